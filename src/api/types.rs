//! Raw wire payloads for the battle-log API.
//!
//! Everything is optional-tolerant: the normalizer decides which absences
//! are fatal for a record, not the deserializer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBattle {
    /// Compact upstream timestamp, e.g. `20250601T123000.000Z`
    #[serde(default)]
    pub battle_time: String,
    #[serde(rename = "type", default)]
    pub battle_type: String,
    #[serde(default)]
    pub game_mode: Option<RawGameMode>,
    #[serde(default)]
    pub arena: Option<RawArena>,
    #[serde(default)]
    pub team: Vec<RawParticipant>,
    #[serde(default)]
    pub opponent: Vec<RawParticipant>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawGameMode {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawArena {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawParticipant {
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub crowns: Option<u32>,
    #[serde(default)]
    pub starting_trophies: Option<i64>,
    #[serde(default)]
    pub trophy_change: Option<i64>,
    #[serde(default)]
    pub cards: Vec<RawCard>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCard {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub level: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProfile {
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub trophies: Option<i64>,
    #[serde(default)]
    pub arena: Option<RawArena>,
}
