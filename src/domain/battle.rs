use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Outcome of one battle from the monitored subject's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleOutcome {
    Win,
    Loss,
    Draw,
}

impl BattleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BattleOutcome::Win => "win",
            BattleOutcome::Loss => "loss",
            BattleOutcome::Draw => "draw",
        }
    }

    /// Decide the outcome from a crown comparison.
    pub fn from_crowns(own: u32, enemy: u32) -> Self {
        match own.cmp(&enemy) {
            std::cmp::Ordering::Greater => BattleOutcome::Win,
            std::cmp::Ordering::Less => BattleOutcome::Loss,
            std::cmp::Ordering::Equal => BattleOutcome::Draw,
        }
    }
}

impl std::fmt::Display for BattleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical representation of one played match. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleRecord {
    /// Derived stable identifier (the upstream API exposes no canonical one)
    pub id: String,
    pub battle_time: DateTime<Utc>,
    /// Raw game mode name as reported by the API
    pub game_mode: String,
    /// Coarse mode bucket used for statistics
    pub mode_category: String,
    pub outcome: BattleOutcome,
    pub opponent_tag: String,
    pub opponent_name: String,
    /// Subject deck snapshot, up to 8 card names
    #[serde(default)]
    pub deck: Vec<String>,
    /// Opponent deck snapshot, up to 8 card names
    #[serde(default)]
    pub opponent_deck: Vec<String>,
    #[serde(default)]
    pub own_crowns: Option<u32>,
    #[serde(default)]
    pub enemy_crowns: Option<u32>,
    #[serde(default)]
    pub starting_trophies: Option<i64>,
    #[serde(default)]
    pub trophy_change: Option<i64>,
}

impl BattleRecord {
    /// Crown differential (own minus enemy), when both sides reported crowns.
    pub fn crown_diff(&self) -> Option<i64> {
        match (self.own_crowns, self.enemy_crowns) {
            (Some(own), Some(enemy)) => Some(own as i64 - enemy as i64),
            _ => None,
        }
    }
}

/// Derive a stable battle identifier from the fields that survive repeated
/// fetches of the same match. The upstream log carries no canonical id, so
/// identity is (subject, opponent, time, mode) by construction.
pub fn derive_battle_id(
    subject_tag: &str,
    opponent_tag: &str,
    battle_time: DateTime<Utc>,
    game_mode: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(subject_tag.as_bytes());
    hasher.update(b"|");
    hasher.update(opponent_tag.as_bytes());
    hasher.update(b"|");
    hasher.update(battle_time.timestamp_millis().to_be_bytes());
    hasher.update(b"|");
    hasher.update(game_mode.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

/// Fold a raw battle type and game-mode name into a coarse category.
///
/// Categories mirror what players actually distinguish: team modes,
/// casual modes, and competitive ladders all count separately.
pub fn categorize_game_mode(battle_type: &str, mode_name: &str) -> String {
    let battle_type_lc = battle_type.to_lowercase();
    let mode_lc = mode_name.to_lowercase();

    if mode_lc.contains("2v2") || battle_type_lc.contains("2v2") {
        return "2v2".to_string();
    }
    if battle_type_lc.contains("friendly") || mode_lc.contains("friendly") {
        return "Friendly".to_string();
    }
    if battle_type_lc.contains("challenge") || mode_lc.contains("challenge") {
        return "Challenge".to_string();
    }
    if battle_type_lc.contains("tournament") || mode_lc.contains("tournament") {
        return "Tournament".to_string();
    }
    if battle_type_lc.contains("clanwar") || mode_lc.contains("war") || mode_lc.contains("clanwar")
    {
        return "Clan War".to_string();
    }
    if mode_lc.contains("party") {
        return "Party Mode".to_string();
    }
    if battle_type_lc.contains("pathoflegend") || battle_type_lc.contains("ladder") {
        return "Ladder".to_string();
    }

    if !mode_name.is_empty() {
        return mode_name.to_string();
    }

    "1v1".to_string()
}
