//! Battle-log API surface
//!
//! The upstream API is poll-only and rate limited. This module exposes the
//! two lookups the monitor consumes behind the `BattleSource` seam so the
//! scheduler can be driven by a scripted source in tests.

pub mod royale;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use types::RawBattle;

pub use royale::RoyaleClient;

/// Normalized player profile, the subset of the upstream payload the
/// monitor cares about.
#[derive(Debug, Clone)]
pub struct PlayerProfile {
    pub tag: String,
    pub name: String,
    pub trophies: Option<i64>,
    pub arena: Option<String>,
}

/// External battle-log/profile lookup API.
///
/// `tag` arguments are normalized (`#`-stripped, uppercase); implementations
/// own any wire encoding. `fetch_battle_log` returns entries newest first,
/// exactly as the upstream serves them.
#[async_trait]
pub trait BattleSource: Send + Sync {
    async fn fetch_profile(&self, tag: &str) -> Result<PlayerProfile>;

    async fn fetch_battle_log(&self, tag: &str) -> Result<Vec<RawBattle>>;
}
