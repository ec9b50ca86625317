use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::battle::{BattleOutcome, BattleRecord};

/// Win/loss/draw counters for one bucket (overall, a mode, or an opponent).
///
/// Win rate is never stored; it is always derived at read time so repeated
/// incremental updates cannot accumulate rounding drift.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketStats {
    pub battles: u64,
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
}

impl BucketStats {
    pub fn record(&mut self, outcome: BattleOutcome) {
        self.battles += 1;
        match outcome {
            BattleOutcome::Win => self.wins += 1,
            BattleOutcome::Loss => self.losses += 1,
            BattleOutcome::Draw => self.draws += 1,
        }
    }

    /// wins / battles, defined as 0 when no battles were counted.
    pub fn win_rate(&self) -> f64 {
        if self.battles == 0 {
            0.0
        } else {
            self.wins as f64 / self.battles as f64
        }
    }
}

/// Head-to-head counters against one opponent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpponentRecord {
    pub name: String,
    pub stats: BucketStats,
    pub last_seen: DateTime<Utc>,
}

/// Per-subject running statistics. Mutated strictly additively by the
/// aggregator; never recomputed from history in the steady state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectAggregate {
    pub totals: BucketStats,
    pub by_mode: HashMap<String, BucketStats>,
    /// Keyed by normalized opponent tag
    pub opponents: HashMap<String, OpponentRecord>,
}

impl SubjectAggregate {
    pub fn overall_win_rate(&self) -> f64 {
        self.totals.win_rate()
    }

    /// Counting invariant: the overall total equals the sum over mode
    /// buckets and the sum over opponent buckets.
    pub fn is_consistent(&self) -> bool {
        let mode_sum: u64 = self.by_mode.values().map(|b| b.battles).sum();
        let opponent_sum: u64 = self.opponents.values().map(|o| o.stats.battles).sum();
        self.totals.battles == mode_sum && self.totals.battles == opponent_sum
    }
}

/// Pointer into the battle log marking the newest battle already processed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorCursor {
    #[serde(default)]
    pub last_battle_id: Option<String>,
    #[serde(default)]
    pub last_battle_time: Option<DateTime<Utc>>,
    /// Monotonic fetch counter, useful when diagnosing upstream log rotation
    #[serde(default)]
    pub fetch_seq: u64,
}

/// Derived view over one entry of the opponent map once the encounter
/// threshold is met.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RivalEntry {
    pub tag: String,
    pub name: String,
    pub battles: u64,
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
    pub win_rate: f64,
    pub last_seen: DateTime<Utc>,
}

impl RivalEntry {
    pub fn from_opponent(tag: &str, record: &OpponentRecord) -> Self {
        Self {
            tag: tag.to_string(),
            name: record.name.clone(),
            battles: record.stats.battles,
            wins: record.stats.wins,
            losses: record.stats.losses,
            draws: record.stats.draws,
            win_rate: record.stats.win_rate(),
            last_seen: record.last_seen,
        }
    }
}

/// Convenience: a battle's timestamp paired with its id, as stored in the
/// cursor after a cycle.
pub fn cursor_from_newest(record: &BattleRecord, fetch_seq: u64) -> MonitorCursor {
    MonitorCursor {
        last_battle_id: Some(record.id.clone()),
        last_battle_time: Some(record.battle_time),
        fetch_seq,
    }
}
