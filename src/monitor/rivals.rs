//! Rival tracking.
//!
//! Rivals are a derived view over the opponent map the aggregator already
//! maintains: one source of truth, no duplicate counters, no mutable
//! promotion flag. An opponent qualifies once the encounter count reaches
//! the threshold.

use crate::domain::aggregate::{RivalEntry, SubjectAggregate};

/// Default repeat-encounter threshold
pub const DEFAULT_MIN_ENCOUNTERS: u64 = 2;

/// Opponents encountered at least `min_encounters` times, most frequent
/// first, ties broken by most recent encounter.
pub fn list_rivals(aggregate: &SubjectAggregate, min_encounters: u64) -> Vec<RivalEntry> {
    let mut rivals: Vec<RivalEntry> = aggregate
        .opponents
        .iter()
        .filter(|(_, record)| record.stats.battles >= min_encounters)
        .map(|(tag, record)| RivalEntry::from_opponent(tag, record))
        .collect();

    rivals.sort_by(|a, b| {
        b.battles
            .cmp(&a.battles)
            .then_with(|| b.last_seen.cmp(&a.last_seen))
    });

    rivals
}

/// Head-to-head record against one opponent, if any battles were counted.
pub fn head_to_head(aggregate: &SubjectAggregate, opponent_tag: &str) -> Option<RivalEntry> {
    aggregate
        .opponents
        .get(opponent_tag)
        .map(|record| RivalEntry::from_opponent(opponent_tag, record))
}
