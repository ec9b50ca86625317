//! Incremental statistics aggregation.
//!
//! Each unseen battle is folded into the subject's running aggregate
//! exactly once: overall totals, the mode bucket, and the opponent bucket.
//! Ratios are never stored; win rates are derived on read.

use crate::domain::aggregate::{OpponentRecord, SubjectAggregate};
use crate::domain::battle::BattleRecord;

/// Fold one battle into the aggregate. Strictly additive.
pub fn apply(aggregate: &mut SubjectAggregate, battle: &BattleRecord) {
    aggregate.totals.record(battle.outcome);

    aggregate
        .by_mode
        .entry(battle.mode_category.clone())
        .or_default()
        .record(battle.outcome);

    let opponent = aggregate
        .opponents
        .entry(battle.opponent_tag.clone())
        .or_insert_with(|| OpponentRecord {
            name: battle.opponent_name.clone(),
            stats: Default::default(),
            last_seen: battle.battle_time,
        });
    // Names drift; the tag is the identity.
    opponent.name = battle.opponent_name.clone();
    opponent.stats.record(battle.outcome);
    opponent.last_seen = battle.battle_time;
}
