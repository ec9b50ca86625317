pub mod aggregate;
pub mod battle;
pub mod subject;

pub use aggregate::{
    BucketStats, MonitorCursor, OpponentRecord, RivalEntry, SubjectAggregate,
};
pub use battle::{categorize_game_mode, derive_battle_id, BattleOutcome, BattleRecord};
pub use subject::{normalize_tag, MonitorStatus, Subject};
