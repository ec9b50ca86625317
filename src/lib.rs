pub mod adapters;
pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod monitor;
pub mod persistence;

pub use adapters::WebhookNotifier;
pub use api::{BattleSource, PlayerProfile, RoyaleClient};
pub use config::AppConfig;
pub use domain::{
    BattleOutcome, BattleRecord, BucketStats, MonitorCursor, MonitorStatus, RivalEntry, Subject,
    SubjectAggregate,
};
pub use error::{Result, WatchError};
pub use monitor::{
    event_channel, CycleReport, EventReceiver, EventSender, MonitorEvent, MonitorScheduler,
    MonitorService, PollPhase, RequestBudget, RivalsReply,
};
pub use persistence::{JsonFileStore, StateStore, SubjectRecord};
