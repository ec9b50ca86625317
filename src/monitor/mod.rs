//! Monitoring and battle-diff engine.
//!
//! Pipeline per cycle: fetch -> normalize -> diff -> aggregate -> persist
//! -> notify. The pure pieces (normalize, diff, stats, rivals) live beside
//! the scheduler that drives them.

pub mod diff;
pub mod events;
pub mod normalize;
pub mod rate_limit;
pub mod rivals;
pub mod scheduler;
pub mod service;
pub mod stats;

pub use diff::{diff as diff_battle_log, DiffOutcome};
pub use events::{event_channel, EventReceiver, EventSender, MonitorEvent};
pub use normalize::normalize;
pub use rate_limit::RequestBudget;
pub use rivals::{head_to_head, list_rivals, DEFAULT_MIN_ENCOUNTERS};
pub use scheduler::{CycleReport, MonitorScheduler, PollPhase};
pub use service::{MonitorService, RivalsReply};
