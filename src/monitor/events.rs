//! Monitoring events handed to the notification collaborator.
//!
//! Events are published after a cycle's state is durably committed, so a
//! consumer never sees a battle the aggregates could forget about.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::domain::aggregate::BucketStats;
use crate::domain::battle::BattleRecord;
use crate::domain::subject::display_tag;

/// One notification-worthy observation from a monitoring cycle
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    NewBattle {
        subject_tag: String,
        subject_name: String,
        battle: BattleRecord,
        /// Overall totals after this battle was counted
        totals: BucketStats,
    },
    RivalPromoted {
        subject_tag: String,
        opponent_tag: String,
        opponent_name: String,
        encounters: u64,
    },
    LogDiscontinuity {
        subject_tag: String,
        fetch_seq: u64,
    },
    ArenaChanged {
        subject_tag: String,
        subject_name: String,
        previous: String,
        current: String,
        trophies: Option<i64>,
    },
    SubjectUnreachable {
        subject_tag: String,
        consecutive_failures: u32,
    },
}

impl MonitorEvent {
    pub fn subject_tag(&self) -> &str {
        match self {
            MonitorEvent::NewBattle { subject_tag, .. }
            | MonitorEvent::RivalPromoted { subject_tag, .. }
            | MonitorEvent::LogDiscontinuity { subject_tag, .. }
            | MonitorEvent::ArenaChanged { subject_tag, .. }
            | MonitorEvent::SubjectUnreachable { subject_tag, .. } => subject_tag,
        }
    }

    /// Short human-readable rendering for logs and webhook notifications.
    pub fn describe(&self) -> String {
        match self {
            MonitorEvent::NewBattle {
                subject_name,
                battle,
                totals,
                ..
            } => {
                let crowns = match (battle.own_crowns, battle.enemy_crowns) {
                    (Some(own), Some(enemy)) => format!(" {}-{}", own, enemy),
                    _ => String::new(),
                };
                format!(
                    "NEW BATTLE: {} {}{} vs {} [{}] | Session: {}W/{}L ({:.1}% WR)",
                    subject_name,
                    battle.outcome.as_str().to_uppercase(),
                    crowns,
                    battle.opponent_name,
                    battle.mode_category,
                    totals.wins,
                    totals.losses,
                    totals.win_rate() * 100.0,
                )
            }
            MonitorEvent::RivalPromoted {
                subject_tag,
                opponent_name,
                encounters,
                ..
            } => format!(
                "RIVALRY: {} has now faced {} {} times",
                display_tag(subject_tag),
                opponent_name,
                encounters
            ),
            MonitorEvent::LogDiscontinuity {
                subject_tag,
                fetch_seq,
            } => format!(
                "LOG DISCONTINUITY: battle log for {} rotated past the cursor (fetch #{})",
                display_tag(subject_tag),
                fetch_seq
            ),
            MonitorEvent::ArenaChanged {
                subject_name,
                previous,
                current,
                trophies,
                ..
            } => {
                let trophy_str = trophies
                    .map(|t| format!(" ({} trophies)", t))
                    .unwrap_or_default();
                format!(
                    "ARENA CHANGE: {} moved {} -> {}{}",
                    subject_name, previous, current, trophy_str
                )
            }
            MonitorEvent::SubjectUnreachable {
                subject_tag,
                consecutive_failures,
            } => format!(
                "UNREACHABLE: {} failed {} consecutive fetches",
                display_tag(subject_tag),
                consecutive_failures
            ),
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<MonitorEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<MonitorEvent>;

/// Create the event channel connecting the scheduler to the notification
/// collaborator. Unbounded: cycles must never block on a slow consumer.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
