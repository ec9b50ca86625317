//! Battle-log diffing.
//!
//! Turns a freshly fetched ordered log into the set of battles not yet
//! processed for a subject. Pure: no side effects, same inputs give the
//! same outcome, the caller decides what to commit.

use std::collections::HashSet;

use crate::domain::aggregate::{cursor_from_newest, MonitorCursor};
use crate::domain::battle::BattleRecord;

/// Result of diffing one fresh fetch against the subject's cursor
#[derive(Debug, Clone)]
pub struct DiffOutcome {
    /// Battles not yet processed, oldest first
    pub unseen: Vec<BattleRecord>,
    /// Cursor to persist once the unseen battles are folded in
    pub cursor: MonitorCursor,
    /// The stored cursor id was absent from a non-empty fetch: the upstream
    /// log rotated or truncated past it
    pub discontinuity: bool,
}

/// Diff a fresh battle log (newest first) against the last-known cursor.
///
/// Scan from the newest entry, collecting until the cursor id matches or the
/// log runs out. First-ever poll: the whole fetch is historical baseline;
/// only the newest id is recorded, nothing is reported as new. A cursor id
/// missing from a non-empty log marks a discontinuity and the entire fetch
/// counts as unseen; the cycle never fails for it.
pub fn diff(cursor: &MonitorCursor, fresh: &[BattleRecord]) -> DiffOutcome {
    let fetch_seq = cursor.fetch_seq + 1;

    let newest = match fresh.first() {
        Some(newest) => newest,
        None => {
            // Empty fetch: the cursor position is unchanged.
            let mut next = cursor.clone();
            next.fetch_seq = fetch_seq;
            return DiffOutcome {
                unseen: Vec::new(),
                cursor: next,
                discontinuity: false,
            };
        }
    };

    let last_id = match &cursor.last_battle_id {
        Some(id) => id,
        None => {
            return DiffOutcome {
                unseen: Vec::new(),
                cursor: cursor_from_newest(newest, fetch_seq),
                discontinuity: false,
            };
        }
    };

    let mut collected: Vec<BattleRecord> = Vec::new();
    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut found_cursor = false;

    for record in fresh {
        if record.id == *last_id {
            found_cursor = true;
            break;
        }
        // Derived ids can collide within one fetch when the upstream
        // repeats an entry; count it once.
        if seen_ids.insert(record.id.as_str()) {
            collected.push(record.clone());
        }
    }

    collected.reverse();

    DiffOutcome {
        unseen: collected,
        cursor: cursor_from_newest(newest, fetch_seq),
        discontinuity: !found_cursor,
    }
}
