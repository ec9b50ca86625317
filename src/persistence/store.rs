//! Durable state store contract.
//!
//! One record per subject, keyed by normalized tag. `commit` replaces the
//! whole record atomically: after a crash, a cycle's cursor and aggregate
//! are either both visible or both absent; a half-applied pair would break
//! at-most-once counting.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::aggregate::{MonitorCursor, SubjectAggregate};
use crate::domain::subject::Subject;
use crate::error::Result;

/// The durable unit: everything the monitor knows about one subject
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub subject: Subject,
    pub cursor: MonitorCursor,
    pub aggregate: SubjectAggregate,
}

impl SubjectRecord {
    pub fn new(subject: Subject) -> Self {
        Self {
            subject,
            cursor: MonitorCursor::default(),
            aggregate: SubjectAggregate::default(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.subject.tag
    }
}

/// Key-value durable store with snapshot-replace commit semantics
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load every persisted subject at startup.
    async fn load_all(&self) -> Result<Vec<SubjectRecord>>;

    /// Atomically replace the persisted record for this subject.
    async fn commit(&self, record: &SubjectRecord) -> Result<()>;

    /// Persist a brand-new subject; fails if one already exists.
    async fn create_subject(&self, record: &SubjectRecord) -> Result<()>;

    /// Remove the persisted record. Idempotent.
    async fn delete_subject(&self, tag: &str) -> Result<()>;
}
