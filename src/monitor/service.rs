//! Command surface for the monitor.
//!
//! The thin operations layer a chat bot, CLI, or any other command
//! collaborator calls into. Tags arrive raw (with or without `#`) and are
//! normalized at this boundary.

use std::sync::Arc;
use tracing::info;

use crate::domain::aggregate::{RivalEntry, SubjectAggregate};
use crate::domain::subject::{display_tag, normalize_tag, Subject};
use crate::error::{Result, WatchError};
use crate::monitor::rivals;
use crate::monitor::scheduler::{CycleReport, MonitorScheduler, PollPhase};
use crate::persistence::SubjectRecord;

/// Answer to a rivals query
#[derive(Debug, Clone)]
pub enum RivalsReply {
    /// All repeat opponents, most frequent first
    List(Vec<RivalEntry>),
    /// Head-to-head record against one opponent
    HeadToHead(RivalEntry),
}

/// Monitoring operations exposed to command collaborators
pub struct MonitorService {
    scheduler: Arc<MonitorScheduler>,
}

impl MonitorService {
    pub fn new(scheduler: Arc<MonitorScheduler>) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Arc<MonitorScheduler> {
        &self.scheduler
    }

    /// Load every persisted subject and resume polling for the active ones.
    pub async fn bootstrap(&self) -> Result<usize> {
        let records = self.scheduler.store().load_all().await?;
        let count = records.len();
        for record in records {
            self.scheduler.adopt(record);
        }
        info!(subjects = count, "monitoring state loaded");
        Ok(count)
    }

    /// Begin monitoring a player. Validates the tag against the upstream
    /// profile endpoint first; re-monitoring a paused subject resumes it
    /// with its history intact.
    pub async fn start_monitoring(&self, raw_tag: &str) -> Result<Subject> {
        let tag = normalize_tag(raw_tag)?;

        if self.scheduler.is_tracked(&tag) {
            let record = self.scheduler.record(&tag).await?;
            if record.subject.is_active() {
                return Err(WatchError::AlreadyMonitored(display_tag(&tag)));
            }
            self.scheduler.resume(&tag).await?;
            info!(subject = %display_tag(&tag), "monitoring resumed");
            return Ok(self.scheduler.record(&tag).await?.subject);
        }

        self.scheduler.budget().acquire().await;
        let profile = self.scheduler.source().fetch_profile(&tag).await?;

        let mut subject = Subject::new(tag.clone(), profile.name);
        subject.arena = profile.arena;
        subject.trophies = profile.trophies;

        let record = SubjectRecord::new(subject.clone());
        self.scheduler.store().create_subject(&record).await?;
        self.scheduler.adopt(record);

        info!(subject = %display_tag(&tag), name = %subject.name, "monitoring started");
        Ok(subject)
    }

    /// Stop monitoring a player. State is frozen, not deleted; an in-flight
    /// cycle finishes and commits before the loop winds down.
    pub async fn stop_monitoring(&self, raw_tag: &str) -> Result<Subject> {
        let tag = normalize_tag(raw_tag)?;
        let record = self.scheduler.pause(&tag).await?;
        info!(subject = %display_tag(&tag), "monitoring stopped");
        Ok(record.subject)
    }

    /// Every tracked subject with its current scheduling phase.
    pub async fn list_monitored(&self) -> Vec<(Subject, PollPhase)> {
        self.scheduler.snapshot().await
    }

    /// Running statistics for a tracked subject (active or paused).
    pub async fn get_stats(&self, raw_tag: &str) -> Result<SubjectAggregate> {
        let tag = normalize_tag(raw_tag)?;
        Ok(self.scheduler.record(&tag).await?.aggregate)
    }

    /// Repeat opponents, or the head-to-head record against one of them.
    pub async fn get_rivals(
        &self,
        raw_tag: &str,
        opponent: Option<&str>,
    ) -> Result<RivalsReply> {
        let tag = normalize_tag(raw_tag)?;
        let aggregate = self.scheduler.record(&tag).await?.aggregate;

        match opponent {
            Some(raw_opponent) => {
                let opponent_tag = normalize_tag(raw_opponent)?;
                rivals::head_to_head(&aggregate, &opponent_tag)
                    .map(RivalsReply::HeadToHead)
                    .ok_or_else(|| WatchError::NotFound(display_tag(&opponent_tag)))
            }
            None => Ok(RivalsReply::List(rivals::list_rivals(
                &aggregate,
                self.scheduler.config().min_rival_encounters,
            ))),
        }
    }

    /// Delete a subject and its durable record outright.
    pub async fn forget_subject(&self, raw_tag: &str) -> Result<()> {
        let tag = normalize_tag(raw_tag)?;
        self.scheduler.remove(&tag).await?;
        self.scheduler.store().delete_subject(&tag).await?;
        info!(subject = %display_tag(&tag), "subject forgotten");
        Ok(())
    }

    /// Manually trigger one cycle for a subject, serialized with its loop.
    pub async fn poll_now(&self, raw_tag: &str) -> Result<CycleReport> {
        let tag = normalize_tag(raw_tag)?;
        self.scheduler.run_cycle(&tag).await
    }

    /// Stop all polling loops, waiting for in-flight cycles.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}
