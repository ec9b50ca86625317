//! Monitor scheduler.
//!
//! Owns one polling task per active subject and drives the cycle pipeline:
//! fetch -> normalize -> diff -> aggregate -> persist -> notify. Cycles for
//! one subject never overlap; subjects only share the outbound request
//! budget and are otherwise independent; a failing subject backs off on
//! its own without stalling the rest.

use dashmap::DashMap;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::BattleSource;
use crate::config::MonitorConfig;
use crate::domain::battle::BattleRecord;
use crate::domain::subject::{display_tag, MonitorStatus, Subject};
use crate::error::{Result, WatchError};
use crate::monitor::diff::diff;
use crate::monitor::events::{EventSender, MonitorEvent};
use crate::monitor::normalize::normalize;
use crate::monitor::rate_limit::RequestBudget;
use crate::monitor::stats;
use crate::persistence::{StateStore, SubjectRecord};

/// Scheduling phase of one subject's polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    /// Waiting for the next timer tick
    Idle,
    /// A cycle is in flight
    Polling,
    /// Delayed after a fetch failure
    Backoff,
}

impl PollPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollPhase::Idle => "idle",
            PollPhase::Polling => "polling",
            PollPhase::Backoff => "backoff",
        }
    }
}

impl std::fmt::Display for PollPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one completed cycle, for manual triggers and logging
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub new_battles: usize,
    pub discontinuity: bool,
    pub fetch_seq: u64,
}

struct SubjectSlot {
    /// Authoritative in-memory copy of the durable record
    record: RwLock<SubjectRecord>,
    /// Serializes cycles for this subject (loop ticks and manual triggers)
    cycle_lock: Mutex<()>,
    stop: std::sync::Mutex<Option<watch::Sender<bool>>>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
    phase: std::sync::Mutex<PollPhase>,
}

impl SubjectSlot {
    fn new(record: SubjectRecord) -> Arc<Self> {
        Arc::new(Self {
            record: RwLock::new(record),
            cycle_lock: Mutex::new(()),
            stop: std::sync::Mutex::new(None),
            task: std::sync::Mutex::new(None),
            running: AtomicBool::new(false),
            phase: std::sync::Mutex::new(PollPhase::Idle),
        })
    }

    fn set_phase(&self, phase: PollPhase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    fn phase(&self) -> PollPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn signal_stop(&self) {
        if let Some(tx) = self
            .stop
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            let _ = tx.send(true);
        }
    }
}

/// Per-subject polling scheduler gated by a shared request budget
pub struct MonitorScheduler {
    source: Arc<dyn BattleSource>,
    store: Arc<dyn StateStore>,
    budget: Arc<RequestBudget>,
    events: EventSender,
    config: MonitorConfig,
    subjects: DashMap<String, Arc<SubjectSlot>>,
}

impl MonitorScheduler {
    pub fn new(
        source: Arc<dyn BattleSource>,
        store: Arc<dyn StateStore>,
        budget: Arc<RequestBudget>,
        events: EventSender,
        config: MonitorConfig,
    ) -> Self {
        Self {
            source,
            store,
            budget,
            events,
            config,
            subjects: DashMap::new(),
        }
    }

    pub fn source(&self) -> &Arc<dyn BattleSource> {
        &self.source
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn budget(&self) -> &Arc<RequestBudget> {
        &self.budget
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn is_tracked(&self, tag: &str) -> bool {
        self.subjects.contains_key(tag)
    }

    fn slot(&self, tag: &str) -> Result<Arc<SubjectSlot>> {
        self.subjects
            .get(tag)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| WatchError::NotMonitored(display_tag(tag)))
    }

    /// Take ownership of a subject record (newly created or loaded at
    /// startup) and start its polling loop if the subject is active.
    pub fn adopt(self: &Arc<Self>, record: SubjectRecord) {
        let tag = record.tag().to_string();
        let active = record.subject.is_active();
        let slot = SubjectSlot::new(record);
        self.subjects.insert(tag.clone(), slot.clone());
        if active {
            self.spawn_loop(tag, slot);
        }
    }

    /// Current status of every tracked subject.
    pub async fn snapshot(&self) -> Vec<(Subject, PollPhase)> {
        let mut out = Vec::with_capacity(self.subjects.len());
        let slots: Vec<Arc<SubjectSlot>> = self
            .subjects
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for slot in slots {
            let subject = slot.record.read().await.subject.clone();
            out.push((subject, slot.phase()));
        }
        out.sort_by(|a, b| a.0.tag.cmp(&b.0.tag));
        out
    }

    /// Clone of the full record for one subject.
    pub async fn record(&self, tag: &str) -> Result<SubjectRecord> {
        let slot = self.slot(tag)?;
        let record = slot.record.read().await.clone();
        Ok(record)
    }

    /// Pause a subject: it drops out of scheduling, its state freezes.
    /// Safe mid-cycle: an in-flight cycle commits normally, then the loop
    /// persists the paused status and exits.
    pub async fn pause(&self, tag: &str) -> Result<SubjectRecord> {
        let slot = self.slot(tag)?;

        {
            let mut record = slot.record.write().await;
            if !record.subject.is_active() {
                return Err(WatchError::NotMonitored(display_tag(tag)));
            }
            record.subject.status = MonitorStatus::Paused;
        }
        slot.signal_stop();

        // No loop running (one-shot usage): persist the status change here.
        if !slot.running.load(Ordering::SeqCst) {
            let record = slot.record.read().await.clone();
            self.store.commit(&record).await?;
        }

        let record = slot.record.read().await.clone();
        Ok(record)
    }

    /// Reactivate a paused subject, keeping its cursor and aggregate.
    pub async fn resume(self: &Arc<Self>, tag: &str) -> Result<()> {
        let slot = self.slot(tag)?;
        {
            let mut record = slot.record.write().await;
            if record.subject.is_active() {
                return Err(WatchError::AlreadyMonitored(display_tag(tag)));
            }
            record.subject.status = MonitorStatus::Active;
        }
        let record = slot.record.read().await.clone();
        self.store.commit(&record).await?;

        // A pause leaves the old loop winding down briefly; wait it out so
        // the fresh loop is the only one for this subject.
        let handle = slot.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(subject = %display_tag(tag), "subject loop join failed: {}", e);
            }
        }

        self.spawn_loop(tag.to_string(), slot);
        Ok(())
    }

    /// Drop a subject from tracking entirely. Waits for its loop to wind
    /// down, so once this returns nothing will write the subject's record
    /// again; the caller owns deleting the durable copy.
    pub async fn remove(&self, tag: &str) -> Result<()> {
        let (_, slot) = self
            .subjects
            .remove(tag)
            .ok_or_else(|| WatchError::NotMonitored(display_tag(tag)))?;
        slot.signal_stop();
        let handle = slot.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(subject = %display_tag(tag), "subject loop join failed: {}", e);
            }
        }
        Ok(())
    }

    /// Stop every polling loop and wait for in-flight cycles to finish.
    pub async fn shutdown(&self) {
        info!("scheduler shutdown: stopping {} subject loops", self.subjects.len());
        let slots: Vec<Arc<SubjectSlot>> = self
            .subjects
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for slot in &slots {
            slot.signal_stop();
        }
        for slot in slots {
            let handle = slot.task.lock().unwrap_or_else(|e| e.into_inner()).take();
            if let Some(handle) = handle {
                if let Err(e) = handle.await {
                    warn!("subject loop join failed: {}", e);
                }
            }
        }
    }

    fn spawn_loop(self: &Arc<Self>, tag: String, slot: Arc<SubjectSlot>) {
        if slot.running.swap(true, Ordering::SeqCst) {
            warn!(subject = %display_tag(&tag), "polling loop already running");
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        *slot.stop.lock().unwrap_or_else(|e| e.into_inner()) = Some(stop_tx);

        let scheduler = self.clone();
        let loop_slot = slot.clone();
        let handle = tokio::spawn(async move {
            info!(subject = %display_tag(&tag), "monitoring loop started");

            // First tick waits a full (jittered) interval; the jitter keeps
            // a restart with many subjects from slamming the budget at once.
            let mut delay = scheduler.poll_delay();
            let mut transient_failures = 0u32;
            let mut store_failures = 0u32;

            loop {
                loop_slot.set_phase(if transient_failures > 0 {
                    PollPhase::Backoff
                } else {
                    PollPhase::Idle
                });

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                }
                if *stop_rx.borrow() {
                    break;
                }

                loop_slot.set_phase(PollPhase::Polling);
                match scheduler.run_cycle(&tag).await {
                    Ok(report) => {
                        transient_failures = 0;
                        store_failures = 0;
                        if report.new_battles > 0 {
                            info!(
                                subject = %display_tag(&tag),
                                new_battles = report.new_battles,
                                "cycle complete"
                            );
                        }
                        delay = scheduler.poll_delay();
                    }
                    Err(WatchError::NotMonitored(_)) => break,
                    Err(WatchError::RateLimited { retry_after }) => {
                        transient_failures += 1;
                        delay = scheduler.rate_limit_delay(retry_after, transient_failures);
                        warn!(
                            subject = %display_tag(&tag),
                            delay_secs = delay.as_secs(),
                            "rate limited, backing off"
                        );
                    }
                    Err(WatchError::StateStore(e)) => {
                        store_failures += 1;
                        if store_failures >= scheduler.config.max_store_failures {
                            error!(
                                subject = %display_tag(&tag),
                                consecutive = store_failures,
                                "state store keeps failing, cycle results are being discarded: {}",
                                e
                            );
                        } else {
                            warn!(
                                subject = %display_tag(&tag),
                                "state store commit failed, retrying next cycle: {}",
                                e
                            );
                        }
                        delay = scheduler.poll_delay();
                    }
                    Err(e) if e.is_retryable() => {
                        transient_failures += 1;
                        if transient_failures == scheduler.config.max_transient_failures {
                            let _ = scheduler.events.send(MonitorEvent::SubjectUnreachable {
                                subject_tag: tag.clone(),
                                consecutive_failures: transient_failures,
                            });
                        }
                        delay = scheduler.backoff_delay(transient_failures);
                        warn!(
                            subject = %display_tag(&tag),
                            kind = e.kind(),
                            failures = transient_failures,
                            delay_secs = delay.as_secs(),
                            "fetch failed, backing off: {}",
                            e
                        );
                    }
                    Err(e) => {
                        // Non-retryable (e.g. the tag vanished upstream):
                        // keep the subject but poll at the normal cadence.
                        error!(
                            subject = %display_tag(&tag),
                            kind = e.kind(),
                            "cycle failed: {}",
                            e
                        );
                        delay = scheduler.poll_delay();
                    }
                }
            }

            // Persist whatever status the record carries now; after an
            // unmonitor this is what makes the pause durable. Taking the
            // cycle lock lets an in-flight manual cycle finish and commit
            // first.
            {
                let _cycle = loop_slot.cycle_lock.lock().await;
                let record = loop_slot.record.read().await.clone();
                if let Err(e) = scheduler.store.commit(&record).await {
                    warn!(subject = %display_tag(&tag), "final commit on loop exit failed: {}", e);
                }
            }

            loop_slot.set_phase(PollPhase::Idle);
            loop_slot.running.store(false, Ordering::SeqCst);
            info!(subject = %display_tag(&tag), "monitoring loop stopped");
        });

        *slot.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Run one full cycle for a subject: fetch, normalize, diff, aggregate,
    /// persist, then publish events. Serialized against the subject's loop.
    pub async fn run_cycle(&self, tag: &str) -> Result<CycleReport> {
        let slot = self.slot(tag)?;
        let _cycle = slot.cycle_lock.lock().await;

        if !slot.record.read().await.subject.is_active() {
            return Err(WatchError::NotMonitored(display_tag(tag)));
        }

        // Fetch under the shared budget.
        self.budget.acquire().await;
        let raw_log = self.source.fetch_battle_log(tag).await?;

        let mut fresh: Vec<BattleRecord> = Vec::with_capacity(raw_log.len());
        for raw in &raw_log {
            match normalize(tag, raw) {
                Ok(record) => fresh.push(record),
                Err(e) => {
                    warn!(subject = %display_tag(tag), "skipping battle entry: {}", e);
                }
            }
        }

        let pre = slot.record.read().await.clone();
        let outcome = diff(&pre.cursor, &fresh);

        let mut aggregate = pre.aggregate.clone();
        let mut promotions: Vec<(String, String, u64)> = Vec::new();
        let threshold = self.config.min_rival_encounters;
        for battle in &outcome.unseen {
            let encounters_before = aggregate
                .opponents
                .get(&battle.opponent_tag)
                .map(|o| o.stats.battles)
                .unwrap_or(0);
            stats::apply(&mut aggregate, battle);
            if encounters_before + 1 == threshold {
                promotions.push((
                    battle.opponent_tag.clone(),
                    battle.opponent_name.clone(),
                    threshold,
                ));
            }
        }
        debug_assert!(aggregate.is_consistent());

        let mut subject = pre.subject.clone();
        let mut arena_change: Option<(String, String, Option<i64>)> = None;
        if self.config.profile_refresh_cycles > 0
            && outcome.cursor.fetch_seq % self.config.profile_refresh_cycles == 0
        {
            self.budget.acquire().await;
            match self.source.fetch_profile(tag).await {
                Ok(profile) => {
                    subject.name = profile.name;
                    if let (Some(previous), Some(current)) = (&subject.arena, &profile.arena) {
                        if previous != current {
                            arena_change =
                                Some((previous.clone(), current.clone(), profile.trophies));
                        }
                    }
                    if profile.arena.is_some() {
                        subject.arena = profile.arena;
                    }
                    if profile.trophies.is_some() {
                        subject.trophies = profile.trophies;
                    }
                }
                Err(e) => {
                    // Profile refresh is cosmetic; battle accounting already
                    // succeeded this cycle.
                    debug!(subject = %display_tag(tag), "profile refresh skipped: {}", e);
                }
            }
        }

        // The status may have flipped to paused while this cycle was in
        // flight; the commit must not resurrect the active status.
        subject.status = slot.record.read().await.subject.status;

        let new_record = SubjectRecord {
            subject,
            cursor: outcome.cursor.clone(),
            aggregate,
        };
        self.store.commit(&new_record).await?;

        // Disk is ahead now; fold the committed state back into memory.
        {
            let mut record = slot.record.write().await;
            record.cursor = new_record.cursor.clone();
            record.aggregate = new_record.aggregate.clone();
            record.subject.name = new_record.subject.name.clone();
            record.subject.arena = new_record.subject.arena.clone();
            record.subject.trophies = new_record.subject.trophies;
        }

        // Publish only after the durable commit.
        if outcome.discontinuity {
            warn!(subject = %display_tag(tag), "battle log discontinuity detected");
            let _ = self.events.send(MonitorEvent::LogDiscontinuity {
                subject_tag: tag.to_string(),
                fetch_seq: outcome.cursor.fetch_seq,
            });
        }
        for battle in &outcome.unseen {
            let _ = self.events.send(MonitorEvent::NewBattle {
                subject_tag: tag.to_string(),
                subject_name: new_record.subject.name.clone(),
                battle: battle.clone(),
                totals: new_record.aggregate.totals,
            });
        }
        for (opponent_tag, opponent_name, encounters) in promotions {
            let _ = self.events.send(MonitorEvent::RivalPromoted {
                subject_tag: tag.to_string(),
                opponent_tag,
                opponent_name,
                encounters,
            });
        }
        if let Some((previous, current, trophies)) = arena_change {
            let _ = self.events.send(MonitorEvent::ArenaChanged {
                subject_tag: tag.to_string(),
                subject_name: new_record.subject.name.clone(),
                previous,
                current,
                trophies,
            });
        }

        Ok(CycleReport {
            new_battles: outcome.unseen.len(),
            discontinuity: outcome.discontinuity,
            fetch_seq: outcome.cursor.fetch_seq,
        })
    }

    /// An upstream retry hint wins over the exponential schedule.
    fn rate_limit_delay(&self, retry_after: Option<Duration>, failures: u32) -> Duration {
        retry_after.unwrap_or_else(|| self.backoff_delay(failures))
    }

    fn poll_delay(&self) -> Duration {
        let secs = self.config.poll_interval_secs;
        let jitter_max = (secs / 10).max(1);
        let jitter = rand::thread_rng().gen_range(0..=jitter_max);
        Duration::from_secs(secs + jitter)
    }

    fn backoff_delay(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(16);
        let secs = self
            .config
            .backoff_base_secs
            .saturating_mul(1u64 << shift)
            .min(self.config.backoff_cap_secs);
        let jitter = rand::thread_rng().gen_range(0..=(secs / 4).max(1));
        Duration::from_secs(secs + jitter)
    }
}
