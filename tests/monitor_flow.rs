//! End-to-end monitoring pipeline tests: a scripted battle source and a
//! real snapshot store on disk, driven through the service surface.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use battlewatch::api::types::{RawBattle, RawGameMode, RawParticipant};
use battlewatch::api::{BattleSource, PlayerProfile};
use battlewatch::config::MonitorConfig;
use battlewatch::domain::MonitorStatus;
use battlewatch::monitor::{
    event_channel, EventReceiver, MonitorEvent, MonitorScheduler, MonitorService, RequestBudget,
    RivalsReply,
};
use battlewatch::persistence::{JsonFileStore, StateStore, SubjectRecord};
use battlewatch::{Result, WatchError};

const SUBJECT: &str = "ABC123";

/// Scripted battle source: profiles and logs are set by the test; an
/// optional gate lets a test hold a fetch in flight.
struct ScriptedSource {
    profiles: Mutex<HashMap<String, PlayerProfile>>,
    logs: Mutex<HashMap<String, Vec<RawBattle>>>,
    gate: Mutex<Option<Arc<Notify>>>,
    fetch_started: Arc<Notify>,
}

impl ScriptedSource {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            profiles: Mutex::new(HashMap::new()),
            logs: Mutex::new(HashMap::new()),
            gate: Mutex::new(None),
            fetch_started: Arc::new(Notify::new()),
        })
    }

    async fn set_profile(&self, tag: &str, name: &str) {
        self.profiles.lock().await.insert(
            tag.to_string(),
            PlayerProfile {
                tag: tag.to_string(),
                name: name.to_string(),
                trophies: Some(6000),
                arena: Some("Arena 15".to_string()),
            },
        );
    }

    /// Install the battle log for a tag; `battles` is chronological and is
    /// reversed to the upstream's newest-first order.
    async fn set_log(&self, tag: &str, battles: Vec<RawBattle>) {
        let mut newest_first = battles;
        newest_first.reverse();
        self.logs.lock().await.insert(tag.to_string(), newest_first);
    }

    async fn hold_next_fetch(&self) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        *self.gate.lock().await = Some(release.clone());
        release
    }
}

#[async_trait]
impl BattleSource for ScriptedSource {
    async fn fetch_profile(&self, tag: &str) -> Result<PlayerProfile> {
        self.profiles
            .lock()
            .await
            .get(tag)
            .cloned()
            .ok_or_else(|| WatchError::NotFound(format!("#{}", tag)))
    }

    async fn fetch_battle_log(&self, tag: &str) -> Result<Vec<RawBattle>> {
        let gate = self.gate.lock().await.take();
        if let Some(gate) = gate {
            self.fetch_started.notify_one();
            gate.notified().await;
        }
        Ok(self
            .logs
            .lock()
            .await
            .get(tag)
            .cloned()
            .unwrap_or_default())
    }
}

/// Store wrapper that can be told to fail commits, for crash-consistency
/// tests.
struct FlakyStore {
    inner: JsonFileStore,
    fail_commits: AtomicBool,
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn load_all(&self) -> Result<Vec<SubjectRecord>> {
        self.inner.load_all().await
    }

    async fn commit(&self, record: &SubjectRecord) -> Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(WatchError::StateStore("injected commit failure".into()));
        }
        self.inner.commit(record).await
    }

    async fn create_subject(&self, record: &SubjectRecord) -> Result<()> {
        self.inner.create_subject(record).await
    }

    async fn delete_subject(&self, tag: &str) -> Result<()> {
        self.inner.delete_subject(tag).await
    }
}

struct Harness {
    service: MonitorService,
    source: Arc<ScriptedSource>,
    store: Arc<FlakyStore>,
    events: EventReceiver,
    dir: PathBuf,
}

static DIR_SEQ: AtomicU64 = AtomicU64::new(0);

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!(
        "battlewatch-flow-test-{}-{}",
        std::process::id(),
        DIR_SEQ.fetch_add(1, Ordering::SeqCst)
    ))
}

fn test_config() -> MonitorConfig {
    MonitorConfig {
        // Long enough that background loops never tick during a test;
        // cycles are driven manually through poll_now.
        poll_interval_secs: 3600,
        requests_per_sec: 1000.0,
        burst: 100,
        profile_refresh_cycles: 0,
        ..MonitorConfig::default()
    }
}

fn harness_in(dir: PathBuf, config: MonitorConfig) -> Harness {
    let source = ScriptedSource::new();
    let store = Arc::new(FlakyStore {
        inner: JsonFileStore::new(&dir).unwrap(),
        fail_commits: AtomicBool::new(false),
    });
    let (events_tx, events) = event_channel();
    let scheduler = Arc::new(MonitorScheduler::new(
        source.clone(),
        store.clone(),
        RequestBudget::new(config.requests_per_sec, config.burst),
        events_tx,
        config,
    ));
    Harness {
        service: MonitorService::new(scheduler),
        source,
        store,
        events,
        dir,
    }
}

fn harness() -> Harness {
    harness_in(temp_dir(), test_config())
}

impl Harness {
    fn drain_events(&mut self) -> Vec<MonitorEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    fn cleanup(&self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn raw_battle(
    time: &str,
    opponent_tag: &str,
    opponent_name: &str,
    own_crowns: u32,
    enemy_crowns: u32,
    mode: &str,
) -> RawBattle {
    RawBattle {
        battle_time: time.to_string(),
        battle_type: "PvP".to_string(),
        game_mode: Some(RawGameMode {
            id: None,
            name: Some(mode.to_string()),
        }),
        arena: None,
        team: vec![RawParticipant {
            tag: Some(format!("#{}", SUBJECT)),
            name: Some("Player One".to_string()),
            crowns: Some(own_crowns),
            starting_trophies: Some(6000),
            trophy_change: None,
            cards: vec![],
        }],
        opponent: vec![RawParticipant {
            tag: Some(format!("#{}", opponent_tag)),
            name: Some(opponent_name.to_string()),
            crowns: Some(enemy_crowns),
            starting_trophies: None,
            trophy_change: None,
            cards: vec![],
        }],
    }
}

fn baseline_battle() -> RawBattle {
    raw_battle("20250601T100000.000Z", "BASE00", "Baseline", 1, 0, "Ladder")
}

async fn monitored_with_baseline(harness: &mut Harness) {
    harness.source.set_profile(SUBJECT, "Player One").await;
    harness.source.set_log(SUBJECT, vec![baseline_battle()]).await;
    harness.service.start_monitoring(SUBJECT).await.unwrap();
    let report = harness.service.poll_now(SUBJECT).await.unwrap();
    assert_eq!(report.new_battles, 0, "first poll must baseline, not count");
    harness.drain_events();
}

#[tokio::test]
async fn first_poll_baselines_without_events() {
    let mut harness = harness();
    harness.source.set_profile(SUBJECT, "Player One").await;
    harness
        .source
        .set_log(
            SUBJECT,
            vec![
                raw_battle("20250601T100000.000Z", "OPP001", "Old", 1, 0, "Ladder"),
                raw_battle("20250601T101000.000Z", "OPP002", "Older", 0, 2, "Ladder"),
            ],
        )
        .await;

    harness.service.start_monitoring(SUBJECT).await.unwrap();
    let report = harness.service.poll_now(SUBJECT).await.unwrap();

    assert_eq!(report.new_battles, 0);
    assert!(!report.discontinuity);
    assert!(harness.drain_events().is_empty());

    let stats = harness.service.get_stats(SUBJECT).await.unwrap();
    assert_eq!(stats.totals.battles, 0);

    // Same log again: still nothing new.
    let report = harness.service.poll_now(SUBJECT).await.unwrap();
    assert_eq!(report.new_battles, 0);

    harness.service.shutdown().await;
    harness.cleanup();
}

#[tokio::test]
async fn new_battles_count_exactly_once() {
    let mut harness = harness();
    monitored_with_baseline(&mut harness).await;

    harness
        .source
        .set_log(
            SUBJECT,
            vec![
                baseline_battle(),
                raw_battle("20250601T110000.000Z", "OPP001", "First", 3, 0, "Ladder"),
                raw_battle("20250601T111000.000Z", "OPP002", "Second", 0, 1, "Ladder"),
            ],
        )
        .await;

    let report = harness.service.poll_now(SUBJECT).await.unwrap();
    assert_eq!(report.new_battles, 2);

    let battle_events: Vec<_> = harness
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, MonitorEvent::NewBattle { .. }))
        .collect();
    assert_eq!(battle_events.len(), 2);

    // Identical fetch repeated: idempotent, nothing recounted.
    let report = harness.service.poll_now(SUBJECT).await.unwrap();
    assert_eq!(report.new_battles, 0);
    assert!(harness.drain_events().is_empty());

    let stats = harness.service.get_stats(SUBJECT).await.unwrap();
    assert_eq!(stats.totals.battles, 2);
    assert_eq!(stats.totals.wins, 1);
    assert_eq!(stats.totals.losses, 1);
    assert!(stats.is_consistent());

    harness.service.shutdown().await;
    harness.cleanup();
}

#[tokio::test]
async fn aggregates_and_rival_promotion() {
    let mut harness = harness();
    monitored_with_baseline(&mut harness).await;

    // A(win, Ladder) and B(loss, Ladder) against OPPO00, then C(win, 2v2)
    // against OPPP00.
    harness
        .source
        .set_log(
            SUBJECT,
            vec![
                baseline_battle(),
                raw_battle("20250601T110000.000Z", "OPPO00", "Oscar", 2, 1, "Ladder"),
                raw_battle("20250601T111000.000Z", "OPPO00", "Oscar", 0, 3, "Ladder"),
                raw_battle("20250601T112000.000Z", "OPPP00", "Papa", 1, 0, "Team Battle 2v2"),
            ],
        )
        .await;

    let report = harness.service.poll_now(SUBJECT).await.unwrap();
    assert_eq!(report.new_battles, 3);

    let stats = harness.service.get_stats(SUBJECT).await.unwrap();
    assert_eq!(stats.totals.battles, 3);
    assert_eq!(stats.totals.wins, 2);
    assert!((stats.overall_win_rate() - 2.0 / 3.0).abs() < 1e-12);

    let ladder = &stats.by_mode["Ladder"];
    assert_eq!(ladder.battles, 2);
    assert!((ladder.win_rate() - 0.5).abs() < 1e-12);

    let oscar = &stats.opponents["OPPO00"];
    assert_eq!(oscar.stats.battles, 2);
    assert_eq!(oscar.stats.wins, 1);
    assert_eq!(oscar.stats.losses, 1);

    // Oscar is a rival now, Papa is not.
    match harness.service.get_rivals(SUBJECT, None).await.unwrap() {
        RivalsReply::List(rivals) => {
            assert_eq!(rivals.len(), 1);
            assert_eq!(rivals[0].tag, "OPPO00");
        }
        other => panic!("expected rival list, got {:?}", other),
    }

    let promotions: Vec<_> = harness
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            MonitorEvent::RivalPromoted {
                opponent_tag,
                encounters,
                ..
            } => Some((opponent_tag, encounters)),
            _ => None,
        })
        .collect();
    assert_eq!(promotions, vec![("OPPO00".to_string(), 2)]);

    harness.service.shutdown().await;
    harness.cleanup();
}

#[tokio::test]
async fn head_to_head_lookup() {
    let mut harness = harness();
    monitored_with_baseline(&mut harness).await;

    harness
        .source
        .set_log(
            SUBJECT,
            vec![
                baseline_battle(),
                raw_battle("20250601T110000.000Z", "OPPO00", "Oscar", 2, 1, "Ladder"),
            ],
        )
        .await;
    harness.service.poll_now(SUBJECT).await.unwrap();

    match harness
        .service
        .get_rivals(SUBJECT, Some("#oppo00"))
        .await
        .unwrap()
    {
        RivalsReply::HeadToHead(entry) => {
            assert_eq!(entry.tag, "OPPO00");
            assert_eq!(entry.battles, 1);
            assert_eq!(entry.wins, 1);
        }
        other => panic!("expected head-to-head, got {:?}", other),
    }

    let err = harness
        .service
        .get_rivals(SUBJECT, Some("NOBODY"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");

    harness.service.shutdown().await;
    harness.cleanup();
}

#[tokio::test]
async fn log_rotation_flags_discontinuity_and_counts_everything() {
    let mut harness = harness();
    monitored_with_baseline(&mut harness).await;

    // The baseline entry is gone from the log entirely.
    harness
        .source
        .set_log(
            SUBJECT,
            vec![
                raw_battle("20250601T120000.000Z", "OPP001", "First", 1, 0, "Ladder"),
                raw_battle("20250601T121000.000Z", "OPP002", "Second", 0, 1, "Ladder"),
            ],
        )
        .await;

    let report = harness.service.poll_now(SUBJECT).await.unwrap();
    assert!(report.discontinuity);
    assert_eq!(report.new_battles, 2);

    let events = harness.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, MonitorEvent::LogDiscontinuity { .. })));

    let stats = harness.service.get_stats(SUBJECT).await.unwrap();
    assert_eq!(stats.totals.battles, 2);

    harness.service.shutdown().await;
    harness.cleanup();
}

#[tokio::test]
async fn failed_commit_discards_cycle_and_recovers() {
    let mut harness = harness();
    monitored_with_baseline(&mut harness).await;

    harness
        .source
        .set_log(
            SUBJECT,
            vec![
                baseline_battle(),
                raw_battle("20250601T110000.000Z", "OPP001", "First", 3, 0, "Ladder"),
            ],
        )
        .await;

    harness.store.fail_commits.store(true, Ordering::SeqCst);
    let err = harness.service.poll_now(SUBJECT).await.unwrap_err();
    assert_eq!(err.kind(), "state_store");

    // Nothing was counted and no events leaked.
    let stats = harness.service.get_stats(SUBJECT).await.unwrap();
    assert_eq!(stats.totals.battles, 0);
    assert!(harness.drain_events().is_empty());

    // Next cycle retries and counts the battle exactly once.
    harness.store.fail_commits.store(false, Ordering::SeqCst);
    let report = harness.service.poll_now(SUBJECT).await.unwrap();
    assert_eq!(report.new_battles, 1);

    let stats = harness.service.get_stats(SUBJECT).await.unwrap();
    assert_eq!(stats.totals.battles, 1);

    harness.service.shutdown().await;
    harness.cleanup();
}

#[tokio::test]
async fn restart_resumes_from_persisted_state() {
    let dir = temp_dir();
    {
        let mut harness = harness_in(dir.clone(), test_config());
        monitored_with_baseline(&mut harness).await;
        harness
            .source
            .set_log(
                SUBJECT,
                vec![
                    baseline_battle(),
                    raw_battle("20250601T110000.000Z", "OPP001", "First", 3, 0, "Ladder"),
                ],
            )
            .await;
        harness.service.poll_now(SUBJECT).await.unwrap();
        harness.service.shutdown().await;
    }

    // Fresh process over the same data directory.
    let harness = harness_in(dir.clone(), test_config());
    harness.source.set_profile(SUBJECT, "Player One").await;
    harness
        .source
        .set_log(
            SUBJECT,
            vec![
                baseline_battle(),
                raw_battle("20250601T110000.000Z", "OPP001", "First", 3, 0, "Ladder"),
            ],
        )
        .await;
    let loaded = harness.service.bootstrap().await.unwrap();
    assert_eq!(loaded, 1);

    let stats = harness.service.get_stats(SUBJECT).await.unwrap();
    assert_eq!(stats.totals.battles, 1);

    // The cursor survived: an identical fetch yields nothing new.
    let report = harness.service.poll_now(SUBJECT).await.unwrap();
    assert_eq!(report.new_battles, 0);

    harness.service.shutdown().await;
    harness.cleanup();
}

#[tokio::test]
async fn stop_monitoring_freezes_and_survives_restart() {
    let mut harness = harness();
    monitored_with_baseline(&mut harness).await;

    let subject = harness.service.stop_monitoring(SUBJECT).await.unwrap();
    assert_eq!(subject.status, MonitorStatus::Paused);

    // Manual triggers are refused while paused.
    let err = harness.service.poll_now(SUBJECT).await.unwrap_err();
    assert_eq!(err.kind(), "not_monitored");

    // Give the loop a moment to wind down and persist the pause.
    harness.service.shutdown().await;

    let records = harness.store.load_all().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].subject.status, MonitorStatus::Paused);

    // A restart keeps it paused and unscheduled.
    let harness2 = harness_in(harness.dir.clone(), test_config());
    harness2.service.bootstrap().await.unwrap();
    let listed = harness2.service.list_monitored().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].0.status, MonitorStatus::Paused);

    harness2.service.shutdown().await;
    harness.cleanup();
}

#[tokio::test]
async fn stop_mid_cycle_commits_in_flight_results() {
    let mut harness = harness();
    monitored_with_baseline(&mut harness).await;

    harness
        .source
        .set_log(
            SUBJECT,
            vec![
                baseline_battle(),
                raw_battle("20250601T110000.000Z", "OPP001", "First", 3, 0, "Ladder"),
            ],
        )
        .await;

    // Hold the next fetch in flight, then unmonitor while it is pending.
    let release = harness.source.hold_next_fetch().await;
    let service_scheduler = harness.service.scheduler().clone();
    let in_flight =
        tokio::spawn(async move { service_scheduler.run_cycle(SUBJECT).await });

    harness.source.fetch_started.notified().await;
    let subject = harness.service.stop_monitoring(SUBJECT).await.unwrap();
    assert_eq!(subject.status, MonitorStatus::Paused);

    release.notify_one();
    let report = in_flight.await.unwrap().unwrap();
    assert_eq!(report.new_battles, 1);

    harness.service.shutdown().await;

    // The in-flight cycle's results were committed, and the pause stuck.
    let records = harness.store.load_all().await.unwrap();
    assert_eq!(records[0].subject.status, MonitorStatus::Paused);
    assert_eq!(records[0].aggregate.totals.battles, 1);
    assert!(records[0].cursor.last_battle_id.is_some());

    harness.cleanup();
}

#[tokio::test]
async fn remonitoring_keeps_history() {
    let mut harness = harness();
    monitored_with_baseline(&mut harness).await;

    harness
        .source
        .set_log(
            SUBJECT,
            vec![
                baseline_battle(),
                raw_battle("20250601T110000.000Z", "OPP001", "First", 3, 0, "Ladder"),
            ],
        )
        .await;
    harness.service.poll_now(SUBJECT).await.unwrap();

    harness.service.stop_monitoring(SUBJECT).await.unwrap();
    let subject = harness.service.start_monitoring(SUBJECT).await.unwrap();
    assert_eq!(subject.status, MonitorStatus::Active);

    let stats = harness.service.get_stats(SUBJECT).await.unwrap();
    assert_eq!(stats.totals.battles, 1);

    harness.service.shutdown().await;
    harness.cleanup();
}

#[tokio::test]
async fn unknown_player_is_not_created() {
    let harness = harness();

    let err = harness.service.start_monitoring("MISSING").await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
    assert!(harness.service.list_monitored().await.is_empty());
    assert!(harness.store.load_all().await.unwrap().is_empty());

    harness.cleanup();
}

#[tokio::test]
async fn double_monitor_is_rejected() {
    let mut harness = harness();
    monitored_with_baseline(&mut harness).await;

    let err = harness.service.start_monitoring(SUBJECT).await.unwrap_err();
    assert_eq!(err.kind(), "already_monitored");

    harness.service.shutdown().await;
    harness.cleanup();
}

#[tokio::test]
async fn forget_deletes_everything() {
    let mut harness = harness();
    monitored_with_baseline(&mut harness).await;

    harness.service.forget_subject(SUBJECT).await.unwrap();
    assert!(harness.service.list_monitored().await.is_empty());
    assert!(harness.store.load_all().await.unwrap().is_empty());

    let err = harness.service.get_stats(SUBJECT).await.unwrap_err();
    assert_eq!(err.kind(), "not_monitored");

    harness.cleanup();
}

#[tokio::test]
async fn malformed_entries_are_skipped_not_fatal() {
    let mut harness = harness();
    monitored_with_baseline(&mut harness).await;

    let mut broken = raw_battle("20250601T110000.000Z", "OPP001", "First", 3, 0, "Ladder");
    broken.battle_time = "garbage".to_string();

    harness
        .source
        .set_log(
            SUBJECT,
            vec![
                baseline_battle(),
                broken,
                raw_battle("20250601T111000.000Z", "OPP002", "Second", 0, 1, "Ladder"),
            ],
        )
        .await;

    let report = harness.service.poll_now(SUBJECT).await.unwrap();
    assert_eq!(report.new_battles, 1);

    let stats = harness.service.get_stats(SUBJECT).await.unwrap();
    assert_eq!(stats.totals.battles, 1);
    assert_eq!(stats.totals.losses, 1);

    harness.service.shutdown().await;
    harness.cleanup();
}
