//! Service lifecycle and end-to-end flows

use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use crate::clock::ManualClock;
use crate::config::{GuardConfig, SentinelConfig};
use crate::error::SentinelError;
use crate::guard::{ResourceSample, StaticProbe};
use crate::metrics::{EffectivenessModel, JsonHistorySink, ResultSink, Trend};
use crate::service::ValidationService;
use crate::tests::test_utils::{
    event, service_config, write_file, KeywordValidator, SlowValidator, StallingSink,
};
use crate::violation::Validator;
use crate::watcher::ChangeKind;

fn quiet_probe() -> Arc<StaticProbe> {
    Arc::new(StaticProbe(ResourceSample::default()))
}

fn service(dir: &TempDir, config: SentinelConfig) -> ValidationService {
    service_with(dir, config, Arc::new(KeywordValidator::default()))
}

fn service_with(
    dir: &TempDir,
    config: SentinelConfig,
    validator: Arc<dyn Validator>,
) -> ValidationService {
    ValidationService::builder(dir.path(), config, validator)
        .probe(quiet_probe())
        .watch(false)
        .build()
        .unwrap()
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

#[tokio::test]
async fn test_process_pending_changes_validates_everything() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir, service_config());

    for (name, content) in [
        ("src/a.ts", "// critical\n"),
        ("src/b.ts", "// warning warning\n"),
        ("docs/c.md", "nothing to see\n"),
    ] {
        let path = write_file(dir.path(), name, content);
        service.enqueue(event(path, ChangeKind::Modified));
    }

    let reports = service.process_pending_changes().await;

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].validated(), 3);
    assert_eq!(service.pending_len(), 0);

    let counters = service.current_counters();
    assert_eq!(counters.files_changed, 3);
    assert_eq!(counters.critical_violations, 1);
    assert_eq!(counters.warnings, 2);
    assert_eq!(counters.clean_files, 1);
    assert_eq!(service.recent_results(10).len(), 3);
}

#[tokio::test]
async fn test_large_queue_is_processed_in_bounded_batches() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir, service_config());

    for i in 0..15 {
        let path = write_file(dir.path(), &format!("src/f{}.ts", i), "// info\n");
        service.enqueue(event(path, ChangeKind::Modified));
    }

    let reports = service.process_pending_changes().await;

    let sizes: Vec<usize> = reports.iter().map(|r| r.validated()).collect();
    assert_eq!(sizes, vec![10, 5]);
    assert_eq!(reports[0].sequence + 1, reports[1].sequence);
    assert_eq!(service.current_counters().info_violations, 15);
}

#[tokio::test]
async fn test_refusing_guard_leaves_changes_pending() {
    let dir = TempDir::new().unwrap();
    let mut config = service_config();
    config.guard = GuardConfig {
        max_heap_mb: 0,
        ..GuardConfig::default()
    };
    let service = service(&dir, config);

    for name in ["src/a.ts", "src/b.ts"] {
        let path = write_file(dir.path(), name, "// warning\n");
        service.enqueue(event(path, ChangeKind::Modified));
    }

    for _ in 0..2 {
        let reports = service.process_pending_changes().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].deferred, 2);
        assert_eq!(service.pending_len(), 2);
    }
    assert_eq!(service.current_counters().files_changed, 0);
}

#[tokio::test]
async fn test_lifecycle_misuse_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut service = service(&dir, service_config());

    assert!(matches!(service.stop().await, Err(SentinelError::NotRunning)));

    service.start().await.unwrap();
    assert!(service.is_running());
    assert!(matches!(service.start().await, Err(SentinelError::AlreadyRunning)));

    service.stop().await.unwrap();
    assert!(!service.is_running());

    // A stopped service can be started again
    service.start().await.unwrap();
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_invalid_config_is_fatal() {
    let dir = TempDir::new().unwrap();
    let mut config = service_config();
    config.scheduler.max_batch_size = 0;

    let result = ValidationService::builder(
        dir.path(),
        config,
        Arc::new(KeywordValidator::default()),
    )
    .build();

    assert!(matches!(result, Err(SentinelError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_corrupt_history_prevents_start() {
    let dir = TempDir::new().unwrap();
    let config = service_config();
    let history_path = config.history_path(dir.path());
    fs::create_dir_all(history_path.parent().unwrap()).unwrap();
    fs::write(&history_path, "not json").unwrap();

    let mut service =
        ValidationService::builder(dir.path(), config, Arc::new(KeywordValidator::default()))
            .probe(quiet_probe())
            .watch(false)
            .history_sink()
            .build()
            .unwrap();

    assert!(matches!(
        service.start().await,
        Err(SentinelError::HistoryFormat { .. })
    ));
    assert!(!service.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scheduler_loop_flushes_enqueued_changes() {
    let dir = TempDir::new().unwrap();
    let mut service = service(&dir, service_config());
    service.start().await.unwrap();

    for name in ["src/a.ts", "src/b.ts", "lib/c.py"] {
        let path = write_file(dir.path(), name, "# suggestion\n");
        service.enqueue(event(path, ChangeKind::Modified));
    }

    let processed = wait_until(|| service.current_counters().files_changed == 3).await;
    service.stop().await.unwrap();

    assert!(processed, "scheduler loop never flushed the pending changes");
    assert_eq!(service.current_counters().suggestions, 3);
    assert_eq!(service.pending_len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_initial_scan_queues_supported_files() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "src/app.ts", "// info\n");
    write_file(dir.path(), "README.md", "hello\n");
    write_file(dir.path(), "notes.txt", "not a supported extension\n");
    write_file(dir.path(), "node_modules/dep/index.js", "// critical\n");

    let mut config = service_config();
    config.watch.initial_scan = true;
    let mut service = service(&dir, config);
    service.start().await.unwrap();

    let processed = wait_until(|| service.current_counters().files_changed >= 2).await;
    service.stop().await.unwrap();

    assert!(processed);
    let counters = service.current_counters();
    assert_eq!(counters.files_changed, 2);
    assert_eq!(counters.critical_violations, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watcher_feeds_file_edits_into_validation() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    let mut service =
        ValidationService::builder(dir.path(), service_config(), Arc::new(KeywordValidator::default()))
            .probe(quiet_probe())
            .build()
            .unwrap();
    service.start().await.unwrap();

    // Give the OS watcher a moment to register
    tokio::time::sleep(Duration::from_millis(200)).await;
    write_file(dir.path(), "src/live.ts", "// critical\n");

    let processed = wait_until(|| service.current_counters().critical_violations >= 1).await;
    service.stop().await.unwrap();

    assert!(processed, "file edit never reached the validator");
    let recent = service.recent_results(1);
    assert_eq!(recent[0].path.file_name().unwrap(), "live.ts");
}

#[tokio::test]
async fn test_stop_persists_final_record() {
    let dir = TempDir::new().unwrap();
    let config = service_config();
    let history_path = config.history_path(dir.path());
    let retention = config.metrics.history_retention;

    let mut service =
        ValidationService::builder(dir.path(), config, Arc::new(KeywordValidator::default()))
            .probe(quiet_probe())
            .watch(false)
            .history_sink()
            .build()
            .unwrap();

    let path = write_file(dir.path(), "src/a.ts", "// warning\n");
    service.enqueue(event(path, ChangeKind::Modified));
    service.process_pending_changes().await;

    service.start().await.unwrap();
    service.stop().await.unwrap();

    let history = JsonHistorySink::new(history_path, retention).load().unwrap();
    let latest = history.latest().unwrap();
    assert_eq!(latest.counters.files_changed, 1);
    assert_eq!(latest.counters.warnings, 1);
}

#[tokio::test]
async fn test_effectiveness_tracks_session_clock() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new());
    let service =
        ValidationService::builder(dir.path(), service_config(), Arc::new(KeywordValidator::default()))
            .clock(clock.clone())
            .probe(quiet_probe())
            .watch(false)
            .build()
            .unwrap();

    let path = write_file(dir.path(), "src/a.ts", "// critical\n");
    service.enqueue(event(path, ChangeKind::Modified));
    service.process_pending_changes().await;

    clock.advance(Duration::from_secs(60 * 60));

    let expected = EffectivenessModel::from_config(&service.config().metrics)
        .snapshot(&service.current_counters(), 60.0);
    assert_eq!(service.current_effectiveness(), expected);
}

#[tokio::test]
async fn test_recorded_snapshots_feed_trend_and_sink() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(JsonHistorySink::new(dir.path().join("history.json"), 5));
    let service =
        ValidationService::builder(dir.path(), service_config(), Arc::new(KeywordValidator::default()))
            .clock(Arc::new(ManualClock::new()))
            .probe(quiet_probe())
            .watch(false)
            .sink(sink.clone())
            .build()
            .unwrap();

    for _ in 0..10 {
        service.record_snapshot().unwrap();
    }

    assert_eq!(service.effectiveness_trend(), Trend::Stable);
    assert_eq!(sink.load().unwrap().len(), 5);
    assert!(sink.verify().is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_aborts_batch_that_outlives_grace_period() {
    let dir = TempDir::new().unwrap();
    let mut config = service_config();
    config.shutdown.grace_ms = 200;
    let validator = Arc::new(SlowValidator::new(Duration::from_secs(3)));
    let mut service = service_with(&dir, config, validator.clone());
    service.start().await.unwrap();

    let path = write_file(dir.path(), "src/slow.ts", "// warning\n");
    service.enqueue(event(path, ChangeKind::Modified));
    let flushed = wait_until(|| validator.started() == 1).await;
    assert!(flushed, "scheduler loop never flushed the change");

    let stopping = Instant::now();
    service.stop().await.unwrap();
    let took = stopping.elapsed();

    assert!(took < Duration::from_millis(1500), "stop took {:?}", took);
    assert!(!service.is_running());
    assert_eq!(service.current_counters().files_changed, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_does_not_wait_past_grace_for_stalled_snapshot() {
    let dir = TempDir::new().unwrap();
    let mut config = service_config();
    config.shutdown.grace_ms = 200;
    config.metrics.snapshot_interval_secs = 1;
    let sink = Arc::new(StallingSink::new(Duration::from_secs(3)));
    let mut service =
        ValidationService::builder(dir.path(), config, Arc::new(KeywordValidator::default()))
            .probe(quiet_probe())
            .watch(false)
            .sink(sink.clone())
            .build()
            .unwrap();
    service.start().await.unwrap();

    let stalled = wait_until(|| sink.entered()).await;
    assert!(stalled, "periodic snapshot never ran");

    let stopping = Instant::now();
    service.stop().await.unwrap();
    let took = stopping.elapsed();

    assert!(took < Duration::from_millis(1500), "stop took {:?}", took);
    // The final record still lands
    assert_eq!(sink.persisted(), 1);
}

#[tokio::test]
async fn test_shutdown_requested_is_immediate_when_stopped() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir, service_config());

    let waited = tokio::time::timeout(Duration::from_secs(1), service.shutdown_requested()).await;
    assert!(waited.is_ok());
}
