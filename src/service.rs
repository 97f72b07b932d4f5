//! Validation service
//!
//! Wires the watcher, pending set, scheduler loop, processor and metrics into
//! one lifecycle. The scheduler loop is the only place batches are flushed
//! while the service runs; watch callbacks only ever enqueue.
//!
//! Batches are processed with a wait-for-drain policy: batch N finishes
//! before batch N+1 is flushed, so the worker budget is never shared between
//! two batches.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::SentinelConfig;
use crate::error::{Result, SentinelError};
use crate::guard::{FileSizeGuard, ResourceGuard, ResourceProbe, SysinfoProbe};
use crate::metrics::{
    EffectivenessModel, EffectivenessSnapshot, JsonHistorySink, MetricsRecord, ResultSink,
    RunningCounters, Trend, TrendTracker, ViolationAggregator,
};
use crate::processor::{BatchReport, PriorityBatchProcessor};
use crate::scheduler::{BatchScheduler, PathClassifier, PendingChangeSet};
use crate::violation::{ValidationResult, Validator};
use crate::watcher::{self, ChangeDetector, FileChangeEvent, WatchFilter};

/// Snapshots are never taken more often than this
const MIN_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);

pub struct ServiceBuilder {
    root: PathBuf,
    config: SentinelConfig,
    validator: Arc<dyn Validator>,
    clock: Arc<dyn Clock>,
    probe: Option<Arc<dyn ResourceProbe>>,
    sink: Option<Arc<dyn ResultSink>>,
    watch: bool,
}

impl ServiceBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Persist snapshots to the configured JSON history file
    pub fn history_sink(self) -> Self {
        let path = self.config.history_path(&self.root);
        let retention = self.config.metrics.history_retention;
        self.sink(Arc::new(JsonHistorySink::new(path, retention)))
    }

    /// Whether `start` attaches a filesystem watcher (on by default)
    pub fn watch(mut self, enabled: bool) -> Self {
        self.watch = enabled;
        self
    }

    pub fn build(self) -> Result<ValidationService> {
        self.config.validate()?;

        let classifier = PathClassifier::new(&self.config.classify, Some(self.root.clone()))?;
        let filter = Arc::new(WatchFilter::from_config(&self.config.watch)?);

        let pending = Arc::new(PendingChangeSet::new(
            classifier,
            self.clock.clone(),
            self.config.scheduler.max_pending,
            self.config.scheduler.age_boost_interval(),
        ));
        let aggregator = Arc::new(ViolationAggregator::new(self.config.metrics.recent_capacity));

        let probe = match self.probe {
            Some(probe) => probe,
            None => Arc::new(SysinfoProbe::new()),
        };
        let guard = Arc::new(ResourceGuard::new(&self.config.guard, probe));
        let processor = Arc::new(PriorityBatchProcessor::new(
            self.validator,
            guard,
            FileSizeGuard::new(self.config.guard.max_file_size_bytes),
            pending.clone(),
            aggregator.clone(),
            self.config.guard.read_timeout(),
        ));

        let metrics = MetricsContext {
            aggregator,
            model: EffectivenessModel::from_config(&self.config.metrics),
            trend: Arc::new(Mutex::new(TrendTracker::new(
                self.config.metrics.trend_window,
            ))),
            sink: self.sink,
            clock: self.clock.clone(),
            session_start: Arc::new(Mutex::new(self.clock.now())),
        };

        Ok(ValidationService {
            scheduler: Arc::new(AsyncMutex::new(BatchScheduler::new(
                self.config.scheduler.clone(),
            ))),
            root: self.root,
            config: self.config,
            clock: self.clock,
            pending,
            processor,
            filter,
            metrics,
            watch_enabled: self.watch,
            detector: None,
            runtime: None,
        })
    }
}

fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("{} mutex poisoned, recovering", what);
            poisoned.into_inner()
        }
    }
}

/// Everything needed to score and persist the session, shareable with tasks
#[derive(Clone)]
struct MetricsContext {
    aggregator: Arc<ViolationAggregator>,
    model: EffectivenessModel,
    trend: Arc<Mutex<TrendTracker>>,
    sink: Option<Arc<dyn ResultSink>>,
    clock: Arc<dyn Clock>,
    session_start: Arc<Mutex<Instant>>,
}

impl MetricsContext {
    fn reset_session(&self) {
        *lock_or_recover(&self.session_start, "Session start") = self.clock.now();
    }

    fn session_minutes(&self) -> f64 {
        let started = *lock_or_recover(&self.session_start, "Session start");
        self.clock.now().saturating_duration_since(started).as_secs_f64() / 60.0
    }

    fn effectiveness(&self) -> EffectivenessSnapshot {
        self.model
            .snapshot(&self.aggregator.counters(), self.session_minutes())
    }

    fn trend(&self) -> Trend {
        lock_or_recover(&self.trend, "Trend tracker").trend()
    }

    /// Score the session, feed the trend window and persist the record
    fn record(&self) -> Result<MetricsRecord> {
        let counters = self.aggregator.counters();
        let effectiveness = self.model.snapshot(&counters, self.session_minutes());

        let trend = {
            let mut tracker = lock_or_recover(&self.trend, "Trend tracker");
            tracker.record(effectiveness.effectiveness_score);
            tracker.trend()
        };

        let record = MetricsRecord {
            timestamp: DateTime::<Utc>::from(self.clock.system_time()),
            counters,
            effectiveness,
            trend,
        };

        if let Some(sink) = &self.sink {
            sink.persist(&record)?;
        }
        Ok(record)
    }
}

struct RunningTasks {
    // Shared with the watcher so a dead watcher can stop the loops
    shutdown: Arc<watch::Sender<bool>>,
    scheduler: JoinHandle<()>,
    snapshots: Option<JoinHandle<()>>,
}

pub struct ValidationService {
    root: PathBuf,
    config: SentinelConfig,
    clock: Arc<dyn Clock>,
    pending: Arc<PendingChangeSet>,
    processor: Arc<PriorityBatchProcessor>,
    scheduler: Arc<AsyncMutex<BatchScheduler>>,
    filter: Arc<WatchFilter>,
    metrics: MetricsContext,
    watch_enabled: bool,
    detector: Option<ChangeDetector>,
    runtime: Option<RunningTasks>,
}

impl ValidationService {
    pub fn builder(
        root: impl Into<PathBuf>,
        config: SentinelConfig,
        validator: Arc<dyn Validator>,
    ) -> ServiceBuilder {
        ServiceBuilder {
            root: root.into(),
            config,
            validator,
            clock: Arc::new(SystemClock),
            probe: None,
            sink: None,
            watch: true,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.runtime.is_some()
    }

    /// Start watching and scheduling.
    ///
    /// Watcher or history failures are returned before anything is spawned,
    /// so a failed start leaves the service stopped.
    pub async fn start(&mut self) -> Result<()> {
        if self.runtime.is_some() {
            return Err(SentinelError::AlreadyRunning);
        }

        if let Some(sink) = &self.metrics.sink {
            sink.verify()?;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let shutdown = Arc::new(shutdown);

        if self.watch_enabled {
            let mut detector = ChangeDetector::new(
                self.root.clone(),
                self.filter.clone(),
                self.pending.clone(),
                self.clock.clone(),
            );
            detector.start(shutdown.clone())?;
            self.detector = Some(detector);
        }

        self.metrics.reset_session();

        if self.config.watch.initial_scan {
            let root = self.root.clone();
            let filter = self.filter.clone();
            let pending = self.pending.clone();
            let now = self.clock.system_time();
            match tokio::task::spawn_blocking(move || {
                watcher::scan_tree(&root, &filter, &pending, now)
            })
            .await
            {
                Ok(queued) => debug!("Initial scan queued {} file(s)", queued),
                Err(e) => error!("Initial scan aborted: {}", e),
            }
        }

        let scheduler = tokio::spawn(run_scheduler(
            self.scheduler.clone(),
            self.pending.clone(),
            self.processor.clone(),
            self.clock.clone(),
            self.config.scheduler.tick(),
            shutdown_rx.clone(),
        ));

        let snapshots = if self.metrics.sink.is_some() {
            let every = Duration::from_secs(self.config.metrics.snapshot_interval_secs)
                .max(MIN_SNAPSHOT_INTERVAL);
            Some(tokio::spawn(run_snapshots(
                self.metrics.clone(),
                every,
                shutdown_rx,
            )))
        } else {
            None
        };

        self.runtime = Some(RunningTasks {
            shutdown,
            scheduler,
            snapshots,
        });

        info!(
            root = %self.root.display(),
            watching = self.watch_enabled,
            pending = self.pending.len(),
            "Validation service started"
        );
        Ok(())
    }

    /// Resolves once the background loops have been told to stop, which
    /// happens without a `stop` call only when the file watcher failed for
    /// good. Returns immediately when the service is not running.
    pub async fn shutdown_requested(&self) {
        let Some(runtime) = &self.runtime else {
            return;
        };
        let mut rx = runtime.shutdown.subscribe();
        if rx.wait_for(|stop| *stop).await.is_err() {
            debug!("Shutdown channel closed");
        }
    }

    /// Stop the service, draining the in-flight batch and the snapshot task
    /// within one grace period, then persist a final record.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(runtime) = self.runtime.take() else {
            return Err(SentinelError::NotRunning);
        };

        if let Some(mut detector) = self.detector.take() {
            detector.stop().await;
        }

        if runtime.shutdown.send(true).is_err() {
            debug!("Background tasks already gone before shutdown signal");
        }

        let grace = self.config.shutdown_grace();
        let deadline = tokio::time::Instant::now() + grace;
        let mut scheduler = runtime.scheduler;
        match tokio::time::timeout_at(deadline, &mut scheduler).await {
            Ok(Ok(())) => debug!("Scheduler loop drained"),
            Ok(Err(e)) => error!("Scheduler loop ended abnormally: {}", e),
            Err(_) => {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "In-flight batch exceeded shutdown grace period, aborting"
                );
                scheduler.abort();
            }
        }

        if let Some(mut snapshots) = runtime.snapshots {
            match tokio::time::timeout_at(deadline, &mut snapshots).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Snapshot task ended abnormally: {}", e),
                Err(_) => {
                    warn!(
                        grace_ms = grace.as_millis() as u64,
                        "Metrics snapshot still persisting after shutdown grace period, aborting"
                    );
                    snapshots.abort();
                }
            }
        }

        let counters = self.current_counters();
        info!(
            files_changed = counters.files_changed,
            violations_detected = counters.violations_detected,
            critical_violations = counters.critical_violations,
            pending = self.pending.len(),
            "Validation service stopped"
        );

        if self.metrics.sink.is_some() {
            self.metrics.record()?;
        }
        Ok(())
    }

    /// Queue a change directly, bypassing the watcher's filters
    pub fn enqueue(&self, event: FileChangeEvent) {
        self.pending.enqueue(event);
    }

    pub fn pending(&self) -> &PendingChangeSet {
        &self.pending
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn current_counters(&self) -> RunningCounters {
        self.metrics.aggregator.counters()
    }

    pub fn current_effectiveness(&self) -> EffectivenessSnapshot {
        self.metrics.effectiveness()
    }

    pub fn effectiveness_trend(&self) -> Trend {
        self.metrics.trend()
    }

    /// Up to `n` most recent results, newest first
    pub fn recent_results(&self, n: usize) -> Vec<ValidationResult> {
        self.metrics.aggregator.recent(n)
    }

    /// Score the session now, add it to the trend window and persist it
    pub fn record_snapshot(&self) -> Result<MetricsRecord> {
        self.metrics.record()
    }

    /// Flush and process everything pending without waiting for the debounce
    /// window. Stops early when a batch makes no progress, e.g. every entry
    /// was refused by the resource guard.
    pub async fn process_pending_changes(&self) -> Vec<BatchReport> {
        let mut reports = Vec::new();
        let mut scheduler = self.scheduler.lock().await;

        while !self.pending.is_empty() {
            let batch = scheduler.flush(&self.pending, self.clock.now());
            if batch.is_empty() {
                scheduler.complete(self.clock.now(), self.pending.len());
                break;
            }

            let taken = batch.len();
            let report = self.processor.process(batch).await;
            scheduler.complete(self.clock.now(), self.pending.len());

            let stalled = report.deferred == taken;
            reports.push(report);
            if stalled {
                debug!(
                    pending = self.pending.len(),
                    "No entry admitted, leaving the rest pending"
                );
                break;
            }
        }

        reports
    }
}

impl Drop for ValidationService {
    fn drop(&mut self) {
        if let Some(runtime) = &self.runtime {
            // Unblock the background tasks; they exit on their next poll
            let _ = runtime.shutdown.send(true);
        }
    }
}

async fn run_scheduler(
    scheduler: Arc<AsyncMutex<BatchScheduler>>,
    pending: Arc<PendingChangeSet>,
    processor: Arc<PriorityBatchProcessor>,
    clock: Arc<dyn Clock>,
    tick: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(tick_ms = tick.as_millis() as u64, "Scheduler loop started");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let mut scheduler = scheduler.lock().await;
                let now = clock.now();
                if !scheduler.should_flush(now, pending.len()) {
                    continue;
                }

                let batch = scheduler.flush(&pending, now);
                if !batch.is_empty() {
                    let report = processor.process(batch).await;
                    if report.deferred > 0 {
                        debug!(
                            sequence = report.sequence,
                            deferred = report.deferred,
                            "Deferred entries returned to the pending set"
                        );
                    }
                }
                scheduler.complete(clock.now(), pending.len());
            }
        }
    }

    debug!(pending = pending.len(), "Scheduler loop stopped");
}

async fn run_snapshots(
    metrics: MetricsContext,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let context = metrics.clone();
                match tokio::task::spawn_blocking(move || context.record()).await {
                    Ok(Ok(record)) => debug!(
                        effectiveness_score = record.effectiveness.effectiveness_score,
                        trend = ?record.trend,
                        "Recorded metrics snapshot"
                    ),
                    Ok(Err(e)) => warn!("Failed to persist metrics snapshot: {}", e),
                    Err(e) => error!("Metrics snapshot task aborted: {}", e),
                }
            }
        }
    }
}
