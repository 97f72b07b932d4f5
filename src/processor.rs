//! Priority batch processor
//!
//! Entries are submitted to a bounded pool of workers in batch order;
//! completion order is not preserved. Every failure is confined to its entry:
//! a file that vanished, timed out or crashed the validator is logged and
//! skipped, and the rest of the batch carries on.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::guard::{FileSizeGuard, ResourceGuard, SizeCheck};
use crate::metrics::ViolationAggregator;
use crate::scheduler::{Batch, PendingChangeEntry, PendingChangeSet};
use crate::violation::{ValidationResult, Validator, Violation};
use crate::watcher::ChangeKind;

/// What happened to each entry of a batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub sequence: u64,
    pub results: Vec<ValidationResult>,
    /// Refused by the resource guard and handed back to the pending set
    pub deferred: usize,
    /// Read failure, timeout or validator error
    pub failed: usize,
    /// Removed files and files over the size limit
    pub skipped: usize,
    /// Content identical to the last successful validation
    pub unchanged: usize,
    pub elapsed_ms: u64,
}

impl BatchReport {
    pub fn validated(&self) -> usize {
        self.results.len()
    }
}

#[derive(Debug)]
enum EntryOutcome {
    Validated(ValidationResult),
    Unchanged,
    Oversized,
    Failed,
}

/// Content hashes of the last successful validation per path
#[derive(Debug, Default)]
struct Fingerprints {
    hashes: Mutex<HashMap<PathBuf, blake3::Hash>>,
}

impl Fingerprints {
    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, blake3::Hash>> {
        match self.hashes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Fingerprint mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn matches(&self, path: &Path, hash: &blake3::Hash) -> bool {
        self.lock().get(path) == Some(hash)
    }

    fn remember(&self, path: PathBuf, hash: blake3::Hash) {
        self.lock().insert(path, hash);
    }

    fn forget(&self, path: &Path) {
        self.lock().remove(path);
    }
}

pub struct PriorityBatchProcessor {
    validator: Arc<dyn Validator>,
    guard: Arc<ResourceGuard>,
    size_guard: FileSizeGuard,
    pending: Arc<PendingChangeSet>,
    aggregator: Arc<ViolationAggregator>,
    fingerprints: Arc<Fingerprints>,
    read_timeout: Duration,
}

impl PriorityBatchProcessor {
    pub fn new(
        validator: Arc<dyn Validator>,
        guard: Arc<ResourceGuard>,
        size_guard: FileSizeGuard,
        pending: Arc<PendingChangeSet>,
        aggregator: Arc<ViolationAggregator>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            validator,
            guard,
            size_guard,
            pending,
            aggregator,
            fingerprints: Arc::new(Fingerprints::default()),
            read_timeout,
        }
    }

    /// Validate every admitted entry of the batch and record the results.
    ///
    /// Returns once all submitted work has finished.
    pub async fn process(&self, batch: Batch) -> BatchReport {
        let started = Instant::now();
        let mut report = BatchReport {
            sequence: batch.sequence(),
            ..BatchReport::default()
        };

        self.guard.begin_batch();
        // A zero worker budget is refused by the guard; the semaphore just must not deadlock
        let workers = Arc::new(Semaphore::new(self.guard.max_workers().max(1)));
        let mut tasks = JoinSet::new();

        for entry in batch.into_entries() {
            if entry.kind == ChangeKind::Removed {
                debug!("Skipping removed file: {}", entry.path.display());
                self.fingerprints.forget(&entry.path);
                report.skipped += 1;
                continue;
            }

            let permit = match workers.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Worker pool closed unexpectedly: {}", e);
                    self.pending.requeue(entry);
                    report.deferred += 1;
                    continue;
                }
            };

            if !self.guard.admit() {
                drop(permit);
                self.pending.requeue(entry);
                report.deferred += 1;
                continue;
            }

            let job = ValidationJob {
                entry,
                validator: self.validator.clone(),
                guard: self.guard.clone(),
                size_guard: self.size_guard,
                aggregator: self.aggregator.clone(),
                fingerprints: self.fingerprints.clone(),
                read_timeout: self.read_timeout,
            };
            tasks.spawn(async move {
                let outcome = job.run().await;
                drop(permit);
                outcome
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(EntryOutcome::Validated(result)) => report.results.push(result),
                Ok(EntryOutcome::Unchanged) => report.unchanged += 1,
                Ok(EntryOutcome::Oversized) => report.skipped += 1,
                Ok(EntryOutcome::Failed) => report.failed += 1,
                Err(e) => {
                    error!("Validation task aborted: {}", e);
                    report.failed += 1;
                }
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            sequence = report.sequence,
            validated = report.validated(),
            deferred = report.deferred,
            failed = report.failed,
            skipped = report.skipped,
            unchanged = report.unchanged,
            elapsed_ms = report.elapsed_ms,
            "Batch processed"
        );
        report
    }
}

/// Everything one worker needs, owned so it can move into a task
struct ValidationJob {
    entry: PendingChangeEntry,
    validator: Arc<dyn Validator>,
    guard: Arc<ResourceGuard>,
    size_guard: FileSizeGuard,
    aggregator: Arc<ViolationAggregator>,
    fingerprints: Arc<Fingerprints>,
    read_timeout: Duration,
}

impl ValidationJob {
    async fn run(self) -> EntryOutcome {
        let started = Instant::now();
        let outcome = self.validate().await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.guard.record_processing(elapsed_ms);

        match outcome {
            Ok((violations, hash)) => {
                let path = self.entry.path;
                self.fingerprints.remember(path.clone(), hash);
                let result = ValidationResult {
                    path,
                    violations,
                    processing_time_ms: elapsed_ms,
                };
                self.aggregator.record(result.clone());
                EntryOutcome::Validated(result)
            }
            Err(outcome) => outcome,
        }
    }

    /// Fresh violations plus the content hash, or why the entry produced none
    async fn validate(&self) -> Result<(Vec<Violation>, blake3::Hash), EntryOutcome> {
        let path = &self.entry.path;

        match self.size_guard.inspect(path).await {
            Ok(SizeCheck::Accepted { .. }) => {}
            Ok(SizeCheck::TooLarge {
                size_bytes,
                limit_bytes,
            }) => {
                debug!(
                    path = %path.display(),
                    size_bytes,
                    limit_bytes,
                    "Skipping file over size limit"
                );
                return Err(EntryOutcome::Oversized);
            }
            Err(e) => {
                warn!("Failed to stat {}: {}", path.display(), e);
                return Err(EntryOutcome::Failed);
            }
        }

        let content = match tokio::time::timeout(self.read_timeout, tokio::fs::read(path)).await {
            Ok(Ok(content)) => content,
            Ok(Err(e)) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return Err(EntryOutcome::Failed);
            }
            Err(_) => {
                warn!(
                    "Reading {} exceeded {}ms, skipping",
                    path.display(),
                    self.read_timeout.as_millis()
                );
                return Err(EntryOutcome::Failed);
            }
        };

        let hash = blake3::hash(&content);
        if self.fingerprints.matches(path, &hash) {
            debug!("File {} unchanged (Blake3 hash match), skipping", path.display());
            return Err(EntryOutcome::Unchanged);
        }

        let validator = self.validator.clone();
        let validate_path = path.clone();
        let joined =
            tokio::task::spawn_blocking(move || validator.validate(&validate_path, &content)).await;

        match joined {
            Ok(Ok(violations)) => Ok((violations, hash)),
            Ok(Err(e)) => {
                warn!("Validation failed for {}: {}", path.display(), e);
                Err(EntryOutcome::Failed)
            }
            Err(e) => {
                error!("Validator crashed on {}: {}", path.display(), e);
                Err(EntryOutcome::Failed)
            }
        }
    }
}
