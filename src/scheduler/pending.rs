//! Pending change set
//!
//! Holds at most one entry per path. Later events for the same path
//! overwrite the earlier one (last write wins) but keep its place in line:
//! `enqueued_at` is never reset, so an entry's age keeps growing until it is
//! flushed.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime};
use tracing::warn;

use crate::clock::Clock;
use crate::scheduler::cost;
use crate::scheduler::priority::PathClassifier;
use crate::watcher::{ChangeKind, FileChangeEvent};

/// A change waiting to be validated
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChangeEntry {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub detected_at: SystemTime,
    /// Priority from path classification alone
    pub base_priority: u32,
    /// Priority including the age boost; fixed when the entry is flushed
    pub priority: u32,
    pub estimated_cost_ms: u64,
    pub size_bytes: u64,
    pub enqueued_at: Instant,
}

impl PendingChangeEntry {
    /// Base priority plus one point per full `boost_interval` waited
    pub fn effective_priority(&self, now: Instant, boost_interval: Duration) -> u32 {
        if boost_interval.is_zero() {
            return self.base_priority;
        }
        let waited = now.saturating_duration_since(self.enqueued_at);
        let boost = waited.as_millis() / boost_interval.as_millis().max(1);
        self.base_priority
            .saturating_add(u32::try_from(boost).unwrap_or(u32::MAX))
    }
}

/// Batch order: priority descending, then cheapest first, then oldest first
pub fn batch_order(a: &PendingChangeEntry, b: &PendingChangeEntry) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then(a.estimated_cost_ms.cmp(&b.estimated_cost_ms))
        .then(a.enqueued_at.cmp(&b.enqueued_at))
        .then_with(|| a.path.cmp(&b.path))
}

/// Thread-safe, path-keyed set of pending changes
pub struct PendingChangeSet {
    entries: Mutex<HashMap<PathBuf, PendingChangeEntry>>,
    classifier: PathClassifier,
    clock: Arc<dyn Clock>,
    max_pending: usize,
    age_boost: Duration,
    evicted: AtomicU64,
}

impl PendingChangeSet {
    pub fn new(
        classifier: PathClassifier,
        clock: Arc<dyn Clock>,
        max_pending: usize,
        age_boost: Duration,
    ) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            classifier,
            clock,
            max_pending: max_pending.max(1),
            age_boost,
            evicted: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, PendingChangeEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Pending change set mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Insert or overwrite the pending change for `event.path`. Never fails.
    pub fn enqueue(&self, event: FileChangeEvent) {
        // Sizing touches the filesystem, so do it before taking the lock
        let size_bytes = match event.kind {
            ChangeKind::Removed => 0,
            _ => fs::metadata(&event.path).map(|m| m.len()).unwrap_or(0),
        };
        let base_priority = self.classifier.priority(&event.path, event.kind);
        let estimated_cost_ms = cost::estimate_cost_ms(&event.path, size_bytes);
        let now = self.clock.now();

        let path = event.path.clone();
        let mut entries = self.lock();
        match entries.entry(event.path) {
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get_mut();
                existing.kind = event.kind;
                existing.detected_at = event.detected_at;
                existing.base_priority = base_priority;
                existing.priority = base_priority;
                existing.estimated_cost_ms = estimated_cost_ms;
                existing.size_bytes = size_bytes;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PendingChangeEntry {
                    path: path.clone(),
                    kind: event.kind,
                    detected_at: event.detected_at,
                    base_priority,
                    priority: base_priority,
                    estimated_cost_ms,
                    size_bytes,
                    enqueued_at: now,
                });
            }
        }
        self.enforce_cap(&mut entries, &path);
    }

    /// Return an entry that could not be processed.
    ///
    /// A fresher change that arrived meanwhile wins, but it inherits the
    /// older `enqueued_at` so deferral never costs an entry its place in line.
    pub fn requeue(&self, entry: PendingChangeEntry) {
        let path = entry.path.clone();
        let mut entries = self.lock();
        match entries.entry(path.clone()) {
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get_mut();
                if entry.enqueued_at < existing.enqueued_at {
                    existing.enqueued_at = entry.enqueued_at;
                }
            }
            Entry::Vacant(vacant) => {
                let mut entry = entry;
                entry.priority = entry.base_priority;
                vacant.insert(entry);
            }
        }
        self.enforce_cap(&mut entries, &path);
    }

    /// Evict oldest-by-enqueue entries beyond the hard cap.
    ///
    /// `inserted` is never the victim, even when its `enqueued_at` ties with
    /// older entries on a coarse clock.
    fn enforce_cap(&self, entries: &mut HashMap<PathBuf, PendingChangeEntry>, inserted: &Path) {
        while entries.len() > self.max_pending {
            let oldest = entries
                .values()
                .filter(|e| e.path != inserted)
                .min_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at).then(a.path.cmp(&b.path)))
                .map(|e| e.path.clone());
            let Some(path) = oldest else { break };
            entries.remove(&path);
            let total = self.evicted.fetch_add(1, AtomicOrdering::Relaxed) + 1;
            warn!(
                path = %path.display(),
                max_pending = self.max_pending,
                evicted_total = total,
                "Pending change set over capacity; dropping oldest change without validation"
            );
        }
    }

    /// Remove and return up to `max` entries in batch order
    pub fn take_batch(&self, max: usize) -> Vec<PendingChangeEntry> {
        let now = self.clock.now();
        let mut entries = self.lock();

        let mut ranked: Vec<PendingChangeEntry> = entries
            .values()
            .map(|entry| {
                let mut entry = entry.clone();
                entry.priority = entry.effective_priority(now, self.age_boost);
                entry
            })
            .collect();
        ranked.sort_by(batch_order);
        ranked.truncate(max);

        for entry in &ranked {
            entries.remove(&entry.path);
        }
        ranked
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<PendingChangeEntry> {
        self.lock().get(path).cloned()
    }

    /// Total entries dropped by the capacity safety valve
    pub fn evicted_total(&self) -> u64 {
        self.evicted.load(AtomicOrdering::Relaxed)
    }
}
