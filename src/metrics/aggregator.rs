//! Violation aggregation
//!
//! Workers finish in any order, so every update is a plain counter
//! increment applied under one lock: the final counters are the same for any
//! completion order, and readers always see a whole update or none of it.

use serde::{Deserialize, Serialize};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

use crate::metrics::ring::RingBuffer;
use crate::violation::{Severity, ValidationResult};

/// Session-long counters. Repeated edits of one file count every time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningCounters {
    pub files_changed: u64,
    pub violations_detected: u64,
    pub critical_violations: u64,
    pub warnings: u64,
    pub info_violations: u64,
    pub suggestions: u64,
    /// Validated files without a single violation
    pub clean_files: u64,
    pub total_processing_time_ms: u64,
}

impl RunningCounters {
    /// Fold one validation result into the counters
    pub fn apply(&mut self, result: &ValidationResult) {
        self.files_changed += 1;
        self.total_processing_time_ms += result.processing_time_ms;
        if result.is_clean() {
            self.clean_files += 1;
        }
        for violation in &result.violations {
            self.violations_detected += 1;
            match violation.severity {
                Severity::Critical => self.critical_violations += 1,
                Severity::Warning => self.warnings += 1,
                Severity::Info => self.info_violations += 1,
                Severity::Suggestion => self.suggestions += 1,
            }
        }
    }

    pub fn average_processing_time_ms(&self) -> f64 {
        if self.files_changed == 0 {
            0.0
        } else {
            self.total_processing_time_ms as f64 / self.files_changed as f64
        }
    }
}

#[derive(Debug)]
struct AggregatorState {
    counters: RunningCounters,
    recent: RingBuffer<ValidationResult>,
}

/// Single owner of the running counters
#[derive(Debug)]
pub struct ViolationAggregator {
    state: RwLock<AggregatorState>,
}

impl ViolationAggregator {
    pub fn new(recent_capacity: usize) -> Self {
        Self {
            state: RwLock::new(AggregatorState {
                counters: RunningCounters::default(),
                recent: RingBuffer::new(recent_capacity),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, AggregatorState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Aggregator lock poisoned during read, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, AggregatorState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Aggregator lock poisoned during update, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Record a completed validation. Call exactly once per result.
    pub fn record(&self, result: ValidationResult) {
        debug!(
            path = %result.path.display(),
            violations = result.violations.len(),
            processing_time_ms = result.processing_time_ms,
            "Recording validation result"
        );

        let mut state = self.write();
        state.counters.apply(&result);
        state.recent.push(result);
    }

    /// Consistent copy of the counters
    pub fn counters(&self) -> RunningCounters {
        self.read().counters
    }

    /// Up to `n` most recent results, newest first
    pub fn recent(&self, n: usize) -> Vec<ValidationResult> {
        self.read().recent.newest(n).cloned().collect()
    }

    pub fn recent_len(&self) -> usize {
        self.read().recent.len()
    }
}
