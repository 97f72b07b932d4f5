//! Batch scheduling
//!
//! The [`BatchScheduler`] is an explicit state machine driven by a single
//! timer:
//!
//! ```text
//! Idle ──(change pending)──▶ Pending ──(delay elapsed)──▶ Flushing
//!  ▲                            ▲                            │
//!  └────(nothing left)──────────┴───────(leftovers)──────────┘
//! ```
//!
//! The delay shrinks as the queue grows: a single edit waits for more edits
//! to coalesce with, a burst at `max_batch_size` flushes almost immediately.

pub mod batch;
pub mod cost;
pub mod pending;
pub mod priority;

use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::SchedulerConfig;

pub use batch::Batch;
pub use pending::{PendingChangeEntry, PendingChangeSet};
pub use priority::PathClassifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    /// Changes are waiting; the debounce window opened at `since`
    Pending { since: Instant },
    Flushing,
}

pub struct BatchScheduler {
    config: SchedulerConfig,
    state: SchedulerState,
    next_sequence: u64,
}

impl BatchScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            state: SchedulerState::Idle,
            next_sequence: 1,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Debounce delay for the current queue depth
    pub fn adaptive_delay(&self, pending_len: usize) -> Duration {
        if pending_len >= self.config.max_batch_size {
            self.config.burst_delay()
        } else if pending_len >= self.config.batch_size_target {
            self.config.standard_delay()
        } else {
            self.config.trickle_delay()
        }
    }

    /// Track Idle/Pending transitions for the observed queue depth
    fn observe(&mut self, now: Instant, pending_len: usize) {
        match (self.state, pending_len) {
            (SchedulerState::Idle, n) if n > 0 => {
                self.state = SchedulerState::Pending { since: now };
            }
            (SchedulerState::Pending { .. }, 0) => {
                self.state = SchedulerState::Idle;
            }
            _ => {}
        }
    }

    /// Time left before a flush is due, or `None` when nothing is pending
    pub fn time_until_flush(&mut self, now: Instant, pending_len: usize) -> Option<Duration> {
        self.observe(now, pending_len);
        match self.state {
            SchedulerState::Pending { since } => {
                let waited = now.saturating_duration_since(since);
                Some(self.adaptive_delay(pending_len).saturating_sub(waited))
            }
            _ => None,
        }
    }

    pub fn should_flush(&mut self, now: Instant, pending_len: usize) -> bool {
        matches!(self.time_until_flush(now, pending_len), Some(left) if left.is_zero())
    }

    /// Take the next batch from the pending set and enter `Flushing`
    pub fn flush(&mut self, pending: &PendingChangeSet, now: Instant) -> Batch {
        self.state = SchedulerState::Flushing;
        let entries = pending.take_batch(self.config.max_batch_size);
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        debug!(
            sequence,
            size = entries.len(),
            remaining = pending.len(),
            "Flushed batch"
        );
        Batch::new(sequence, now, entries)
    }

    /// Leave `Flushing` once the batch has drained.
    ///
    /// Leftovers open a fresh debounce window rather than flushing at once.
    pub fn complete(&mut self, now: Instant, pending_len: usize) {
        self.state = if pending_len > 0 {
            SchedulerState::Pending { since: now }
        } else {
            SchedulerState::Idle
        };
    }
}
