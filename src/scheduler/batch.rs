use std::time::Instant;

use crate::scheduler::pending::PendingChangeEntry;

/// An ordered, immutable snapshot of pending changes taken at flush time
#[derive(Debug, Clone)]
pub struct Batch {
    sequence: u64,
    flushed_at: Instant,
    entries: Vec<PendingChangeEntry>,
}

impl Batch {
    pub(crate) fn new(sequence: u64, flushed_at: Instant, entries: Vec<PendingChangeEntry>) -> Self {
        Self {
            sequence,
            flushed_at,
            entries,
        }
    }

    /// Monotonically increasing per scheduler
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn flushed_at(&self) -> Instant {
        self.flushed_at
    }

    pub fn entries(&self) -> &[PendingChangeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<PendingChangeEntry> {
        self.entries
    }
}
