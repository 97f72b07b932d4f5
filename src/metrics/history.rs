//! Persisted metrics history
//!
//! File format:
//! ```json
//! {
//!   "version": 1,
//!   "entries": [
//!     { "timestamp": "2026-01-01T12:00:00Z", "counters": { ... }, "effectiveness": { ... }, "trend": "stable" }
//!   ]
//! }
//! ```
//!
//! Entries beyond the retention count are trimmed oldest-first on every append.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Result, SentinelError};
use crate::metrics::aggregator::RunningCounters;
use crate::metrics::effectiveness::{EffectivenessSnapshot, Trend};

const HISTORY_VERSION: u32 = 1;

/// One persisted point-in-time view of the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub timestamp: DateTime<Utc>,
    pub counters: RunningCounters,
    pub effectiveness: EffectivenessSnapshot,
    #[serde(default)]
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsHistory {
    version: u32,
    entries: Vec<MetricsRecord>,
}

impl Default for MetricsHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsHistory {
    pub const fn new() -> Self {
        Self {
            version: HISTORY_VERSION,
            entries: Vec::new(),
        }
    }

    /// Load history from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|source| SentinelError::HistoryFormat {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load history, starting fresh when the file does not exist yet
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }

    /// Write atomically: temp file in the same directory, then rename
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Append a record and trim the oldest entries beyond `retention`
    pub fn push(&mut self, record: MetricsRecord, retention: usize) {
        self.entries.push(record);
        let retention = retention.max(1);
        if self.entries.len() > retention {
            let excess = self.entries.len() - retention;
            self.entries.drain(..excess);
        }
    }

    pub fn entries(&self) -> &[MetricsRecord] {
        &self.entries
    }

    pub fn latest(&self) -> Option<&MetricsRecord> {
        self.entries.last()
    }

    /// Up to `n` newest records, oldest first
    pub fn last_n(&self, n: usize) -> &[MetricsRecord] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Destination for periodic metrics records
pub trait ResultSink: Send + Sync {
    fn persist(&self, record: &MetricsRecord) -> Result<()>;

    /// Fail early if the destination is unusable
    fn verify(&self) -> Result<()> {
        Ok(())
    }
}

/// Appends records to a bounded JSON history file
pub struct JsonHistorySink {
    path: PathBuf,
    retention: usize,
    // Serializes read-modify-write cycles from the periodic and final snapshots
    write_lock: Mutex<()>,
}

impl JsonHistorySink {
    pub fn new(path: PathBuf, retention: usize) -> Self {
        Self {
            path,
            retention,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<MetricsHistory> {
        MetricsHistory::load_or_default(&self.path)
    }
}

impl ResultSink for JsonHistorySink {
    fn persist(&self, record: &MetricsRecord) -> Result<()> {
        let _guard = match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("History write lock poisoned, recovering");
                poisoned.into_inner()
            }
        };

        let mut history = self.load()?;
        history.push(record.clone(), self.retention);
        history.save(&self.path)?;

        debug!(
            path = %self.path.display(),
            entries = history.len(),
            "Persisted metrics record"
        );
        Ok(())
    }

    fn verify(&self) -> Result<()> {
        let history = self.load()?;
        debug!(
            path = %self.path.display(),
            entries = history.len(),
            "Metrics history readable"
        );
        Ok(())
    }
}
