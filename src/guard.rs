//! Resource guards
//!
//! [`FileSizeGuard`] rejects oversized files before they are read.
//! [`ResourceGuard`] is the only backpressure signal in the pipeline: when a
//! budget is exhausted it refuses admission and the processor hands the entry
//! back to the pending set instead of dropping it.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::warn;

use crate::config::GuardConfig;

/// Outcome of the size pre-check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeCheck {
    Accepted { size_bytes: u64 },
    TooLarge { size_bytes: u64, limit_bytes: u64 },
}

/// Cheap pre-filter that never reads file content
#[derive(Debug, Clone, Copy)]
pub struct FileSizeGuard {
    max_bytes: u64,
}

impl FileSizeGuard {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn check_size(&self, size_bytes: u64) -> SizeCheck {
        if size_bytes > self.max_bytes {
            SizeCheck::TooLarge {
                size_bytes,
                limit_bytes: self.max_bytes,
            }
        } else {
            SizeCheck::Accepted { size_bytes }
        }
    }

    /// Stat the file and check its size
    pub async fn inspect(&self, path: &Path) -> std::io::Result<SizeCheck> {
        let metadata = tokio::fs::metadata(path).await?;
        Ok(self.check_size(metadata.len()))
    }
}

/// Point-in-time resource usage of this process
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceSample {
    pub heap_bytes: u64,
    pub cpu_percent: f32,
}

/// Source of resource samples
pub trait ResourceProbe: Send + Sync {
    fn sample(&self) -> ResourceSample;
}

/// Samples resident memory and CPU of the current process via sysinfo
pub struct SysinfoProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!("Cannot determine current pid, memory budget disabled: {}", e);
                None
            }
        };
        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SysinfoProbe {
    fn sample(&self) -> ResourceSample {
        let Some(pid) = self.pid else {
            return ResourceSample::default();
        };

        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory().with_cpu(),
        );

        system
            .process(pid)
            .map(|process| ResourceSample {
                heap_bytes: process.memory(),
                cpu_percent: process.cpu_usage(),
            })
            .unwrap_or_default()
    }
}

/// A probe that always reports the same values
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticProbe(pub ResourceSample);

impl ResourceProbe for StaticProbe {
    fn sample(&self) -> ResourceSample {
        self.0
    }
}

/// Why admission was refused
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Refusal {
    NoWorkers,
    Heap { used_bytes: u64, limit_bytes: u64 },
    BatchTime { spent_ms: u64, limit_ms: u64 },
    Cpu { usage_percent: f32, limit_percent: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Admitted,
    Refused(Refusal),
}

/// Memory, CPU and time budgets for one batch.
///
/// A budget is exhausted once the measured value reaches its limit, so a
/// limit of zero refuses everything.
pub struct ResourceGuard {
    max_heap_bytes: u64,
    max_batch_time_ms: u64,
    max_workers: usize,
    max_cpu_percent: Option<f32>,
    probe: Arc<dyn ResourceProbe>,
    batch_time_ms: AtomicU64,
    refusals: AtomicU64,
}

impl ResourceGuard {
    pub fn new(config: &GuardConfig, probe: Arc<dyn ResourceProbe>) -> Self {
        Self {
            max_heap_bytes: config.max_heap_bytes(),
            max_batch_time_ms: config.max_batch_time_ms,
            max_workers: config.max_workers,
            max_cpu_percent: config.max_cpu_percent,
            probe,
            batch_time_ms: AtomicU64::new(0),
            refusals: AtomicU64::new(0),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Reset the per-batch time budget
    pub fn begin_batch(&self) {
        self.batch_time_ms.store(0, Ordering::Relaxed);
    }

    /// Charge validation time against the current batch
    pub fn record_processing(&self, elapsed_ms: u64) {
        self.batch_time_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
    }

    pub fn batch_time_ms(&self) -> u64 {
        self.batch_time_ms.load(Ordering::Relaxed)
    }

    pub fn refusals_total(&self) -> u64 {
        self.refusals.load(Ordering::Relaxed)
    }

    /// Check every budget without side effects
    pub fn evaluate(&self) -> Admission {
        if self.max_workers == 0 {
            return Admission::Refused(Refusal::NoWorkers);
        }

        let spent_ms = self.batch_time_ms();
        if spent_ms >= self.max_batch_time_ms {
            return Admission::Refused(Refusal::BatchTime {
                spent_ms,
                limit_ms: self.max_batch_time_ms,
            });
        }

        let sample = self.probe.sample();
        if sample.heap_bytes >= self.max_heap_bytes {
            return Admission::Refused(Refusal::Heap {
                used_bytes: sample.heap_bytes,
                limit_bytes: self.max_heap_bytes,
            });
        }

        if let Some(limit) = self.max_cpu_percent {
            if sample.cpu_percent >= limit {
                return Admission::Refused(Refusal::Cpu {
                    usage_percent: sample.cpu_percent,
                    limit_percent: limit,
                });
            }
        }

        Admission::Admitted
    }

    /// Ask to start one more validation; logs a warning when refused
    pub fn admit(&self) -> bool {
        match self.evaluate() {
            Admission::Admitted => true,
            Admission::Refused(refusal) => {
                self.refusals.fetch_add(1, Ordering::Relaxed);
                match refusal {
                    Refusal::NoWorkers => {
                        warn!(max_workers = 0, "Resource guard refused work: no workers allowed")
                    }
                    Refusal::Heap {
                        used_bytes,
                        limit_bytes,
                    } => warn!(
                        used_bytes,
                        limit_bytes, "Resource guard refused work: heap budget exceeded"
                    ),
                    Refusal::BatchTime { spent_ms, limit_ms } => warn!(
                        spent_ms,
                        limit_ms, "Resource guard refused work: batch time budget exceeded"
                    ),
                    Refusal::Cpu {
                        usage_percent,
                        limit_percent,
                    } => warn!(
                        usage_percent,
                        limit_percent, "Resource guard refused work: CPU budget exceeded"
                    ),
                }
                false
            }
        }
    }
}

impl std::fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGuard")
            .field("max_heap_bytes", &self.max_heap_bytes)
            .field("max_batch_time_ms", &self.max_batch_time_ms)
            .field("max_workers", &self.max_workers)
            .field("max_cpu_percent", &self.max_cpu_percent)
            .field("batch_time_ms", &self.batch_time_ms())
            .finish()
    }
}
