// Sentinel - Real-Time Standards Validation Library
//!
//! Sentinel watches a source tree, coalesces bursts of file edits into
//! prioritized batches, validates them under a resource budget and keeps a
//! live model of violation counts and session effectiveness.

pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod metrics;
pub mod processor;
pub mod rules;
pub mod scheduler;
pub mod service;
pub mod violation;
pub mod watcher;

#[cfg(test)]
pub mod tests;

// Re-export common types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SentinelConfig;
pub use error::{Result, SentinelError};
pub use metrics::{EffectivenessSnapshot, RunningCounters, Trend};
pub use service::ValidationService;
pub use violation::{Severity, ValidationError, ValidationResult, Validator, Violation};
pub use watcher::{ChangeKind, FileChangeEvent};
