//! Violation metrics: running counters, effectiveness scoring and history

pub mod aggregator;
pub mod effectiveness;
pub mod history;
pub mod ring;

pub use aggregator::{RunningCounters, ViolationAggregator};
pub use effectiveness::{EffectivenessModel, EffectivenessSnapshot, Trend, TrendTracker};
pub use history::{JsonHistorySink, MetricsHistory, MetricsRecord, ResultSink};
pub use ring::RingBuffer;
