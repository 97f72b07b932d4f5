//! Effectiveness scoring
//!
//! [`EffectivenessModel::snapshot`] is a pure function of the running
//! counters and the session length. Trend smoothing lives in a separate
//! [`TrendTracker`] and never feeds back into the scores.

use serde::{Deserialize, Serialize};

use crate::config::MetricsConfig;
use crate::metrics::aggregator::RunningCounters;
use crate::metrics::ring::RingBuffer;

/// Hours saved per violation caught, regardless of class
const HOURS_PER_VIOLATION: f64 = 0.25 / 60.0;
/// Hours saved per critical violation caught before review or production
const HOURS_PER_CRITICAL: f64 = 2.0;
const HOURS_PER_WARNING: f64 = 0.5 / 60.0;
const HOURS_PER_INFO: f64 = 0.1 / 60.0;
const HOURS_PER_SUGGESTION: f64 = 0.05 / 60.0;

/// Share of session time charged as the tool's own overhead in ROI
const OVERHEAD_SHARE: f64 = 0.1;

const WEIGHT_TIME_SAVED: f64 = 0.3;
const WEIGHT_PRODUCTIVITY: f64 = 0.25;
const WEIGHT_QUALITY: f64 = 0.25;
const WEIGHT_ADOPTION: f64 = 0.2;

/// Scores compared on each side of a trend window
pub const TREND_SPAN: usize = 5;
/// Mean difference, in score points, that counts as movement
pub const TREND_THRESHOLD: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectivenessSnapshot {
    pub effectiveness_score: u32,
    pub time_saved_hours: f64,
    pub compliance_rate_pct: f64,
    pub productivity_gain_pct: f64,
    pub quality_improvement_pct: f64,
    pub standards_adoption_pct: f64,
    pub roi_pct: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    #[default]
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectivenessModel {
    hourly_rate: f64,
    time_saved_target_hours: f64,
}

impl EffectivenessModel {
    pub fn new(hourly_rate: f64, time_saved_target_hours: f64) -> Self {
        Self {
            hourly_rate,
            time_saved_target_hours,
        }
    }

    pub fn from_config(config: &MetricsConfig) -> Self {
        Self::new(config.hourly_rate, config.time_saved_target_hours)
    }

    pub fn time_saved_hours(counters: &RunningCounters) -> f64 {
        counters.violations_detected as f64 * HOURS_PER_VIOLATION
            + counters.critical_violations as f64 * HOURS_PER_CRITICAL
            + counters.warnings as f64 * HOURS_PER_WARNING
            + counters.info_violations as f64 * HOURS_PER_INFO
            + counters.suggestions as f64 * HOURS_PER_SUGGESTION
    }

    /// Saved hours on a 0-100 scale, saturating at the target
    fn normalize_time_saved(&self, hours: f64) -> f64 {
        if self.time_saved_target_hours <= 0.0 {
            return 0.0;
        }
        (hours / self.time_saved_target_hours).min(1.0) * 100.0
    }

    pub fn snapshot(
        &self,
        counters: &RunningCounters,
        session_duration_minutes: f64,
    ) -> EffectivenessSnapshot {
        let files = counters.files_changed.max(1) as f64;
        let violations = counters.violations_detected as f64;

        let time_saved_hours = Self::time_saved_hours(counters);
        let compliance_rate_pct =
            ((counters.files_changed as f64 - violations) / files * 100.0).clamp(0.0, 100.0);
        let productivity_gain_pct = ((compliance_rate_pct - 50.0) / 50.0 * 100.0).max(0.0);
        let quality_improvement_pct = (100.0 - violations / files * 100.0).max(0.0);
        let standards_adoption_pct = (counters.clean_files as f64 / files * 100.0).min(100.0);

        let weighted = WEIGHT_TIME_SAVED * self.normalize_time_saved(time_saved_hours)
            + WEIGHT_PRODUCTIVITY * productivity_gain_pct
            + WEIGHT_QUALITY * quality_improvement_pct
            + WEIGHT_ADOPTION * standards_adoption_pct;
        let effectiveness_score = weighted.round().clamp(0.0, 100.0) as u32;

        let overhead_cost =
            session_duration_minutes.max(0.0) / 60.0 * self.hourly_rate * OVERHEAD_SHARE;
        let roi_pct = if overhead_cost != 0.0 {
            (time_saved_hours * self.hourly_rate - overhead_cost) / overhead_cost * 100.0
        } else {
            0.0
        };

        EffectivenessSnapshot {
            effectiveness_score,
            time_saved_hours,
            compliance_rate_pct,
            productivity_gain_pct,
            quality_improvement_pct,
            standards_adoption_pct,
            roi_pct,
        }
    }
}

impl Default for EffectivenessModel {
    fn default() -> Self {
        Self::from_config(&MetricsConfig::default())
    }
}

/// Bounded history of scores used only to label the direction of travel
#[derive(Debug, Clone)]
pub struct TrendTracker {
    scores: RingBuffer<u32>,
}

impl TrendTracker {
    /// The window never shrinks below two full spans
    pub fn new(window: usize) -> Self {
        Self {
            scores: RingBuffer::new(window.max(TREND_SPAN * 2)),
        }
    }

    pub fn record(&mut self, score: u32) {
        self.scores.push(score);
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Compare the mean of the newest five scores with the five before them
    pub fn trend(&self) -> Trend {
        if self.scores.len() < TREND_SPAN * 2 {
            return Trend::Stable;
        }

        let newest: Vec<f64> = self
            .scores
            .newest(TREND_SPAN * 2)
            .map(|&s| s as f64)
            .collect();
        let (recent, previous) = newest.split_at(TREND_SPAN);
        let mean = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;
        let delta = mean(recent) - mean(previous);

        if delta >= TREND_THRESHOLD {
            Trend::Improving
        } else if delta <= -TREND_THRESHOLD {
            Trend::Declining
        } else {
            Trend::Stable
        }
    }
}
