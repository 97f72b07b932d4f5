//! Aggregation and effectiveness scoring

use crate::metrics::{
    EffectivenessModel, RunningCounters, Trend, TrendTracker, ViolationAggregator,
};
use crate::tests::test_utils::result_with;
use crate::violation::{Severity, ValidationResult};

fn permutations(items: &[ValidationResult]) -> Vec<Vec<ValidationResult>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut all = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head.clone());
            all.push(tail);
        }
    }
    all
}

fn sample_results() -> Vec<ValidationResult> {
    vec![
        result_with("src/a.ts", &[Severity::Critical, Severity::Warning], 12),
        result_with("src/b.ts", &[], 3),
        result_with("src/c.rs", &[Severity::Info, Severity::Info, Severity::Suggestion], 40),
        result_with("src/a.ts", &[Severity::Warning], 9),
    ]
}

#[test]
fn test_counters_are_independent_of_completion_order() {
    let expected = RunningCounters {
        files_changed: 4,
        violations_detected: 6,
        critical_violations: 1,
        warnings: 2,
        info_violations: 2,
        suggestions: 1,
        clean_files: 1,
        total_processing_time_ms: 64,
    };

    let orders = permutations(&sample_results());
    assert_eq!(orders.len(), 24);

    for order in orders {
        let aggregator = ViolationAggregator::new(10);
        for result in order {
            aggregator.record(result);
        }
        assert_eq!(aggregator.counters(), expected);
    }
}

#[test]
fn test_recent_results_keep_newest_within_capacity() {
    let aggregator = ViolationAggregator::new(3);
    for i in 0..5 {
        aggregator.record(result_with(&format!("src/f{}.ts", i), &[], i));
    }

    assert_eq!(aggregator.recent_len(), 3);
    let recent: Vec<String> = aggregator
        .recent(10)
        .iter()
        .map(|r| r.path.display().to_string())
        .collect();
    assert_eq!(recent, vec!["src/f4.ts", "src/f3.ts", "src/f2.ts"]);

    // Counters are session-long, the window is not
    assert_eq!(aggregator.counters().files_changed, 5);
}

#[test]
fn test_average_processing_time() {
    let mut counters = RunningCounters::default();
    assert_eq!(counters.average_processing_time_ms(), 0.0);

    for result in sample_results() {
        counters.apply(&result);
    }
    assert_eq!(counters.average_processing_time_ms(), 16.0);
}

#[test]
fn test_effectiveness_for_violation_heavy_hour() {
    let counters = RunningCounters {
        files_changed: 50,
        violations_detected: 100,
        critical_violations: 10,
        info_violations: 90,
        ..RunningCounters::default()
    };
    let model = EffectivenessModel::new(50.0, 8.0);

    let snapshot = model.snapshot(&counters, 60.0);

    assert!((snapshot.time_saved_hours - 20.5667).abs() < 1e-3);
    assert_eq!(snapshot.compliance_rate_pct, 0.0);
    assert_eq!(snapshot.productivity_gain_pct, 0.0);
    assert_eq!(snapshot.quality_improvement_pct, 0.0);
    assert_eq!(snapshot.standards_adoption_pct, 0.0);
    assert_eq!(snapshot.effectiveness_score, 30);
    assert!((snapshot.roi_pct - 20466.67).abs() < 0.01);
}

#[test]
fn test_effectiveness_for_mostly_clean_session() {
    let counters = RunningCounters {
        files_changed: 20,
        violations_detected: 2,
        warnings: 2,
        clean_files: 18,
        ..RunningCounters::default()
    };
    let snapshot = EffectivenessModel::new(50.0, 8.0).snapshot(&counters, 30.0);

    assert_eq!(snapshot.compliance_rate_pct, 90.0);
    assert_eq!(snapshot.productivity_gain_pct, 80.0);
    assert_eq!(snapshot.quality_improvement_pct, 90.0);
    assert_eq!(snapshot.standards_adoption_pct, 90.0);
    assert!(snapshot.effectiveness_score >= 60);
    assert!(snapshot.effectiveness_score <= 100);
}

#[test]
fn test_snapshot_is_pure() {
    let counters = RunningCounters {
        files_changed: 7,
        violations_detected: 3,
        critical_violations: 1,
        suggestions: 2,
        clean_files: 4,
        total_processing_time_ms: 70,
        ..RunningCounters::default()
    };
    let model = EffectivenessModel::default();
    let before = counters;

    let first = model.snapshot(&counters, 12.5);
    let second = model.snapshot(&counters, 12.5);

    assert_eq!(first, second);
    assert_eq!(counters, before);
}

#[test]
fn test_zero_session_has_zero_roi() {
    let snapshot = EffectivenessModel::default().snapshot(&RunningCounters::default(), 0.0);
    assert_eq!(snapshot.roi_pct, 0.0);
    assert_eq!(snapshot.time_saved_hours, 0.0);
}

#[test]
fn test_trend_needs_two_full_spans() {
    let mut tracker = TrendTracker::new(20);
    for _ in 0..9 {
        tracker.record(90);
    }
    assert_eq!(tracker.trend(), Trend::Stable);
}

#[test]
fn test_trend_compares_newest_five_with_previous_five() {
    let mut improving = TrendTracker::new(20);
    for score in [40, 40, 40, 40, 40, 50, 50, 50, 50, 50] {
        improving.record(score);
    }
    assert_eq!(improving.trend(), Trend::Improving);

    let mut declining = TrendTracker::new(20);
    for score in [70, 70, 70, 70, 70, 60, 62, 64, 60, 60] {
        declining.record(score);
    }
    assert_eq!(declining.trend(), Trend::Declining);

    let mut stable = TrendTracker::new(20);
    for score in [50, 50, 50, 50, 50, 52, 53, 54, 51, 50] {
        stable.record(score);
    }
    assert_eq!(stable.trend(), Trend::Stable);
}

#[test]
fn test_trend_window_forgets_old_scores() {
    let mut tracker = TrendTracker::new(10);
    for _ in 0..5 {
        tracker.record(10);
    }
    for _ in 0..10 {
        tracker.record(80);
    }
    assert_eq!(tracker.len(), 10);
    assert_eq!(tracker.trend(), Trend::Stable);
}
