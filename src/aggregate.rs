//! Per-condition aggregation
//!
//! Groups trial summaries by `(participant, condition)` and reports mean,
//! unbiased variance and contributing count for every aggregated metric.
//! Groups keep the order in which their key was first seen.

use crate::types::{
    ConditionSummary, FieldStats, MetricSummary, TimingEvent, TrialSummary, AGGREGATED_METRICS,
    OFFSET_DEVIATION_METRIC, ONSET_DEVIATION_METRIC,
};
use crate::variance::{describe, timing_stats};
use std::collections::HashMap;

/// Condition-level aggregator
pub struct ConditionAggregator;

impl ConditionAggregator {
    /// Aggregate trial summaries into one row per `(participant, condition)`
    pub fn aggregate(summaries: &[TrialSummary]) -> Vec<ConditionSummary> {
        group_by_condition(summaries)
            .into_iter()
            .map(|group| summarize_group(&group))
            .collect()
    }
}

/// Group summaries in first-seen order of their group key
fn group_by_condition(summaries: &[TrialSummary]) -> Vec<Vec<&TrialSummary>> {
    let mut groups: Vec<Vec<&TrialSummary>> = Vec::new();
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();

    for summary in summaries {
        let slot = *index.entry(summary.key.group()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(summary);
    }

    groups
}

fn summarize_group(group: &[&TrialSummary]) -> ConditionSummary {
    let (participant, condition) = group
        .first()
        .map(|s| (s.key.participant.clone(), s.key.condition.clone()))
        .unwrap_or_default();

    let metrics = AGGREGATED_METRICS
        .iter()
        .enumerate()
        .map(|(i, &name)| MetricSummary {
            name: name.to_string(),
            stats: metric_stats(group, i),
        })
        .collect();

    ConditionSummary {
        participant,
        condition,
        n_trials: group.len(),
        n_detection_ok: group.iter().filter(|s| s.detection_ok).count(),
        n_reach_fallback: group.iter().filter(|s| s.reach_fallback).count(),
        metrics,
    }
}

fn metric_stats(group: &[&TrialSummary], index: usize) -> FieldStats {
    match index {
        ONSET_DEVIATION_METRIC => timing_stats(group.iter().copied(), TimingEvent::Onset),
        OFFSET_DEVIATION_METRIC => timing_stats(group.iter().copied(), TimingEvent::Offset),
        _ => describe(group.iter().map(|s| s.metrics()[index])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TrialKey, WindowStats};
    use pretty_assertions::assert_eq;

    fn window(variance: Option<f64>) -> WindowStats {
        WindowStats {
            center_t: 0.0,
            position_variance: variance,
            mean_position: None,
            n_samples_in_window: if variance.is_some() { 5 } else { 0 },
        }
    }

    fn summary(
        participant: &str,
        condition: &str,
        trial: i64,
        start_t: Option<f64>,
        end_t: Option<f64>,
    ) -> TrialSummary {
        let reach_time = match (start_t, end_t) {
            (Some(s), Some(e)) => Some(e - s),
            _ => None,
        };
        TrialSummary {
            key: TrialKey::new(participant, condition, trial),
            tau: 0.5,
            detection_ok: start_t.is_some() && end_t.is_some(),
            start_t,
            end_t,
            target_reached_t: None,
            reach_time,
            reach_y: Some(200.0),
            reach_x: Some(0.0),
            reach_fallback: end_t.is_none(),
            start_window: window(Some(1.0)),
            end_window: window(None),
            onset_deviation: start_t.map(|s| s - 0.5),
            offset_deviation: end_t.map(|e| e - 1.5),
            offset_sq_error: end_t.map(|e| (e - 1.5) * (e - 1.5)),
            tracking_mse: None,
            flags: vec![],
        }
    }

    #[test]
    fn test_reach_time_mean_excludes_missing_end() {
        let summaries = vec![
            summary("p1", "c1", 0, Some(0.5), Some(1.5)),
            summary("p1", "c1", 1, Some(0.5), None),
            summary("p1", "c1", 2, Some(0.5), Some(2.5)),
        ];

        let rows = ConditionAggregator::aggregate(&summaries);
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.n_trials, 3);
        assert_eq!(row.n_detection_ok, 2);
        assert_eq!(row.n_reach_fallback, 1);
        assert_eq!(
            row.metric("reach_time"),
            Some(&FieldStats {
                mean: Some(1.5),
                variance: Some(0.5),
                n: 2,
            })
        );
        // Counts differ per metric
        assert_eq!(row.metric("start_t").map(|s| s.n), Some(3));
        assert_eq!(row.metric("start_pos_var").map(|s| s.n), Some(3));
    }

    #[test]
    fn test_metric_without_values_is_missing() {
        let summaries = vec![
            summary("p1", "c1", 0, None, None),
            summary("p1", "c1", 1, None, None),
        ];
        let rows = ConditionAggregator::aggregate(&summaries);

        assert_eq!(rows[0].metric("end_pos_var"), Some(&FieldStats::default()));
        assert_eq!(rows[0].metric("tracking_mse"), Some(&FieldStats::default()));
        assert_eq!(rows[0].metric("reach_time").and_then(|s| s.mean), None);
    }

    #[test]
    fn test_single_trial_group_has_no_variance() {
        let rows = ConditionAggregator::aggregate(&[summary("p1", "c1", 0, Some(0.5), Some(1.4))]);
        let stats = rows[0].metric("end_t").unwrap();
        assert_eq!(stats.mean, Some(1.4));
        assert_eq!(stats.variance, None);
        assert_eq!(stats.n, 1);
    }

    #[test]
    fn test_groups_keep_first_seen_order() {
        let summaries = vec![
            summary("p2", "b", 0, Some(0.5), Some(1.5)),
            summary("p1", "a", 0, Some(0.5), Some(1.5)),
            summary("p2", "a", 0, Some(0.5), Some(1.5)),
            summary("p2", "b", 1, Some(0.5), Some(1.5)),
        ];

        let keys: Vec<(String, String, usize)> = ConditionAggregator::aggregate(&summaries)
            .into_iter()
            .map(|r| (r.participant, r.condition, r.n_trials))
            .collect();

        assert_eq!(
            keys,
            vec![
                ("p2".to_string(), "b".to_string(), 2),
                ("p1".to_string(), "a".to_string(), 1),
                ("p2".to_string(), "a".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_timing_variance_around_ideal_offset() {
        let summaries = vec![
            summary("p1", "c1", 0, Some(0.5), Some(1.25)),
            summary("p1", "c1", 1, Some(0.5), Some(1.75)),
        ];
        let rows = ConditionAggregator::aggregate(&summaries);

        assert_eq!(
            rows[0].metric("offset_deviation"),
            Some(&FieldStats {
                mean: Some(0.0),
                variance: Some(0.125),
                n: 2,
            })
        );
        assert_eq!(
            rows[0].metric("offset_sq_error").and_then(|s| s.mean),
            Some(0.0625)
        );
    }

    #[test]
    fn test_timing_metrics_follow_their_own_values() {
        // Onset deviation differs from start_t by tau; the columns must not swap
        let summaries = vec![
            summary("p1", "c1", 0, Some(0.6), Some(1.5)),
            summary("p1", "c1", 1, Some(0.8), Some(1.5)),
        ];
        let row = &ConditionAggregator::aggregate(&summaries)[0];

        let onset = row.metric("onset_deviation").unwrap();
        assert!((onset.mean.unwrap() - 0.2).abs() < 1e-12);
        assert_eq!(onset.n, 2);
        let start = row.metric("start_t").unwrap();
        assert!((start.mean.unwrap() - 0.7).abs() < 1e-12);
        assert_eq!(row.metric("offset_deviation").and_then(|s| s.mean), Some(0.0));
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let summaries = vec![
            summary("p1", "c1", 0, Some(0.5), Some(1.5)),
            summary("p1", "c2", 0, None, None),
            summary("p1", "c1", 1, Some(0.6), Some(1.7)),
        ];

        let first = ConditionAggregator::aggregate(&summaries);
        let second = ConditionAggregator::aggregate(&summaries);
        assert_eq!(first, second);
        assert_eq!(
            first[0].metrics.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            AGGREGATED_METRICS.to_vec()
        );
    }
}
