//! Windowed variance and descriptive statistics
//!
//! All variances are unbiased (N-1). Fewer than two values yield `None`
//! rather than zero, so "missing" stays distinguishable from "no spread".

use crate::types::{FieldStats, Sample, TimingEvent, Trial, TrialSummary, WindowStats};

/// Positional statistics of the samples within `center_t ± half_width_ms`.
///
/// Window bounds are inclusive on both sides.
pub fn window_variance(trial: &Trial, center_t: f64, half_width_ms: f64) -> WindowStats {
    let half_width_s = half_width_ms / 1000.0;
    let positions: Vec<f64> = window(trial, center_t - half_width_s, center_t + half_width_s)
        .iter()
        .map(|s| s.participant_y)
        .collect();

    WindowStats {
        center_t,
        position_variance: sample_variance(&positions),
        mean_position: mean(&positions),
        n_samples_in_window: positions.len(),
    }
}

/// Samples with `from <= t <= to`
fn window(trial: &Trial, from: f64, to: f64) -> &[Sample] {
    let samples = trial.samples();
    if !(from.is_finite() && to.is_finite()) || from > to {
        return &samples[..0];
    }
    let lo = samples.partition_point(|s| s.t < from);
    let hi = samples.partition_point(|s| s.t <= to);
    &samples[lo..hi.max(lo)]
}

/// Arithmetic mean, `None` when empty
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Unbiased sample variance, `None` for fewer than two values
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|x| (x - m).powi(2)).sum();
    Some(ss / (values.len() - 1) as f64)
}

/// Mean, variance and count over the present values
pub fn describe<I>(values: I) -> FieldStats
where
    I: IntoIterator<Item = Option<f64>>,
{
    let present: Vec<f64> = values.into_iter().flatten().filter(|v| v.is_finite()).collect();
    FieldStats {
        mean: mean(&present),
        variance: sample_variance(&present),
        n: present.len(),
    }
}

/// Dispersion of detected onset or offset times around their ideal times
/// across a set of trials.
pub fn timing_stats<'a, I>(summaries: I, event: TimingEvent) -> FieldStats
where
    I: IntoIterator<Item = &'a TrialSummary>,
{
    describe(summaries.into_iter().map(|s| match event {
        TimingEvent::Onset => s.onset_deviation,
        TimingEvent::Offset => s.offset_deviation,
    }))
}

/// Mean squared difference between participant and target position over
/// `from_t <= t <= to_t`
pub fn tracking_mse(trial: &Trial, from_t: f64, to_t: f64) -> Option<f64> {
    let errors: Vec<f64> = window(trial, from_t, to_t)
        .iter()
        .map(|s| (s.participant_y - s.target_y).powi(2))
        .collect();
    mean(&errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrialKey;
    use pretty_assertions::assert_eq;

    /// Samples every 100 ms; test windows stay clear of sample times
    fn trial(positions: &[f64], targets: &[f64]) -> Trial {
        let samples = positions
            .iter()
            .zip(targets)
            .enumerate()
            .map(|(i, (&y, &target_y))| Sample {
                t: i as f64 * 0.1,
                tau: 0.2,
                target_y,
                participant_x: 0.0,
                participant_y: y,
            })
            .collect();
        Trial::new(TrialKey::new("p", "c", 0), samples, 0.0).unwrap()
    }

    #[test]
    fn test_sample_variance_is_unbiased() {
        assert_eq!(sample_variance(&[1.0, 2.0, 3.0, 4.0]), Some(5.0 / 3.0));
        assert_eq!(sample_variance(&[7.0]), None);
        assert_eq!(sample_variance(&[]), None);
    }

    #[test]
    fn test_window_variance() {
        let trial = trial(&[0.0, 2.0, 4.0, 6.0, 8.0], &[0.0; 5]);
        // 0.15 ± 0.1 covers t = 0.1 and 0.2
        let stats = window_variance(&trial, 0.15, 100.0);

        assert_eq!(stats.n_samples_in_window, 2);
        assert_eq!(stats.position_variance, Some(2.0));
        assert_eq!(stats.mean_position, Some(3.0));
        assert_eq!(stats.center_t, 0.15);
    }

    #[test]
    fn test_single_sample_window_is_missing() {
        let trial = trial(&[0.0, 2.0, 4.0], &[0.0; 3]);
        let stats = window_variance(&trial, 0.1, 20.0);

        assert_eq!(stats.n_samples_in_window, 1);
        assert_eq!(stats.position_variance, None);
        assert_eq!(stats.mean_position, Some(2.0));
    }

    #[test]
    fn test_empty_window_is_missing() {
        let trial = trial(&[0.0, 2.0, 4.0], &[0.0; 3]);
        let stats = window_variance(&trial, 5.0, 100.0);

        assert_eq!(
            stats,
            WindowStats {
                center_t: 5.0,
                position_variance: None,
                mean_position: None,
                n_samples_in_window: 0,
            }
        );
    }

    #[test]
    fn test_window_with_nan_center_is_empty() {
        let trial = trial(&[0.0, 2.0, 4.0], &[0.0; 3]);
        let stats = window_variance(&trial, f64::NAN, 100.0);
        assert_eq!(stats.n_samples_in_window, 0);
        assert_eq!(stats.position_variance, None);
    }

    #[test]
    fn test_describe_skips_missing() {
        let stats = describe([Some(1.0), None, Some(3.0), Some(f64::NAN)]);
        assert_eq!(
            stats,
            FieldStats {
                mean: Some(2.0),
                variance: Some(2.0),
                n: 2,
            }
        );

        let empty = describe([None, None]);
        assert_eq!(empty, FieldStats::default());

        let single = describe([Some(4.0)]);
        assert_eq!(single.mean, Some(4.0));
        assert_eq!(single.variance, None);
        assert_eq!(single.n, 1);
    }

    #[test]
    fn test_tracking_mse() {
        let trial = trial(&[0.0, 1.0, 3.0, 5.0], &[0.0, 0.0, 1.0, 5.0]);
        // t = 0.1 .. 0.25 covers samples 1 and 2: errors 1 and 4
        assert_eq!(tracking_mse(&trial, 0.05, 0.25), Some(2.5));
        assert_eq!(tracking_mse(&trial, 1.0, 2.0), None);
    }
}
