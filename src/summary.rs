//! Per-trial summaries
//!
//! Packs detection results and window statistics into one [`TrialSummary`]
//! row per trial, deriving reach position/time and timing deviations.

use crate::config::AnalysisConfig;
use crate::error::TrialError;
use crate::types::{
    DetectionResult, QualityFlag, ReachFallback, Trial, TrialSummary, WindowStats,
};
use crate::variance::tracking_mse;

/// Builds [`TrialSummary`] rows
#[derive(Debug, Clone, Copy)]
pub struct TrialAggregator {
    ideal_duration_s: f64,
    reach_fallback: ReachFallback,
}

impl TrialAggregator {
    pub fn new(ideal_duration_s: f64, reach_fallback: ReachFallback) -> Self {
        Self {
            ideal_duration_s,
            reach_fallback,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.ideal_duration_s, config.reach_fallback)
    }

    /// Summarize one trial. Fails fast on a trial without samples.
    pub fn summarize(
        &self,
        trial: &Trial,
        detection: &DetectionResult,
        start_stats: WindowStats,
        end_stats: WindowStats,
    ) -> Result<TrialSummary, TrialError> {
        let (Some(tau), Some(last)) = (trial.tau(), trial.last()) else {
            return Err(TrialError::EmptyTrial(trial.key().clone()));
        };
        let ideal_offset = tau + self.ideal_duration_s;

        let mut flags = Vec::new();
        if detection.start_t.is_none() {
            flags.push(QualityFlag::StartNotDetected);
        }
        if detection.end_t.is_none() {
            flags.push(QualityFlag::EndNotDetected);
        }
        if start_stats.position_variance.is_none() {
            flags.push(QualityFlag::SparseStartWindow);
        }
        if end_stats.position_variance.is_none() {
            flags.push(QualityFlag::SparseEndWindow);
        }

        let detected_reach = detection
            .end_t
            .and_then(|end_t| trial.sample_at_or_after(end_t))
            .map(|s| (Some(s.participant_y), Some(s.participant_x)));

        let (reach_y, reach_x, reach_fallback) = match detected_reach {
            Some((y, x)) => (y, x, false),
            None => match self.reach_fallback {
                ReachFallback::LastSample => {
                    (Some(last.participant_y), Some(last.participant_x), true)
                }
                ReachFallback::EndWindowMean => (end_stats.mean_position, None, true),
                ReachFallback::Missing => (None, None, false),
            },
        };
        if reach_fallback {
            flags.push(QualityFlag::ReachFallback);
        }

        let reach_time = match (detection.start_t, detection.end_t) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        };
        let onset_deviation = detection.start_t.map(|s| s - tau);
        let offset_deviation = detection.end_t.map(|e| e - ideal_offset);

        Ok(TrialSummary {
            key: trial.key().clone(),
            tau,
            detection_ok: detection.detection_ok,
            start_t: detection.start_t,
            end_t: detection.end_t,
            target_reached_t: detection.target_reached_t,
            reach_time,
            reach_y,
            reach_x,
            reach_fallback,
            start_window: start_stats,
            end_window: end_stats,
            onset_deviation,
            offset_deviation,
            offset_sq_error: offset_deviation.map(|d| d * d),
            tracking_mse: tracking_mse(trial, tau, ideal_offset),
            flags,
        })
    }
}
