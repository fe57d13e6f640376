//! Core types for the reach-metrics pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! analysis: recorded samples and trials, detection results, window statistics,
//! per-trial summaries and per-condition aggregates.

use crate::error::TrialError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One recorded frame of a trial
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Wall time since trial start (seconds)
    pub t: f64,
    /// Target onset delay for this trial (seconds)
    pub tau: f64,
    /// Target vertical position (px)
    pub target_y: f64,
    /// Participant horizontal position (px)
    pub participant_x: f64,
    /// Participant vertical position (px)
    pub participant_y: f64,
}

/// Identifies a trial within a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrialKey {
    pub participant: String,
    pub condition: String,
    pub trial: i64,
}

impl TrialKey {
    pub fn new(participant: impl Into<String>, condition: impl Into<String>, trial: i64) -> Self {
        Self {
            participant: participant.into(),
            condition: condition.into(),
            trial,
        }
    }

    /// Grouping key used by the condition aggregator
    pub fn group(&self) -> (&str, &str) {
        (&self.participant, &self.condition)
    }
}

impl fmt::Display for TrialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "participant={} condition={} trial={}",
            self.participant, self.condition, self.trial
        )
    }
}

/// A validated, time-ordered trial. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    key: TrialKey,
    samples: Vec<Sample>,
}

impl Trial {
    /// Build a trial from samples that are already sorted by `t`.
    ///
    /// Consecutive samples closer than `duplicate_tolerance_s` (or going
    /// backwards) are rejected as a data-quality error.
    pub fn new(
        key: TrialKey,
        samples: Vec<Sample>,
        duplicate_tolerance_s: f64,
    ) -> Result<Self, TrialError> {
        if samples.is_empty() {
            return Err(TrialError::EmptyTrial(key));
        }

        for (i, pair) in samples.windows(2).enumerate() {
            let dt = pair[1].t - pair[0].t;
            if dt <= duplicate_tolerance_s {
                return Err(TrialError::NonMonotonicTime {
                    key,
                    index: i + 1,
                    line: None,
                    previous: pair[0].t,
                    current: pair[1].t,
                });
            }
        }

        Ok(Self { key, samples })
    }

    pub fn key(&self) -> &TrialKey {
        &self.key
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// Target onset delay, taken from the first sample
    pub fn tau(&self) -> Option<f64> {
        self.first().map(|s| s.tau)
    }

    /// Wall time at which the target starts moving
    pub fn ideal_onset(&self) -> Option<f64> {
        self.tau()
    }

    /// Wall time at which the target stops, for a nominal duration `T`
    pub fn ideal_offset(&self, ideal_duration_s: f64) -> Option<f64> {
        self.tau().map(|tau| tau + ideal_duration_s)
    }

    /// First sample whose time is at or after `t`
    pub fn sample_at_or_after(&self, t: f64) -> Option<&Sample> {
        let idx = self.samples.partition_point(|s| s.t < t);
        self.samples.get(idx)
    }
}

/// Movement detection strategy, selected once per run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DetectionPolicy {
    /// Fixed pixel-distance thresholds from start and target positions
    Margin {
        start_margin_px: f64,
        end_margin_px: f64,
    },
    /// Speed thresholds with minimum dwell durations
    Velocity {
        v_start: f64,
        v_stop: f64,
        hold_start_ms: f64,
        hold_stop_ms: f64,
    },
}

impl DetectionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionPolicy::Margin { .. } => "margin",
            DetectionPolicy::Velocity { .. } => "velocity",
        }
    }
}

/// States of the velocity+dwell detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionState {
    Idle,
    Moving,
    Stopped,
}

/// Outcome of movement detection for one trial
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Movement onset (seconds), `None` when no crossing was found
    pub start_t: Option<f64>,
    /// Movement offset (seconds), `None` when no crossing was found
    pub end_t: Option<f64>,
    /// Both onset and offset were found
    pub detection_ok: bool,
    /// First time the participant was within the end margin of the target's
    /// final position, regardless of onset (margin mode only)
    pub target_reached_t: Option<f64>,
}

impl DetectionResult {
    pub fn new(start_t: Option<f64>, end_t: Option<f64>) -> Self {
        Self {
            start_t,
            end_t,
            detection_ok: start_t.is_some() && end_t.is_some(),
            target_reached_t: None,
        }
    }
}

/// Positional statistics of the samples around a reference time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    /// Window center (seconds)
    pub center_t: f64,
    /// Unbiased variance of participant position, `None` for fewer than 2 samples
    pub position_variance: Option<f64>,
    /// Mean participant position, `None` for an empty window
    pub mean_position: Option<f64>,
    /// Number of samples inside the window
    pub n_samples_in_window: usize,
}

/// Where a variance window is centered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowAnchor {
    /// Detected event time, falling back to the ideal time when undetected
    Detected,
    /// Ideal time from the experimental design (`tau`, `tau + T`)
    Ideal,
}

/// How reach position is chosen when no movement offset was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReachFallback {
    /// Participant position at the last recorded sample
    LastSample,
    /// Mean participant position in the end window
    EndWindowMean,
    /// Leave reach position missing
    Missing,
}

/// Which detected event a timing statistic refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingEvent {
    Onset,
    Offset,
}

/// Per-trial data quality markers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    StartNotDetected,
    EndNotDetected,
    ReachFallback,
    SparseStartWindow,
    SparseEndWindow,
}

impl QualityFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityFlag::StartNotDetected => "start_not_detected",
            QualityFlag::EndNotDetected => "end_not_detected",
            QualityFlag::ReachFallback => "reach_fallback",
            QualityFlag::SparseStartWindow => "sparse_start_window",
            QualityFlag::SparseEndWindow => "sparse_end_window",
        }
    }
}

/// One row of the per-trial table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSummary {
    pub key: TrialKey,
    /// Target onset delay (seconds)
    pub tau: f64,
    pub detection_ok: bool,
    pub start_t: Option<f64>,
    pub end_t: Option<f64>,
    pub target_reached_t: Option<f64>,
    /// `end_t - start_t`
    pub reach_time: Option<f64>,
    /// Participant vertical position at reach
    pub reach_y: Option<f64>,
    /// Participant horizontal position at reach
    pub reach_x: Option<f64>,
    /// Reach position came from the configured fallback
    pub reach_fallback: bool,
    pub start_window: WindowStats,
    pub end_window: WindowStats,
    /// `start_t - tau`
    pub onset_deviation: Option<f64>,
    /// `end_t - (tau + T)`
    pub offset_deviation: Option<f64>,
    /// Squared offset deviation, this trial's contribution to timing variance
    pub offset_sq_error: Option<f64>,
    /// Mean squared tracking error over `[tau, tau + T]`
    pub tracking_mse: Option<f64>,
    pub flags: Vec<QualityFlag>,
}

/// Names of the per-trial metrics aggregated per condition, in output order
pub const AGGREGATED_METRICS: [&str; 11] = [
    "start_t",
    "end_t",
    "reach_time",
    "reach_y",
    "start_pos_var",
    "end_pos_var",
    "end_window_mean_y",
    "onset_deviation",
    "offset_deviation",
    "offset_sq_error",
    "tracking_mse",
];

/// Position of `onset_deviation` in [`AGGREGATED_METRICS`]
pub const ONSET_DEVIATION_METRIC: usize = 7;

/// Position of `offset_deviation` in [`AGGREGATED_METRICS`]
pub const OFFSET_DEVIATION_METRIC: usize = 8;

impl TrialSummary {
    /// Aggregated metric values, aligned with [`AGGREGATED_METRICS`]
    pub fn metrics(&self) -> [Option<f64>; 11] {
        [
            self.start_t,
            self.end_t,
            self.reach_time,
            self.reach_y,
            self.start_window.position_variance,
            self.end_window.position_variance,
            self.end_window.mean_position,
            self.onset_deviation,
            self.offset_deviation,
            self.offset_sq_error,
            self.tracking_mse,
        ]
    }
}

/// Mean, unbiased variance and count of the present values of one metric
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldStats {
    pub mean: Option<f64>,
    pub variance: Option<f64>,
    pub n: usize,
}

/// Aggregated statistics of one metric within a condition group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub name: String,
    #[serde(flatten)]
    pub stats: FieldStats,
}

/// One row of the per-condition table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionSummary {
    pub participant: String,
    pub condition: String,
    pub n_trials: usize,
    pub n_detection_ok: usize,
    pub n_reach_fallback: usize,
    pub metrics: Vec<MetricSummary>,
}

impl ConditionSummary {
    /// Look up the statistics of a metric by name
    pub fn metric(&self, name: &str) -> Option<&FieldStats> {
        self.metrics.iter().find(|m| m.name == name).map(|m| &m.stats)
    }
}
