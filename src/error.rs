//! Error types for reach-metrics
//!
//! Two layers: [`AnalysisError`] aborts a run, [`TrialError`] only skips the
//! offending trial.

use crate::types::TrialKey;
use thiserror::Error;

/// Fatal errors that halt an analysis run
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("No usable data rows in input: {0}")]
    EmptyInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Per-trial data errors; the trial is skipped and the run continues
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrialError {
    #[error("Trial {0} has no samples")]
    EmptyTrial(TrialKey),

    /// `index` counts samples after sorting by time; `line` is the input
    /// line of the offending row when the trial came from a file
    #[error(
        "Trial {key}: non-monotonic time at sorted sample {index}{} ({previous} -> {current})",
        line_suffix(.line)
    )]
    NonMonotonicTime {
        key: TrialKey,
        index: usize,
        line: Option<u64>,
        previous: f64,
        current: f64,
    },
}

fn line_suffix(line: &Option<u64>) -> String {
    line.map(|l| format!(" (line {})", l)).unwrap_or_default()
}

impl TrialError {
    /// Key of the trial this error belongs to
    pub fn key(&self) -> &TrialKey {
        match self {
            TrialError::EmptyTrial(key) => key,
            TrialError::NonMonotonicTime { key, .. } => key,
        }
    }
}
