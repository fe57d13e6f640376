//! reach-metrics - Movement timing and positional variance for target-tracking trials
//!
//! A participant follows a moving target on screen. For every trial this crate
//! finds when the participant's movement started and ended, measures how
//! scattered their position was around those moments, and aggregates the
//! results per participant and condition through a deterministic pipeline:
//! loading → event detection → window variance → trial summary → condition
//! aggregation.
//!
//! ## Detection modes
//!
//! - **Margin**: fixed pixel distances from the start position and the target
//! - **Velocity**: speed thresholds held for a minimum dwell time

pub mod aggregate;
pub mod config;
pub mod detector;
pub mod error;
pub mod loader;
pub mod output;
pub mod pipeline;
pub mod report;
pub mod summary;
pub mod types;
pub mod variance;

pub use config::AnalysisConfig;
pub use detector::{detect, EventDetector, VelocityStateMachine};
pub use error::{AnalysisError, TrialError};
pub use pipeline::{analyze_csv, AnalysisOutput, SessionAnalyzer};
pub use report::RunReport;
pub use types::{
    ConditionSummary, DetectionPolicy, DetectionResult, Sample, Trial, TrialKey, TrialSummary,
    WindowStats,
};

/// Crate version recorded in every run report
pub const REACH_METRICS_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name recorded in every run report
pub const PRODUCER_NAME: &str = "reach-metrics";
