//! Pipeline orchestration
//!
//! This module provides the public API for reach-metrics. It runs the full
//! analysis from a session CSV to the per-trial and per-condition tables.
//!
//! Stages:
//! 1. loader - Parse, group and validate trials
//! 2. EventDetector - Movement onset/offset
//! 3. variance - Start/end window statistics
//! 4. TrialAggregator - One summary row per trial
//! 5. ConditionAggregator - One row per (participant, condition)

use crate::aggregate::ConditionAggregator;
use crate::config::AnalysisConfig;
use crate::detector::EventDetector;
use crate::error::{AnalysisError, TrialError};
use crate::loader::{load_session, SessionData};
use crate::report::RunReport;
use crate::summary::TrialAggregator;
use crate::types::{ConditionSummary, DetectionResult, Trial, TrialSummary, WindowAnchor};
use crate::variance::window_variance;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

/// Everything one run produces
#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub trials: Vec<TrialSummary>,
    pub conditions: Vec<ConditionSummary>,
    pub report: RunReport,
}

/// Analyze a session CSV held in memory (one-shot).
///
/// # Example
/// ```ignore
/// let output = analyze_csv(&csv_text, AnalysisConfig::default())?;
/// println!("{} trials", output.trials.len());
/// ```
pub fn analyze_csv(csv: &str, config: AnalysisConfig) -> Result<AnalysisOutput, AnalysisError> {
    SessionAnalyzer::new(config)?.analyze_reader(csv.as_bytes(), "<memory>")
}

/// Runs the analysis stages with one fixed configuration
pub struct SessionAnalyzer {
    config: AnalysisConfig,
    detector: EventDetector,
    aggregator: TrialAggregator,
    run_id: String,
}

impl SessionAnalyzer {
    /// Create an analyzer; fails on an invalid configuration
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self {
            detector: EventDetector::new(config.policy()),
            aggregator: TrialAggregator::from_config(&config),
            config,
            run_id: Uuid::new_v4().to_string(),
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Detection, window statistics and summary for one trial
    pub fn analyze_trial(&self, trial: &Trial) -> Result<TrialSummary, TrialError> {
        let (Some(ideal_onset), Some(ideal_offset)) = (
            trial.ideal_onset(),
            trial.ideal_offset(self.config.ideal_duration_s),
        ) else {
            return Err(TrialError::EmptyTrial(trial.key().clone()));
        };

        let detection = self.detector.detect(trial);
        let (start_center, end_center) =
            self.window_centers(&detection, ideal_onset, ideal_offset);

        let start_stats = window_variance(trial, start_center, self.config.poswin_ms);
        let end_stats = window_variance(trial, end_center, self.config.poswin_ms);

        self.aggregator
            .summarize(trial, &detection, start_stats, end_stats)
    }

    fn window_centers(
        &self,
        detection: &DetectionResult,
        ideal_onset: f64,
        ideal_offset: f64,
    ) -> (f64, f64) {
        let start = match self.config.start_anchor {
            WindowAnchor::Detected => detection.start_t.unwrap_or(ideal_onset),
            WindowAnchor::Ideal => ideal_onset,
        };
        let end = match self.config.end_anchor {
            WindowAnchor::Detected => detection.end_t.unwrap_or(ideal_offset),
            WindowAnchor::Ideal => ideal_offset,
        };
        (start, end)
    }

    /// Analyze every trial of a loaded session.
    ///
    /// A trial that fails is reported and skipped; the others still produce rows.
    pub fn analyze_session(&self, session: SessionData, source: &str) -> AnalysisOutput {
        let mut report = RunReport::new(&self.run_id, source, self.detector.policy().as_str());
        report.rows_read = session.rows_read;
        report.trials_found = session.trials.len() + session.rejected.len();
        report.dropped_rows = session.dropped_rows;

        for error in &session.rejected {
            report.record_skip(error);
        }

        let mut trials = Vec::with_capacity(session.trials.len());
        for trial in &session.trials {
            match self.analyze_trial(trial) {
                Ok(summary) => {
                    report.record_summary(&summary);
                    trials.push(summary);
                }
                Err(e) => {
                    warn!(trial = %e.key(), error = %e, "skipping trial");
                    report.record_skip(&e);
                }
            }
        }

        let conditions = ConditionAggregator::aggregate(&trials);

        info!(
            input = source,
            analyzed = report.trials_analyzed,
            skipped = report.skipped.len(),
            start_misses = report.start_misses,
            end_misses = report.end_misses,
            groups = conditions.len(),
            "analysis finished"
        );

        AnalysisOutput {
            trials,
            conditions,
            report,
        }
    }

    /// Load and analyze a session from any CSV reader
    pub fn analyze_reader<R: Read>(
        &self,
        reader: R,
        source: &str,
    ) -> Result<AnalysisOutput, AnalysisError> {
        let session = load_session(reader, source, self.config.duplicate_time_tolerance_s)?;
        Ok(self.analyze_session(session, source))
    }

    /// Load and analyze a session CSV from disk
    pub fn analyze_file(&self, path: &Path) -> Result<AnalysisOutput, AnalysisError> {
        let file = File::open(path)?;
        self.analyze_reader(file, &path.display().to_string())
    }
}
