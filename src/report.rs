//! Run report
//!
//! Collects what happened during a run beyond the two output tables: skipped
//! trials, dropped rows and detection misses, plus provenance.

use crate::error::TrialError;
use crate::loader::DroppedRow;
use crate::types::{QualityFlag, TrialSummary};
use crate::{PRODUCER_NAME, REACH_METRICS_VERSION};
use chrono::Utc;
use serde::Serialize;

/// A trial that produced no summary row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedTrial {
    pub participant: String,
    pub condition: String,
    pub trial: i64,
    pub reason: String,
}

impl From<&TrialError> for SkippedTrial {
    fn from(e: &TrialError) -> Self {
        let key = e.key();
        Self {
            participant: key.participant.clone(),
            condition: key.condition.clone(),
            trial: key.trial,
            reason: e.to_string(),
        }
    }
}

/// Summary of one analysis run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub producer: String,
    pub version: String,
    pub run_id: String,
    pub computed_at_utc: String,
    pub input: String,
    pub detection_mode: String,
    pub rows_read: usize,
    pub trials_found: usize,
    pub trials_analyzed: usize,
    /// Trials with no detected onset
    pub start_misses: usize,
    /// Trials with no detected offset
    pub end_misses: usize,
    pub reach_fallbacks: usize,
    pub skipped: Vec<SkippedTrial>,
    pub dropped_rows: Vec<DroppedRow>,
}

impl RunReport {
    pub fn new(run_id: &str, input: &str, detection_mode: &str) -> Self {
        Self {
            producer: PRODUCER_NAME.to_string(),
            version: REACH_METRICS_VERSION.to_string(),
            run_id: run_id.to_string(),
            computed_at_utc: Utc::now().to_rfc3339(),
            input: input.to_string(),
            detection_mode: detection_mode.to_string(),
            rows_read: 0,
            trials_found: 0,
            trials_analyzed: 0,
            start_misses: 0,
            end_misses: 0,
            reach_fallbacks: 0,
            skipped: Vec::new(),
            dropped_rows: Vec::new(),
        }
    }

    /// Count a successfully summarized trial
    pub fn record_summary(&mut self, summary: &TrialSummary) {
        self.trials_analyzed += 1;
        for flag in &summary.flags {
            match flag {
                QualityFlag::StartNotDetected => self.start_misses += 1,
                QualityFlag::EndNotDetected => self.end_misses += 1,
                QualityFlag::ReachFallback => self.reach_fallbacks += 1,
                QualityFlag::SparseStartWindow | QualityFlag::SparseEndWindow => {}
            }
        }
    }

    /// Count a trial that was skipped
    pub fn record_skip(&mut self, error: &TrialError) {
        self.skipped.push(SkippedTrial::from(error));
    }

    pub fn has_skipped(&self) -> bool {
        !self.skipped.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrialKey;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_skipped_trial_from_error() {
        let error = TrialError::EmptyTrial(TrialKey::new("p3", "var", 9));
        let skipped = SkippedTrial::from(&error);

        assert_eq!(
            skipped,
            SkippedTrial {
                participant: "p3".to_string(),
                condition: "var".to_string(),
                trial: 9,
                reason: "Trial participant=p3 condition=var trial=9 has no samples".to_string(),
            }
        );
    }

    #[test]
    fn test_report_json_has_provenance() {
        let mut report = RunReport::new("run-1", "session.csv", "velocity");
        report.record_skip(&TrialError::EmptyTrial(TrialKey::new("p", "c", 1)));

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["producer"], "reach-metrics");
        assert_eq!(json["run_id"], "run-1");
        assert_eq!(json["detection_mode"], "velocity");
        assert_eq!(json["skipped"][0]["trial"], 1);
        assert!(report.has_skipped());
    }
}
