//! Session CSV loader
//!
//! Parses a recorded session into validated, time-sorted trials. Rows are
//! grouped by `(participant, condition, trial)` in first-seen order and each
//! group is sorted by `t` before validation.

use crate::error::{AnalysisError, TrialError};
use crate::types::{Sample, Trial, TrialKey};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// Input columns, in their canonical order
pub const REQUIRED_COLUMNS: [&str; 8] = [
    "participant",
    "condition",
    "trial",
    "tau",
    "t",
    "y_t",
    "x_p",
    "y_p",
];

/// A data row that could not be parsed and was left out
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedRow {
    /// 1-based line number in the input
    pub line: u64,
    pub reason: String,
}

/// Everything recovered from one session file
#[derive(Debug, Clone, Default)]
pub struct SessionData {
    /// Trials that passed validation, in first-seen order
    pub trials: Vec<Trial>,
    /// Trials rejected by validation
    pub rejected: Vec<TrialError>,
    /// Data rows read, including dropped ones
    pub rows_read: usize,
    pub dropped_rows: Vec<DroppedRow>,
}

/// Column positions resolved from the header row
struct ColumnIndex([usize; 8]);

impl ColumnIndex {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, AnalysisError> {
        let mut idx = [0usize; 8];
        for (slot, name) in idx.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| AnalysisError::MissingColumn(name.to_string()))?;
        }
        Ok(Self(idx))
    }

    fn field<'r>(&self, record: &'r csv::ByteRecord, col: usize) -> Result<&'r str, String> {
        let raw = record
            .get(self.0[col])
            .ok_or_else(|| format!("missing value for column {}", REQUIRED_COLUMNS[col]))?;
        std::str::from_utf8(raw)
            .map_err(|_| format!("invalid UTF-8 in column {}", REQUIRED_COLUMNS[col]))
    }

    fn number(&self, record: &csv::ByteRecord, col: usize) -> Result<f64, String> {
        let raw = self.field(record, col)?;
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(format!(
                "non-numeric value {:?} in column {}",
                raw, REQUIRED_COLUMNS[col]
            )),
        }
    }

    fn trial_index(&self, record: &csv::ByteRecord) -> Result<i64, String> {
        let raw = self.field(record, 2)?;
        if let Ok(v) = raw.parse::<i64>() {
            return Ok(v);
        }
        match raw.parse::<f64>() {
            // i64::MAX as f64 rounds up to 2^63, which is already out of range
            Ok(v) if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 => {
                Ok(v as i64)
            }
            _ => Err(format!("invalid trial index {:?}", raw)),
        }
    }

    fn parse_row(&self, record: &csv::ByteRecord) -> Result<(TrialKey, Sample), String> {
        let participant = self.field(record, 0)?;
        let condition = self.field(record, 1)?;
        if participant.is_empty() || condition.is_empty() {
            return Err("empty participant or condition".to_string());
        }

        let key = TrialKey::new(participant, condition, self.trial_index(record)?);
        let sample = Sample {
            tau: self.number(record, 3)?,
            t: self.number(record, 4)?,
            target_y: self.number(record, 5)?,
            participant_x: self.number(record, 6)?,
            participant_y: self.number(record, 7)?,
        };
        Ok((key, sample))
    }
}

/// Load a session from any CSV reader.
///
/// `source` names the input in diagnostics.
pub fn load_session<R: Read>(
    reader: R,
    source: &str,
    duplicate_tolerance_s: f64,
) -> Result<SessionData, AnalysisError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(AnalysisError::EmptyInput(source.to_string()));
    }
    let columns = ColumnIndex::from_headers(&headers)?;

    // Samples keep their input line so validation errors can point back at it
    let mut order: Vec<(TrialKey, Vec<(u64, Sample)>)> = Vec::new();
    let mut positions: HashMap<TrialKey, usize> = HashMap::new();
    let mut session = SessionData::default();

    for record in csv_reader.byte_records() {
        let record = record?;
        session.rows_read += 1;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        match columns.parse_row(&record) {
            Ok((key, sample)) => {
                let slot = *positions.entry(key.clone()).or_insert_with(|| {
                    order.push((key, Vec::new()));
                    order.len() - 1
                });
                order[slot].1.push((line, sample));
            }
            Err(reason) => {
                warn!(line, %reason, "dropping row");
                session.dropped_rows.push(DroppedRow { line, reason });
            }
        }
    }

    if order.is_empty() {
        return Err(AnalysisError::EmptyInput(source.to_string()));
    }

    for (key, mut rows) in order {
        rows.sort_by(|a, b| a.1.t.total_cmp(&b.1.t));
        let (lines, samples): (Vec<u64>, Vec<Sample>) = rows.into_iter().unzip();
        let trial = Trial::new(key, samples, duplicate_tolerance_s).map_err(|e| match e {
            TrialError::NonMonotonicTime {
                key,
                index,
                previous,
                current,
                ..
            } => TrialError::NonMonotonicTime {
                key,
                line: lines.get(index).copied(),
                index,
                previous,
                current,
            },
            other => other,
        });
        match trial {
            Ok(trial) => {
                debug!(trial = %trial.key(), samples = trial.len(), "loaded trial");
                session.trials.push(trial);
            }
            Err(e) => {
                warn!(trial = %e.key(), error = %e, "rejecting trial");
                session.rejected.push(e);
            }
        }
    }

    Ok(session)
}

/// Load a session CSV from disk
pub fn load_session_file(
    path: &Path,
    duplicate_tolerance_s: f64,
) -> Result<SessionData, AnalysisError> {
    let file = File::open(path)?;
    load_session(file, &path.display().to_string(), duplicate_tolerance_s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HEADER: &str = "participant,condition,trial,tau,t,y_t,x_p,y_p\n";

    fn load(body: &str) -> Result<SessionData, AnalysisError> {
        load_session(format!("{}{}", HEADER, body).as_bytes(), "test.csv", 0.0)
    }

    #[test]
    fn test_groups_in_first_seen_order_and_sorts_by_time() {
        let data = load(
            "p1,B,2,0.5,0.02,-200,0,-200\n\
             p1,A,1,0.4,0.00,-200,0,-200\n\
             p1,B,2,0.5,0.00,-200,0,-200\n\
             p1,B,2,0.5,0.01,-200,0,-199\n",
        )
        .unwrap();

        assert_eq!(data.rows_read, 4);
        assert_eq!(data.trials.len(), 2);
        assert_eq!(data.trials[0].key(), &TrialKey::new("p1", "B", 2));
        assert_eq!(data.trials[1].key(), &TrialKey::new("p1", "A", 1));

        let times: Vec<f64> = data.trials[0].samples().iter().map(|s| s.t).collect();
        assert_eq!(times, vec![0.0, 0.01, 0.02]);
    }

    #[test]
    fn test_column_order_is_free_and_extras_ignored() {
        let csv = "t,y_p,x_p,y_t,tau,trial,condition,participant,note\n\
                   0.0,1.0,2.0,3.0,0.5,7,c,p,hello\n";
        let data = load_session(csv.as_bytes(), "test.csv", 0.0).unwrap();

        let sample = data.trials[0].samples()[0];
        assert_eq!(data.trials[0].key(), &TrialKey::new("p", "c", 7));
        assert_eq!(sample.participant_y, 1.0);
        assert_eq!(sample.participant_x, 2.0);
        assert_eq!(sample.target_y, 3.0);
        assert_eq!(sample.tau, 0.5);
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let csv = "participant,condition,trial,tau,t,y_t,x_p\np,c,1,0.5,0.0,0,0\n";
        match load_session(csv.as_bytes(), "test.csv", 0.0) {
            Err(AnalysisError::MissingColumn(name)) => assert_eq!(name, "y_p"),
            other => panic!("expected MissingColumn, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_input_is_fatal() {
        assert!(matches!(
            load_session("".as_bytes(), "empty.csv", 0.0),
            Err(AnalysisError::EmptyInput(_))
        ));
        assert!(matches!(load(""), Err(AnalysisError::EmptyInput(_))));
    }

    #[test]
    fn test_malformed_rows_are_dropped() {
        let data = load(
            "p,c,1,0.5,0.00,0,0,0\n\
             p,c,1,0.5,0.01,0,0,abc\n\
             p,c,x,0.5,0.02,0,0,0\n\
             p,c,1.0,0.5,0.03,0,0,1\n",
        )
        .unwrap();

        assert_eq!(data.rows_read, 4);
        assert_eq!(data.dropped_rows.len(), 2);
        assert_eq!(data.dropped_rows[0].line, 3);
        assert_eq!(data.trials[0].len(), 2);
    }

    #[test]
    fn test_duplicate_timestamps_reject_only_that_trial() {
        let data = load(
            "p,c,1,0.5,0.00,0,0,0\n\
             p,c,1,0.5,0.00,0,0,1\n\
             p,c,2,0.5,0.00,0,0,0\n\
             p,c,2,0.5,0.01,0,0,1\n",
        )
        .unwrap();

        assert_eq!(data.trials.len(), 1);
        assert_eq!(data.trials[0].key().trial, 2);
        assert_eq!(data.rejected.len(), 1);
        assert_eq!(data.rejected[0].key(), &TrialKey::new("p", "c", 1));
    }

    #[test]
    fn test_rejected_trial_points_at_input_line() {
        let data = load(
            "p,c,1,0.5,0.02,0,0,0\n\
             p,c,1,0.5,0.00,0,0,0\n\
             p,c,1,0.5,0.02,0,0,1\n",
        )
        .unwrap();

        // Sorted: 0.00 (line 3), 0.02 (line 2), 0.02 (line 4)
        match &data.rejected[0] {
            TrialError::NonMonotonicTime { index, line, .. } => {
                assert_eq!(*index, 2);
                assert_eq!(*line, Some(4));
            }
            other => panic!("expected NonMonotonicTime, got {:?}", other),
        }
        assert!(data.rejected[0].to_string().contains("(line 4)"));
    }

    #[test]
    fn test_invalid_utf8_row_is_dropped() {
        let mut bytes = HEADER.as_bytes().to_vec();
        bytes.extend_from_slice(b"p,c,1,0.5,0.00,0,0,0\n");
        bytes.extend_from_slice(b"p,c,1,0.5,0.01,0,0,1\n");
        bytes.extend_from_slice(b"p\xe9,c,1,0.5,0.02,0,0,2\n");
        bytes.extend_from_slice(b"p,c,1,0.5,0.03,0,0,3\n");

        let data = load_session(bytes.as_slice(), "latin1.csv", 0.0).unwrap();

        assert_eq!(data.rows_read, 4);
        assert_eq!(data.trials.len(), 1);
        assert_eq!(data.trials[0].len(), 3);
        assert_eq!(data.dropped_rows.len(), 1);
        assert_eq!(data.dropped_rows[0].line, 4);
        assert_eq!(
            data.dropped_rows[0].reason,
            "invalid UTF-8 in column participant"
        );
    }

    #[test]
    fn test_out_of_range_trial_index_is_dropped() {
        let data = load(
            "p,c,1e19,0.5,0.00,0,0,0\n\
             p,c,-1e19,0.5,0.01,0,0,0\n\
             p,c,3,0.5,0.00,0,0,0\n",
        )
        .unwrap();

        assert_eq!(data.dropped_rows.len(), 2);
        assert_eq!(data.trials.len(), 1);
        assert_eq!(data.trials[0].key().trial, 3);
    }
}
