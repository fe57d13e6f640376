//! Output tables
//!
//! Writes the per-trial and per-condition tables as CSV with a header row.
//! Missing values are written as a configurable marker, never as zero.

use crate::error::AnalysisError;
use crate::types::{ConditionSummary, TrialSummary, AGGREGATED_METRICS};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Suffix of the per-trial table file name
pub const TRIALS_SUFFIX: &str = "_trials.csv";

/// Suffix of the per-condition table file name
pub const CONDITIONS_SUFFIX: &str = "_by_condition.csv";

/// Columns of the per-trial table
pub const TRIAL_COLUMNS: [&str; 24] = [
    "participant",
    "condition",
    "trial",
    "tau",
    "detection_ok",
    "start_t",
    "end_t",
    "target_reached_t",
    "reach_time",
    "reach_y",
    "reach_x",
    "reach_fallback",
    "start_center_t",
    "start_pos_var",
    "start_window_n",
    "end_center_t",
    "end_pos_var",
    "end_window_n",
    "end_window_mean_y",
    "onset_deviation",
    "offset_deviation",
    "offset_sq_error",
    "tracking_mse",
    "flags",
];

/// Columns of the per-condition table
pub fn condition_columns() -> Vec<String> {
    let mut columns: Vec<String> = [
        "participant",
        "condition",
        "n_trials",
        "n_detection_ok",
        "n_reach_fallback",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();

    for metric in AGGREGATED_METRICS {
        columns.push(format!("{}_mean", metric));
        columns.push(format!("{}_var", metric));
        columns.push(format!("{}_n", metric));
    }
    columns
}

fn value(v: Option<f64>, missing: &str) -> String {
    match v {
        Some(x) if x.is_finite() => x.to_string(),
        _ => missing.to_string(),
    }
}

fn trial_record(s: &TrialSummary, missing: &str) -> Vec<String> {
    let flags: Vec<&str> = s.flags.iter().map(|f| f.as_str()).collect();
    vec![
        s.key.participant.clone(),
        s.key.condition.clone(),
        s.key.trial.to_string(),
        s.tau.to_string(),
        s.detection_ok.to_string(),
        value(s.start_t, missing),
        value(s.end_t, missing),
        value(s.target_reached_t, missing),
        value(s.reach_time, missing),
        value(s.reach_y, missing),
        value(s.reach_x, missing),
        s.reach_fallback.to_string(),
        value(Some(s.start_window.center_t), missing),
        value(s.start_window.position_variance, missing),
        s.start_window.n_samples_in_window.to_string(),
        value(Some(s.end_window.center_t), missing),
        value(s.end_window.position_variance, missing),
        s.end_window.n_samples_in_window.to_string(),
        value(s.end_window.mean_position, missing),
        value(s.onset_deviation, missing),
        value(s.offset_deviation, missing),
        value(s.offset_sq_error, missing),
        value(s.tracking_mse, missing),
        flags.join(";"),
    ]
}

fn condition_record(c: &ConditionSummary, missing: &str) -> Vec<String> {
    let mut record = vec![
        c.participant.clone(),
        c.condition.clone(),
        c.n_trials.to_string(),
        c.n_detection_ok.to_string(),
        c.n_reach_fallback.to_string(),
    ];
    for metric in AGGREGATED_METRICS {
        let stats = c.metric(metric).copied().unwrap_or_default();
        record.push(value(stats.mean, missing));
        record.push(value(stats.variance, missing));
        record.push(stats.n.to_string());
    }
    record
}

/// Write the per-trial table
pub fn write_trials<W: Write>(
    writer: W,
    summaries: &[TrialSummary],
    missing: &str,
) -> Result<(), AnalysisError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(TRIAL_COLUMNS)?;
    for summary in summaries {
        csv_writer.write_record(trial_record(summary, missing))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write the per-condition table
pub fn write_conditions<W: Write>(
    writer: W,
    conditions: &[ConditionSummary],
    missing: &str,
) -> Result<(), AnalysisError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(condition_columns())?;
    for condition in conditions {
        csv_writer.write_record(condition_record(condition, missing))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Paths of the two tables for an input file: beside the input unless an
/// output directory is given
pub fn output_paths(input: &Path, out_dir: Option<&Path>) -> (PathBuf, PathBuf) {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "session".to_string());
    let dir = out_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();

    (
        dir.join(format!("{}{}", stem, TRIALS_SUFFIX)),
        dir.join(format!("{}{}", stem, CONDITIONS_SUFFIX)),
    )
}

/// Write both tables to disk and return their paths
pub fn write_tables(
    trials: &[TrialSummary],
    conditions: &[ConditionSummary],
    input: &Path,
    out_dir: Option<&Path>,
    missing: &str,
) -> Result<(PathBuf, PathBuf), AnalysisError> {
    let (trials_path, conditions_path) = output_paths(input, out_dir);
    if let Some(parent) = trials_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    write_trials(File::create(&trials_path)?, trials, missing)?;
    write_conditions(File::create(&conditions_path)?, conditions, missing)?;
    Ok((trials_path, conditions_path))
}
