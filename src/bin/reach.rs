//! Reach CLI - Command-line interface for reach-metrics
//!
//! Commands:
//! - analyze: Detect movement onset/offset and write the trial and condition tables
//! - validate: Load a session and report per-trial data problems
//! - config: Print the effective configuration

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use reach_metrics::loader::load_session_file;
use reach_metrics::output::write_tables;
use reach_metrics::report::SkippedTrial;
use reach_metrics::types::{ReachFallback, WindowAnchor};
use reach_metrics::{AnalysisConfig, AnalysisError, SessionAnalyzer, REACH_METRICS_VERSION};

/// Reach - Movement timing and positional variance for target-tracking trials
#[derive(Parser)]
#[command(name = "reach")]
#[command(version = REACH_METRICS_VERSION)]
#[command(about = "Analyze reaching movements in target-tracking sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a session CSV and write the output tables
    Analyze {
        /// Session CSV file
        input: PathBuf,

        /// Directory for the output tables (default: beside the input)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Write the run report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,

        #[command(flatten)]
        settings: Settings,
    },

    /// Load a session and report per-trial validation problems
    Validate {
        /// Session CSV file
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        settings: Settings,
    },

    /// Print the effective configuration as JSON
    Config {
        #[command(flatten)]
        settings: Settings,
    },
}

/// Configuration file plus per-field overrides
#[derive(Args)]
struct Settings {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Nominal movement duration T (seconds)
    #[arg(long, visible_alias = "T")]
    ideal_duration: Option<f64>,

    /// Half-width of the position variance windows (ms)
    #[arg(long)]
    poswin_ms: Option<f64>,

    /// Detection mode
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    #[arg(long)]
    start_margin_px: Option<f64>,

    #[arg(long)]
    end_margin_px: Option<f64>,

    /// Onset speed threshold (px/s)
    #[arg(long)]
    v_start: Option<f64>,

    /// Offset speed threshold (px/s)
    #[arg(long)]
    v_stop: Option<f64>,

    #[arg(long)]
    hold_start_ms: Option<f64>,

    #[arg(long)]
    hold_stop_ms: Option<f64>,

    /// Center of the start variance window
    #[arg(long, value_enum)]
    start_anchor: Option<Anchor>,

    /// Center of the end variance window
    #[arg(long, value_enum)]
    end_anchor: Option<Anchor>,

    /// Reach position when no offset was detected
    #[arg(long, value_enum)]
    reach_fallback: Option<Fallback>,

    /// Marker written for missing values
    #[arg(long)]
    missing_marker: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Fixed pixel margins
    Margin,
    /// Speed thresholds with dwell times
    Velocity,
}

#[derive(Clone, Copy, ValueEnum)]
enum Anchor {
    Detected,
    Ideal,
}

impl From<Anchor> for WindowAnchor {
    fn from(a: Anchor) -> Self {
        match a {
            Anchor::Detected => WindowAnchor::Detected,
            Anchor::Ideal => WindowAnchor::Ideal,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Fallback {
    LastSample,
    EndWindowMean,
    Missing,
}

impl From<Fallback> for ReachFallback {
    fn from(f: Fallback) -> Self {
        match f {
            Fallback::LastSample => ReachFallback::LastSample,
            Fallback::EndWindowMean => ReachFallback::EndWindowMean,
            Fallback::Missing => ReachFallback::Missing,
        }
    }
}

impl Settings {
    /// File (or defaults) first, then command-line overrides
    fn resolve(&self) -> Result<AnalysisConfig, AnalysisError> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::load(path)?,
            None => AnalysisConfig::default(),
        };

        if let Some(v) = self.ideal_duration {
            config.ideal_duration_s = v;
        }
        if let Some(v) = self.poswin_ms {
            config.poswin_ms = v;
        }
        if let Some(mode) = self.mode {
            config.use_velocity = matches!(mode, Mode::Velocity);
        }
        if let Some(v) = self.start_margin_px {
            config.start_margin_px = v;
        }
        if let Some(v) = self.end_margin_px {
            config.end_margin_px = v;
        }
        if let Some(v) = self.v_start {
            config.v_start = v;
        }
        if let Some(v) = self.v_stop {
            config.v_stop = v;
        }
        if let Some(v) = self.hold_start_ms {
            config.hold_start_ms = v;
        }
        if let Some(v) = self.hold_stop_ms {
            config.hold_stop_ms = v;
        }
        if let Some(a) = self.start_anchor {
            config.start_anchor = a.into();
        }
        if let Some(a) = self.end_anchor {
            config.end_anchor = a.into();
        }
        if let Some(f) = self.reach_fallback {
            config.reach_fallback = f.into();
        }
        if let Some(marker) = &self.missing_marker {
            config.missing_marker = marker.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), ReachCliError> {
    match cli.command {
        Commands::Analyze {
            input,
            out_dir,
            report,
            settings,
        } => cmd_analyze(&input, out_dir.as_deref(), report.as_deref(), &settings),

        Commands::Validate {
            input,
            json,
            settings,
        } => cmd_validate(&input, json, &settings),

        Commands::Config { settings } => {
            println!("{}", settings.resolve()?.to_json()?);
            Ok(())
        }
    }
}

fn cmd_analyze(
    input: &Path,
    out_dir: Option<&Path>,
    report_path: Option<&Path>,
    settings: &Settings,
) -> Result<(), ReachCliError> {
    let config = settings.resolve()?;
    let missing = config.missing_marker.clone();
    let analyzer = SessionAnalyzer::new(config)?;

    let output = analyzer.analyze_file(input)?;
    let (trials_path, conditions_path) =
        write_tables(&output.trials, &output.conditions, input, out_dir, &missing)?;

    if let Some(path) = report_path {
        fs::write(path, output.report.to_json()?)?;
    }

    let report = &output.report;
    println!("Analyzed {} of {} trials", report.trials_analyzed, report.trials_found);
    println!("  Onset not detected:  {}", report.start_misses);
    println!("  Offset not detected: {}", report.end_misses);
    println!("  Reach fallbacks:     {}", report.reach_fallbacks);
    if !report.dropped_rows.is_empty() {
        println!("  Dropped rows:        {}", report.dropped_rows.len());
    }
    if report.has_skipped() {
        println!("\nSkipped trials:");
        print_skipped(&report.skipped);
    }
    println!("\nWrote {}", trials_path.display());
    println!("Wrote {}", conditions_path.display());

    Ok(())
}

fn cmd_validate(input: &Path, json: bool, settings: &Settings) -> Result<(), ReachCliError> {
    let config = settings.resolve()?;
    let session = load_session_file(input, config.duplicate_time_tolerance_s)?;

    let report = ValidationReport {
        rows_read: session.rows_read,
        dropped_rows: session.dropped_rows.len(),
        total_trials: session.trials.len() + session.rejected.len(),
        valid_trials: session.trials.len(),
        invalid_trials: session.rejected.len(),
        errors: session.rejected.iter().map(SkippedTrial::from).collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Rows read:      {}", report.rows_read);
        println!("Dropped rows:   {}", report.dropped_rows);
        println!("Total trials:   {}", report.total_trials);
        println!("Valid trials:   {}", report.valid_trials);
        println!("Invalid trials: {}", report.invalid_trials);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            print_skipped(&report.errors);
        }
    }

    if report.invalid_trials > 0 {
        Err(ReachCliError::ValidationFailed(report.invalid_trials))
    } else {
        Ok(())
    }
}

fn print_skipped(skipped: &[SkippedTrial]) {
    for s in skipped {
        println!(
            "  - {} / {} / trial {}: {}",
            s.participant, s.condition, s.trial, s.reason
        );
    }
}

// Error types

#[derive(Debug)]
enum ReachCliError {
    Analysis(AnalysisError),
    Io(std::io::Error),
    Json(serde_json::Error),
    ValidationFailed(usize),
}

impl From<AnalysisError> for ReachCliError {
    fn from(e: AnalysisError) -> Self {
        ReachCliError::Analysis(e)
    }
}

impl From<std::io::Error> for ReachCliError {
    fn from(e: std::io::Error) -> Self {
        ReachCliError::Io(e)
    }
}

impl From<serde_json::Error> for ReachCliError {
    fn from(e: serde_json::Error) -> Self {
        ReachCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(code: &str, message: String, hint: &str) -> Self {
        Self {
            code: code.to_string(),
            message,
            hint: Some(hint.to_string()),
        }
    }
}

impl From<ReachCliError> for CliError {
    fn from(e: ReachCliError) -> Self {
        match e {
            ReachCliError::Analysis(e) => {
                let message = e.to_string();
                match e {
                    AnalysisError::Io(_) => {
                        CliError::new("IO_ERROR", message, "Check file paths and permissions")
                    }
                    AnalysisError::Csv(_) => {
                        CliError::new("CSV_ERROR", message, "Check that the input is valid CSV")
                    }
                    AnalysisError::Json(_) => {
                        CliError::new("JSON_ERROR", message, "Check the configuration file syntax")
                    }
                    AnalysisError::MissingColumn(_) => CliError::new(
                        "MISSING_COLUMN",
                        message,
                        "Required columns: participant, condition, trial, tau, t, y_t, x_p, y_p",
                    ),
                    AnalysisError::EmptyInput(_) => {
                        CliError::new("EMPTY_INPUT", message, "Ensure the input file has data rows")
                    }
                    AnalysisError::InvalidConfig(_) => CliError::new(
                        "INVALID_CONFIG",
                        message,
                        "Run 'reach config' to inspect the effective configuration",
                    ),
                }
            }
            ReachCliError::Io(e) => {
                CliError::new("IO_ERROR", e.to_string(), "Check file paths and permissions")
            }
            ReachCliError::Json(e) => CliError::new("JSON_ERROR", e.to_string(), "Check JSON syntax"),
            ReachCliError::ValidationFailed(count) => CliError::new(
                "VALIDATION_FAILED",
                format!("{} trials failed validation", count),
                "Fix the listed trials or raise duplicate_time_tolerance_s",
            ),
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    rows_read: usize,
    dropped_rows: usize,
    total_trials: usize,
    valid_trials: usize,
    invalid_trials: usize,
    errors: Vec<SkippedTrial>,
}
