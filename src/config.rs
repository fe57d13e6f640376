//! Analysis configuration
//!
//! Every field has a default, so a partial JSON file only overrides what it
//! names. The command line overrides individual fields on top of that.

use crate::error::AnalysisError;
use crate::types::{DetectionPolicy, ReachFallback, WindowAnchor};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Marker written for missing values in output tables
pub const DEFAULT_MISSING_MARKER: &str = "NA";

/// Parameters of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Nominal movement duration `T` (seconds)
    pub ideal_duration_s: f64,
    /// Half-width of the position variance windows (ms)
    pub poswin_ms: f64,
    /// Margin mode: departure from the initial position that marks onset (px)
    pub start_margin_px: f64,
    /// Margin mode: distance to the target's final position that marks offset (px)
    pub end_margin_px: f64,
    /// Select velocity+dwell detection instead of margin detection
    pub use_velocity: bool,
    /// Velocity mode: onset speed threshold (px/s)
    pub v_start: f64,
    /// Velocity mode: offset speed threshold (px/s)
    pub v_stop: f64,
    /// Velocity mode: dwell above `v_start` required for onset (ms)
    pub hold_start_ms: f64,
    /// Velocity mode: dwell below `v_stop` required for offset (ms)
    pub hold_stop_ms: f64,
    pub start_anchor: WindowAnchor,
    pub end_anchor: WindowAnchor,
    pub reach_fallback: ReachFallback,
    /// Consecutive samples this close in time are treated as duplicates (seconds)
    pub duplicate_time_tolerance_s: f64,
    pub missing_marker: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            ideal_duration_s: 1.0,
            poswin_ms: 100.0,
            start_margin_px: 20.0,
            end_margin_px: 20.0,
            use_velocity: true,
            v_start: 50.0,
            v_stop: 20.0,
            hold_start_ms: 80.0,
            hold_stop_ms: 100.0,
            start_anchor: WindowAnchor::Detected,
            end_anchor: WindowAnchor::Ideal,
            reach_fallback: ReachFallback::LastSample,
            duplicate_time_tolerance_s: 0.0,
            missing_marker: DEFAULT_MISSING_MARKER.to_string(),
        }
    }
}

impl AnalysisConfig {
    /// Parse configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, AnalysisError> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Serialize configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, AnalysisError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The detection policy active for this run
    pub fn policy(&self) -> DetectionPolicy {
        if self.use_velocity {
            DetectionPolicy::Velocity {
                v_start: self.v_start,
                v_stop: self.v_stop,
                hold_start_ms: self.hold_start_ms,
                hold_stop_ms: self.hold_stop_ms,
            }
        } else {
            DetectionPolicy::Margin {
                start_margin_px: self.start_margin_px,
                end_margin_px: self.end_margin_px,
            }
        }
    }

    /// Reject parameters that cannot describe a meaningful analysis
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let non_negative = [
            ("ideal_duration_s", self.ideal_duration_s),
            ("poswin_ms", self.poswin_ms),
            ("start_margin_px", self.start_margin_px),
            ("end_margin_px", self.end_margin_px),
            ("v_start", self.v_start),
            ("v_stop", self.v_stop),
            ("hold_start_ms", self.hold_start_ms),
            ("hold_stop_ms", self.hold_stop_ms),
            ("duplicate_time_tolerance_s", self.duplicate_time_tolerance_s),
        ];

        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(AnalysisError::InvalidConfig(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        if self.missing_marker.contains(',') || self.missing_marker.contains('\n') {
            return Err(AnalysisError::InvalidConfig(
                "missing_marker must not contain a delimiter or newline".to_string(),
            ));
        }

        if self.use_velocity && self.v_stop > self.v_start {
            warn!(
                v_start = self.v_start,
                v_stop = self.v_stop,
                "v_stop exceeds v_start; offset may be confirmed immediately after onset"
            );
        }

        Ok(())
    }
}
