//! Movement onset/offset detection
//!
//! Two strategies, selected once per run through [`DetectionPolicy`]:
//! - Margin: fixed pixel distances from the initial position and from the
//!   target's final position
//! - Velocity: speed thresholds that must hold for a minimum dwell, driven by
//!   an explicit `Idle -> Moving -> Stopped` state machine

use crate::types::{DetectionPolicy, DetectionResult, MotionState, Sample, Trial};
use serde::Serialize;
use tracing::debug;

/// Smallest time step (seconds) for which a speed estimate is defined
pub const MIN_DT: f64 = 1e-9;

/// Pure detector over `(trial, policy)`
#[derive(Debug, Clone, Copy)]
pub struct EventDetector {
    policy: DetectionPolicy,
}

impl EventDetector {
    pub fn new(policy: DetectionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DetectionPolicy {
        self.policy
    }

    /// Find movement onset and offset in a trial
    pub fn detect(&self, trial: &Trial) -> DetectionResult {
        let result = detect(trial.samples(), &self.policy);
        debug!(
            trial = %trial.key(),
            mode = self.policy.as_str(),
            start_t = ?result.start_t,
            end_t = ?result.end_t,
            "detection finished"
        );
        result
    }
}

/// Run detection over time-ordered samples
pub fn detect(samples: &[Sample], policy: &DetectionPolicy) -> DetectionResult {
    match *policy {
        DetectionPolicy::Margin {
            start_margin_px,
            end_margin_px,
        } => detect_margin(samples, start_margin_px, end_margin_px),
        DetectionPolicy::Velocity {
            v_start,
            v_stop,
            hold_start_ms,
            hold_stop_ms,
        } => {
            let mut machine =
                VelocityStateMachine::new(v_start, v_stop, hold_start_ms, hold_stop_ms);
            for (sample, speed) in samples.iter().zip(speeds(samples)) {
                if machine.push(sample.t, speed).is_some() && machine.is_finished() {
                    break;
                }
            }
            machine.result()
        }
    }
}

/// Margin detection.
///
/// Offset is only searched from the onset sample onwards; the unconditional
/// first arrival within the end margin is kept as `target_reached_t`.
fn detect_margin(samples: &[Sample], start_margin_px: f64, end_margin_px: f64) -> DetectionResult {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return DetectionResult::default();
    };
    let origin = first.participant_y;
    let goal = last.target_y;
    let at_goal = |s: &Sample| (s.participant_y - goal).abs() <= end_margin_px;

    let target_reached_t = samples.iter().find(|s| at_goal(s)).map(|s| s.t);

    let start_idx = samples
        .iter()
        .position(|s| (s.participant_y - origin).abs() >= start_margin_px);

    let (start_t, end_t) = match start_idx {
        Some(i) => {
            let end_t = samples[i..].iter().find(|s| at_goal(s)).map(|s| s.t);
            (Some(samples[i].t), end_t)
        }
        None => (None, None),
    };

    DetectionResult {
        target_reached_t,
        ..DetectionResult::new(start_t, end_t)
    }
}

/// Instantaneous speed at each sample from the preceding one.
///
/// The first sample, and any step shorter than [`MIN_DT`], has no speed.
pub fn speeds(samples: &[Sample]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(samples.len());
    if samples.is_empty() {
        return out;
    }
    out.push(None);
    out.extend(samples.windows(2).map(|pair| {
        let dt = pair[1].t - pair[0].t;
        if dt < MIN_DT {
            None
        } else {
            Some((pair[1].participant_y - pair[0].participant_y).abs() / dt)
        }
    }));
    out
}

/// Tracks how long a condition has held continuously.
///
/// Armed at the first sample where the condition becomes true, cleared on
/// any sample where it is false.
#[derive(Debug, Clone, Copy)]
pub struct HoldTimer {
    hold_s: f64,
    armed_at: Option<f64>,
}

impl HoldTimer {
    pub fn new(hold_ms: f64) -> Self {
        Self {
            hold_s: hold_ms / 1000.0,
            armed_at: None,
        }
    }

    /// Feed one sample; returns the arming time once the hold is satisfied
    pub fn update(&mut self, t: f64, condition: bool) -> Option<f64> {
        if !condition {
            self.armed_at = None;
            return None;
        }
        let armed_at = *self.armed_at.get_or_insert(t);
        (t - armed_at >= self.hold_s).then_some(armed_at)
    }

    pub fn armed_at(&self) -> Option<f64> {
        self.armed_at
    }
}

/// A confirmed state change of the velocity detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StateTransition {
    pub from: MotionState,
    pub to: MotionState,
    /// Time the threshold was first crossed
    pub event_t: f64,
    /// Time the dwell was satisfied
    pub confirmed_t: f64,
}

/// Three-state velocity+dwell detector
#[derive(Debug, Clone)]
pub struct VelocityStateMachine {
    v_start: f64,
    v_stop: f64,
    state: MotionState,
    start_timer: HoldTimer,
    stop_timer: HoldTimer,
    start_t: Option<f64>,
    end_t: Option<f64>,
    transitions: Vec<StateTransition>,
}

impl VelocityStateMachine {
    pub fn new(v_start: f64, v_stop: f64, hold_start_ms: f64, hold_stop_ms: f64) -> Self {
        Self {
            v_start,
            v_stop,
            state: MotionState::Idle,
            start_timer: HoldTimer::new(hold_start_ms),
            stop_timer: HoldTimer::new(hold_stop_ms),
            start_t: None,
            end_t: None,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == MotionState::Stopped
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    /// Feed one sample. Samples without a defined speed leave the timers as is.
    pub fn push(&mut self, t: f64, speed: Option<f64>) -> Option<StateTransition> {
        let speed = speed?;

        let (timer, condition, next) = match self.state {
            MotionState::Idle => (&mut self.start_timer, speed >= self.v_start, MotionState::Moving),
            MotionState::Moving => (&mut self.stop_timer, speed <= self.v_stop, MotionState::Stopped),
            MotionState::Stopped => return None,
        };

        let event_t = timer.update(t, condition)?;
        match next {
            MotionState::Moving => self.start_t = Some(event_t),
            _ => self.end_t = Some(event_t),
        }

        let transition = StateTransition {
            from: self.state,
            to: next,
            event_t,
            confirmed_t: t,
        };
        self.state = next;
        self.transitions.push(transition);
        Some(transition)
    }

    pub fn result(&self) -> DetectionResult {
        DetectionResult::new(self.start_t, self.end_t)
    }
}
