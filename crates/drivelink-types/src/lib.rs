//! `drivelink-types` – shared value types for the drivelink control stack.
//!
//! Everything that crosses a crate boundary lives here: the vehicle
//! [`ControlState`], the per-tick [`ControlDelta`], the predictor's
//! [`Prediction`] and the [`Observation`] shipped to it, plus the bus
//! [`Event`] envelope and the workspace-wide [`DriveError`].

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Gear
// ─────────────────────────────────────────────────────────────────────────────

/// Drive direction of the vehicle.
///
/// Serialised as the vendor integer encoding (`-1`, `0`, `1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Gear {
    Reverse,
    #[default]
    Neutral,
    Forward,
}

impl Gear {
    /// Integer encoding used by the vehicle SDK.
    pub fn as_i8(self) -> i8 {
        match self {
            Gear::Reverse => -1,
            Gear::Neutral => 0,
            Gear::Forward => 1,
        }
    }

    /// Direction of travel as a float multiplier.
    pub fn sign(self) -> f64 {
        f64::from(self.as_i8())
    }

    /// Gear matching the sign of `value`; zero maps to [`Gear::Neutral`].
    pub fn from_sign(value: f64) -> Self {
        if value > 0.0 {
            Gear::Forward
        } else if value < 0.0 {
            Gear::Reverse
        } else {
            Gear::Neutral
        }
    }

    pub fn is_neutral(self) -> bool {
        self == Gear::Neutral
    }
}

impl TryFrom<i8> for Gear {
    type Error = DriveError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Gear::Reverse),
            0 => Ok(Gear::Neutral),
            1 => Ok(Gear::Forward),
            other => Err(DriveError::PredictionDecode(format!(
                "gear must be one of -1, 0, 1 (got {other})"
            ))),
        }
    }
}

impl From<Gear> for i8 {
    fn from(gear: Gear) -> Self {
        gear.as_i8()
    }
}

impl fmt::Display for Gear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i8())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Control state
// ─────────────────────────────────────────────────────────────────────────────

/// Clamp `value` into `[-1, 1]`.
pub fn clamp_steering(value: f64) -> f64 {
    value.clamp(-1.0, 1.0)
}

/// Clamp `value` into `[0, 1]`.
pub fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// The vehicle's committed actuation values plus the raw command history the
/// next delta is computed against.
///
/// Owned by the control loop and mutated once per tick.  Every mutator keeps
/// `steering` in `[-1, 1]` and `throttle`/`braking` in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlState {
    pub steering: f64,
    pub throttle: f64,
    pub braking: f64,
    pub gear: Gear,
    /// Last committed raw steering input.
    pub steering_command: f64,
    /// Last committed raw linear input.
    pub linear_command: f64,
}

impl ControlState {
    /// Replace steering with an absolute value.
    pub fn set_steering(&mut self, value: f64) {
        self.steering = clamp_steering(value);
    }

    /// Move steering by `delta`.  A zero delta leaves steering untouched.
    pub fn nudge_steering(&mut self, delta: f64) {
        if delta != 0.0 {
            self.steering = clamp_steering(self.steering + delta);
        }
    }

    pub fn nudge_throttle(&mut self, delta: f64) {
        if delta != 0.0 {
            self.throttle = clamp_unit(self.throttle + delta);
        }
    }

    pub fn nudge_braking(&mut self, delta: f64) {
        if delta != 0.0 {
            self.braking = clamp_unit(self.braking + delta);
        }
    }

    /// Re-establish the range invariants after a multi-field mutation.
    ///
    /// In neutral the vehicle is neither accelerating nor reversing, so the
    /// throttle is forced to zero.
    pub fn settle(&mut self) {
        self.steering = clamp_steering(self.steering);
        self.throttle = clamp_unit(self.throttle);
        self.braking = clamp_unit(self.braking);
        if self.gear.is_neutral() {
            self.throttle = 0.0;
        }
    }

    /// `true` when every actuation value lies in its closed range.
    pub fn is_within_limits(&self) -> bool {
        (-1.0..=1.0).contains(&self.steering)
            && (0.0..=1.0).contains(&self.throttle)
            && (0.0..=1.0).contains(&self.braking)
    }
}

/// Requested change to the control channels for one tick.
///
/// Produced by the delta computer whether or not it is applied locally; the
/// same value is what gets shipped to the predictor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlDelta {
    pub d_steering: f64,
    pub d_throttle: f64,
    pub d_braking: f64,
    /// Gear change in steps (`new - old`).
    pub d_gear: i8,
}

impl ControlDelta {
    pub fn is_zero(&self) -> bool {
        self.d_steering == 0.0 && self.d_throttle == 0.0 && self.d_braking == 0.0 && self.d_gear == 0
    }
}

/// The raw input values of the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RawCommands {
    pub steering: f64,
    pub linear: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Prediction
// ─────────────────────────────────────────────────────────────────────────────

/// How a [`Prediction`] is merged into the [`ControlState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// The human input replaces the absolute command.
    Supervisor,
    /// Absolute steering from the model; throttle and gear follow local input.
    Steer,
    /// Steering nudged by the model; throttle and gear follow local input.
    SteerDiff,
    /// Steering and throttle nudged by the model, gear replaced outright.
    FullDiff,
}

impl UpdateMode {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateMode::Supervisor => "supervisor",
            UpdateMode::Steer => "steer",
            UpdateMode::SteerDiff => "steer_diff",
            UpdateMode::FullDiff => "full_diff",
        }
    }
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote model's answer to one [`Observation`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub mode: UpdateMode,
    pub d_steering: f64,
    pub d_throttle: f64,
    pub d_braking: f64,
    /// Absolute gear requested by the model.
    pub d_gear: Gear,
    /// Model confidence for the steering output.  Display only.
    pub confidence_steering: Option<f64>,
    /// Sequence number of the observation this answers, when echoed.
    pub seq: Option<u64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Observation
// ─────────────────────────────────────────────────────────────────────────────

/// A decoded camera frame.  Pixel data is shared, never copied per tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Bytes per pixel (3 for RGB24).
    pub channels: u8,
    pub data: Arc<[u8]>,
}

impl Frame {
    pub fn new(width: u32, height: u32, channels: u8, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            channels,
            data: data.into(),
        }
    }

    /// Number of bytes the geometry calls for, or `None` if that does not
    /// fit in `usize`.
    pub fn expected_len(&self) -> Option<usize> {
        usize::try_from(self.width)
            .ok()?
            .checked_mul(usize::try_from(self.height).ok()?)?
            .checked_mul(usize::from(self.channels))
    }
}

/// Telemetry key carrying the battery voltage in millivolts.
pub const BATTERY_KEY: &str = "b";

/// Vehicle telemetry snapshot as reported by the vendor link.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Telemetry(pub serde_json::Map<String, serde_json::Value>);

impl Telemetry {
    pub fn new(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }

    /// Battery voltage in millivolts, if reported.  Fractional readings
    /// are rounded.
    pub fn battery_mv(&self) -> Option<i64> {
        let value = self.0.get(BATTERY_KEY)?;
        value.as_i64().or_else(|| {
            value
                .as_f64()
                .filter(|mv| mv.is_finite() && mv.abs() < i64::MAX as f64)
                .map(|mv| mv.round() as i64)
        })
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }
}

/// The unit sent to the predictor each override tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Observation {
    pub frame: Option<Frame>,
    pub telemetry: Option<Telemetry>,
    pub delta: ControlDelta,
}

// ─────────────────────────────────────────────────────────────────────────────
// Bus events
// ─────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the in-process event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"drivelink-runtime::control_loop"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Per-tick record for the recording stream and any dashboards.
    ControlSnapshot(ControlSnapshot),
    /// A recovered failure inside a tick.
    Fault { component: String, message: String },
    /// Predictor liveness transition.
    PredictorHealth { healthy: bool },
}

/// What the control loop committed on one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSnapshot {
    pub tick: u64,
    pub state: ControlState,
    pub delta: ControlDelta,
    pub raw: RawCommands,
    /// Mode of the prediction merged this tick, if any.
    pub applied_mode: Option<UpdateMode>,
    /// `true` when override was active but no prediction arrived.
    pub coasted: bool,
    pub confidence_steering: Option<f64>,
    pub battery_mv: Option<i64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Workspace error type.  Every variant is recoverable at the tick boundary.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DriveError {
    #[error("Input sampling failed: {0}")]
    Input(String),

    #[error("Prediction timed out after {timeout_ms} ms")]
    PredictionTimeout { timeout_ms: u64 },

    #[error("Prediction decode error: {0}")]
    PredictionDecode(String),

    #[error("Vehicle command failed: {0}")]
    VehicleSink(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Prediction request {seq} is still outstanding")]
    RequestInFlight { seq: u64 },

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
