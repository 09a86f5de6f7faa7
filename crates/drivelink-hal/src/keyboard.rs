//! Keyboard driving: boolean arrow keys turned into analogue axes.
//!
//! Keys cannot express "how far", so [`KeyboardAxes`] integrates them over
//! time.  Holding a key ramps its axis at a fixed rate per second; releasing
//! it lets the axis decay back to zero.  The resulting axes feed the same
//! delta computation as a joystick.

use std::time::Duration;

use drivelink_types::DriveError;

use crate::input::{InputSample, InputSource};

/// Which keys are currently held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub gear_up: bool,
    pub gear_down: bool,
}

/// Axis change rates, in units per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyRates {
    pub steering: f64,
    pub steering_decay: f64,
    pub acceleration: f64,
    pub decay: f64,
    pub braking: f64,
}

impl Default for KeyRates {
    fn default() -> Self {
        Self {
            steering: 5.0,
            steering_decay: 3.0,
            acceleration: 5.0,
            decay: 2.0,
            braking: 5.0,
        }
    }
}

/// Below this magnitude a decaying axis snaps to zero.
const REST_BAND: f64 = 0.01;

/// Move `value` toward zero by `step` without overshooting.
fn decay(value: f64, step: f64) -> f64 {
    if value > REST_BAND {
        (value - step).max(0.0)
    } else if value < -REST_BAND {
        (value + step).min(0.0)
    } else {
        0.0
    }
}

/// Integrates [`KeyState`]s into steering and linear axes.
#[derive(Debug, Clone, Default)]
pub struct KeyboardAxes {
    rates: KeyRates,
    steering: f64,
    linear: f64,
    gear_up_held: bool,
    gear_down_held: bool,
}

impl KeyboardAxes {
    pub fn new(rates: KeyRates) -> Self {
        Self {
            rates,
            ..Self::default()
        }
    }

    pub fn axes(&self) -> (f64, f64) {
        (self.steering, self.linear)
    }

    /// Advance the axes by `dt` with `keys` held and return the sample.
    pub fn update(&mut self, keys: KeyState, dt: Duration) -> InputSample {
        let dt = dt.as_secs_f64();
        let r = self.rates;

        self.steering = match (keys.left, keys.right) {
            (true, false) => (self.steering - dt * r.steering).max(-1.0),
            (false, true) => (self.steering + dt * r.steering).min(1.0),
            _ => decay(self.steering, dt * r.steering_decay),
        };

        self.linear = match (keys.up, keys.down) {
            (true, false) if self.linear < 0.0 => (self.linear + dt * r.braking).min(0.0),
            (true, false) => (self.linear + dt * r.acceleration).min(1.0),
            (false, true) if self.linear > 0.0 => (self.linear - dt * r.braking).max(0.0),
            (false, true) => (self.linear - dt * r.acceleration).max(-1.0),
            _ => decay(self.linear, dt * r.decay),
        };

        let sample = InputSample {
            steering: self.steering,
            linear: self.linear,
            gear_up: keys.gear_up && !self.gear_up_held,
            gear_down: keys.gear_down && !self.gear_down_held,
        };
        self.gear_up_held = keys.gear_up;
        self.gear_down_held = keys.gear_down;
        sample
    }
}

/// Anything that can report the currently held keys.
pub trait KeySource: Send {
    fn name(&self) -> &str;

    /// # Errors
    ///
    /// Returns [`DriveError::Input`] if the keyboard cannot be read.
    fn keys(&mut self) -> Result<KeyState, DriveError>;
}

/// [`InputSource`] adapter that integrates a [`KeySource`] at a fixed tick
/// interval.
pub struct KeyboardInput<K> {
    keys: K,
    axes: KeyboardAxes,
    tick: Duration,
}

impl<K: KeySource> KeyboardInput<K> {
    pub fn new(keys: K, rates: KeyRates, tick: Duration) -> Self {
        Self {
            keys,
            axes: KeyboardAxes::new(rates),
            tick,
        }
    }
}

impl<K: KeySource> InputSource for KeyboardInput<K> {
    fn name(&self) -> &str {
        self.keys.name()
    }

    fn sample(&mut self) -> Result<InputSample, DriveError> {
        let keys = self.keys.keys()?;
        self.axes.update(keys, self.tick).validate()
    }
}
