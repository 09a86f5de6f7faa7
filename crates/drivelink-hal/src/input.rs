//! Generic `InputSource` trait for anything that produces operator commands
//! once per tick (joystick, keyboard, scripted playback).
//!
//! The control loop only ever talks to this trait, so devices can be swapped
//! without touching the arbitration logic.

use drivelink_types::{DriveError, RawCommands};

/// One raw operator sample.
///
/// Axes are normalised to `[-1, 1]`.  `linear` is positive for forward
/// motion and negative for reverse.  The gear flags are *edges*: `true` only
/// on the tick the button went down.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputSample {
    pub steering: f64,
    pub linear: f64,
    pub gear_up: bool,
    pub gear_down: bool,
}

impl InputSample {
    pub fn new(steering: f64, linear: f64) -> Self {
        Self {
            steering,
            linear,
            ..Self::default()
        }
    }

    /// Reject non-finite axes and pull finite ones into `[-1, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Input`] when either axis is NaN or infinite.
    pub fn validate(self) -> Result<Self, DriveError> {
        if !self.steering.is_finite() {
            return Err(DriveError::Input(format!(
                "steering axis is not finite: {}",
                self.steering
            )));
        }
        if !self.linear.is_finite() {
            return Err(DriveError::Input(format!(
                "linear axis is not finite: {}",
                self.linear
            )));
        }
        Ok(Self {
            steering: self.steering.clamp(-1.0, 1.0),
            linear: self.linear.clamp(-1.0, 1.0),
            ..self
        })
    }

    pub fn commands(&self) -> RawCommands {
        RawCommands {
            steering: self.steering,
            linear: self.linear,
        }
    }
}

/// A device that yields one [`InputSample`] per control tick.
pub trait InputSource: Send {
    /// Human-readable device name used in logs.
    fn name(&self) -> &str;

    /// Read the current sample.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Input`] if the device cannot be read.  The
    /// control loop skips the tick and keeps the last committed state.
    fn sample(&mut self) -> Result<InputSample, DriveError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_clamps_finite_axes() {
        let sample = InputSample::new(-1.7, 2.0).validate().unwrap();
        assert_eq!(sample.steering, -1.0);
        assert_eq!(sample.linear, 1.0);
    }

    #[test]
    fn validate_rejects_nan() {
        let err = InputSample::new(f64::NAN, 0.0).validate().unwrap_err();
        assert!(matches!(err, DriveError::Input(_)));
        let err = InputSample::new(0.0, f64::INFINITY).validate().unwrap_err();
        assert!(matches!(err, DriveError::Input(_)));
    }

    #[test]
    fn validate_keeps_gear_edges() {
        let sample = InputSample {
            gear_down: true,
            ..InputSample::new(0.1, 0.2)
        }
        .validate()
        .unwrap();
        assert!(sample.gear_down);
        assert!(!sample.gear_up);
        assert_eq!(
            sample.commands(),
            RawCommands {
                steering: 0.1,
                linear: 0.2
            }
        );
    }
}
