//! Joystick support: raw axis/button readings mapped onto [`InputSample`]s.
//!
//! Device polling itself lives outside this crate; a driver only has to
//! implement [`JoystickDevice`] and return a [`JoystickReading`] snapshot.
//! [`JoystickMapper`] owns the layout (which axis steers, which buttons
//! shift) plus the button history needed for edge detection.
//!
//! # Trigger axes
//!
//! Analogue triggers rest at `-1.0` and travel to `+1.0` when fully pressed.
//! With `throttle_trigger` enabled the throttle axis is rescaled to
//! `(a + 1) / 2`, giving `0.0` at rest.  An optional `reverse_axis` is
//! rescaled the same way and subtracted, so two triggers cover both
//! directions of the linear command.

use drivelink_types::DriveError;

use crate::input::{InputSample, InputSource};

/// Snapshot of every axis and button on a controller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoystickReading {
    pub axes: Vec<f64>,
    pub buttons: Vec<bool>,
}

/// A controller driver that can be polled for its current reading.
pub trait JoystickDevice: Send {
    fn name(&self) -> &str;

    /// # Errors
    ///
    /// Returns [`DriveError::Input`] if the controller is disconnected.
    fn read(&mut self) -> Result<JoystickReading, DriveError>;
}

/// Which controls drive which command.
#[derive(Debug, Clone, PartialEq)]
pub struct JoystickLayout {
    pub steering_axis: usize,
    pub throttle_axis: usize,
    pub reverse_axis: Option<usize>,
    pub throttle_trigger: bool,
    pub invert_steering: bool,
    pub gear_up_button: usize,
    pub gear_down_button: usize,
}

impl Default for JoystickLayout {
    fn default() -> Self {
        Self {
            steering_axis: 0,
            throttle_axis: 5,
            reverse_axis: None,
            throttle_trigger: true,
            invert_steering: false,
            gear_up_button: 3,
            gear_down_button: 2,
        }
    }
}

/// Maps [`JoystickReading`]s onto [`InputSample`]s.
#[derive(Debug, Clone, Default)]
pub struct JoystickMapper {
    layout: JoystickLayout,
    gear_up_held: bool,
    gear_down_held: bool,
}

fn trigger(value: f64) -> f64 {
    (value + 1.0) / 2.0
}

impl JoystickMapper {
    pub fn new(layout: JoystickLayout) -> Self {
        Self {
            layout,
            gear_up_held: false,
            gear_down_held: false,
        }
    }

    pub fn layout(&self) -> &JoystickLayout {
        &self.layout
    }

    /// Translate one reading.  Gear flags are set only on the press edge.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Input`] when the reading lacks a mapped axis.
    pub fn map(&mut self, reading: &JoystickReading) -> Result<InputSample, DriveError> {
        let axis = |index: usize| {
            reading.axes.get(index).copied().ok_or_else(|| {
                DriveError::Input(format!(
                    "axis {index} missing (controller reports {})",
                    reading.axes.len()
                ))
            })
        };

        let mut steering = axis(self.layout.steering_axis)?;
        if self.layout.invert_steering {
            steering = -steering;
        }

        let throttle = axis(self.layout.throttle_axis)?;
        let mut linear = if self.layout.throttle_trigger {
            trigger(throttle)
        } else {
            throttle
        };
        if let Some(index) = self.layout.reverse_axis {
            linear -= trigger(axis(index)?);
        }

        let button = |index: usize| reading.buttons.get(index).copied().unwrap_or(false);
        let up = button(self.layout.gear_up_button);
        let down = button(self.layout.gear_down_button);
        let sample = InputSample {
            steering,
            linear,
            gear_up: up && !self.gear_up_held,
            gear_down: down && !self.gear_down_held,
        };
        self.gear_up_held = up;
        self.gear_down_held = down;

        sample.validate()
    }
}

/// [`InputSource`] adapter for a [`JoystickDevice`].
pub struct JoystickInput<D> {
    device: D,
    mapper: JoystickMapper,
}

impl<D: JoystickDevice> JoystickInput<D> {
    pub fn new(device: D, layout: JoystickLayout) -> Self {
        Self {
            device,
            mapper: JoystickMapper::new(layout),
        }
    }
}

impl<D: JoystickDevice> InputSource for JoystickInput<D> {
    fn name(&self) -> &str {
        self.device.name()
    }

    fn sample(&mut self) -> Result<InputSample, DriveError> {
        let reading = self.device.read()?;
        self.mapper.map(&reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(steering: f64, throttle: f64, up: bool, down: bool) -> JoystickReading {
        let mut axes = vec![0.0; 6];
        axes[0] = steering;
        axes[5] = throttle;
        let mut buttons = vec![false; 4];
        buttons[3] = up;
        buttons[2] = down;
        JoystickReading { axes, buttons }
    }

    #[test]
    fn trigger_at_rest_is_zero() {
        let mut mapper = JoystickMapper::default();
        let sample = mapper.map(&reading(0.25, -1.0, false, false)).unwrap();
        assert_eq!(sample.steering, 0.25);
        assert_eq!(sample.linear, 0.0);
    }

    #[test]
    fn trigger_fully_pressed_is_one() {
        let mut mapper = JoystickMapper::default();
        let sample = mapper.map(&reading(0.0, 1.0, false, false)).unwrap();
        assert_eq!(sample.linear, 1.0);
    }

    #[test]
    fn reverse_trigger_subtracts() {
        let mut mapper = JoystickMapper::new(JoystickLayout {
            reverse_axis: Some(2),
            ..JoystickLayout::default()
        });
        let mut r = reading(0.0, -1.0, false, false);
        r.axes[2] = 0.0;
        let sample = mapper.map(&r).unwrap();
        assert_eq!(sample.linear, -0.5);
    }

    #[test]
    fn gear_buttons_fire_on_press_edge_only() {
        let mut mapper = JoystickMapper::default();
        let first = mapper.map(&reading(0.0, -1.0, true, false)).unwrap();
        assert!(first.gear_up);
        let held = mapper.map(&reading(0.0, -1.0, true, false)).unwrap();
        assert!(!held.gear_up);
        mapper.map(&reading(0.0, -1.0, false, false)).unwrap();
        let again = mapper.map(&reading(0.0, -1.0, true, true)).unwrap();
        assert!(again.gear_up);
        assert!(again.gear_down);
    }

    #[test]
    fn missing_axis_is_input_error() {
        let mut mapper = JoystickMapper::default();
        let err = mapper
            .map(&JoystickReading {
                axes: vec![0.0, 0.0],
                buttons: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, DriveError::Input(_)));
    }

    #[test]
    fn inverted_steering() {
        let mut mapper = JoystickMapper::new(JoystickLayout {
            invert_steering: true,
            ..JoystickLayout::default()
        });
        let sample = mapper.map(&reading(0.4, -1.0, false, false)).unwrap();
        assert_eq!(sample.steering, -0.4);
    }

    struct FixedPad(JoystickReading);

    impl JoystickDevice for FixedPad {
        fn name(&self) -> &str {
            "fixed_pad"
        }

        fn read(&mut self) -> Result<JoystickReading, DriveError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn joystick_input_adapts_device() {
        let mut input = JoystickInput::new(
            FixedPad(reading(-0.5, 0.6, false, false)),
            JoystickLayout::default(),
        );
        assert_eq!(input.name(), "fixed_pad");
        let sample = input.sample().unwrap();
        assert_eq!(sample.steering, -0.5);
        assert!((sample.linear - 0.8).abs() < 1e-12);
    }
}
