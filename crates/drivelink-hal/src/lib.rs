//! `drivelink-hal` – Collaborator contracts
//!
//! The control loop talks to the outside world only through the traits in
//! this crate:
//!
//! - [`input`] – [`InputSource`][input::InputSource] yields one
//!   [`InputSample`][input::InputSample] per tick.
//! - [`joystick`] – [`JoystickMapper`][joystick::JoystickMapper] turns raw
//!   controller readings into samples (trigger axes, gear button edges).
//! - [`keyboard`] – [`KeyboardAxes`][keyboard::KeyboardAxes] integrates held
//!   arrow keys into analogue axes.
//! - [`vehicle`] – [`VehicleSink`][vehicle::VehicleSink] receives the final
//!   committed command each tick.
//! - [`sensor`] – [`SensorSource`][sensor::SensorSource] exposes the newest
//!   frame and telemetry snapshots; [`SensorCache`][sensor::SensorCache] is
//!   the shared slot capture tasks write into.
//! - [`sim`] – simulated drivers for tests and headless runs.

pub mod input;
pub mod joystick;
pub mod keyboard;
pub mod sensor;
pub mod sim;
pub mod vehicle;

pub use input::{InputSample, InputSource};
pub use joystick::{JoystickDevice, JoystickInput, JoystickLayout, JoystickMapper, JoystickReading};
pub use keyboard::{KeyRates, KeySource, KeyState, KeyboardAxes, KeyboardInput};
pub use sensor::{NoSensors, SensorCache, SensorSource, Stamped};
pub use sim::{ScriptedInput, SimVehicle, VehicleCommand, WaveInput};
pub use vehicle::VehicleSink;
