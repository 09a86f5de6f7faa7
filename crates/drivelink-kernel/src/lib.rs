//! `drivelink-kernel` – Control arithmetic & arbitration
//!
//! The pure, synchronous heart of drivelink.  Nothing here performs I/O;
//! every function takes the current [`ControlState`][drivelink_types::ControlState]
//! and mutates it deterministically so the rules can be tested without a
//! vehicle or a predictor.
//!
//! # Modules
//!
//! - [`delta`] – [`DeltaComputer`][delta::DeltaComputer]:
//!   turns raw operator commands into a per-tick
//!   [`ControlDelta`][drivelink_types::ControlDelta] and, when no predictor
//!   holds override, commits it (gear selection, throttle magnitude,
//!   steering accumulation).
//! - [`arbiter`] – [`OverridePolicy`][arbiter::OverridePolicy]:
//!   merges a remote [`Prediction`][drivelink_types::Prediction] into the
//!   state according to its update mode, or coasts when none arrived.
//! - [`watchdog`] – [`PredictorWatchdog`][watchdog::PredictorWatchdog]:
//!   tracks how long the predictor has been silent and reports health
//!   transitions once each.

pub mod arbiter;
pub mod delta;
pub mod watchdog;

pub use arbiter::{Arbitration, OverridePolicy};
pub use delta::{DeltaComputer, GearShift, LinearEdge};
pub use watchdog::{ComponentHealth, PredictorWatchdog};
