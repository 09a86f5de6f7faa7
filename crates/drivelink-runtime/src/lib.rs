//! `drivelink-runtime` – Orchestration
//!
//! Wires the kernel's arithmetic to the collaborators in `drivelink-hal`
//! and the predictor protocol in `drivelink-middleware`.
//!
//! # Modules
//!
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]:
//!   the per-tick state machine (sample, compute, predict, apply) and its
//!   [`ControlLoopConfig`][control_loop::ControlLoopConfig].  It is the
//!   single writer of the vehicle's control state.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   installs the global `tracing` subscriber with optional JSON output and
//!   OTLP span export.

pub mod control_loop;
pub mod telemetry;

pub use control_loop::{
    ControlLoop, ControlLoopConfig, LoopPhase, ShutdownHandle, TickOutcome,
};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
