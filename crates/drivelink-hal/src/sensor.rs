//! Sensor snapshots: the most recent decoded frame and telemetry map.
//!
//! Capture and decoding run on their own timeline; the control loop only
//! reads whatever snapshot is newest when it samples.  [`SensorCache`] is
//! the shared slot a capture task writes into and the loop reads from.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use drivelink_types::{Frame, Telemetry};
use tracing::warn;

/// A value together with the instant it was captured.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    pub value: T,
    pub captured_at: Instant,
}

impl<T> Stamped<T> {
    pub fn new(value: T, captured_at: Instant) -> Self {
        Self { value, captured_at }
    }

    /// `Some(value)` when captured no more than `max_age` before `now`.
    pub fn fresh(self, now: Instant, max_age: Duration) -> Option<T> {
        (now.saturating_duration_since(self.captured_at) <= max_age).then_some(self.value)
    }
}

/// Read side of the sensor pipeline.
pub trait SensorSource: Send + Sync {
    fn latest_frame(&self) -> Option<Stamped<Frame>>;
    fn latest_telemetry(&self) -> Option<Stamped<Telemetry>>;
}

#[derive(Default)]
struct Slots {
    frame: Option<Stamped<Frame>>,
    telemetry: Option<Stamped<Telemetry>>,
}

/// Latest-value cache shared between a capture task and the control loop.
///
/// Cloning is cheap; every clone refers to the same slots.
#[derive(Clone, Default)]
pub struct SensorCache {
    slots: Arc<RwLock<Slots>>,
}

impl SensorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish_frame(&self, frame: Frame, captured_at: Instant) {
        match self.slots.write() {
            Ok(mut slots) => slots.frame = Some(Stamped::new(frame, captured_at)),
            Err(_) => warn!("sensor cache lock poisoned; frame dropped"),
        }
    }

    pub fn publish_telemetry(&self, telemetry: Telemetry, captured_at: Instant) {
        match self.slots.write() {
            Ok(mut slots) => slots.telemetry = Some(Stamped::new(telemetry, captured_at)),
            Err(_) => warn!("sensor cache lock poisoned; telemetry dropped"),
        }
    }
}

impl SensorSource for SensorCache {
    fn latest_frame(&self) -> Option<Stamped<Frame>> {
        self.slots.read().ok()?.frame.clone()
    }

    fn latest_telemetry(&self) -> Option<Stamped<Telemetry>> {
        self.slots.read().ok()?.telemetry.clone()
    }
}

/// A source with no sensors attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSensors;

impl SensorSource for NoSensors {
    fn latest_frame(&self) -> Option<Stamped<Frame>> {
        None
    }

    fn latest_telemetry(&self) -> Option<Stamped<Telemetry>> {
        None
    }
}
