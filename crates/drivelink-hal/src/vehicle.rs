//! Generic `VehicleSink` trait for the vendor vehicle link.
//!
//! The control loop calls [`VehicleSink::update_control`] exactly once per
//! tick with the final committed state.  Drivers wrap whatever SDK session
//! the car speaks; the rest of drivelink only ever sees this trait.

use async_trait::async_trait;
use drivelink_types::{ControlState, DriveError, Gear};

/// Receives final actuation commands.
#[async_trait]
pub trait VehicleSink: Send + Sync {
    /// Stable identifier for this sink, e.g. `"rc_car"`.
    fn id(&self) -> &str;

    /// Push one actuation command to the vehicle.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::VehicleSink`] if the command could not be
    /// delivered.  The loop logs it and sends fresh state next tick.
    async fn update_control(
        &self,
        gear: Gear,
        steering: f64,
        throttle: f64,
        braking: f64,
    ) -> Result<(), DriveError>;

    /// Convenience wrapper that unpacks a [`ControlState`].
    async fn apply(&self, state: &ControlState) -> Result<(), DriveError> {
        self.update_control(state.gear, state.steering, state.throttle, state.braking)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Minimal in-process sink used only for tests.
    #[derive(Default)]
    struct MockSink {
        last: Mutex<Option<(Gear, f64, f64, f64)>>,
    }

    #[async_trait]
    impl VehicleSink for MockSink {
        fn id(&self) -> &str {
            "mock"
        }

        async fn update_control(
            &self,
            gear: Gear,
            steering: f64,
            throttle: f64,
            braking: f64,
        ) -> Result<(), DriveError> {
            *self.last.lock().unwrap() = Some((gear, steering, throttle, braking));
            Ok(())
        }
    }

    #[tokio::test]
    async fn apply_unpacks_state() {
        let sink = MockSink::default();
        let state = ControlState {
            steering: -0.3,
            throttle: 0.6,
            braking: 0.1,
            gear: Gear::Reverse,
            ..ControlState::default()
        };
        sink.apply(&state).await.unwrap();
        assert_eq!(
            *sink.last.lock().unwrap(),
            Some((Gear::Reverse, -0.3, 0.6, 0.1))
        );
    }
}
