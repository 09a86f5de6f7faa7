//! In-process simulated drivers for tests and headless runs.
//!
//! [`SimVehicle`] records every command it receives and can be told to fail
//! the next N calls.  [`ScriptedInput`] replays a fixed list of samples and
//! [`WaveInput`] produces a smooth sinusoidal drive for demos.
//!
//! # Example
//!
//! ```rust
//! use drivelink_hal::sim::{ScriptedInput, SimVehicle};
//! use drivelink_hal::input::{InputSample, InputSource};
//!
//! let mut input = ScriptedInput::new(vec![InputSample::new(-0.5, 0.8)]);
//! assert_eq!(input.sample().unwrap().linear, 0.8);
//!
//! let car = SimVehicle::new("sim_car");
//! assert!(car.commands().is_empty());
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use drivelink_types::{DriveError, Frame, Gear};

use crate::input::{InputSample, InputSource};
use crate::vehicle::VehicleSink;

// ────────────────────────────────────────────────────────────────────────────
// Simulated vehicle
// ────────────────────────────────────────────────────────────────────────────

/// One command as received by [`SimVehicle`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleCommand {
    pub gear: Gear,
    pub steering: f64,
    pub throttle: f64,
    pub braking: f64,
}

#[derive(Default)]
struct SimVehicleInner {
    commands: Mutex<Vec<VehicleCommand>>,
    failures_left: AtomicUsize,
}

/// A vehicle that records commands.  Clones share the same log.
#[derive(Clone)]
pub struct SimVehicle {
    id: String,
    inner: Arc<SimVehicleInner>,
}

impl SimVehicle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inner: Arc::new(SimVehicleInner::default()),
        }
    }

    /// Fail the next `count` calls with [`DriveError::VehicleSink`].
    pub fn fail_next(&self, count: usize) {
        self.inner.failures_left.store(count, Ordering::SeqCst);
    }

    /// Every command delivered so far, oldest first.
    pub fn commands(&self) -> Vec<VehicleCommand> {
        self.inner
            .commands
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn last_command(&self) -> Option<VehicleCommand> {
        self.inner.commands.lock().ok()?.last().copied()
    }
}

#[async_trait]
impl VehicleSink for SimVehicle {
    fn id(&self) -> &str {
        &self.id
    }

    async fn update_control(
        &self,
        gear: Gear,
        steering: f64,
        throttle: f64,
        braking: f64,
    ) -> Result<(), DriveError> {
        let failing = self
            .inner
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DriveError::VehicleSink(format!(
                "{}: simulated link failure",
                self.id
            )));
        }
        let mut commands = self
            .inner
            .commands
            .lock()
            .map_err(|_| DriveError::VehicleSink("command log poisoned".into()))?;
        commands.push(VehicleCommand {
            gear,
            steering,
            throttle,
            braking,
        });
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Scripted input
// ────────────────────────────────────────────────────────────────────────────

/// Replays queued samples; once exhausted, repeats the last good one.
#[derive(Default)]
pub struct ScriptedInput {
    script: VecDeque<Result<InputSample, DriveError>>,
    last: InputSample,
}

impl ScriptedInput {
    pub fn new(samples: Vec<InputSample>) -> Self {
        Self {
            script: samples.into_iter().map(Ok).collect(),
            last: InputSample::default(),
        }
    }

    /// Queue a sampling failure.
    pub fn push_error(&mut self, message: impl Into<String>) {
        self.script.push_back(Err(DriveError::Input(message.into())));
    }

    pub fn push(&mut self, sample: InputSample) {
        self.script.push_back(Ok(sample));
    }
}

impl InputSource for ScriptedInput {
    fn name(&self) -> &str {
        "scripted"
    }

    fn sample(&mut self) -> Result<InputSample, DriveError> {
        match self.script.pop_front() {
            Some(Ok(sample)) => {
                self.last = sample;
                sample.validate()
            }
            Some(Err(e)) => Err(e),
            None => Ok(InputSample {
                gear_up: false,
                gear_down: false,
                ..self.last
            }),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Wave input
// ────────────────────────────────────────────────────────────────────────────

/// Slow sinusoidal steering with a gentle forward throttle.
pub struct WaveInput {
    tick: Duration,
    elapsed: Duration,
    period: Duration,
}

impl WaveInput {
    pub fn new(tick: Duration, period: Duration) -> Self {
        Self {
            tick,
            elapsed: Duration::ZERO,
            period,
        }
    }
}

impl InputSource for WaveInput {
    fn name(&self) -> &str {
        "wave"
    }

    fn sample(&mut self) -> Result<InputSample, DriveError> {
        let phase = if self.period.is_zero() {
            0.0
        } else {
            self.elapsed.as_secs_f64() / self.period.as_secs_f64() * std::f64::consts::TAU
        };
        self.elapsed += self.tick;
        Ok(InputSample::new(0.6 * phase.sin(), 0.3 + 0.2 * phase.cos()))
    }
}

/// A greyscale gradient frame whose pattern shifts with `tick`.
pub fn synthetic_frame(width: u32, height: u32, tick: u64) -> Frame {
    let data: Vec<u8> = (0..width * height)
        .map(|i| ((u64::from(i) + tick) % 256) as u8)
        .collect();
    Frame::new(width, height, 1, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sim_vehicle_records_commands() {
        let car = SimVehicle::new("sim_car");
        let observer = car.clone();
        car.update_control(Gear::Forward, 0.1, 0.2, 0.0).await.unwrap();
        assert_eq!(observer.commands().len(), 1);
        assert_eq!(
            observer.last_command(),
            Some(VehicleCommand {
                gear: Gear::Forward,
                steering: 0.1,
                throttle: 0.2,
                braking: 0.0
            })
        );
    }

    #[tokio::test]
    async fn sim_vehicle_injected_failures() {
        let car = SimVehicle::new("sim_car");
        car.fail_next(2);
        assert!(car.update_control(Gear::Neutral, 0.0, 0.0, 0.0).await.is_err());
        assert!(car.update_control(Gear::Neutral, 0.0, 0.0, 0.0).await.is_err());
        assert!(car.update_control(Gear::Neutral, 0.0, 0.0, 0.0).await.is_ok());
        assert_eq!(car.commands().len(), 1);
    }

    #[test]
    fn scripted_input_repeats_last_sample_without_edges() {
        let mut input = ScriptedInput::new(vec![InputSample {
            gear_down: true,
            ..InputSample::new(0.2, 0.4)
        }]);
        assert!(input.sample().unwrap().gear_down);
        let repeat = input.sample().unwrap();
        assert_eq!(repeat.linear, 0.4);
        assert!(!repeat.gear_down);
    }

    #[test]
    fn scripted_input_replays_errors() {
        let mut input = ScriptedInput::default();
        input.push_error("unplugged");
        input.push(InputSample::new(0.0, 0.5));
        assert!(matches!(input.sample(), Err(DriveError::Input(_))));
        assert_eq!(input.sample().unwrap().linear, 0.5);
    }

    #[test]
    fn wave_input_stays_in_range() {
        let mut input = WaveInput::new(Duration::from_millis(50), Duration::from_secs(2));
        for _ in 0..100 {
            let s = input.sample().unwrap();
            assert!((-1.0..=1.0).contains(&s.steering));
            assert!((0.0..=1.0).contains(&s.linear));
        }
    }

    #[test]
    fn synthetic_frame_matches_geometry() {
        let frame = synthetic_frame(4, 3, 7);
        assert_eq!(Some(frame.data.len()), frame.expected_len());
        assert_eq!(frame.data[0], 7);
    }
}
