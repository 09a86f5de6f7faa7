//! [`OverridePolicy`] – per-tick arbitration between local input and the
//! remote predictor.
//!
//! Runs once per tick after [`DeltaComputer::compute`].  With override
//! disabled the local commit has already happened and the policy does
//! nothing.  With override enabled:
//!
//! * no prediction this tick → the state is left exactly as it was (coast);
//! * a prediction → merged according to its [`UpdateMode`]:
//!
//! | mode | steering | throttle / gear |
//! |---|---|---|
//! | `Supervisor` | raw steering command, absolute | local rule |
//! | `Steer` | model value, absolute | local rule |
//! | `SteerDiff` | nudged by the model | local rule |
//! | `FullDiff` | nudged by the model | throttle/braking nudged, gear replaced |
//!
//! The model wins every field its mode governs; every other field keeps the
//! local commit.  `confidence_steering` never influences arbitration.

use drivelink_types::{ControlDelta, ControlState, Prediction, RawCommands, UpdateMode};
use tracing::debug;

use crate::delta::DeltaComputer;

/// Result of one arbitration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arbitration {
    /// Override disabled; the local commit stands.
    Local,
    /// Override enabled but no prediction arrived; state unchanged.
    Coast,
    /// A prediction was merged using the given mode.
    Applied(UpdateMode),
}

impl Arbitration {
    pub fn applied_mode(self) -> Option<UpdateMode> {
        match self {
            Arbitration::Applied(mode) => Some(mode),
            _ => None,
        }
    }
}

/// Decides whether the local delta or a predicted one drives the vehicle.
#[derive(Debug, Clone, Copy)]
pub struct OverridePolicy {
    enabled: bool,
}

impl OverridePolicy {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Merge `prediction` into `state` according to its mode.
    ///
    /// `delta` is the local delta computed this tick (already shipped to the
    /// predictor); `raw` are the raw commands it was computed from.
    pub fn arbitrate(
        &self,
        state: &mut ControlState,
        delta: &ControlDelta,
        prediction: Option<&Prediction>,
        raw: RawCommands,
    ) -> Arbitration {
        if !self.enabled {
            return Arbitration::Local;
        }
        let Some(prediction) = prediction else {
            debug!("no prediction this tick; coasting");
            return Arbitration::Coast;
        };

        debug!(mode = %prediction.mode, ?delta, ?prediction, "merging prediction");
        match prediction.mode {
            UpdateMode::Supervisor => {
                DeltaComputer::commit_linear(state, raw.linear);
                state.set_steering(raw.steering);
                state.steering_command = raw.steering;
            }
            UpdateMode::Steer => {
                DeltaComputer::commit_linear(state, raw.linear);
                state.set_steering(prediction.d_steering);
            }
            UpdateMode::SteerDiff => {
                DeltaComputer::commit_linear(state, raw.linear);
                state.nudge_steering(prediction.d_steering);
            }
            UpdateMode::FullDiff => {
                state.gear = prediction.d_gear;
                state.nudge_steering(prediction.d_steering);
                state.nudge_throttle(prediction.d_throttle);
                state.nudge_braking(prediction.d_braking);
                state.steering_command = raw.steering;
                state.linear_command = raw.linear;
            }
        }
        state.settle();
        Arbitration::Applied(prediction.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivelink_types::Gear;

    const EPS: f64 = 1e-12;

    fn prediction(mode: UpdateMode, d_steering: f64) -> Prediction {
        Prediction {
            mode,
            d_steering,
            d_throttle: 0.0,
            d_braking: 0.0,
            d_gear: Gear::Neutral,
            confidence_steering: None,
            seq: None,
        }
    }

    /// Run one override tick: compute without committing, then arbitrate.
    fn override_tick(
        state: &mut ControlState,
        raw: RawCommands,
        prediction: Option<&Prediction>,
    ) -> Arbitration {
        let delta = DeltaComputer::compute(state, raw.steering, raw.linear, true);
        OverridePolicy::new(true).arbitrate(state, &delta, prediction, raw)
    }

    const RAW: RawCommands = RawCommands {
        steering: -0.5,
        linear: 0.8,
    };

    #[test]
    fn disabled_policy_leaves_local_commit() {
        let mut state = ControlState::default();
        let delta = DeltaComputer::compute(&mut state, RAW.steering, RAW.linear, false);
        let committed = state;
        let p = prediction(UpdateMode::FullDiff, 0.9);
        let result = OverridePolicy::new(false).arbitrate(&mut state, &delta, Some(&p), RAW);
        assert_eq!(result, Arbitration::Local);
        assert_eq!(state, committed);
    }

    #[test]
    fn missing_prediction_coasts() {
        let mut state = ControlState {
            steering: 0.2,
            throttle: 0.3,
            gear: Gear::Forward,
            steering_command: 0.2,
            linear_command: 0.3,
            ..ControlState::default()
        };
        let before = state;
        let result = override_tick(&mut state, RAW, None);
        assert_eq!(result, Arbitration::Coast);
        assert_eq!(state, before);
    }

    #[test]
    fn steer_diff_nudges_local_steering() {
        let mut state = ControlState::default();
        let p = prediction(UpdateMode::SteerDiff, -0.2);
        let result = override_tick(&mut state, RAW, Some(&p));

        assert_eq!(result, Arbitration::Applied(UpdateMode::SteerDiff));
        assert_eq!(state.gear, Gear::Forward);
        assert!((state.throttle - 0.8).abs() < EPS);
        assert!((state.steering + 0.2).abs() < EPS);
        // Steering baseline stays put so the human correction keeps accumulating.
        assert_eq!(state.steering_command, 0.0);
        assert_eq!(state.linear_command, 0.8);
    }

    #[test]
    fn steer_replaces_steering_absolutely() {
        let mut state = ControlState {
            steering: 0.4,
            ..ControlState::default()
        };
        let p = prediction(UpdateMode::Steer, 1.6);
        override_tick(&mut state, RAW, Some(&p));
        assert_eq!(state.steering, 1.0);
        assert_eq!(state.gear, Gear::Forward);
        assert!((state.throttle - 0.8).abs() < EPS);
    }

    #[test]
    fn supervisor_takes_raw_steering_and_local_linear() {
        let mut state = ControlState {
            steering: 0.9,
            steering_command: 0.1,
            ..ControlState::default()
        };
        let p = prediction(UpdateMode::Supervisor, 0.7);
        override_tick(&mut state, RAW, Some(&p));
        assert_eq!(state.steering, -0.5);
        assert_eq!(state.steering_command, -0.5);
        assert_eq!(state.gear, Gear::Forward);
        assert!((state.throttle - 0.8).abs() < EPS);
        assert_eq!(state.linear_command, 0.8);
    }

    #[test]
    fn full_diff_nudges_and_replaces_gear() {
        let mut state = ControlState {
            steering: 0.5,
            throttle: 0.5,
            gear: Gear::Forward,
            linear_command: 0.5,
            steering_command: 0.5,
            ..ControlState::default()
        };
        let p = Prediction {
            mode: UpdateMode::FullDiff,
            d_steering: 0.7,
            d_throttle: -0.2,
            d_braking: 0.4,
            d_gear: Gear::Reverse,
            confidence_steering: Some(0.3),
            seq: None,
        };
        override_tick(&mut state, RAW, Some(&p));
        assert_eq!(state.gear, Gear::Reverse);
        assert_eq!(state.steering, 1.0);
        assert!((state.throttle - 0.3).abs() < EPS);
        assert!((state.braking - 0.4).abs() < EPS);
        assert_eq!(state.steering_command, RAW.steering);
        assert_eq!(state.linear_command, RAW.linear);
    }

    #[test]
    fn full_diff_into_neutral_zeroes_throttle() {
        let mut state = ControlState {
            throttle: 0.5,
            gear: Gear::Forward,
            ..ControlState::default()
        };
        let mut p = prediction(UpdateMode::FullDiff, 0.0);
        p.d_throttle = 0.2;
        override_tick(&mut state, RAW, Some(&p));
        assert_eq!(state.gear, Gear::Neutral);
        assert_eq!(state.throttle, 0.0);
    }

    #[test]
    fn confidence_does_not_change_arbitration() {
        let mut a = ControlState::default();
        let mut b = ControlState::default();
        let plain = prediction(UpdateMode::SteerDiff, 0.1);
        let mut confident = plain;
        confident.confidence_steering = Some(0.01);
        override_tick(&mut a, RAW, Some(&plain));
        override_tick(&mut b, RAW, Some(&confident));
        assert_eq!(a, b);
    }

    #[test]
    fn applied_mode_accessor() {
        assert_eq!(
            Arbitration::Applied(UpdateMode::Steer).applied_mode(),
            Some(UpdateMode::Steer)
        );
        assert_eq!(Arbitration::Coast.applied_mode(), None);
    }
}
