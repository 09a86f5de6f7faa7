//! [`DeltaComputer`] – turns raw input into an incremental [`ControlDelta`].
//!
//! Throttle polarity is gear-relative: forward and reverse share a single
//! `throttle` scalar, so the same axis motion accelerates in one gear and
//! decelerates in the other.  Every edge is classified against the state
//! *before* anything is committed, and the delta is produced even when
//! override suppresses the commit because the delta is what the predictor
//! receives.
//!
//! # Linear edges
//!
//! | condition | edge | `d_throttle` |
//! |---|---|---|
//! | command unchanged | [`LinearEdge::Idle`] | `0` |
//! | neutral, command leaves zero or changes sign | [`LinearEdge::Takeoff`] | `|raw|` on a zero baseline |
//! | neutral, any other motion | [`LinearEdge::Hold`] | `0` |
//! | gear agrees with the motion | [`LinearEdge::Accelerate`] | `|d_linear|` |
//! | gear opposes the motion | [`LinearEdge::Decelerate`] | `-|d_linear|` |
//!
//! Only a neutral vehicle takes off.  In gear, pulling the command back
//! through zero just brakes the throttle toward zero; the gear itself is
//! left to the operator's gear buttons.
//!
//! # Example
//!
//! ```
//! use drivelink_kernel::DeltaComputer;
//! use drivelink_types::{ControlState, Gear};
//!
//! let mut state = ControlState::default();
//! let delta = DeltaComputer::compute(&mut state, -0.5, 0.8, false);
//!
//! assert_eq!(delta.d_gear, 1);
//! assert_eq!(state.gear, Gear::Forward);
//! assert_eq!(state.steering, -0.5);
//! assert!((state.throttle - 0.8).abs() < 1e-12);
//! ```

use drivelink_types::{ControlDelta, ControlState, Gear, clamp_unit};
use tracing::trace;

/// Classification of the linear input against the current state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinearEdge {
    /// The linear command did not move.
    Idle,
    /// Neutral, but the command did not leave zero; wait for a takeoff.
    Hold,
    /// Neutral and the command left zero: start moving in `gear`.
    Takeoff { gear: Gear, magnitude: f64 },
    /// Motion agrees with the current gear.
    Accelerate(f64),
    /// Motion opposes the current gear.
    Decelerate(f64),
}

/// Manual gear request from the input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GearShift {
    Up,
    Down,
}

/// Stateless delta computer.  All state lives in [`ControlState`].
pub struct DeltaComputer;

impl DeltaComputer {
    /// Compute this tick's delta and, unless `override_active`, commit it.
    ///
    /// Only `state.steering_command` and `state.linear_command` are read to
    /// build the delta; with `override_active` the state is left untouched.
    pub fn compute(
        state: &mut ControlState,
        raw_steering: f64,
        raw_linear: f64,
        override_active: bool,
    ) -> ControlDelta {
        let delta = Self::delta(state, raw_steering, raw_linear);
        trace!(?delta, override_active, "computed control delta");
        if !override_active {
            Self::commit_steering(state, raw_steering);
            Self::commit_linear(state, raw_linear);
            state.settle();
        }
        delta
    }

    /// Pure delta for the given raw input.
    pub fn delta(state: &ControlState, raw_steering: f64, raw_linear: f64) -> ControlDelta {
        let edge = Self::classify(state, raw_linear);
        let (d_throttle, gear) = Self::linear_effect(state, edge);
        ControlDelta {
            d_steering: raw_steering - state.steering_command,
            d_throttle,
            d_braking: 0.0,
            d_gear: gear.as_i8() - state.gear.as_i8(),
        }
    }

    /// Classify the linear command edge for `raw_linear`.
    pub fn classify(state: &ControlState, raw_linear: f64) -> LinearEdge {
        let previous = state.linear_command;
        let d_linear = raw_linear - previous;
        if d_linear == 0.0 {
            return LinearEdge::Idle;
        }

        match state.gear {
            Gear::Neutral => {
                let leaves_zero = raw_linear != 0.0
                    && (previous == 0.0 || previous.signum() != raw_linear.signum());
                if leaves_zero {
                    LinearEdge::Takeoff {
                        gear: Gear::from_sign(d_linear),
                        magnitude: raw_linear.abs(),
                    }
                } else {
                    LinearEdge::Hold
                }
            }
            gear if gear.sign() == d_linear.signum() => LinearEdge::Accelerate(d_linear.abs()),
            _ => LinearEdge::Decelerate(d_linear.abs()),
        }
    }

    /// Commit the steering channel: baseline and clamped steering.
    pub fn commit_steering(state: &mut ControlState, raw_steering: f64) {
        let d_steering = raw_steering - state.steering_command;
        state.steering_command = raw_steering;
        state.nudge_steering(d_steering);
    }

    /// Commit the linear channel: gear, throttle and baseline.
    pub fn commit_linear(state: &mut ControlState, raw_linear: f64) {
        let edge = Self::classify(state, raw_linear);
        match edge {
            LinearEdge::Idle | LinearEdge::Hold => {}
            LinearEdge::Takeoff { gear, magnitude } => {
                state.gear = gear;
                state.throttle = clamp_unit(magnitude);
            }
            LinearEdge::Accelerate(step) => state.nudge_throttle(step),
            LinearEdge::Decelerate(step) => state.nudge_throttle(-step),
        }
        state.linear_command = raw_linear;
    }

    /// Apply a manual gear shift.
    ///
    /// Shifts only ever move toward neutral; nonzero gear is entered on a
    /// takeoff edge.  Returns `true` when the gear changed.
    pub fn shift(state: &mut ControlState, shift: GearShift) -> bool {
        let target = match (state.gear, shift) {
            (Gear::Forward, GearShift::Down) | (Gear::Reverse, GearShift::Up) => Gear::Neutral,
            _ => return false,
        };
        state.gear = target;
        state.throttle = 0.0;
        true
    }

    fn linear_effect(state: &ControlState, edge: LinearEdge) -> (f64, Gear) {
        match edge {
            LinearEdge::Idle | LinearEdge::Hold => (0.0, state.gear),
            LinearEdge::Takeoff { gear, magnitude } => (magnitude, gear),
            LinearEdge::Accelerate(step) => (step, state.gear),
            LinearEdge::Decelerate(step) => (-step, state.gear),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    fn forward(throttle: f64, linear_command: f64) -> ControlState {
        ControlState {
            gear: Gear::Forward,
            throttle,
            linear_command,
            ..ControlState::default()
        }
    }

    #[test]
    fn takeoff_from_rest_commits_forward_gear() {
        let mut state = ControlState::default();
        let delta = DeltaComputer::compute(&mut state, -0.5, 0.8, false);

        assert_eq!(state.gear, Gear::Forward);
        assert!((state.steering + 0.5).abs() < EPS);
        assert!((state.throttle - 0.8).abs() < EPS);
        assert_eq!(state.steering_command, -0.5);
        assert_eq!(state.linear_command, 0.8);
        assert_eq!(delta.d_gear, 1);
        assert!((delta.d_throttle - 0.8).abs() < EPS);
        assert!((delta.d_steering + 0.5).abs() < EPS);
    }

    #[test]
    fn takeoff_into_reverse_has_positive_throttle() {
        let mut state = ControlState::default();
        DeltaComputer::compute(&mut state, 0.0, -0.4, false);
        assert_eq!(state.gear, Gear::Reverse);
        assert!((state.throttle - 0.4).abs() < EPS);
    }

    #[test]
    fn crossing_zero_in_gear_decelerates_without_shifting() {
        let mut state = forward(0.9, 0.9);
        let delta = DeltaComputer::compute(&mut state, 0.0, -0.3, false);
        assert_eq!(state.gear, Gear::Forward);
        assert_eq!(state.throttle, 0.0);
        assert_eq!(delta.d_gear, 0);
        assert!((delta.d_throttle + 1.2).abs() < EPS);
        assert_eq!(state.linear_command, -0.3);
    }

    #[test]
    fn takeoff_after_gear_down_resets_residual_throttle() {
        let mut state = forward(0.9, 0.9);
        assert!(DeltaComputer::shift(&mut state, GearShift::Down));
        let delta = DeltaComputer::compute(&mut state, 0.0, -0.3, false);
        assert_eq!(state.gear, Gear::Reverse);
        assert!((state.throttle - 0.3).abs() < EPS);
        assert_eq!(delta.d_gear, -1);
    }

    #[test]
    fn acceleration_follows_gear_direction() {
        let mut state = forward(0.2, 0.2);
        let delta = DeltaComputer::compute(&mut state, 0.0, 0.5, false);
        assert!((delta.d_throttle - 0.3).abs() < EPS);
        assert!((state.throttle - 0.5).abs() < EPS);

        let mut state = ControlState {
            gear: Gear::Reverse,
            throttle: 0.2,
            linear_command: -0.2,
            ..ControlState::default()
        };
        let delta = DeltaComputer::compute(&mut state, 0.0, -0.6, false);
        assert!((delta.d_throttle - 0.4).abs() < EPS);
        assert!((state.throttle - 0.6).abs() < EPS);
    }

    #[test]
    fn deceleration_uses_magnitude_only() {
        let mut state = forward(0.8, 0.8);
        let delta = DeltaComputer::compute(&mut state, 0.0, 0.3, false);
        assert!((delta.d_throttle + 0.5).abs() < EPS);
        assert!((state.throttle - 0.3).abs() < EPS);
        assert_eq!(state.gear, Gear::Forward);
    }

    #[test]
    fn deceleration_never_goes_negative() {
        let mut state = forward(0.1, 0.9);
        DeltaComputer::compute(&mut state, 0.0, 0.2, false);
        assert_eq!(state.throttle, 0.0);
    }

    #[test]
    fn landing_on_zero_in_gear_only_decelerates() {
        let mut state = forward(0.9, 0.3);
        let delta = DeltaComputer::compute(&mut state, 0.0, 0.0, false);
        assert_eq!(state.gear, Gear::Forward);
        assert!((state.throttle - 0.6).abs() < EPS);
        assert_eq!(delta.d_gear, 0);
        assert!((delta.d_throttle + 0.3).abs() < EPS);
    }

    #[test]
    fn shipped_gear_delta_is_a_single_step() {
        let reverse = ControlState {
            gear: Gear::Reverse,
            throttle: 0.5,
            linear_command: -0.5,
            ..ControlState::default()
        };
        let starts = [forward(0.5, 0.5), ControlState::default(), reverse];
        for start in starts {
            for raw in [-1.0, -0.4, 0.0, 0.4, 1.0] {
                let delta = DeltaComputer::delta(&start, 0.0, raw);
                assert!((-1..=1).contains(&delta.d_gear), "{start:?} -> {raw}: {delta:?}");
            }
        }
    }

    #[test]
    fn neutral_without_crossing_holds() {
        let mut state = ControlState {
            linear_command: 0.3,
            ..ControlState::default()
        };
        let delta = DeltaComputer::compute(&mut state, 0.0, 0.6, false);
        assert_eq!(state.gear, Gear::Neutral);
        assert_eq!(state.throttle, 0.0);
        assert_eq!(delta.d_throttle, 0.0);
        assert_eq!(state.linear_command, 0.6);

        // Returning to zero while neutral is also a hold.
        let delta = DeltaComputer::compute(&mut state, 0.0, 0.0, false);
        assert_eq!(state.gear, Gear::Neutral);
        assert_eq!(delta.d_gear, 0);
    }

    #[test]
    fn zero_delta_is_idempotent() {
        let mut state = ControlState {
            steering: 0.25,
            throttle: 0.4,
            gear: Gear::Forward,
            steering_command: 0.25,
            linear_command: 0.4,
            ..ControlState::default()
        };
        let before = state;
        let delta = DeltaComputer::compute(&mut state, 0.25, 0.4, false);
        assert!(delta.is_zero());
        assert_eq!(state, before);
    }

    #[test]
    fn override_computes_delta_without_committing() {
        let mut state = ControlState::default();
        let before = state;
        let delta = DeltaComputer::compute(&mut state, -0.5, 0.8, true);
        assert_eq!(state, before);
        assert_eq!(delta.d_gear, 1);
        assert!((delta.d_steering + 0.5).abs() < EPS);
    }

    #[test]
    fn delta_is_independent_of_override_flag() {
        let state = forward(0.5, 0.5);
        let mut a = state;
        let mut b = state;
        let local = DeltaComputer::compute(&mut a, 0.3, -0.2, false);
        let shipped = DeltaComputer::compute(&mut b, 0.3, -0.2, true);
        assert_eq!(local, shipped);
    }

    #[test]
    fn steering_stays_in_range_for_any_command_sequence() {
        let mut state = ControlState::default();
        let commands = [0.9, -1.0, 1.0, -1.0, 0.4, 1.0, 1.0, -0.7, -1.0, 0.0, 1.0];
        // Drift the baseline so increments accumulate past the limits.
        for (i, c) in commands.iter().cycle().take(200).enumerate() {
            let raw = if i % 3 == 0 { *c } else { -*c };
            DeltaComputer::compute(&mut state, raw, 0.0, false);
            assert!((-1.0..=1.0).contains(&state.steering), "steering {}", state.steering);
        }
    }

    #[test]
    fn first_crossing_from_neutral_sets_gear_to_sign() {
        for raw in [0.05, 0.7, 1.0, -0.05, -0.7, -1.0] {
            let mut state = ControlState::default();
            let delta = DeltaComputer::compute(&mut state, 0.0, raw, false);
            assert_eq!(state.gear, Gear::from_sign(raw));
            assert_eq!(delta.d_gear, Gear::from_sign(raw).as_i8());
            assert!(state.throttle >= 0.0);
            assert!((state.throttle - clamp_unit(raw.abs())).abs() < EPS);
        }
    }

    #[test]
    fn shift_only_moves_toward_neutral() {
        let mut state = forward(0.5, 0.5);
        assert!(!DeltaComputer::shift(&mut state, GearShift::Up));
        assert_eq!(state.gear, Gear::Forward);
        assert!(DeltaComputer::shift(&mut state, GearShift::Down));
        assert_eq!(state.gear, Gear::Neutral);
        assert_eq!(state.throttle, 0.0);
        assert!(!DeltaComputer::shift(&mut state, GearShift::Down));
        assert_eq!(state.gear, Gear::Neutral);
    }

    #[test]
    fn classify_reports_edges() {
        let state = forward(0.5, 0.5);
        assert_eq!(DeltaComputer::classify(&state, 0.5), LinearEdge::Idle);
        assert_eq!(DeltaComputer::classify(&state, 0.0), LinearEdge::Decelerate(0.5));
        assert!(matches!(
            DeltaComputer::classify(&state, -0.2),
            LinearEdge::Decelerate(_)
        ));
        let parked = ControlState {
            linear_command: 0.4,
            ..ControlState::default()
        };
        assert!(matches!(
            DeltaComputer::classify(&parked, -0.2),
            LinearEdge::Takeoff { gear: Gear::Reverse, .. }
        ));
        assert_eq!(DeltaComputer::classify(&parked, 0.7), LinearEdge::Hold);
        assert!(matches!(DeltaComputer::classify(&state, 0.7), LinearEdge::Accelerate(_)));
        assert!(matches!(DeltaComputer::classify(&state, 0.1), LinearEdge::Decelerate(_)));
    }
}
