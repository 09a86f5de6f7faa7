//! Simulated predictor served over an in-process transport.
//!
//! Used when override is enabled but no `predictor_url` is configured.  It
//! answers each observation after a fixed latency:
//!
//! | Mode | Answer |
//! |---|---|
//! | `steer`, `supervisor` | absolute steering from the frame's mean brightness |
//! | `steer_diff` | half of the human's steering delta, reversed |
//! | `full_diff` | damped steering, echoed throttle, forward gear |

use std::time::Duration;

use drivelink_middleware::{ObservationEnvelope, PredictorEndpoint, decode_observation, encode_prediction};
use drivelink_types::{Frame, Gear, Prediction, UpdateMode, clamp_steering};
use tracing::{debug, info, warn};

pub struct SimPredictor {
    mode: UpdateMode,
    latency: Duration,
}

impl SimPredictor {
    pub fn new(mode: UpdateMode, latency: Duration) -> Self {
        Self { mode, latency }
    }

    pub fn predict(&self, envelope: &ObservationEnvelope) -> Prediction {
        let obs = &envelope.observation;
        let damped = -0.5 * obs.delta.d_steering;
        let (d_steering, d_throttle, d_gear) = match self.mode {
            UpdateMode::Steer | UpdateMode::Supervisor => {
                (obs.frame.as_ref().map_or(0.0, brightness_bias), 0.0, Gear::Neutral)
            }
            UpdateMode::SteerDiff => (damped, 0.0, Gear::Neutral),
            UpdateMode::FullDiff => (damped, obs.delta.d_throttle, Gear::Forward),
        };
        Prediction {
            mode: self.mode,
            d_steering,
            d_throttle,
            d_braking: 0.0,
            d_gear,
            confidence_steering: Some(if obs.frame.is_some() { 0.8 } else { 0.3 }),
            seq: Some(envelope.seq),
        }
    }

    /// Answer observations until the client side goes away.  Returns the
    /// number of predictions sent.
    pub async fn serve(self, mut endpoint: PredictorEndpoint) -> u64 {
        info!(mode = self.mode.as_str(), latency = ?self.latency, "simulated predictor up");
        let mut served = 0;
        while let Some(bytes) = endpoint.next_observation().await {
            let envelope = match decode_observation(&bytes) {
                Ok(env) => env,
                Err(err) => {
                    warn!(error = %err, "simulated predictor got a bad observation");
                    continue;
                }
            };
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            let reply = match encode_prediction(&self.predict(&envelope)) {
                Ok(text) => text,
                Err(err) => {
                    warn!(error = %err, "simulated predictor encode failed");
                    continue;
                }
            };
            if endpoint.respond(reply).await.is_err() {
                break;
            }
            served += 1;
        }
        debug!(served, "simulated predictor stopped");
        served
    }
}

/// Map mean pixel brightness onto `[-0.5, 0.5]` steering.
fn brightness_bias(frame: &Frame) -> f64 {
    if frame.data.is_empty() {
        return 0.0;
    }
    let sum: u64 = frame.data.iter().map(|&b| u64::from(b)).sum();
    let mean = sum as f64 / frame.data.len() as f64;
    clamp_steering(mean / 255.0 - 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivelink_middleware::{InProcessTransport, PredictionChannel};
    use drivelink_types::{ControlDelta, Observation};

    fn envelope(seq: u64, d_steering: f64, frame: Option<Frame>) -> ObservationEnvelope {
        ObservationEnvelope {
            seq,
            supervisor: false,
            observation: Observation {
                frame,
                telemetry: None,
                delta: ControlDelta {
                    d_steering,
                    d_throttle: 0.2,
                    ..ControlDelta::default()
                },
            },
        }
    }

    #[test]
    fn steer_diff_damps_human_delta() {
        let p = SimPredictor::new(UpdateMode::SteerDiff, Duration::ZERO)
            .predict(&envelope(7, 0.4, None));
        assert_eq!(p.mode, UpdateMode::SteerDiff);
        assert!((p.d_steering + 0.2).abs() < 1e-9);
        assert_eq!(p.seq, Some(7));
        assert_eq!(p.confidence_steering, Some(0.3));
    }

    #[test]
    fn full_diff_echoes_throttle_and_drives_forward() {
        let p = SimPredictor::new(UpdateMode::FullDiff, Duration::ZERO)
            .predict(&envelope(1, 0.0, None));
        assert_eq!(p.d_gear, Gear::Forward);
        assert!((p.d_throttle - 0.2).abs() < 1e-9);
    }

    #[test]
    fn steer_follows_frame_brightness() {
        let bright = Frame::new(2, 2, 1, vec![255u8; 4]);
        let dark = Frame::new(2, 2, 1, vec![0u8; 4]);
        let sim = SimPredictor::new(UpdateMode::Steer, Duration::ZERO);
        assert!((sim.predict(&envelope(0, 0.0, Some(bright))).d_steering - 0.5).abs() < 1e-9);
        assert!((sim.predict(&envelope(0, 0.0, Some(dark))).d_steering + 0.5).abs() < 1e-9);
        assert_eq!(sim.predict(&envelope(0, 0.0, None)).d_steering, 0.0);
    }

    #[tokio::test]
    async fn serves_a_prediction_channel() {
        let (client, endpoint) = InProcessTransport::pair(4);
        let server = tokio::spawn(
            SimPredictor::new(UpdateMode::SteerDiff, Duration::ZERO).serve(endpoint),
        );
        let mut channel = PredictionChannel::new(Box::new(client), false);

        let obs = envelope(0, 0.6, None).observation;
        let seq = channel.request(&obs).await.unwrap();
        let p = channel.poll(Duration::from_millis(500)).await.unwrap();
        assert_eq!(p.seq, Some(seq));
        assert!((p.d_steering + 0.3).abs() < 1e-9);

        drop(channel);
        assert_eq!(server.await.unwrap(), 1);
    }
}
