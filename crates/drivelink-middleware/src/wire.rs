//! Wire format spoken with the remote predictor.
//!
//! # Observation (client → predictor, one binary message)
//!
//! ```text
//! +----------------+----------------------+------------------+
//! | meta_len: u32  | metadata (JSON)      | frame bytes      |
//! | big-endian     | meta_len bytes       | rest of message  |
//! +----------------+----------------------+------------------+
//! ```
//!
//! The metadata object carries `seq`, the `supervisor` flag, the local
//! delta (`d_steering`, `d_throttle`, `d_braking`, `d_gear`), the telemetry
//! map (or `null`) and the frame geometry (or `null` when no fresh frame
//! was available, in which case no frame bytes follow).
//!
//! # Prediction (predictor → client, one JSON text message)
//!
//! ```json
//! {"d_steering": -0.2, "d_throttle": 0.0, "d_braking": 0.0, "d_gear": 1,
//!  "update_mode": "steer_diff", "p_steering": 0.93, "seq": 17}
//! ```
//!
//! `p_steering` and `seq` are optional.  Anything that does not parse is a
//! [`DriveError::PredictionDecode`].

use drivelink_types::{
    ControlDelta, DriveError, Frame, Gear, Observation, Prediction, Telemetry, UpdateMode,
};
use serde::{Deserialize, Serialize};

const LEN_PREFIX: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct FrameGeometry {
    width: u32,
    height: u32,
    channels: u8,
}

#[derive(Debug, Serialize, Deserialize)]
struct ObservationMeta {
    seq: u64,
    supervisor: bool,
    d_steering: f64,
    d_throttle: f64,
    d_braking: f64,
    d_gear: i8,
    telemetry: Option<Telemetry>,
    frame: Option<FrameGeometry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PredictionWire {
    d_steering: f64,
    d_throttle: f64,
    d_braking: f64,
    d_gear: Gear,
    update_mode: UpdateMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    p_steering: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    seq: Option<u64>,
}

/// An observation as it appears on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationEnvelope {
    pub seq: u64,
    pub supervisor: bool,
    pub observation: Observation,
}

/// Serialise one observation into a single binary message.
pub fn encode_observation(
    seq: u64,
    supervisor: bool,
    observation: &Observation,
) -> Result<Vec<u8>, DriveError> {
    let delta = observation.delta;
    let meta = ObservationMeta {
        seq,
        supervisor,
        d_steering: delta.d_steering,
        d_throttle: delta.d_throttle,
        d_braking: delta.d_braking,
        d_gear: delta.d_gear,
        telemetry: observation.telemetry.clone(),
        frame: observation.frame.as_ref().map(|f| FrameGeometry {
            width: f.width,
            height: f.height,
            channels: f.channels,
        }),
    };
    let json = serde_json::to_vec(&meta)
        .map_err(|e| DriveError::Transport(format!("observation metadata: {e}")))?;
    let len = u32::try_from(json.len())
        .map_err(|_| DriveError::Transport("observation metadata too large".into()))?;

    let frame_bytes = observation.frame.as_ref().map_or(&[][..], |f| &f.data[..]);
    let mut out = Vec::with_capacity(LEN_PREFIX + json.len() + frame_bytes.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&json);
    out.extend_from_slice(frame_bytes);
    Ok(out)
}

/// Parse a binary observation message.
///
/// # Errors
///
/// Returns [`DriveError::Transport`] if the envelope is truncated, the
/// metadata is not valid JSON, or the frame bytes disagree with the declared
/// geometry.
pub fn decode_observation(bytes: &[u8]) -> Result<ObservationEnvelope, DriveError> {
    let Some((prefix, rest)) = bytes.split_first_chunk::<LEN_PREFIX>() else {
        return Err(DriveError::Transport("observation shorter than length prefix".into()));
    };
    let len = u32::from_be_bytes(*prefix) as usize;
    if rest.len() < len {
        return Err(DriveError::Transport(format!(
            "observation metadata truncated: need {len} bytes, have {}",
            rest.len()
        )));
    }
    let (json, pixels) = rest.split_at(len);
    let meta: ObservationMeta = serde_json::from_slice(json)
        .map_err(|e| DriveError::Transport(format!("observation metadata: {e}")))?;

    let frame = match meta.frame {
        Some(g) => {
            let geometry = Frame::new(g.width, g.height, g.channels, Vec::new());
            let Some(needed) = geometry.expected_len() else {
                return Err(DriveError::Transport(format!(
                    "frame {}x{}x{} is too large to address",
                    g.width, g.height, g.channels
                )));
            };
            if pixels.len() != needed {
                return Err(DriveError::Transport(format!(
                    "frame {}x{}x{} needs {needed} bytes, got {}",
                    g.width,
                    g.height,
                    g.channels,
                    pixels.len()
                )));
            }
            Some(Frame { data: pixels.into(), ..geometry })
        }
        None if pixels.is_empty() => None,
        None => {
            return Err(DriveError::Transport(
                "frame bytes present without geometry".into(),
            ));
        }
    };

    Ok(ObservationEnvelope {
        seq: meta.seq,
        supervisor: meta.supervisor,
        observation: Observation {
            frame,
            telemetry: meta.telemetry,
            delta: ControlDelta {
                d_steering: meta.d_steering,
                d_throttle: meta.d_throttle,
                d_braking: meta.d_braking,
                d_gear: meta.d_gear,
            },
        },
    })
}

/// Parse a prediction message.
pub fn decode_prediction(text: &str) -> Result<Prediction, DriveError> {
    let wire: PredictionWire =
        serde_json::from_str(text).map_err(|e| DriveError::PredictionDecode(e.to_string()))?;
    let finite = [wire.d_steering, wire.d_throttle, wire.d_braking]
        .iter()
        .chain(wire.p_steering.iter())
        .all(|v| v.is_finite());
    if !finite {
        return Err(DriveError::PredictionDecode(
            "prediction carries a non-finite value".into(),
        ));
    }
    Ok(Prediction {
        mode: wire.update_mode,
        d_steering: wire.d_steering,
        d_throttle: wire.d_throttle,
        d_braking: wire.d_braking,
        d_gear: wire.d_gear,
        confidence_steering: wire.p_steering,
        seq: wire.seq,
    })
}

/// Serialise a prediction the way a predictor would send it.
pub fn encode_prediction(prediction: &Prediction) -> Result<String, DriveError> {
    let wire = PredictionWire {
        d_steering: prediction.d_steering,
        d_throttle: prediction.d_throttle,
        d_braking: prediction.d_braking,
        d_gear: prediction.d_gear,
        update_mode: prediction.mode,
        p_steering: prediction.confidence_steering,
        seq: prediction.seq,
    };
    serde_json::to_string(&wire).map_err(|e| DriveError::Transport(format!("prediction: {e}")))
}
