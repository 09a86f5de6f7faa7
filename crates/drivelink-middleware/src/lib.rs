//! `drivelink-middleware` – Transport & protocol
//!
//! Everything that moves bytes or events between drivelink components and
//! the outside world.
//!
//! - [`bus`] – [`EventBus`][bus::EventBus]: topic-based broadcast bus for
//!   per-tick snapshots and recovered faults.
//! - [`channel`] – [`PredictionChannel`][channel::PredictionChannel]: the
//!   request / bounded-poll protocol with the remote predictor.
//! - [`transport`] – [`PredictorTransport`][transport::PredictorTransport]
//!   seam plus the in-process implementation.
//! - [`ws_transport`] – [`WsTransport`][ws_transport::WsTransport]: predictor
//!   over a WebSocket.
//! - [`wire`] – observation envelope and prediction JSON codec.

pub mod bus;
pub mod channel;
pub mod transport;
pub mod wire;
pub mod ws_transport;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use channel::PredictionChannel;
pub use transport::{InProcessTransport, PredictorEndpoint, PredictorTransport};
pub use wire::{ObservationEnvelope, decode_observation, decode_prediction, encode_observation, encode_prediction};
pub use ws_transport::WsTransport;
