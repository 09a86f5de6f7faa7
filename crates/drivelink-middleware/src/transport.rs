//! The predictor transport seam.
//!
//! [`PredictionChannel`][crate::channel::PredictionChannel] never touches a
//! socket directly.  It owns one [`PredictorTransport`], which moves opaque
//! payloads: binary observations out, JSON text predictions in.
//!
//! - [`InProcessTransport`] – a pair of bounded tokio mpsc queues; the other
//!   end is a [`PredictorEndpoint`] that a simulated predictor (or a test)
//!   drives directly.
//! - [`WsTransport`][crate::ws_transport::WsTransport] – a WebSocket client.

use async_trait::async_trait;
use drivelink_types::DriveError;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

/// Ordered, message-oriented link to a remote predictor.
///
/// # Contract
///
/// * `send` must not wait on the predictor; a full or closed link is an
///   immediate [`DriveError::Transport`].
/// * `recv` must be cancellation-safe: dropping its future before it
///   completes loses no message.  The channel relies on this to bound the
///   wait with a timeout.
/// * `try_recv` returns `None` when nothing is queued right now.
#[async_trait]
pub trait PredictorTransport: Send {
    /// Short description for logs, e.g. the peer URL.
    fn describe(&self) -> String;

    async fn send(&mut self, payload: Vec<u8>) -> Result<(), DriveError>;

    async fn recv(&mut self) -> Result<String, DriveError>;

    fn try_recv(&mut self) -> Option<Result<String, DriveError>>;
}

// ────────────────────────────────────────────────────────────────────────────
// In-process transport
// ────────────────────────────────────────────────────────────────────────────

/// Client half of an in-process predictor link.
pub struct InProcessTransport {
    outbound: mpsc::Sender<Vec<u8>>,
    inbound: mpsc::Receiver<String>,
}

/// Predictor half of an in-process link.
pub struct PredictorEndpoint {
    observations: mpsc::Receiver<Vec<u8>>,
    predictions: mpsc::Sender<String>,
}

impl InProcessTransport {
    /// Create a connected pair with `capacity` slots in each direction.
    pub fn pair(capacity: usize) -> (InProcessTransport, PredictorEndpoint) {
        let (obs_tx, obs_rx) = mpsc::channel(capacity);
        let (pred_tx, pred_rx) = mpsc::channel(capacity);
        (
            InProcessTransport {
                outbound: obs_tx,
                inbound: pred_rx,
            },
            PredictorEndpoint {
                observations: obs_rx,
                predictions: pred_tx,
            },
        )
    }
}

#[async_trait]
impl PredictorTransport for InProcessTransport {
    fn describe(&self) -> String {
        "in-process".to_string()
    }

    async fn send(&mut self, payload: Vec<u8>) -> Result<(), DriveError> {
        self.outbound.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => DriveError::Transport("predictor queue full".into()),
            TrySendError::Closed(_) => DriveError::Transport("predictor endpoint closed".into()),
        })
    }

    async fn recv(&mut self) -> Result<String, DriveError> {
        self.inbound
            .recv()
            .await
            .ok_or_else(|| DriveError::Transport("predictor endpoint closed".into()))
    }

    fn try_recv(&mut self) -> Option<Result<String, DriveError>> {
        match self.inbound.try_recv() {
            Ok(text) => Some(Ok(text)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                Some(Err(DriveError::Transport("predictor endpoint closed".into())))
            }
        }
    }
}

impl PredictorEndpoint {
    /// Wait for the next observation; `None` once the client is gone.
    pub async fn next_observation(&mut self) -> Option<Vec<u8>> {
        self.observations.recv().await
    }

    /// Send a raw prediction message back to the client.
    pub async fn respond(&self, text: impl Into<String>) -> Result<(), DriveError> {
        self.predictions
            .send(text.into())
            .await
            .map_err(|_| DriveError::Transport("client transport dropped".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_moves_messages_both_ways() {
        let (mut client, mut endpoint) = InProcessTransport::pair(4);
        client.send(vec![1, 2, 3]).await.unwrap();
        assert_eq!(endpoint.next_observation().await, Some(vec![1, 2, 3]));

        assert!(client.try_recv().is_none());
        endpoint.respond("{}").await.unwrap();
        assert_eq!(client.recv().await.unwrap(), "{}");
    }

    #[tokio::test]
    async fn send_never_waits_on_a_full_queue() {
        let (mut client, _endpoint) = InProcessTransport::pair(1);
        client.send(vec![0]).await.unwrap();
        let err = client.send(vec![1]).await.unwrap_err();
        assert!(matches!(err, DriveError::Transport(_)));
    }

    #[tokio::test]
    async fn dropped_endpoint_is_reported() {
        let (mut client, endpoint) = InProcessTransport::pair(1);
        drop(endpoint);
        assert!(client.send(vec![0]).await.is_err());
        assert!(client.recv().await.is_err());
        assert!(matches!(client.try_recv(), Some(Err(_))));
    }
}
