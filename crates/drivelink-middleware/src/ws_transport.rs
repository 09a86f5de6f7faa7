//! WebSocket client transport to a remote predictor.
//!
//! Observations go out as one binary message each; predictions come back as
//! text messages.  Ping/pong is answered by tungstenite itself; any other
//! non-text frame is skipped.
//!
//! The socket's write half lives in a writer task fed by a one-slot queue,
//! so [`send`][PredictorTransport::send] never waits on TCP backpressure: a
//! predictor that stops reading fills the slot and further observations
//! fail fast with [`DriveError::Transport`].

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{FutureExt, SinkExt, StreamExt};
use drivelink_types::DriveError;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::transport::PredictorTransport;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Observations queued behind the one being written.
const OUTBOX_SLOTS: usize = 1;

/// A connected predictor WebSocket.
pub struct WsTransport {
    url: String,
    outbox: mpsc::Sender<Vec<u8>>,
    writer: JoinHandle<()>,
    stream: SplitStream<WsStream>,
}

impl WsTransport {
    /// Connect to `url` (e.g. `ws://10.0.0.5:8765/predict`).
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Transport`] if the handshake fails.
    pub async fn connect(url: &str) -> Result<Self, DriveError> {
        let (ws, response) = connect_async(url)
            .await
            .map_err(|e| DriveError::Transport(format!("connect {url}: {e}")))?;
        info!(url, status = %response.status(), "predictor connected");
        let (sink, stream) = ws.split();
        let (outbox, queued) = mpsc::channel(OUTBOX_SLOTS);
        let writer = tokio::spawn(write_observations(url.to_string(), sink, queued));
        Ok(Self {
            url: url.to_string(),
            outbox,
            writer,
            stream,
        })
    }

    fn closed(&self) -> DriveError {
        DriveError::Transport(format!("{} closed the connection", self.url))
    }

    /// Map one incoming frame; `None` means "not a prediction, keep reading".
    fn accept(&self, msg: Message) -> Option<Result<String, DriveError>> {
        match msg {
            Message::Text(text) => Some(Ok(text.as_str().to_owned())),
            Message::Binary(bytes) => Some(
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| DriveError::PredictionDecode(format!("binary prediction: {e}"))),
            ),
            Message::Close(_) => Some(Err(self.closed())),
            other => {
                debug!(kind = ?other, "ignoring control frame");
                None
            }
        }
    }
}

#[async_trait]
impl PredictorTransport for WsTransport {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn send(&mut self, payload: Vec<u8>) -> Result<(), DriveError> {
        self.outbox.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => {
                DriveError::Transport(format!("{} is not reading observations", self.url))
            }
            TrySendError::Closed(_) => DriveError::Transport(format!("{} writer stopped", self.url)),
        })
    }

    async fn recv(&mut self) -> Result<String, DriveError> {
        loop {
            match self.stream.next().await {
                Some(Ok(msg)) => {
                    if let Some(result) = self.accept(msg) {
                        return result;
                    }
                }
                Some(Err(e)) => {
                    return Err(DriveError::Transport(format!("recv from {}: {e}", self.url)));
                }
                None => return Err(self.closed()),
            }
        }
    }

    fn try_recv(&mut self) -> Option<Result<String, DriveError>> {
        loop {
            match self.stream.next().now_or_never()? {
                Some(Ok(msg)) => {
                    if let Some(result) = self.accept(msg) {
                        return Some(result);
                    }
                }
                Some(Err(e)) => {
                    return Some(Err(DriveError::Transport(format!(
                        "recv from {}: {e}",
                        self.url
                    ))));
                }
                None => return Some(Err(self.closed())),
            }
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.writer.abort();
    }
}

/// Drain `queued` into the socket until a write fails.  Dropping the
/// transport aborts this task, even mid-write.
async fn write_observations(
    url: String,
    mut sink: SplitSink<WsStream, Message>,
    mut queued: mpsc::Receiver<Vec<u8>>,
) {
    while let Some(payload) = queued.recv().await {
        if let Err(e) = sink.send(Message::Binary(payload.into())).await {
            warn!(url, error = %e, "predictor write failed; link is down");
            return;
        }
    }
}
