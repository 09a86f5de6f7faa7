//! [`PredictionChannel`] – request/poll protocol with the remote predictor.
//!
//! The control loop uses an explicit two-phase call:
//!
//! 1. [`request`][PredictionChannel::request] encodes the observation and
//!    hands it to the transport without waiting for an answer.
//! 2. [`poll`][PredictionChannel::poll] waits at most `timeout` for the
//!    matching prediction.
//!
//! [`exchange`][PredictionChannel::exchange] runs both phases under one
//! deadline, so a transport that stalls on send cannot stretch a tick.
//!
//! At most one request is outstanding.  A second `request` before the first
//! is resolved fails with [`DriveError::RequestInFlight`].  `poll` resolves
//! the request whatever happens: a prediction, a timeout, a transport error
//! or garbage all end it, and only the first yields `Some`.
//!
//! Each observation carries a sequence number.  Answers that arrive after
//! their request was resolved are drained before the next request goes out,
//! and an answer echoing another request's `seq` is discarded, so a
//! prediction is only ever paired with the observation it was computed from.

use std::time::Duration;

use drivelink_types::{DriveError, Observation, Prediction};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::transport::PredictorTransport;
use crate::wire::{decode_prediction, encode_observation};

pub struct PredictionChannel {
    transport: Box<dyn PredictorTransport>,
    supervisor: bool,
    next_seq: u64,
    outstanding: Option<u64>,
}

impl PredictionChannel {
    /// Wrap `transport`.  `supervisor` is forwarded with every observation
    /// so the predictor knows whether human corrections are supervising it.
    pub fn new(transport: Box<dyn PredictorTransport>, supervisor: bool) -> Self {
        Self {
            transport,
            supervisor,
            next_seq: 0,
            outstanding: None,
        }
    }

    pub fn set_supervisor(&mut self, supervisor: bool) {
        self.supervisor = supervisor;
    }

    pub fn describe(&self) -> String {
        self.transport.describe()
    }

    pub fn has_outstanding(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Publish `observation`; returns its sequence number.
    ///
    /// # Errors
    ///
    /// * [`DriveError::RequestInFlight`] if the previous request is unresolved.
    /// * [`DriveError::Transport`] if the message could not be handed off; no
    ///   request is outstanding afterwards.
    pub async fn request(&mut self, observation: &Observation) -> Result<u64, DriveError> {
        if let Some(seq) = self.outstanding {
            return Err(DriveError::RequestInFlight { seq });
        }
        self.drain_stale();

        let seq = self.next_seq;
        self.next_seq += 1;
        let payload = encode_observation(seq, self.supervisor, observation)?;
        self.transport.send(payload).await?;
        self.outstanding = Some(seq);
        debug!(seq, "observation sent");
        Ok(seq)
    }

    /// Wait up to `timeout` for the answer to the outstanding request.
    ///
    /// Never fails: timeouts, transport errors and malformed payloads are
    /// logged and reported as `None`.  Without an outstanding request this
    /// returns `None` immediately.
    pub async fn poll(&mut self, timeout: Duration) -> Option<Prediction> {
        self.poll_until(Instant::now() + timeout, timeout).await
    }

    /// Request and poll with `timeout` covering both.
    ///
    /// Cancel-safe: dropping the future leaves at most an outstanding
    /// request, which [`abandon`][Self::abandon] clears.
    ///
    /// # Errors
    ///
    /// The request could not go out: [`DriveError::RequestInFlight`],
    /// [`DriveError::Transport`], or [`DriveError::PredictionTimeout`] when
    /// the hand-off alone used up the deadline.  A request that went out but
    /// got no usable answer is `Ok(None)`.
    pub async fn exchange(
        &mut self,
        observation: &Observation,
        timeout: Duration,
    ) -> Result<Option<Prediction>, DriveError> {
        let deadline = Instant::now() + timeout;
        match timeout_at(deadline, self.request(observation)).await {
            Ok(sent) => {
                sent?;
            }
            Err(_) => {
                self.abandon();
                return Err(timeout_error(timeout));
            }
        }
        Ok(self.poll_until(deadline, timeout).await)
    }

    async fn poll_until(&mut self, deadline: Instant, timeout: Duration) -> Option<Prediction> {
        let seq = self.outstanding?;

        let result = loop {
            let text = match timeout_at(deadline, self.transport.recv()).await {
                Err(_) => {
                    let err = timeout_error(timeout);
                    warn!(seq, error = %err, "no prediction; coasting");
                    break None;
                }
                Ok(Err(err)) => {
                    warn!(seq, error = %err, "predictor transport failed");
                    break None;
                }
                Ok(Ok(text)) => text,
            };
            match decode_prediction(&text) {
                Ok(prediction) => match prediction.seq {
                    Some(echoed) if echoed != seq => {
                        debug!(seq, echoed, "discarding prediction for another observation");
                    }
                    _ => break Some(prediction),
                },
                Err(err) => {
                    warn!(seq, error = %err, "malformed prediction");
                    break None;
                }
            }
        };

        self.outstanding = None;
        result
    }

    /// Forget the outstanding request without waiting for it.  A late answer
    /// will be drained by the next `request`.
    pub fn abandon(&mut self) -> Option<u64> {
        let seq = self.outstanding.take();
        if let Some(seq) = seq {
            debug!(seq, "request abandoned");
        }
        seq
    }

    fn drain_stale(&mut self) {
        let mut dropped = 0usize;
        while let Some(item) = self.transport.try_recv() {
            match item {
                Ok(_) => dropped += 1,
                Err(err) => {
                    debug!(error = %err, "transport error while draining");
                    break;
                }
            }
        }
        if dropped > 0 {
            debug!(dropped, "drained late predictions");
        }
    }
}

fn timeout_error(timeout: Duration) -> DriveError {
    DriveError::PredictionTimeout {
        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    }
}
