//! [`ControlLoop`] – the per-tick driver.
//!
//! Each tick walks a fixed sequence of phases:
//!
//! 1. **Sampling** – read one [`InputSample`] from the input source.  A
//!    sampling failure skips the whole tick; nothing is sent anywhere.
//! 2. **Computing** – apply gear-button shifts (local control only) and run
//!    [`DeltaComputer::compute`].  The delta is always computed; it is
//!    committed immediately unless override is enabled.
//! 3. **Publishing** (override disabled) – the local commit stands.
//!    **Predicting** (override enabled) – ship an [`Observation`] through the
//!    [`PredictionChannel`] and wait at most `prediction_timeout` for the
//!    answer.
//! 4. **Applying** – merge the prediction via [`OverridePolicy`] (or coast),
//!    push the committed state to the vehicle sink and publish a
//!    [`ControlSnapshot`] on the bus.
//!
//! The loop is the only writer of [`ControlState`].  Every failure is
//! recovered at the tick boundary: a slow or broken predictor makes the
//! vehicle coast, a failed vehicle command is retried with fresh state on
//! the next tick.
//!
//! # Cancellation
//!
//! [`ShutdownHandle::cancel`] stops [`ControlLoop::run`] before the next
//! tick.  If it fires while a tick waits on the predictor, that request is
//! abandoned, not completed, and the tick ends without emitting anything.

use std::sync::Arc;
use std::time::Duration;

use drivelink_hal::{InputSample, InputSource, SensorSource, VehicleSink};
use drivelink_kernel::{
    Arbitration, ComponentHealth, DeltaComputer, GearShift, OverridePolicy, PredictorWatchdog,
};
use drivelink_middleware::{EventBus, PredictionChannel, Topic};
use drivelink_types::{
    ControlDelta, ControlSnapshot, ControlState, DriveError, Event, EventPayload, Observation,
    Prediction, RawCommands,
};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const SOURCE: &str = "drivelink-runtime::control_loop";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Ambient toggles for one [`ControlLoop`].
#[derive(Debug, Clone, PartialEq)]
pub struct ControlLoopConfig {
    /// Hand control authority to the remote predictor.
    pub override_enabled: bool,
    /// Tell the predictor that human corrections supervise it.
    pub supervision_enabled: bool,
    /// Upper bound on the wait for each prediction.
    pub prediction_timeout: Duration,
    /// Target tick rate.
    pub tick_rate_hz: f64,
    /// Sensor snapshots older than this are sent as absent.
    pub max_frame_age: Duration,
    /// Predictor silence after which it is reported degraded.
    pub predictor_silence_limit: Duration,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            override_enabled: false,
            supervision_enabled: false,
            prediction_timeout: Duration::from_millis(20),
            tick_rate_hz: 30.0,
            max_frame_age: Duration::from_millis(200),
            predictor_silence_limit: Duration::from_secs(2),
        }
    }
}

impl ControlLoopConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate_hz)
    }

    /// # Errors
    ///
    /// Returns [`DriveError::Config`] for a non-positive or non-finite tick rate.
    pub fn validate(&self) -> Result<(), DriveError> {
        if !(self.tick_rate_hz.is_finite() && self.tick_rate_hz > 0.0) {
            return Err(DriveError::Config(format!(
                "tick_rate_hz must be a positive number, got {}",
                self.tick_rate_hz
            )));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tick bookkeeping
// ─────────────────────────────────────────────────────────────────────────────

/// Where the loop currently is within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    Sampling,
    Computing,
    Publishing,
    Predicting,
    Applying,
}

/// Result of one completed (or cancelled) tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub tick: u64,
    pub state: ControlState,
    pub delta: ControlDelta,
    pub arbitration: Arbitration,
    pub prediction: Option<Prediction>,
    /// Vehicle command failure, already logged.
    pub sink_error: Option<DriveError>,
    /// Cancellation arrived while waiting on the predictor; nothing emitted.
    pub cancelled: bool,
}

/// Cloneable handle that stops a running [`ControlLoop`].
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Resolves once cancellation is requested.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ControlLoop
// ─────────────────────────────────────────────────────────────────────────────

pub struct ControlLoop {
    config: ControlLoopConfig,
    state: ControlState,
    phase: LoopPhase,
    tick: u64,
    policy: OverridePolicy,
    input: Box<dyn InputSource>,
    vehicle: Arc<dyn VehicleSink>,
    sensors: Arc<dyn SensorSource>,
    channel: Option<PredictionChannel>,
    watchdog: PredictorWatchdog,
    bus: EventBus,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ControlLoop {
    /// # Errors
    ///
    /// Returns [`DriveError::Config`] if the configuration is invalid or
    /// override is enabled without a prediction channel.
    pub fn new(
        config: ControlLoopConfig,
        input: Box<dyn InputSource>,
        vehicle: Arc<dyn VehicleSink>,
        sensors: Arc<dyn SensorSource>,
        mut channel: Option<PredictionChannel>,
        bus: EventBus,
    ) -> Result<Self, DriveError> {
        config.validate()?;
        match (&mut channel, config.override_enabled) {
            (None, true) => {
                return Err(DriveError::Config(
                    "override enabled but no predictor channel configured".into(),
                ));
            }
            (Some(ch), true) => ch.set_supervisor(config.supervision_enabled),
            (Some(ch), false) => {
                warn!(predictor = %ch.describe(), "override disabled; predictor channel unused");
            }
            (None, false) => {}
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        info!(
            input = input.name(),
            vehicle = vehicle.id(),
            override_enabled = config.override_enabled,
            supervision = config.supervision_enabled,
            tick_hz = config.tick_rate_hz,
            "control loop ready"
        );
        Ok(Self {
            policy: OverridePolicy::new(config.override_enabled),
            watchdog: PredictorWatchdog::new(
                config.predictor_silence_limit,
                Instant::now().into_std(),
            ),
            config,
            state: ControlState::default(),
            phase: LoopPhase::Idle,
            tick: 0,
            input,
            vehicle,
            sensors,
            channel,
            bus,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn config(&self) -> &ControlLoopConfig {
        &self.config
    }

    /// Number of ticks that reached the vehicle sink.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    pub fn has_pending_request(&self) -> bool {
        self.channel
            .as_ref()
            .is_some_and(PredictionChannel::has_outstanding)
    }

    // -------------------------------------------------------------------------
    // Driving
    // -------------------------------------------------------------------------

    /// Tick at `tick_rate_hz` until cancelled.  Returns the number of ticks
    /// that reached the vehicle sink.
    pub async fn run(&mut self) -> u64 {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown = self.shutdown_rx.clone();
        let start = self.tick;
        info!(interval = ?self.config.tick_interval(), "control loop running");

        loop {
            tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => break,
                _ = interval.tick() => {}
            }
            match self.tick().await {
                Ok(outcome) if outcome.cancelled => break,
                Ok(_) => {}
                Err(err) => warn!(error = %err, "tick skipped"),
            }
        }

        if let Some(seq) = self.channel.as_mut().and_then(PredictionChannel::abandon) {
            debug!(seq, "discarded in-flight request on shutdown");
        }
        self.phase = LoopPhase::Idle;
        let ticks = self.tick - start;
        info!(ticks, "control loop stopped");
        ticks
    }

    /// Run one tick.
    ///
    /// # Errors
    ///
    /// Only [`DriveError::Input`] escapes: the tick is skipped and the state
    /// is left as it was.  Every other failure is logged and folded into the
    /// returned [`TickOutcome`].
    #[tracing::instrument(name = "tick", skip_all, fields(n = self.tick))]
    pub async fn tick(&mut self) -> Result<TickOutcome, DriveError> {
        // ── Sampling ─────────────────────────────────────────────────────────
        self.phase = LoopPhase::Sampling;
        let sample = match self.input.sample().and_then(InputSample::validate) {
            Ok(sample) => sample,
            Err(err) => {
                warn!(error = %err, "input sampling failed; tick skipped");
                self.alert("input", &err);
                self.phase = LoopPhase::Idle;
                return Err(err);
            }
        };
        let raw = sample.commands();

        // ── Computing ────────────────────────────────────────────────────────
        self.phase = LoopPhase::Computing;
        let override_active = self.policy.is_enabled();
        if !override_active {
            self.apply_gear_buttons(&sample);
        }
        let delta = DeltaComputer::compute(&mut self.state, raw.steering, raw.linear, override_active);
        debug!(?raw, ?delta, "delta computed");

        // ── Publishing / Predicting ──────────────────────────────────────────
        let (arbitration, prediction) = if override_active {
            self.phase = LoopPhase::Predicting;
            let Some(prediction) = self.predict(delta).await else {
                self.phase = LoopPhase::Idle;
                return Ok(TickOutcome {
                    tick: self.tick,
                    state: self.state,
                    delta,
                    arbitration: Arbitration::Coast,
                    prediction: None,
                    sink_error: None,
                    cancelled: true,
                });
            };
            self.phase = LoopPhase::Applying;
            let arbitration =
                self.policy
                    .arbitrate(&mut self.state, &delta, prediction.as_ref(), raw);
            (arbitration, prediction)
        } else {
            self.phase = LoopPhase::Publishing;
            (Arbitration::Local, None)
        };

        // ── Applying ─────────────────────────────────────────────────────────
        self.phase = LoopPhase::Applying;
        let sink_error = match self.vehicle.apply(&self.state).await {
            Ok(()) => None,
            Err(err) => {
                warn!(error = %err, "vehicle command failed; retrying next tick");
                self.alert("vehicle", &err);
                Some(err)
            }
        };
        self.publish_snapshot(delta, raw, arbitration, prediction.as_ref());

        let outcome = TickOutcome {
            tick: self.tick,
            state: self.state,
            delta,
            arbitration,
            prediction,
            sink_error,
            cancelled: false,
        };
        self.tick += 1;
        self.phase = LoopPhase::Idle;
        Ok(outcome)
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    fn apply_gear_buttons(&mut self, sample: &InputSample) {
        for (pressed, shift) in [
            (sample.gear_up, GearShift::Up),
            (sample.gear_down, GearShift::Down),
        ] {
            if pressed && DeltaComputer::shift(&mut self.state, shift) {
                info!(gear = %self.state.gear, "gear shifted by operator");
            }
        }
    }

    /// Request and poll one prediction.
    ///
    /// `None` means cancelled; `Some(None)` means no usable prediction.
    async fn predict(&mut self, delta: ControlDelta) -> Option<Option<Prediction>> {
        let observation = self.observe(delta);
        let timeout = self.config.prediction_timeout;
        let mut shutdown = self.shutdown_rx.clone();
        let channel = self.channel.as_mut()?;

        let exchanged = tokio::select! {
            biased;
            _ = cancelled(&mut shutdown) => None,
            outcome = channel.exchange(&observation, timeout) => Some(outcome),
        };
        let prediction = match exchanged {
            None => {
                channel.abandon();
                info!("cancelled while waiting for prediction");
                return None;
            }
            Some(Ok(prediction)) => prediction,
            Some(Err(err)) => {
                warn!(error = %err, "prediction request failed; coasting");
                self.alert("predictor", &err);
                None
            }
        };

        let now = Instant::now().into_std();
        if prediction.is_some() {
            self.watchdog.heartbeat(now);
        }
        if let Some(health) = self.watchdog.check(now) {
            let healthy = health == ComponentHealth::Healthy;
            if healthy {
                info!("predictor recovered");
            } else {
                warn!(
                    silence_limit = ?self.watchdog.silence_limit(),
                    "predictor silent; vehicle coasting"
                );
            }
            self.publish(Topic::Telemetry, EventPayload::PredictorHealth { healthy });
        }
        Some(prediction)
    }

    fn observe(&self, delta: ControlDelta) -> Observation {
        let now = Instant::now().into_std();
        let max_age = self.config.max_frame_age;
        Observation {
            frame: self
                .sensors
                .latest_frame()
                .and_then(|s| s.fresh(now, max_age)),
            telemetry: self
                .sensors
                .latest_telemetry()
                .and_then(|s| s.fresh(now, max_age)),
            delta,
        }
    }

    fn publish_snapshot(
        &self,
        delta: ControlDelta,
        raw: RawCommands,
        arbitration: Arbitration,
        prediction: Option<&Prediction>,
    ) {
        let battery_mv = self
            .sensors
            .latest_telemetry()
            .and_then(|t| t.value.battery_mv());
        let snapshot = ControlSnapshot {
            tick: self.tick,
            state: self.state,
            delta,
            raw,
            applied_mode: arbitration.applied_mode(),
            coasted: arbitration == Arbitration::Coast,
            confidence_steering: prediction.and_then(|p| p.confidence_steering),
            battery_mv,
        };
        self.publish(Topic::Telemetry, EventPayload::ControlSnapshot(snapshot));
    }

    fn alert(&self, component: &str, err: &DriveError) {
        self.publish(
            Topic::SystemAlerts,
            EventPayload::Fault {
                component: component.to_string(),
                message: err.to_string(),
            },
        );
    }

    fn publish(&self, topic: Topic, payload: EventPayload) {
        if let Err(err) = self.bus.publish_to(topic, Event::new(SOURCE, payload)) {
            debug!(error = %err, ?topic, "bus publish failed");
        }
    }
}
