//! [`PredictorWatchdog`] – predictor liveness monitor.
//!
//! The control loop calls [`PredictorWatchdog::heartbeat`] whenever a
//! prediction is accepted and [`PredictorWatchdog::check`] once per tick.
//! When no prediction has arrived within the silence limit the predictor is
//! considered *degraded*; `check` reports each transition exactly once so
//! the caller can raise (or clear) a single alert instead of one per tick.
//!
//! Coasting itself is not the watchdog's business: the vehicle keeps its
//! last state on every missed prediction regardless of health.

use std::time::{Duration, Instant};

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Health state of the remote predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    /// A prediction arrived within the silence limit.
    Healthy,
    /// No prediction within the silence limit.
    TimedOut,
}

// ────────────────────────────────────────────────────────────────────────────
// PredictorWatchdog
// ────────────────────────────────────────────────────────────────────────────

/// Tracks the time of the last accepted prediction.
///
/// # Example
///
/// ```
/// use std::time::{Duration, Instant};
/// use drivelink_kernel::watchdog::{ComponentHealth, PredictorWatchdog};
///
/// let start = Instant::now();
/// let mut wd = PredictorWatchdog::new(Duration::from_secs(1), start);
///
/// assert_eq!(wd.check(start + Duration::from_millis(500)), None);
/// assert_eq!(
///     wd.check(start + Duration::from_secs(2)),
///     Some(ComponentHealth::TimedOut)
/// );
/// // Reported once only.
/// assert_eq!(wd.check(start + Duration::from_secs(3)), None);
/// ```
#[derive(Debug, Clone)]
pub struct PredictorWatchdog {
    silence_limit: Duration,
    last_heartbeat: Instant,
    reported: ComponentHealth,
}

impl PredictorWatchdog {
    /// Create a watchdog that starts healthy at `now`.
    pub fn new(silence_limit: Duration, now: Instant) -> Self {
        Self {
            silence_limit,
            last_heartbeat: now,
            reported: ComponentHealth::Healthy,
        }
    }

    /// Record an accepted prediction at `now`.
    pub fn heartbeat(&mut self, now: Instant) {
        self.last_heartbeat = now;
    }

    /// Health as of `now`, without touching the reported state.
    pub fn health(&self, now: Instant) -> ComponentHealth {
        if now.saturating_duration_since(self.last_heartbeat) <= self.silence_limit {
            ComponentHealth::Healthy
        } else {
            ComponentHealth::TimedOut
        }
    }

    /// Return the new health if it differs from the last reported one.
    pub fn check(&mut self, now: Instant) -> Option<ComponentHealth> {
        let current = self.health(now);
        if current == self.reported {
            return None;
        }
        self.reported = current;
        Some(current)
    }

    pub fn silence_limit(&self) -> Duration {
        self.silence_limit
    }
}
