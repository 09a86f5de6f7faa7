//! In-process event bus for control snapshots and recovered faults.
//!
//! Each [`Topic`] is its own [`tokio::sync::broadcast`] lane.  Publishing
//! never waits: a recorder that falls behind loses the oldest events (and is
//! told how many) instead of holding up the control loop.
//!
//! # Topics
//!
//! | Topic | Carries |
//! |---|---|
//! | [`Topic::Telemetry`] | One `ControlSnapshot` per tick, predictor health |
//! | [`Topic::SystemAlerts`] | Recovered faults (input, sink, predictor) |

use drivelink_types::{DriveError, Event};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

/// Events buffered per lane before a lagging subscriber starts losing them.
const LANE_CAPACITY: usize = 256;

/// Routing lanes on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Per-tick control snapshots and predictor health transitions.
    Telemetry,
    /// Faults that were recovered at the tick boundary.
    SystemAlerts,
}

impl Topic {
    pub const ALL: [Topic; 2] = [Topic::Telemetry, Topic::SystemAlerts];

    fn lane(self) -> usize {
        match self {
            Topic::Telemetry => 0,
            Topic::SystemAlerts => 1,
        }
    }
}

/// Handle to the bus.  Clones publish into the same lanes; the lanes close
/// once every clone is dropped.
#[derive(Clone, Debug)]
pub struct EventBus {
    lanes: [broadcast::Sender<Event>; 2],
}

impl EventBus {
    /// Bus whose lanes each buffer `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            lanes: Topic::ALL.map(|_| broadcast::channel(capacity).0),
        }
    }

    /// Hand `event` to every current subscriber of `topic`.
    ///
    /// Returns how many subscribers got it; an unwatched lane yields `Ok(0)`.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, DriveError> {
        let lane = &self.lanes[topic.lane()];
        if lane.receiver_count() == 0 {
            return Ok(0);
        }
        lane.send(event)
            .map_err(|_| DriveError::Channel(format!("{topic:?} lost its last subscriber")))
    }

    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            rx: self.lanes[topic.lane()].subscribe(),
        }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.lanes[topic.lane()].receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(LANE_CAPACITY)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscriber side
// ─────────────────────────────────────────────────────────────────────────────

/// One subscription to one [`Topic`].
pub struct TopicReceiver {
    topic: Topic,
    rx: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Raw receive.  Surfaces `RecvError::Lagged(n)` when `n` events were
    /// overwritten and `RecvError::Closed` once every bus handle is gone.
    pub async fn recv(&mut self) -> Result<Event, RecvError> {
        self.rx.recv().await
    }

    /// Next event, stepping over lag with a warning.  `None` once the bus
    /// is closed.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(topic = ?self.topic, skipped, "bus subscriber fell behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}
