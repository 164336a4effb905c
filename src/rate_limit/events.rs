//! Admission Events
//!
//! Every decision the controller makes is also published on a broadcast
//! channel so observers do not have to run inside the admission path.
//! Slow subscribers lose the oldest events.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Capacity of the event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Something the admission controller decided or observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RateLimitEvent {
    /// A slot was handed out
    Granted {
        /// Whether the caller waited in the queue
        queued: bool,
        /// Time spent waiting
        waited_ms: u64,
    },

    /// A caller joined the waiter queue
    Queued {
        /// Queue length including the new waiter
        queue_len: usize,
    },

    /// Few admissions remain in the tightest window
    ApproachingLimit {
        remaining: u32,
        reset_at_ms: u64,
    },

    /// A request was rejected for quota
    LimitExceeded { retry_after_ms: u64 },

    /// A request was rejected because the queue was full
    QueueFull { max_queue_size: usize },

    /// A queued waiter gave up before being granted
    Cancelled { waited_ms: u64 },

    /// An unused reservation was returned
    Released,
}

/// Fan-out of [`RateLimitEvent`]s to any number of subscribers
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RateLimitEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish an event; dropped silently when nobody listens
    pub fn emit(&self, event: RateLimitEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RateLimitEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
