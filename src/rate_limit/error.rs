//! Rate Limiting Error Types
//!
//! Admission can fail in a small number of well-defined ways. Each kind is a
//! separate variant so callers can tell a remote-quota problem (back off and
//! retry) apart from a local backlog problem (shed the request).

use std::time::Duration;

/// Errors returned by [`AdmissionController::request_wait`](super::AdmissionController::request_wait)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// No slot is free and queueing is disabled
    #[error("Rate limit exceeded, retry after {retry_after_ms}ms")]
    RateLimitExceeded {
        /// Milliseconds until the next slot is expected to open
        retry_after_ms: u64,
    },

    /// The waiter queue is already at capacity
    #[error("Admission queue is full ({max_queue_size} waiters)")]
    QueueFull {
        /// Configured queue bound
        max_queue_size: usize,
    },

    /// A deadline-bounded wait expired before a slot was granted
    #[error("Gave up waiting for a rate limit slot after {waited_ms}ms")]
    WaitTimeout {
        /// How long the waiter sat in the queue
        waited_ms: u64,
    },

    /// The controller stopped draining before this waiter was granted
    #[error("Admission controller closed before the request was admitted")]
    Closed,
}

impl RateLimitError {
    /// Back-off hint carried by the error, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RateLimitError::RateLimitExceeded { retry_after_ms } => {
                Some(Duration::from_millis(*retry_after_ms))
            }
            _ => None,
        }
    }

    /// Whether the failure came from the remote quota rather than the local backlog
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, RateLimitError::RateLimitExceeded { .. })
    }
}

/// Invalid rate limiter configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A per-second override of zero would never admit anything
    #[error("requests_per_second must be > 0")]
    ZeroSecondLimit,

    /// A per-day override of zero would never admit anything
    #[error("requests_per_day must be > 0")]
    ZeroDayLimit,

    /// Queueing enabled with no room for waiters
    #[error("max_queue_size must be > 0")]
    ZeroQueueSize,

    /// Unknown profile name
    #[error("Unknown rate limit profile: {0}. Must be one of: standard, premium, disabled")]
    UnknownProfile(String),
}
