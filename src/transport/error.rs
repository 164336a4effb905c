//! Client Error Types
//!
//! Local throttling failures stay distinguishable from remote API errors so
//! callers can pick their own back-off strategy.

use crate::rate_limit::RateLimitError;

/// Error types for API calls
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Rejected locally by the admission controller
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    /// The API answered with a non-2xx status
    #[error("HTTP request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    /// No connection could be made; the request never left the process
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Any other transport failure
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The response body was not valid JSON
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Base URL or path did not form a valid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// Whether the request was refused by the local rate limiter
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ClientError::RateLimited(_))
    }

    /// HTTP status for remote errors
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            ClientError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the request may have reached the API and so counts against the quota
    pub fn was_dispatched(&self) -> bool {
        match self {
            ClientError::RateLimited(_) | ClientError::Connect(_) | ClientError::InvalidUrl(_) => {
                false
            }
            ClientError::Request(e) => !e.is_connect() && !e.is_builder(),
            ClientError::Http { .. } | ClientError::Decode(_) => true,
        }
    }
}
