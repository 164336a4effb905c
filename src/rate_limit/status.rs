//! Status Snapshots
//!
//! Read-only view of the controller for dashboards and logs. Not used for
//! admission decisions.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::config::Profile;

/// Point-in-time throttling state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    /// Active profile
    pub profile: Profile,

    /// Whether a request would be admitted right now
    pub can_make_request: bool,

    /// Requests counted in the current second
    pub requests_this_second: u32,

    /// Per-second limit (`None` = unlimited)
    pub second_limit: Option<u32>,

    /// Requests counted in the current day
    pub requests_this_day: u32,

    /// Per-day limit (`None` = unlimited)
    pub day_limit: Option<u32>,

    /// Pending waiters
    pub queue_size: usize,

    /// Milliseconds until the next admission is possible
    pub retry_after: u64,

    /// When the snapshot was taken (epoch ms)
    pub timestamp_ms: u64,
}

impl RateLimitStatus {
    /// Fraction of the daily quota used, as a percentage
    pub fn day_utilization_percent(&self) -> f64 {
        match self.day_limit {
            Some(limit) if limit > 0 => (self.requests_this_day as f64 / limit as f64) * 100.0,
            _ => 0.0,
        }
    }
}

fn limit_str(limit: Option<u32>) -> String {
    limit.map_or_else(|| "∞".to_string(), |l| l.to_string())
}

impl fmt::Display for RateLimitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}/{} this second, {}/{} today, {} queued",
            self.profile,
            self.requests_this_second,
            limit_str(self.second_limit),
            self.requests_this_day,
            limit_str(self.day_limit),
            self.queue_size,
        )?;
        if !self.can_make_request {
            write!(f, ", retry after {}ms", self.retry_after)?;
        }
        Ok(())
    }
}
