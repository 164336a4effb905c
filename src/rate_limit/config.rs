//! Rate Limiter Configuration
//!
//! Profiles bundle the remote API's published quotas. Explicit overrides
//! replace the profile's value for one dimension only.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::error::ConfigError;

/// Standard tier limits
pub const STANDARD_REQUESTS_PER_SECOND: u32 = 2;
pub const STANDARD_REQUESTS_PER_DAY: u32 = 1440;

/// Premium tier limits
pub const PREMIUM_REQUESTS_PER_SECOND: u32 = 16;
pub const PREMIUM_REQUESTS_PER_DAY: u32 = 50_000;

/// Default bound on pending waiters
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;

/// Hook fired when few admissions remain: `(remaining, reset_at_epoch_ms)`
pub type ApproachingLimitHook = Arc<dyn Fn(u32, u64) + Send + Sync>;

/// Hook fired when a request is rejected for quota: `(retry_after_ms)`
pub type LimitExceededHook = Arc<dyn Fn(u64) + Send + Sync>;

/// Named bundle of default limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// 2 req/s, 1440 req/day
    #[default]
    Standard,
    /// 16 req/s, 50000 req/day
    Premium,
    /// No limits enforced
    Disabled,
}

impl Profile {
    /// Per-second limit for this profile
    pub fn requests_per_second(&self) -> Option<u32> {
        match self {
            Profile::Standard => Some(STANDARD_REQUESTS_PER_SECOND),
            Profile::Premium => Some(PREMIUM_REQUESTS_PER_SECOND),
            Profile::Disabled => None,
        }
    }

    /// Per-day limit for this profile
    pub fn requests_per_day(&self) -> Option<u32> {
        match self {
            Profile::Standard => Some(STANDARD_REQUESTS_PER_DAY),
            Profile::Premium => Some(PREMIUM_REQUESTS_PER_DAY),
            Profile::Disabled => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Standard => "standard",
            Profile::Premium => "premium",
            Profile::Disabled => "disabled",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(Profile::Standard),
            "premium" => Ok(Profile::Premium),
            "disabled" => Ok(Profile::Disabled),
            other => Err(ConfigError::UnknownProfile(other.to_string())),
        }
    }
}

/// Admission controller configuration
///
/// Immutable once handed to the controller.
///
/// # Example
///
/// ```ignore
/// let config = RateLimiterConfig::new(Profile::Premium)
///     .requests_per_day(10_000)
///     .max_queue_size(20)
///     .on_limit_exceeded(|retry_after_ms| eprintln!("throttled for {retry_after_ms}ms"));
/// ```
#[derive(Clone)]
pub struct RateLimiterConfig {
    /// Named default limits
    pub profile: Profile,

    /// Replaces the profile's per-second limit when set
    pub requests_per_second: Option<u32>,

    /// Replaces the profile's per-day limit when set
    pub requests_per_day: Option<u32>,

    /// Queue requests that cannot be admitted immediately instead of failing fast
    pub queue_requests: bool,

    /// Bound on pending waiters
    pub max_queue_size: usize,

    /// Called with `(remaining, reset_at)` once remaining admissions drop to the threshold
    pub on_approaching_limit: Option<ApproachingLimitHook>,

    /// Called with `retry_after_ms` when a request is rejected for quota
    pub on_limit_exceeded: Option<LimitExceededHook>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            profile: Profile::Standard,
            requests_per_second: None,
            requests_per_day: None,
            queue_requests: true,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            on_approaching_limit: None,
            on_limit_exceeded: None,
        }
    }
}

impl fmt::Debug for RateLimiterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiterConfig")
            .field("profile", &self.profile)
            .field("requests_per_second", &self.requests_per_second)
            .field("requests_per_day", &self.requests_per_day)
            .field("queue_requests", &self.queue_requests)
            .field("max_queue_size", &self.max_queue_size)
            .field("on_approaching_limit", &self.on_approaching_limit.is_some())
            .field("on_limit_exceeded", &self.on_limit_exceeded.is_some())
            .finish()
    }
}

impl RateLimiterConfig {
    /// Create a configuration for the given profile with default queueing
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            ..Self::default()
        }
    }

    /// No limits enforced
    pub fn disabled() -> Self {
        Self::new(Profile::Disabled)
    }

    /// Load the rate limit settings from environment variables
    ///
    /// Unparseable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("QUOTAGUARD_PROFILE") {
            if let Ok(profile) = val.parse() {
                config.profile = profile;
            }
        }

        if let Ok(val) = std::env::var("QUOTAGUARD_REQUESTS_PER_SECOND") {
            if let Ok(limit) = val.parse() {
                config.requests_per_second = Some(limit);
            }
        }

        if let Ok(val) = std::env::var("QUOTAGUARD_REQUESTS_PER_DAY") {
            if let Ok(limit) = val.parse() {
                config.requests_per_day = Some(limit);
            }
        }

        if let Ok(val) = std::env::var("QUOTAGUARD_QUEUE_REQUESTS") {
            config.queue_requests = val.parse().unwrap_or(config.queue_requests);
        }

        if let Ok(val) = std::env::var("QUOTAGUARD_MAX_QUEUE_SIZE") {
            if let Ok(size) = val.parse() {
                config.max_queue_size = size;
            }
        }

        config
    }

    pub fn requests_per_second(mut self, limit: u32) -> Self {
        self.requests_per_second = Some(limit);
        self
    }

    pub fn requests_per_day(mut self, limit: u32) -> Self {
        self.requests_per_day = Some(limit);
        self
    }

    pub fn queue_requests(mut self, enabled: bool) -> Self {
        self.queue_requests = enabled;
        self
    }

    pub fn max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Register the approaching-limit hook
    pub fn on_approaching_limit<F>(mut self, hook: F) -> Self
    where
        F: Fn(u32, u64) + Send + Sync + 'static,
    {
        self.on_approaching_limit = Some(Arc::new(hook));
        self
    }

    /// Register the limit-exceeded hook
    pub fn on_limit_exceeded<F>(mut self, hook: F) -> Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.on_limit_exceeded = Some(Arc::new(hook));
        self
    }

    /// Effective per-second limit. `None` means the dimension never constrains.
    pub fn second_limit(&self) -> Option<u32> {
        match self.profile {
            Profile::Disabled => None,
            profile => self.requests_per_second.or(profile.requests_per_second()),
        }
    }

    /// Effective per-day limit. `None` means the dimension never constrains.
    pub fn day_limit(&self) -> Option<u32> {
        match self.profile {
            Profile::Disabled => None,
            profile => self.requests_per_day.or(profile.requests_per_day()),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.profile == Profile::Disabled
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.requests_per_second == Some(0) {
            return Err(ConfigError::ZeroSecondLimit);
        }
        if self.requests_per_day == Some(0) {
            return Err(ConfigError::ZeroDayLimit);
        }
        if self.queue_requests && self.max_queue_size == 0 {
            return Err(ConfigError::ZeroQueueSize);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RateLimiterConfig::default();
        assert_eq!(config.profile, Profile::Standard);
        assert!(config.queue_requests);
        assert_eq!(config.max_queue_size, DEFAULT_MAX_QUEUE_SIZE);
        assert_eq!(config.second_limit(), Some(2));
        assert_eq!(config.day_limit(), Some(1440));
    }

    #[test]
    fn test_premium_limits() {
        let config = RateLimiterConfig::new(Profile::Premium);
        assert_eq!(config.second_limit(), Some(16));
        assert_eq!(config.day_limit(), Some(50_000));
    }

    #[test]
    fn test_override_replaces_one_dimension() {
        let config = RateLimiterConfig::new(Profile::Standard).requests_per_day(2);
        assert_eq!(config.second_limit(), Some(2));
        assert_eq!(config.day_limit(), Some(2));
    }

    #[test]
    fn test_disabled_voids_all_limits() {
        let config = RateLimiterConfig::disabled();
        assert!(config.is_disabled());
        assert_eq!(config.second_limit(), None);
        assert_eq!(config.day_limit(), None);

        // Overrides do not resurrect limits under Disabled
        let config = RateLimiterConfig::disabled().requests_per_second(5);
        assert_eq!(config.second_limit(), None);
    }

    #[test]
    fn test_validation() {
        assert!(RateLimiterConfig::default().validate().is_ok());
        assert_eq!(
            RateLimiterConfig::default().requests_per_second(0).validate(),
            Err(ConfigError::ZeroSecondLimit)
        );
        assert_eq!(
            RateLimiterConfig::default().requests_per_day(0).validate(),
            Err(ConfigError::ZeroDayLimit)
        );
        assert_eq!(
            RateLimiterConfig::default().max_queue_size(0).validate(),
            Err(ConfigError::ZeroQueueSize)
        );
        // Queue size is irrelevant when queueing is off
        assert!(RateLimiterConfig::default()
            .queue_requests(false)
            .max_queue_size(0)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!("standard".parse::<Profile>(), Ok(Profile::Standard));
        assert_eq!(" Premium ".parse::<Profile>(), Ok(Profile::Premium));
        assert_eq!("DISABLED".parse::<Profile>(), Ok(Profile::Disabled));
        assert!("gold".parse::<Profile>().is_err());
    }

    #[test]
    fn test_profile_serialization() {
        let json = serde_json::to_string(&Profile::Premium).unwrap();
        assert_eq!(json, "\"premium\"");
        let parsed: Profile = serde_json::from_str("\"disabled\"").unwrap();
        assert_eq!(parsed, Profile::Disabled);
    }

    #[test]
    fn test_debug_hides_hooks() {
        let config = RateLimiterConfig::default().on_limit_exceeded(|_| {});
        let debug = format!("{:?}", config);
        assert!(debug.contains("on_limit_exceeded: true"));
        assert!(debug.contains("on_approaching_limit: false"));
    }
}
