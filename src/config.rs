// Configuration File Support
//
// This module provides configuration file parsing for the QuotaGuard client.
// Supports TOML format with environment variable overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::rate_limit::config::DEFAULT_MAX_QUEUE_SIZE;
use crate::rate_limit::{Profile, RateLimiterConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Admission control settings
    pub rate_limit: RateLimitSettings,

    /// Remote API connection settings
    pub client: ClientSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Admission control settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Quota profile (standard, premium, disabled)
    pub profile: Profile,

    /// Per-second override
    pub requests_per_second: Option<u32>,

    /// Per-day override
    pub requests_per_day: Option<u32>,

    /// Queue requests instead of failing fast
    pub queue_requests: bool,

    /// Bound on pending waiters
    pub max_queue_size: usize,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            profile: Profile::Standard,
            requests_per_second: None,
            requests_per_day: None,
            queue_requests: true,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
        }
    }
}

impl RateLimitSettings {
    /// Controller configuration without hooks
    pub fn to_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            profile: self.profile,
            requests_per_second: self.requests_per_second,
            requests_per_day: self.requests_per_day,
            queue_requests: self.queue_requests,
            max_queue_size: self.max_queue_size,
            on_approaching_limit: None,
            on_limit_exceeded: None,
        }
    }
}

/// Remote API connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientSettings {
    /// API root URL
    pub base_url: String,

    /// Bearer token
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// User-Agent override
    pub user_agent: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: None,
            timeout_secs: 30,
            user_agent: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// If the config file does not exist, returns default configuration
    /// with environment overrides applied.
    pub fn load() -> Result<Self> {
        Self::load_from_path(Self::config_path())
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or
    /// if the result fails validation.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;

            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        // Apply environment variable overrides
        let config = config.apply_env_overrides();

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// `$QUOTAGUARD_CONFIG` if set, else `~/.config/quotaguard/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("QUOTAGUARD_CONFIG") {
            return PathBuf::from(path);
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home)
            .join(".config")
            .join("quotaguard")
            .join("config.toml")
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - QUOTAGUARD_LOG_LEVEL
    /// - QUOTAGUARD_LOG_FORMAT
    /// - QUOTAGUARD_PROFILE
    /// - QUOTAGUARD_REQUESTS_PER_SECOND
    /// - QUOTAGUARD_REQUESTS_PER_DAY
    /// - QUOTAGUARD_QUEUE_REQUESTS
    /// - QUOTAGUARD_MAX_QUEUE_SIZE
    /// - QUOTAGUARD_BASE_URL
    /// - QUOTAGUARD_API_KEY
    fn apply_env_overrides(mut self) -> Self {
        // Logging overrides
        if let Ok(level) = std::env::var("QUOTAGUARD_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("QUOTAGUARD_LOG_FORMAT") {
            self.logging.format = format;
        }

        // Rate limit overrides
        if let Ok(profile) = std::env::var("QUOTAGUARD_PROFILE") {
            if let Ok(profile) = profile.parse() {
                self.rate_limit.profile = profile;
            }
        }
        if let Ok(limit) = std::env::var("QUOTAGUARD_REQUESTS_PER_SECOND") {
            if let Ok(limit) = limit.parse::<u32>() {
                self.rate_limit.requests_per_second = Some(limit);
            }
        }
        if let Ok(limit) = std::env::var("QUOTAGUARD_REQUESTS_PER_DAY") {
            if let Ok(limit) = limit.parse::<u32>() {
                self.rate_limit.requests_per_day = Some(limit);
            }
        }
        if let Ok(queue) = std::env::var("QUOTAGUARD_QUEUE_REQUESTS") {
            self.rate_limit.queue_requests = queue.parse().unwrap_or(self.rate_limit.queue_requests);
        }
        if let Ok(size) = std::env::var("QUOTAGUARD_MAX_QUEUE_SIZE") {
            if let Ok(size) = size.parse::<usize>() {
                self.rate_limit.max_queue_size = size;
            }
        }

        // Client overrides
        if let Ok(url) = std::env::var("QUOTAGUARD_BASE_URL") {
            self.client.base_url = url;
        }
        if let Ok(key) = std::env::var("QUOTAGUARD_API_KEY") {
            self.client.api_key = Some(key);
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        self.rate_limit
            .to_limiter_config()
            .validate()
            .context("Invalid [rate_limit] section")?;

        if self.client.base_url.is_empty() {
            anyhow::bail!("client.base_url must not be empty");
        }
        if self.client.timeout_secs == 0 {
            anyhow::bail!("client.timeout_secs must be > 0");
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}
