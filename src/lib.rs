//! QuotaGuard Client Library
//!
//! This library provides a quota-aware client for remote HTTP APIs that
//! enforce a per-second and a per-day request budget, including the
//! admission controller, the transport layer and configuration loading.

pub mod config;
pub mod metrics;
pub mod rate_limit;
pub mod transport;

pub use rate_limit::{
    Admission, AdmissionController, Profile, RateLimitError, RateLimitStatus, RateLimiterConfig,
};
pub use transport::{ApiRequest, ApiResponse, ClientError, HttpTransport, RateLimitedTransport, Transport};
