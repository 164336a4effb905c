//! Rate Limiting and Admission Control
//!
//! Governs a single in-process stream of outbound calls against one remote
//! quota of N requests per second and M requests per day.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   AdmissionController                        │
//! │   can_admit · request_wait · record_admission · status      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │ FIFO waiter  │  │ Drain loop   │  │ Hooks +      │       │
//! │  │ queue        │  │ (one task)   │  │ EventBus     │       │
//! │  └──────────────┘  └──────────────┘  └──────────────┘       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │     QuotaTracker (per-second + per-day windows)      │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod quota;
pub mod status;

pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use config::{Profile, RateLimiterConfig};
pub use controller::{Admission, AdmissionController, APPROACHING_LIMIT_THRESHOLD};
pub use error::{ConfigError, RateLimitError};
pub use events::RateLimitEvent;
pub use quota::{QuotaTracker, WindowMarks};
pub use status::RateLimitStatus;
