//! API Transport Layer
//!
//! This module defines the transport abstraction for calling the remote API
//! and the rate-limited wrapper every outbound call goes through.
//!
//! # Architecture
//!
//! - **Transport** (`Transport`): sends one request, returns one response
//! - **HTTP** (`http_transport`): reqwest-backed transport for the real API
//! - **Rate limiting** (`rate_limited`): wait for admission, dispatch,
//!   give the slot back if the request never left the process
//!
//! Endpoint-specific parameters, schema validation and pagination are the
//! caller's business; the transport moves JSON.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod error;
pub mod http_transport;
pub mod rate_limited;

pub use error::ClientError;
pub use http_transport::HttpTransport;
pub use rate_limited::RateLimitedTransport;

/// HTTP method of an API call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// One outbound API call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub method: Method,

    /// Path relative to the API base URL
    pub path: String,

    /// Query string pairs, in order
    #[serde(default)]
    pub query: Vec<(String, String)>,

    /// JSON body
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Successful API response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// HTTP status code (2xx)
    pub status: u16,

    /// Decoded JSON body; `Null` for empty bodies
    pub body: serde_json::Value,
}

/// Transport trait for API calls
///
/// All transports must implement this trait, so the rate-limited wrapper
/// and tests can work with any of them.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and wait for its response
    ///
    /// Non-2xx responses are returned as [`ClientError::Http`].
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ClientError>;
}
