//! HTTP Transport
//!
//! reqwest-backed transport for the remote API. Each call is one HTTP
//! transaction: the JSON body goes out, the JSON body comes back.
//!
//! # Example
//!
//! ```ignore
//! let transport = HttpTransport::new("https://api.example.com")?
//!     .with_api_key("secret")
//!     .with_timeout(Duration::from_secs(10))?;
//!
//! let response = transport.execute(ApiRequest::get("/v1/status")).await?;
//! ```

use async_trait::async_trait;
use std::time::Duration;

use super::{ApiRequest, ApiResponse, ClientError, Method, Transport};
use crate::config::ClientSettings;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default User-Agent header
pub const DEFAULT_USER_AGENT: &str = concat!("quotaguard-client/", env!("CARGO_PKG_VERSION"));

/// HTTP transport for the remote API
///
/// # Configuration
///
/// - **base_url**: API root, paths are joined onto it
/// - **timeout**: Request timeout (default: 30 seconds)
/// - **api_key**: Optional bearer token
pub struct HttpTransport {
    /// Reqwest HTTP client
    client: reqwest::Client,

    /// API root
    base_url: reqwest::Url,

    /// Request timeout
    timeout: Duration,

    /// Bearer token sent with every request
    api_key: Option<String>,

    /// User-Agent header
    user_agent: String,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl HttpTransport {
    /// Create a transport for the API rooted at `base_url`
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, ClientError> {
        let base_url = parse_base_url(base_url.as_ref())?;
        let user_agent = DEFAULT_USER_AGENT.to_string();
        let client = build_client(DEFAULT_TIMEOUT, &user_agent)?;

        Ok(Self {
            client,
            base_url,
            timeout: DEFAULT_TIMEOUT,
            api_key: None,
            user_agent,
        })
    }

    /// Create a transport from the `[client]` config section
    pub fn from_settings(settings: &ClientSettings) -> Result<Self, ClientError> {
        let mut transport = Self::new(&settings.base_url)?;
        transport.api_key = settings.api_key.clone();
        if let Some(user_agent) = &settings.user_agent {
            transport.user_agent = user_agent.clone();
        }
        transport.with_timeout(Duration::from_secs(settings.timeout_secs))
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ClientError> {
        self.timeout = timeout;
        // Rebuild client with new timeout
        self.client = build_client(timeout, &self.user_agent)?;
        Ok(self)
    }

    /// Send `api_key` as a bearer token
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Full URL for a request, query string included
    pub fn endpoint(&self, request: &ApiRequest) -> Result<reqwest::Url, ClientError> {
        let mut url = self
            .base_url
            .join(request.path.trim_start_matches('/'))
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", request.path, e)))?;

        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }

        Ok(url)
    }
}

fn parse_base_url(base_url: &str) -> Result<reqwest::Url, ClientError> {
    // A trailing slash makes `join` append instead of replacing the last segment
    let normalized = format!("{}/", base_url.trim_end_matches('/'));
    let url = reqwest::Url::parse(&normalized)
        .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ClientError::InvalidUrl(format!(
            "{}: unsupported scheme '{}'",
            base_url, scheme
        ))),
    }
}

fn build_client(timeout: Duration, user_agent: &str) -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .map_err(ClientError::from)
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    /// Send the request and decode the JSON response
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The URL cannot be built
    /// - No connection can be made ([`ClientError::Connect`])
    /// - The status is not 2xx
    /// - The body is not valid JSON
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let url = self.endpoint(&request)?;

        tracing::debug!("Sending HTTP {} to {}", request.method, url);

        let mut builder = self.client.request(to_reqwest_method(request.method), url);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let http_response = builder.send().await.map_err(|e| {
            if e.is_connect() {
                ClientError::Connect(e.to_string())
            } else {
                ClientError::Request(e)
            }
        })?;

        let status = http_response.status();
        let response_text = http_response.text().await?;

        tracing::debug!("Received HTTP {} ({} bytes)", status, response_text.len());

        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
                body: response_text,
            });
        }

        let body = if response_text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&response_text)?
        };

        Ok(ApiResponse {
            status: status.as_u16(),
            body,
        })
    }
}
