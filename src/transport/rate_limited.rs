//! Rate-Limited Transport
//!
//! Wraps any [`Transport`] with the admission contract:
//!
//! ```text
//! admission = controller.request_wait()      // may suspend or fail
//! result    = transport.execute(request)
//! if the request never left the process:
//!     admission.release()                    // slot goes to the next waiter
//! ```
//!
//! The slot is counted when it is granted, so concurrent callers cannot
//! over-admit between the wait and the dispatch.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::{ApiRequest, ApiResponse, ClientError, Transport};
use crate::rate_limit::{AdmissionController, RateLimitStatus};

/// Transport that waits for an admission slot before every call
#[derive(Debug, Clone)]
pub struct RateLimitedTransport<T> {
    inner: T,
    limiter: AdmissionController,
    wait_timeout: Option<Duration>,
}

impl<T: Transport> RateLimitedTransport<T> {
    pub fn new(inner: T, limiter: AdmissionController) -> Self {
        Self {
            inner,
            limiter,
            wait_timeout: None,
        }
    }

    /// Give up on a queued wait after `timeout`
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    pub fn limiter(&self) -> &AdmissionController {
        &self.limiter
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Current throttling state
    pub fn status(&self) -> RateLimitStatus {
        self.limiter.status()
    }

    /// GET `path` and return the decoded body
    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, ClientError> {
        let request = query
            .iter()
            .fold(ApiRequest::get(path), |req, (k, v)| req.with_query(*k, *v));
        Ok(self.execute(request).await?.body)
    }

    /// POST `body` to `path` and return the decoded body
    pub async fn post(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        Ok(self.execute(ApiRequest::post(path, body)).await?.body)
    }
}

#[async_trait]
impl<T: Transport> Transport for RateLimitedTransport<T> {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let admission = match self.wait_timeout {
            Some(timeout) => self.limiter.request_wait_timeout(timeout).await?,
            None => self.limiter.request_wait().await?,
        };

        if admission.was_queued() {
            tracing::debug!(
                "Admitted {} {} after {:?} in queue",
                request.method,
                request.path,
                admission.waited()
            );
        }

        let result = self.inner.execute(request).await;

        if let Err(err) = &result {
            if !err.was_dispatched() {
                tracing::debug!("Request not dispatched ({}), releasing slot", err);
                admission.release();
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::{Profile, RateLimitError, RateLimiterConfig};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Transport that answers every request with a fixed outcome
    struct StaticTransport {
        calls: Arc<AtomicUsize>,
        refuse: bool,
    }

    #[async_trait]
    impl Transport for StaticTransport {
        async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.refuse {
                return Err(ClientError::Connect("connection refused".to_string()));
            }
            Ok(ApiResponse {
                status: 200,
                body: json!({ "path": request.path }),
            })
        }
    }

    fn transport(
        config: RateLimiterConfig,
        refuse: bool,
    ) -> (RateLimitedTransport<StaticTransport>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = StaticTransport {
            calls: Arc::clone(&calls),
            refuse,
        };
        let limiter = AdmissionController::new(config).unwrap();
        (RateLimitedTransport::new(inner, limiter), calls)
    }

    #[tokio::test]
    async fn test_get_counts_admission() {
        let (client, calls) = transport(RateLimiterConfig::new(Profile::Premium), false);

        let body = client.get("/v1/items", &[("page", "1")]).await.unwrap();
        assert_eq!(body["path"], "/v1/items");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.status().requests_this_day, 1);
    }

    #[tokio::test]
    async fn test_rejection_skips_transport() {
        let config = RateLimiterConfig::new(Profile::Standard)
            .requests_per_day(1)
            .queue_requests(false);
        let (client, calls) = transport(config, false);

        client.post("/v1/items", json!({})).await.unwrap();
        let err = client.get("/v1/items", &[]).await.unwrap_err();

        assert!(err.is_rate_limited());
        assert!(matches!(
            err,
            ClientError::RateLimited(RateLimitError::RateLimitExceeded { .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_releases_slot() {
        let (client, calls) = transport(RateLimiterConfig::new(Profile::Standard), true);

        let err = client.get("/v1/items", &[]).await.unwrap_err();
        assert!(matches!(err, ClientError::Connect(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let status = client.status();
        assert_eq!(status.requests_this_second, 0);
        assert_eq!(status.requests_this_day, 0);
    }

    #[tokio::test]
    async fn test_disabled_limiter_passes_through() {
        let (client, calls) = transport(RateLimiterConfig::disabled(), false);

        for _ in 0..50 {
            client.get("/v1/ping", &[]).await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 50);
        assert_eq!(client.status().requests_this_second, 0);
    }
}
