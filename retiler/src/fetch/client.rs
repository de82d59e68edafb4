//! Network retrieval abstraction.
//!
//! [`TileFetcher`] is the seam between the pipeline and the transport:
//! production code uses [`ReqwestFetcher`], tests substitute mocks. The
//! trait deliberately knows nothing about tiles, caching, or cancellation;
//! it turns a URL and headers into bytes.

use super::FetchError;
use bytes::Bytes;
use std::future::Future;
use tracing::{trace, warn};

/// Trait for asynchronous tile retrieval.
///
/// Implementations own transport, TLS, and redirect handling; callers only
/// see the response body or a [`FetchError`].
pub trait TileFetcher: Send + Sync {
    /// Performs one GET request.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to request
    /// * `headers` - Extra request headers as (name, value) pairs
    ///
    /// # Returns
    ///
    /// The response body, or [`FetchError::Network`] for transport failures
    /// and non-success status codes.
    fn fetch(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = Result<Bytes, FetchError>> + Send;
}

/// Default User-Agent string. Some tile servers reject requests without one.
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Real fetcher backed by a pooled async reqwest client.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Creates a fetcher with a 30 second transport timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(30)
    }

    /// Creates a fetcher with a custom transport timeout.
    ///
    /// This bounds a single request on the wire; per-call deadlines and
    /// cancellation are layered on top by the fetch cache.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent(DEFAULT_USER_AGENT)
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| FetchError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl TileFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str, headers: &[(String, String)]) -> Result<Bytes, FetchError> {
        trace!(url, "tile request starting");

        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            warn!(url, error = %e, is_timeout = e.is_timeout(), "tile request failed");
            FetchError::Network(format!("request failed: {e}"))
        })?;

        if !response.status().is_success() {
            warn!(url, status = response.status().as_u16(), "tile request rejected");
            return Err(FetchError::Network(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(format!("failed to read response: {e}")))?;
        trace!(url, bytes = bytes.len(), "tile response body read");
        Ok(bytes)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Mock fetcher returning a canned response, optionally after a delay.
    pub struct MockTileFetcher {
        pub response: Result<Bytes, FetchError>,
        pub delay: Option<Duration>,
        pub calls: AtomicUsize,
    }

    impl MockTileFetcher {
        pub fn ok(body: impl Into<Bytes>) -> Self {
            Self {
                response: Ok(body.into()),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(error: FetchError) -> Self {
            Self {
                response: Err(error),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TileFetcher for MockTileFetcher {
        async fn fetch(
            &self,
            _url: &str,
            _headers: &[(String, String)],
        ) -> Result<Bytes, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.response.clone()
        }
    }

    #[tokio::test]
    async fn test_mock_fetcher_success() {
        let mock = MockTileFetcher::ok(vec![1u8, 2, 3]);
        let body = mock.fetch("http://example.com/0/0/0", &[]).await;
        assert_eq!(body.unwrap(), Bytes::from(vec![1u8, 2, 3]));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_fetcher_error() {
        let mock = MockTileFetcher::failing(FetchError::Network("boom".to_string()));
        let body = mock.fetch("http://example.com/0/0/0", &[]).await;
        assert!(matches!(body, Err(FetchError::Network(_))));
    }
}
