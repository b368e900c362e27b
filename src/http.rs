//! HTTP fetching with bounded concurrency and exponential backoff.
//!
//! # Architecture
//!
//! - [`Fetch`]: core trait, "GET this URL and give me the body as text"
//! - [`HttpFetcher`]: `reqwest`-backed implementation with a per-request
//!   timeout and a semaphore capping in-flight requests
//! - [`RetryFetch`]: decorator that retries transient failures of any [`Fetch`]
//!
//! # Retry Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..=max_jitter)
//! ```
//!
//! Only [`ReviewError::Network`] and [`ReviewError::UnexpectedStatus`] are
//! retried. When the budget runs out the last error is wrapped in
//! [`ReviewError::RetriesExhausted`].

use crate::config::Settings;
use crate::error::{ReviewError, Result};
use rand::{Rng, rng};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

/// Something that can turn a URL into a response body.
pub trait Fetch {
    /// GET `url` and return the body, failing on transport errors and
    /// non-success status codes.
    async fn get_text(&self, url: &str) -> Result<String>;
}

impl<T: Fetch> Fetch for &T {
    async fn get_text(&self, url: &str) -> Result<String> {
        (**self).get_text(url).await
    }
}

/// `reqwest` client shared by every source of one harvest.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
}

impl HttpFetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .user_agent(settings.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(settings.max_concurrent_requests)),
        })
    }
}

impl fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn get_text(&self, url: &str) -> Result<String> {
        // The semaphore is never closed, so acquire only fails if that changes.
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| ReviewError::Network(format!("request pool closed: {e}")))?;

        let t0 = Instant::now();
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(%status, elapsed_ms = t0.elapsed().as_millis() as u64, "Non-success status");
            return Err(ReviewError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched"
        );
        Ok(body)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`Fetch`] implementation.
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
    max_jitter_ms: u64,
}

impl<T> RetryFetch<T>
where
    T: Fetch,
{
    pub fn new(inner: T, max_retries: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay,
            max_jitter_ms: 250,
        }
    }

    pub fn from_settings(inner: T, settings: &Settings) -> Self {
        Self::new(
            inner,
            settings.max_retries,
            settings.retry_base_delay(),
            settings.retry_max_delay(),
        )
        .with_max_jitter(settings.retry_max_jitter_ms)
    }

    pub fn with_max_jitter(mut self, max_jitter_ms: u64) -> Self {
        self.max_jitter_ms = max_jitter_ms;
        self
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = if self.max_jitter_ms == 0 {
            0
        } else {
            rng().random_range(0..=self.max_jitter_ms)
        };
        delay + Duration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> Fetch for RetryFetch<T>
where
    T: Fetch,
{
    #[instrument(level = "debug", skip(self))]
    async fn get_text(&self, url: &str) -> Result<String> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.get_text(url).await {
                Ok(body) => return Ok(body),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "Fetch exhausted retries"
                        );
                        return Err(ReviewError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "Fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StubFetcher;
    use super::*;

    fn quick_retry(inner: StubFetcher, max_retries: usize) -> RetryFetch<StubFetcher> {
        RetryFetch::new(
            inner,
            max_retries,
            Duration::from_millis(1),
            Duration::from_millis(2),
        )
        .with_max_jitter(0)
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_status() {
        let stub = StubFetcher::new()
            .with_status("http://x/a", 503)
            .with_status("http://x/a", 502)
            .with_body("http://x/a", "ok");
        let fetcher = quick_retry(stub, 3);

        assert_eq!(fetcher.get_text("http://x/a").await.unwrap(), "ok");
        assert_eq!(fetcher.inner.request_count("http://x/a"), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_is_reported() {
        let stub = StubFetcher::new().with_status("http://x/a", 500);
        let fetcher = quick_retry(stub, 2);

        let err = fetcher.get_text("http://x/a").await.unwrap_err();
        match err {
            ReviewError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, ReviewError::UnexpectedStatus { status: 500, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fetcher.inner.request_count("http://x/a"), 3);
    }

    #[test]
    fn test_backoff_is_capped() {
        let fetcher = RetryFetch::new(
            StubFetcher::new(),
            10,
            Duration::from_millis(100),
            Duration::from_millis(300),
        )
        .with_max_jitter(0);

        assert_eq!(fetcher.backoff(1), Duration::from_millis(100));
        assert_eq!(fetcher.backoff(2), Duration::from_millis(200));
        assert_eq!(fetcher.backoff(3), Duration::from_millis(300));
        assert_eq!(fetcher.backoff(9), Duration::from_millis(300));
    }

    #[test]
    fn test_http_fetcher_builds_from_defaults() {
        let fetcher = HttpFetcher::new(&Settings::default()).unwrap();
        assert_eq!(fetcher.permits.available_permits(), 8);
    }

    /// Accepts connections and never answers them.
    async fn silent_server() -> (String, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        (format!("http://{addr}/slow"), handle)
    }

    #[tokio::test]
    async fn test_timeout_maps_to_network_error() {
        let (url, server) = silent_server().await;
        let fetcher = HttpFetcher::new(&Settings {
            request_timeout_secs: 1,
            max_concurrent_requests: 1,
            ..Settings::default()
        })
        .unwrap();

        let t0 = Instant::now();
        let (result, permits_during) = tokio::join!(fetcher.get_text(&url), async {
            sleep(Duration::from_millis(200)).await;
            fetcher.permits.available_permits()
        });

        // The hanging request held the only permit until it timed out.
        assert_eq!(permits_during, 0);
        assert_eq!(fetcher.permits.available_permits(), 1);
        assert!(t0.elapsed() < Duration::from_secs(10));
        match result {
            Err(ReviewError::Network(msg)) => assert!(msg.contains("timed out"), "{msg}"),
            other => panic!("expected a network error, got {other:?}"),
        }
        server.abort();
    }

    #[tokio::test]
    async fn test_http_fetcher_serializes_beyond_permit_count() {
        let (url, server) = silent_server().await;
        let fetcher = HttpFetcher::new(&Settings {
            request_timeout_secs: 1,
            max_concurrent_requests: 2,
            ..Settings::default()
        })
        .unwrap();

        // Three hanging requests against two permits: the third only starts
        // once a permit frees up, so the batch takes two timeout periods.
        let t0 = Instant::now();
        let (a, b, c) = tokio::join!(
            fetcher.get_text(&url),
            fetcher.get_text(&url),
            fetcher.get_text(&url)
        );

        assert!(t0.elapsed() >= Duration::from_millis(1900), "{:?}", t0.elapsed());
        for result in [a, b, c] {
            assert!(matches!(result, Err(ReviewError::Network(_))));
        }
        server.abort();
    }
}
