//! Runtime settings for the harvester.
//!
//! Settings come from an optional YAML file. Every key is optional; anything
//! left out falls back to [`Settings::default`], so an empty file is valid.
//!
//! ```yaml
//! api_base_url: https://store.naver.com/sogum/api
//! detail_base_url: https://store.naver.com/restaurants/detail
//! request_timeout_secs: 30
//! max_concurrent_requests: 8
//! max_retries: 3
//! retry_base_delay_ms: 500
//! retry_max_delay_ms: 8000
//! retry_max_jitter_ms: 250
//! ```

use crate::error::{ReviewError, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Endpoints, timeouts and retry budget shared by every source.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Prefix for the three review endpoints (`bookingReviews`, `fsasReviews`, `receiptReviews`).
    pub api_base_url: String,
    /// Business detail page scanned for the booking identifier.
    pub detail_base_url: String,
    /// Per-request timeout; expiry surfaces as a network error.
    pub request_timeout_secs: u64,
    /// Upper bound on simultaneously in-flight requests across all sources.
    pub max_concurrent_requests: usize,
    /// Retries after the first attempt for transient failures.
    pub max_retries: usize,
    /// Backoff before the first retry; doubles on each further attempt.
    pub retry_base_delay_ms: u64,
    /// Ceiling on a single backoff, before jitter is added.
    pub retry_max_delay_ms: u64,
    /// Random extra delay added to each backoff, up to this many milliseconds.
    pub retry_max_jitter_ms: u64,
    /// `User-Agent` header sent with every request. The detail pages serve a
    /// different document to clients that do not look like a browser.
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "https://store.naver.com/sogum/api".to_string(),
            detail_base_url: "https://store.naver.com/restaurants/detail".to_string(),
            request_timeout_secs: 30,
            max_concurrent_requests: 8,
            max_retries: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 8_000,
            retry_max_jitter_ms: 250,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file, or defaults when no path is given.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&str>) -> Result<Self> {
        let settings = match path {
            Some(path) => {
                let raw = tokio::fs::read_to_string(path).await?;
                let settings = Self::from_yaml(&raw)?;
                info!(path, "Loaded settings file");
                settings
            }
            None => {
                info!("No settings file given; using defaults");
                Self::default()
            }
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrent_requests == 0 {
            return Err(ReviewError::Config(
                "max_concurrent_requests must be at least 1".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ReviewError::Config(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        url::Url::parse(&self.api_base_url)?;
        url::Url::parse(&self.detail_base_url)?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    /// Full URL of one review endpoint, e.g. `receiptReviews`.
    pub fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.api_base_url.trim_end_matches('/'), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let settings = Settings::from_yaml("max_retries: 1\nrequest_timeout_secs: 5\n").unwrap();
        assert_eq!(settings.max_retries, 1);
        assert_eq!(settings.request_timeout(), Duration::from_secs(5));
        assert_eq!(settings.max_concurrent_requests, 8);
        assert_eq!(settings.api_base_url, "https://store.naver.com/sogum/api");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let settings = Settings::from_yaml("   \n").unwrap();
        assert_eq!(settings.retry_base_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let settings = Settings::from_yaml("max_concurrent_requests: 0").unwrap();
        assert!(matches!(settings.validate(), Err(ReviewError::Config(_))));
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let settings = Settings::from_yaml("api_base_url: http://localhost:9000/api/").unwrap();
        assert_eq!(
            settings.endpoint("fsasReviews"),
            "http://localhost:9000/api/fsasReviews"
        );
    }
}
