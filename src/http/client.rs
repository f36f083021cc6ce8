//! HTTP client with retry and rate limiting
//!
//! Provides the transport used by the gateway client:
//! - Automatic retries with configurable backoff
//! - Rate limiting shared across concurrent callers
//! - Error classification for retry decisions

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::error::{Error, Result};
use crate::types::BackoffType;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout
    pub timeout: Duration,
    /// Maximum number of retries
    pub max_retries: u32,
    /// Initial delay for backoff
    pub initial_backoff: Duration,
    /// Maximum delay for backoff
    pub max_backoff: Duration,
    /// Type of backoff strategy
    pub backoff_type: BackoffType,
    /// Rate limiter configuration
    pub rate_limit: Option<RateLimiterConfig>,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_type: BackoffType::Exponential,
            rate_limit: Some(RateLimiterConfig::default()),
            user_agent: format!("intacct-source/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    /// Create a new config builder
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for HTTP client config
#[derive(Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set max retries
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set backoff configuration
    pub fn backoff(mut self, backoff_type: BackoffType, initial: Duration, max: Duration) -> Self {
        self.config.backoff_type = backoff_type;
        self.config.initial_backoff = initial;
        self.config.max_backoff = max;
        self
    }

    /// Set rate limiter
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    /// Disable rate limiting
    pub fn no_rate_limit(mut self) -> Self {
        self.config.rate_limit = None;
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Build the config
    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

/// HTTP client with retry and rate limiting
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    rate_limiter: Option<RateLimiter>,
}

impl HttpClient {
    /// Create a new HTTP client with custom configuration
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new);

        Ok(Self {
            client,
            config,
            rate_limiter,
        })
    }

    /// Get the client configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// POST an XML document and return the response body
    ///
    /// 429 and 5xx responses, timeouts, and connection failures are retried.
    /// Once the retry budget is spent the last failure is reported as
    /// [`Error::MaxRetriesExceeded`].
    pub async fn post_xml(&self, url: &str, body: &str) -> Result<String> {
        let max_retries = self.config.max_retries;
        let mut attempt = 0;

        loop {
            if let Some(ref limiter) = self.rate_limiter {
                limiter.wait().await;
            }

            let result = self
                .client
                .post(url)
                .header("Content-Type", "application/xml")
                .body(body.to_string())
                .send()
                .await;

            let (error, delay) = match result {
                Ok(response) => match self.classify(response).await {
                    Ok(text) => {
                        debug!("Request succeeded: POST {}", url);
                        return Ok(text);
                    }
                    Err((error, retry_after)) => {
                        let delay = retry_after.unwrap_or_else(|| self.calculate_backoff(attempt));
                        (error, delay)
                    }
                },
                Err(e) if e.is_timeout() => (
                    Error::Timeout {
                        timeout_ms: self.config.timeout.as_millis() as u64,
                    },
                    self.calculate_backoff(attempt),
                ),
                Err(e) => (Error::Http(e), self.calculate_backoff(attempt)),
            };

            if !error.is_retryable() {
                return Err(error);
            }

            if attempt >= max_retries {
                if max_retries == 0 {
                    return Err(error);
                }
                return Err(Error::MaxRetriesExceeded {
                    max_retries,
                    last_error: error.to_string(),
                });
            }

            warn!(
                "Request failed ({}), attempt {}/{}, retrying in {:?}",
                error,
                attempt + 1,
                max_retries + 1,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Turn a response into its body, or an error plus an optional server-requested delay
    async fn classify(
        &self,
        response: Response,
    ) -> std::result::Result<String, (Error, Option<Duration>)> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = extract_retry_after(&response);
            return Err((
                Error::RateLimited {
                    retry_after_seconds: retry_after,
                },
                Some(std::cmp::min(
                    Duration::from_secs(retry_after),
                    self.config.max_backoff,
                )),
            ));
        }

        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(500).collect();
            return Err((Error::http_status(status.as_u16(), body), None));
        }

        response.text().await.map_err(|e| (Error::Http(e), None))
    }

    /// Check if rate limiting is enabled
    pub fn has_rate_limiter(&self) -> bool {
        self.rate_limiter.is_some()
    }

    /// Pacing applied to requests, if any
    pub fn rate_limit(&self) -> Option<&RateLimiterConfig> {
        self.rate_limiter.as_ref().map(RateLimiter::config)
    }

    /// Calculate backoff delay for a given attempt
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        calculate_backoff(
            self.config.backoff_type,
            self.config.initial_backoff,
            self.config.max_backoff,
            attempt,
        )
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

/// Backoff delay for a given attempt, capped at `max`
pub fn calculate_backoff(
    backoff_type: BackoffType,
    initial: Duration,
    max: Duration,
    attempt: u32,
) -> Duration {
    let delay = match backoff_type {
        BackoffType::Constant => initial,
        BackoffType::Linear => initial.saturating_mul(attempt + 1),
        BackoffType::Exponential => {
            let factor = 2u32.saturating_pow(attempt);
            initial.saturating_mul(factor)
        }
    };

    std::cmp::min(delay, max)
}

/// Extract retry-after header value
fn extract_retry_after(response: &Response) -> u64 {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(60)
}
