//! Source configuration
//!
//! Credentials, gateway location, and the knobs that gate incremental
//! extraction (start date, lookback, slice width, page size, entity
//! selection). Loaded from a JSON or YAML file or from inline JSON.

use crate::error::{Error, Result};
use crate::http::{HttpClientConfig, RateLimiterConfig};
use crate::partition::parse_datetime;
use crate::types::{BackoffType, EntitiesMode};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default gateway endpoint
pub const DEFAULT_API_URL: &str = "https://api.intacct.com/ia/xml/xmlgw.phtml";

/// Server-enforced maximum page size
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Upper bound for `lookback_days` and `slice_step_days`
pub const MAX_DAYS: i64 = 36_500;

// ============================================================================
// Source Config
// ============================================================================

/// Complete source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Web services sender id
    pub sender_id: String,

    /// Web services sender password
    pub sender_password: String,

    /// Company id
    pub company_id: String,

    /// API user id
    pub user_id: String,

    /// API user password
    pub user_password: String,

    /// Gateway endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Earliest modification time to read (RFC 3339 or `MM/DD/YYYY[ HH:MM:SS]`)
    #[serde(default)]
    pub start_date: Option<String>,

    /// Days re-included before the stored cursor on each run
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,

    /// Records per page (server cap 1000)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Width of one sync window in days
    #[serde(default = "default_slice_step_days")]
    pub slice_step_days: i64,

    /// Records sampled per stream during discovery
    #[serde(default = "default_schema_sample_size")]
    pub schema_sample_size: usize,

    /// Entity selection mode
    #[serde(default)]
    pub entities_mode: EntitiesMode,

    /// Entities read when `entities_mode` is `selected`
    #[serde(default)]
    pub entity_ids: Vec<String>,

    /// Document type of order-entry invoices
    #[serde(default = "default_invoice_docparid")]
    pub oe_invoice_docparid: String,

    /// Document type of order-entry sales orders
    #[serde(default = "default_order_docparid")]
    pub oe_order_docparid: String,

    /// HTTP and retry settings
    #[serde(default)]
    pub http: HttpSettings,

    /// Streams read concurrently
    #[serde(default = "default_max_concurrent_streams")]
    pub max_concurrent_streams: usize,

    /// Acquire and reuse an API session per entity
    #[serde(default = "default_true")]
    pub use_sessions: bool,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_lookback_days() -> i64 {
    3
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_slice_step_days() -> i64 {
    7
}

fn default_schema_sample_size() -> usize {
    200
}

fn default_invoice_docparid() -> String {
    "Sales Invoice".to_string()
}

fn default_order_docparid() -> String {
    "Sales Order".to_string()
}

fn default_max_concurrent_streams() -> usize {
    1
}

fn default_true() -> bool {
    true
}

impl SourceConfig {
    /// Load config from a JSON or YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_str(&content)
    }

    /// Parse config from JSON or YAML text
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        // YAML is a superset of JSON, so one parser covers both
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse config from a JSON value
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate required fields and ranges
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("sender_id", &self.sender_id),
            ("sender_password", &self.sender_password),
            ("company_id", &self.company_id),
            ("user_id", &self.user_id),
            ("user_password", &self.user_password),
        ] {
            if value.trim().is_empty() {
                return Err(Error::missing_field(field));
            }
        }

        url::Url::parse(&self.api_url)?;

        if !(0..=MAX_DAYS).contains(&self.lookback_days) {
            return Err(Error::invalid_value(
                "lookback_days",
                format!("must be between 0 and {MAX_DAYS}"),
            ));
        }
        if !(1..=MAX_DAYS).contains(&self.slice_step_days) {
            return Err(Error::invalid_value(
                "slice_step_days",
                format!("must be between 1 and {MAX_DAYS}"),
            ));
        }
        if self.page_size == 0 {
            return Err(Error::invalid_value("page_size", "must be >= 1"));
        }
        if self.max_concurrent_streams == 0 {
            return Err(Error::invalid_value(
                "max_concurrent_streams",
                "must be >= 1",
            ));
        }
        if let Some(start) = &self.start_date {
            parse_datetime(start)
                .map_err(|_| Error::invalid_value("start_date", format!("unparsable: {start}")))?;
        }
        if self.entities_mode == EntitiesMode::Selected
            && self.entity_ids.iter().all(|id| id.trim().is_empty())
        {
            return Err(Error::invalid_value(
                "entity_ids",
                "at least one entity id is required when entities_mode is 'selected'",
            ));
        }
        Ok(())
    }

    /// Configured start date, or 30 days before `now`
    pub fn start_date_or(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.start_date
            .as_deref()
            .and_then(|s| parse_datetime(s).ok())
            .unwrap_or_else(|| now - ChronoDuration::days(30))
    }

    /// Page size clamped to the server cap
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    /// Lookback as a duration
    pub fn lookback(&self) -> ChronoDuration {
        ChronoDuration::days(self.lookback_days.clamp(0, MAX_DAYS))
    }

    /// Slice width as a duration
    pub fn slice_step(&self) -> ChronoDuration {
        ChronoDuration::days(self.slice_step_days.clamp(1, MAX_DAYS))
    }

    /// Selected entity ids with blanks removed
    pub fn selected_entities(&self) -> Vec<String> {
        self.entity_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    /// Build the HTTP client config for the gateway
    pub fn http_client_config(&self) -> HttpClientConfig {
        let http = &self.http;
        HttpClientConfig::builder()
            .timeout(Duration::from_secs(http.timeout_seconds))
            .max_retries(http.max_retries)
            .backoff(
                http.backoff_type,
                Duration::from_millis(http.initial_backoff_ms),
                Duration::from_millis(http.max_backoff_ms),
            )
            .rate_limit(RateLimiterConfig::new(
                http.requests_per_second,
                http.requests_per_second,
            ))
            .build()
    }

    /// Overall bound for one logical gateway request
    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.http.request_deadline_seconds)
    }
}

// ============================================================================
// HTTP Settings
// ============================================================================

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Per-attempt timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Overall bound for one logical request including retries
    #[serde(default = "default_request_deadline")]
    pub request_deadline_seconds: u64,

    /// Maximum retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff strategy
    #[serde(default)]
    pub backoff_type: BackoffType,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_ms")]
    pub max_backoff_ms: u64,

    /// Shared request rate across all streams
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            request_deadline_seconds: default_request_deadline(),
            max_retries: default_max_retries(),
            backoff_type: BackoffType::default(),
            initial_backoff_ms: default_initial_ms(),
            max_backoff_ms: default_max_ms(),
            requests_per_second: default_rps(),
        }
    }
}

fn default_timeout() -> u64 {
    60
}

fn default_request_deadline() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_ms() -> u64 {
    1000
}

fn default_max_ms() -> u64 {
    30_000
}

fn default_rps() -> u32 {
    5
}
