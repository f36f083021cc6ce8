//! Slice planning and gateway datetime handling

use super::types::SyncWindow;
use crate::catalog::StreamDefinition;
use crate::config::SourceConfig;
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, SubsecRound, Utc};
use tracing::debug;

/// Datetime format the gateway uses in filters and record fields
pub const GATEWAY_DATETIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// Splits the time range a stream still has to read into windows
#[derive(Debug, Clone, Copy)]
pub struct SlicePlanner {
    start_date: DateTime<Utc>,
    lookback: Duration,
    step: Duration,
}

impl SlicePlanner {
    /// Create a planner
    pub fn new(start_date: DateTime<Utc>, lookback: Duration, step: Duration) -> Self {
        Self {
            start_date,
            lookback,
            step,
        }
    }

    /// Planner for the configured start date, lookback, and slice width
    pub fn from_config(config: &SourceConfig, now: DateTime<Utc>) -> Self {
        Self::new(
            config.start_date_or(now),
            config.lookback(),
            config.slice_step(),
        )
    }

    /// Configured start date
    pub fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }

    /// Plan the windows left to read for a stream.
    ///
    /// Non-incremental streams get a single `[start_date, now)` window.
    /// Incremental streams start from `max(start_date, cursor - lookback)`
    /// and walk to `now` in steps, clamping the last window. Nothing is
    /// planned when the start is not before `now`.
    pub fn plan(
        &self,
        stream: &StreamDefinition,
        cursor: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Vec<SyncWindow>> {
        // Filters carry whole seconds only
        let now = now.trunc_subsecs(0);
        let start_date = self.start_date.trunc_subsecs(0);

        if !stream.is_incremental() {
            if start_date >= now {
                return Ok(Vec::new());
            }
            return Ok(vec![SyncWindow::new(start_date, now, 0)]);
        }

        if self.step <= Duration::zero() {
            return Err(Error::planning(
                &stream.name,
                format!("slice step must be positive, got {}", self.step),
            ));
        }

        // A lookback reaching past the representable range falls back to the start date
        let effective_start = match cursor {
            Some(cursor) => cursor
                .trunc_subsecs(0)
                .checked_sub_signed(self.lookback)
                .map_or(start_date, |rewound| std::cmp::max(start_date, rewound)),
            None => start_date,
        };

        let mut windows = Vec::new();
        let mut current = effective_start;
        while current < now {
            let end = current
                .checked_add_signed(self.step)
                .map_or(now, |next| std::cmp::min(next, now));
            windows.push(SyncWindow::new(current, end, windows.len()));
            current = end;
        }

        debug!(
            stream = %stream.name,
            windows = windows.len(),
            "Planned from {} to {}",
            effective_start,
            now
        );
        Ok(windows)
    }
}

/// Render a timestamp the way gateway filters expect it
pub fn format_gateway_datetime(dt: DateTime<Utc>) -> String {
    dt.format(GATEWAY_DATETIME_FORMAT).to_string()
}

/// Parse a datetime in RFC 3339, the gateway's `MM/DD/YYYY[ HH:MM:SS]`, or
/// ISO-like formats. Values without an offset are taken as UTC.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let formats = [
        GATEWAY_DATETIME_FORMAT,
        "%m/%d/%Y",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d",
    ];

    for fmt in formats {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ndt.and_utc());
        }
        if let Ok(nd) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(nd.and_time(NaiveTime::MIN).and_utc());
        }
    }

    Err(Error::config(format!("Invalid datetime format: {s}")))
}
