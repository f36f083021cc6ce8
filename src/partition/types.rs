//! Window types

use super::planner::format_gateway_datetime;
use crate::gateway::Filter;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open time range `[start, end)` read as one unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindow {
    /// Inclusive start
    pub start: DateTime<Utc>,
    /// Exclusive end
    pub end: DateTime<Utc>,
    /// Position in the planned sequence
    pub index: usize,
}

impl SyncWindow {
    /// Create a window
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, index: usize) -> Self {
        Self { start, end, index }
    }

    /// Width of the window
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Whether `ts` falls inside `[start, end)`
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }

    /// `field >= start AND field < end` in the gateway's datetime format
    pub fn filter(&self, field: &str) -> Filter {
        Filter::And(vec![
            Filter::greater_or_equal(field, format_gateway_datetime(self.start)),
            Filter::less_than(field, format_gateway_datetime(self.end)),
        ])
    }
}

impl fmt::Display for SyncWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} [{}, {})",
            self.index,
            self.start.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.end.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        )
    }
}
