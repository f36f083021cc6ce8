//! Engine types
//!
//! Messages yielded during a read and the per-run report.

use crate::error::Result;
use crate::schema::{record_to_json, FieldType, FlatRecord};
use crate::types::{JsonValue, LogLevel};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;

/// Stream of messages returned by a read
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<Message>> + Send>>;

// ============================================================================
// Messages
// ============================================================================

/// A message emitted during sync
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A field of a stream and its current type
    Schema {
        /// Stream name
        stream: String,
        /// Flattened field name
        field: String,
        /// Inferred type
        field_type: FieldType,
    },
    /// One flattened record
    Record {
        /// Stream name
        stream: String,
        /// Field values, coerced to the last reported schema
        data: FlatRecord,
        /// When the record was emitted
        emitted_at: DateTime<Utc>,
    },
    /// Checkpoint carrying the stream's state after a window flush
    State {
        /// Stream (family) name
        stream: String,
        /// Serialized stream state
        data: JsonValue,
    },
    /// Log message
    Log {
        /// Log level
        level: LogLevel,
        /// Log message
        message: String,
    },
    /// Outcome of the whole run, always the last message
    Report(SyncReport),
}

impl Message {
    /// Create a schema message
    pub fn schema(stream: impl Into<String>, field: impl Into<String>, field_type: FieldType) -> Self {
        Self::Schema {
            stream: stream.into(),
            field: field.into(),
            field_type,
        }
    }

    /// Create a record message stamped now
    pub fn record(stream: impl Into<String>, data: FlatRecord) -> Self {
        Self::Record {
            stream: stream.into(),
            data,
            emitted_at: Utc::now(),
        }
    }

    /// Create a state message
    pub fn state(stream: impl Into<String>, data: JsonValue) -> Self {
        Self::State {
            stream: stream.into(),
            data,
        }
    }

    /// Create a log message
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log {
            level,
            message: message.into(),
        }
    }

    /// Create an info log
    pub fn info(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Info, message)
    }

    /// Create a warning log
    pub fn warn(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Warn, message)
    }

    /// Create an error log
    pub fn error(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Error, message)
    }

    /// Check if this is a record message
    pub fn is_record(&self) -> bool {
        matches!(self, Self::Record { .. })
    }

    /// Check if this is a state message
    pub fn is_state(&self) -> bool {
        matches!(self, Self::State { .. })
    }

    /// Check if this is a schema message
    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema { .. })
    }

    /// Check if this is a log message
    pub fn is_log(&self) -> bool {
        matches!(self, Self::Log { .. })
    }

    /// Record data as JSON, for record messages
    pub fn record_json(&self) -> Option<JsonValue> {
        match self {
            Self::Record { data, .. } => Some(record_to_json(data)),
            _ => None,
        }
    }
}

// ============================================================================
// Report
// ============================================================================

/// Where a stream is in its sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    #[default]
    Pending,
    Planning,
    FetchingWindow,
    Flushing,
    Done,
    Failed,
}

/// Final status of one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Succeeded,
    Failed,
    Cancelled,
}

/// Final status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every stream finished
    Succeeded,
    /// Some streams failed, the others finished
    PartiallyFailed,
    /// Every stream failed, or authentication failed
    Failed,
    /// Stopped on request before every stream finished
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::PartiallyFailed => "partially failed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Outcome of one stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamReport {
    /// Stream (family) name
    pub stream: String,
    /// Final status
    pub status: StreamStatus,
    /// Records emitted across all family members
    pub records_emitted: u64,
    /// Windows whose cursor was committed
    pub windows_committed: usize,
    /// Phase reached before finishing
    pub last_phase: Phase,
    /// Failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamReport {
    /// Report for a stream that has not started
    pub fn pending(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            status: StreamStatus::Succeeded,
            records_emitted: 0,
            windows_committed: 0,
            last_phase: Phase::Pending,
            error: None,
        }
    }

    /// Mark finished
    pub fn done(&mut self) {
        self.status = StreamStatus::Succeeded;
        self.last_phase = Phase::Done;
    }

    /// Mark failed; the phase reached is kept
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = StreamStatus::Failed;
        self.error = Some(error.into());
    }

    /// Mark cancelled
    pub fn cancel(&mut self) {
        self.status = StreamStatus::Cancelled;
    }

    /// Check if the stream failed
    pub fn is_failed(&self) -> bool {
        self.status == StreamStatus::Failed
    }
}

/// Outcome of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Overall status
    pub status: RunStatus,
    /// One report per selected stream, in selection order
    pub streams: Vec<StreamReport>,
}

impl SyncReport {
    /// Summarize stream reports.
    ///
    /// `fatal` marks a run aborted by an authentication failure and
    /// `cancelled` one stopped on request.
    pub fn summarize(streams: Vec<StreamReport>, fatal: bool, cancelled: bool) -> Self {
        let failed = streams.iter().filter(|s| s.is_failed()).count();
        let status = if fatal || (failed > 0 && failed == streams.len()) {
            RunStatus::Failed
        } else if cancelled
            && streams
                .iter()
                .any(|s| s.status == StreamStatus::Cancelled)
        {
            RunStatus::Cancelled
        } else if failed > 0 {
            RunStatus::PartiallyFailed
        } else {
            RunStatus::Succeeded
        };
        Self { status, streams }
    }

    /// Names of failed streams
    pub fn failed_streams(&self) -> Vec<&str> {
        self.streams
            .iter()
            .filter(|s| s.is_failed())
            .map(|s| s.stream.as_str())
            .collect()
    }

    /// Report of one stream
    pub fn stream(&self, name: &str) -> Option<&StreamReport> {
        self.streams.iter().find(|s| s.stream == name)
    }

    /// Total records emitted
    pub fn records_emitted(&self) -> u64 {
        self.streams.iter().map(|s| s.records_emitted).sum()
    }
}
