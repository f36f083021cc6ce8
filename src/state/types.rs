//! State types for tracking sync progress
//!
//! These types are serialized to JSON and persisted between runs. Cursors
//! are kept per stream and per entity:
//!
//! ```json
//! {"streams": {"customers": {"entities": {"E100": {"cursor": "2024-03-08T00:00:00Z"}}}}}
//! ```

use crate::partition::parse_datetime;
use crate::types::ROOT_ENTITY_KEY;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Complete state for the source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// Per-stream state
    #[serde(default)]
    pub streams: BTreeMap<String, StreamState>,
}

impl State {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get state for a stream
    pub fn get_stream(&self, stream: &str) -> Option<&StreamState> {
        self.streams.get(stream)
    }

    /// Get mutable state for a stream, creating if needed
    pub fn get_stream_mut(&mut self, stream: &str) -> &mut StreamState {
        self.streams.entry(stream.to_string()).or_default()
    }

    /// Replace a stream's state
    pub fn set_stream(&mut self, stream: &str, state: StreamState) {
        self.streams.insert(stream.to_string(), state);
    }

    /// Committed cursor of a stream within an entity
    pub fn get_cursor(&self, stream: &str, entity: &str) -> Option<DateTime<Utc>> {
        self.streams.get(stream)?.cursor(entity)
    }

    /// Commit a cursor for a stream within an entity
    pub fn set_cursor(&mut self, stream: &str, entity: &str, cursor: DateTime<Utc>) {
        self.get_stream_mut(stream).set_cursor(entity, cursor);
    }

    /// Forget a stream's cursors
    pub fn clear_stream(&mut self, stream: &str) {
        self.streams.remove(stream);
    }
}

/// State for a single stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamState {
    /// Cursor per entity key (`_root` without an entity)
    #[serde(default)]
    pub entities: BTreeMap<String, CursorState>,

    /// Records emitted for this stream during the run that wrote the state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_emitted: Option<u64>,
}

impl StreamState {
    /// Create a new empty stream state
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor for an entity key
    pub fn cursor(&self, entity: &str) -> Option<DateTime<Utc>> {
        self.entities.get(entity)?.cursor
    }

    /// Set the cursor for an entity key
    pub fn set_cursor(&mut self, entity: &str, cursor: DateTime<Utc>) {
        self.entities
            .insert(entity.to_string(), CursorState::at(cursor));
    }

    /// Cursor of the root entity
    pub fn root_cursor(&self) -> Option<DateTime<Utc>> {
        self.cursor(ROOT_ENTITY_KEY)
    }
}

/// High-water mark of one stream within one entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorState {
    /// End of the last fully flushed window
    #[serde(default, deserialize_with = "deserialize_cursor")]
    pub cursor: Option<DateTime<Utc>>,
}

impl CursorState {
    /// Cursor at a timestamp
    pub fn at(cursor: DateTime<Utc>) -> Self {
        Self {
            cursor: Some(cursor),
        }
    }
}

/// Accept RFC 3339 and the gateway's own datetime format; empty is no cursor
fn deserialize_cursor<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_datetime(s)
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid cursor timestamp: {s}"))),
    }
}
