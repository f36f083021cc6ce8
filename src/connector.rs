//! Connector trait
//!
//! The protocol surface a source exposes to its caller: spec, check,
//! discover and read.

use crate::engine::MessageStream;
use crate::error::Result;
use crate::state::State;
use crate::types::{JsonValue, SyncMode};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Connector Spec
// ============================================================================

/// Connector specification returned by spec()
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorSpec {
    /// Connector name
    pub name: String,

    /// Human-readable title
    pub title: String,

    /// Description
    pub description: Option<String>,

    /// JSON Schema of the configuration
    pub connection_specification: JsonValue,
}

// ============================================================================
// Check Result
// ============================================================================

/// Result of a connection check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Whether the check succeeded
    pub success: bool,

    /// Error message if failed
    pub message: Option<String>,
}

impl CheckResult {
    /// Create a successful check result
    pub fn success() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    /// Create a failed check result
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

// ============================================================================
// Discovered Streams
// ============================================================================

/// A stream as reported by discover()
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredStream {
    /// Stream name
    pub name: String,

    /// JSON Schema of the flattened records
    pub json_schema: JsonValue,

    /// Sync modes the stream supports
    pub supported_sync_modes: Vec<SyncMode>,

    /// Whether the cursor is fixed by the source
    pub source_defined_cursor: bool,

    /// Cursor field path
    pub default_cursor_field: Option<Vec<String>>,

    /// Primary key paths
    pub source_defined_primary_key: Vec<Vec<String>>,
}

// ============================================================================
// Connector Trait
// ============================================================================

/// Core trait a source implements
#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the connector specification
    fn spec(&self) -> ConnectorSpec;

    /// Tests if credentials and configuration are valid
    async fn check(&self) -> Result<CheckResult>;

    /// Lists available streams with their schemas
    async fn discover(&self) -> Result<Vec<DiscoveredStream>>;

    /// Reads the named streams (all when empty), starting from `state`
    ///
    /// Returns a stream of messages (schemas, records, checkpoints, logs,
    /// and a final report)
    fn read(&self, streams: &[String], state: State, mode: SyncMode) -> Result<MessageStream>;
}
