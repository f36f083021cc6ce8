//! # Sage Intacct source
//!
//! Incremental extraction of Intacct objects through the XML gateway.
//!
//! ## Features
//!
//! - **Multi-entity reads**: every entity of the company, or a configured subset
//! - **Windowed incremental sync**: fixed-width windows with a trailing lookback
//! - **Resumable state**: per-stream, per-entity cursors committed after each window
//! - **Flattening**: nested payloads become dotted fields with widening type inference
//! - **Parquet output**: one part file per stream per checkpoint
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use intacct_source::{Connector, IntacctSource, SourceConfig, State, SyncMode};
//!
//! #[tokio::main]
//! async fn main() -> intacct_source::Result<()> {
//!     let config = SourceConfig::from_file("config.yaml")?;
//!     let source = IntacctSource::new(config)?;
//!
//!     let status = source.check().await?;
//!     let streams = source.discover().await?;
//!
//!     let mut messages = source.read(&["customers".into()], State::new(), SyncMode::Incremental)?;
//!     while let Some(msg) = messages.next().await {
//!         // Persist state messages, forward records
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Connector Interface                         │
//! │  spec() → ConnectorSpec  check() → CheckResult  discover()      │
//! │  read(streams, state, mode) → Stream<Message>                   │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌──────────┬───────────┬───────┴───────┬───────────┬─────────────┐
//! │ Gateway  │   HTTP    │   Paginate    │ Partition │   Output    │
//! ├──────────┼───────────┼───────────────┼───────────┼─────────────┤
//! │ Envelope │ POST      │ Offset pages  │ Windows   │ Arrow       │
//! │ Sessions │ Retry     │ Parent/child  │ Lookback  │ Parquet     │
//! │ Entities │ Rate Limit│ Early stop    │ Entities  │             │
//! └──────────┴───────────┴───────────────┴───────────┴─────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(missing_docs)] // TODO: Document enum variants before 1.0 release

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Source configuration
pub mod config;

/// HTTP client with retry and rate limiting
pub mod http;

/// XML gateway transport
pub mod gateway;

/// Stream catalog
pub mod catalog;

/// Window planning
pub mod partition;

/// Paginated fetching per window
pub mod pagination;

/// Flattening and schema inference
pub mod schema;

/// State management and checkpointing
pub mod state;

/// Stream sync orchestration
pub mod engine;

/// Arrow/Parquet output
pub mod output;

/// Connector trait
pub mod connector;

/// The Intacct source
pub mod source;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::SourceConfig;
pub use connector::{CheckResult, Connector, ConnectorSpec, DiscoveredStream};
pub use engine::{Message, MessageStream, RunStatus, SyncEngine, SyncReport};
pub use error::{Error, Result};
pub use source::IntacctSource;
pub use state::{State, StateManager};
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
