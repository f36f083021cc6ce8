//! Execution engine module
//!
//! Stream sync orchestration.
//!
//! # Overview
//!
//! Each selected stream moves through
//! `PENDING → PLANNING → FETCHING_WINDOW → FLUSHING → … → DONE`, per entity:
//!
//! - windows are planned once from the committed cursor
//! - each window is drained completely, flattened, and flushed
//! - only after the flush is the window's end committed and a `State`
//!   message emitted
//!
//! A failing stream stops at its last committed window while the others
//! carry on. An authentication failure aborts every stream.

mod orchestrator;
mod types;

pub use orchestrator::{resolve_entities, SyncEngine};
pub use types::{Message, MessageStream, Phase, RunStatus, StreamReport, StreamStatus, SyncReport};

#[cfg(test)]
mod tests;
