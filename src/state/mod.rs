//! State management module
//!
//! Handles cursor tracking and checkpointing between runs.
//!
//! # Overview
//!
//! The state module provides:
//! - `State` - committed cursors keyed by stream and then by entity
//! - `StateManager` - file-based persistence with atomic writes
//!
//! A cursor only moves forward once every record of a window has been
//! emitted, so a crash mid-window replays that window on the next run.

mod manager;
mod types;

pub use manager::StateManager;
pub use types::{CursorState, State, StreamState};

#[cfg(test)]
mod manager_tests;
