//! Slice planning module
//!
//! # Overview
//!
//! A stream's remaining time range is split into contiguous half-open
//! windows no wider than the configured step. The first window reaches back
//! by the lookback before the stored cursor so late edits are re-read.
//! Windows are the unit of work: a cursor only ever advances to the end of a
//! window whose records were all handed to the caller.

mod planner;
mod types;

pub use planner::{format_gateway_datetime, parse_datetime, SlicePlanner, GATEWAY_DATETIME_FORMAT};
pub use types::SyncWindow;
