//! Pagination types

use crate::types::RawEntityRecord;

/// Result of processing one page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPage {
    /// Request the next page at this offset
    Continue {
        /// Offset of the next page
        offset: u32,
    },
    /// No more pages
    Done,
}

impl NextPage {
    /// Check if this is a done result
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Tracks pagination through one result set
#[derive(Debug, Clone, Default)]
pub struct PaginationState {
    /// Offset of the next request
    pub offset: u32,
    /// Records received so far
    pub total_fetched: u64,
    /// Result size most recently reported by the gateway
    pub total_count: Option<u64>,
    /// Pages requested so far
    pub pages: u32,
    /// Is pagination complete?
    pub done: bool,
}

impl PaginationState {
    /// Create a new pagination state
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark pagination as complete
    pub fn mark_done(&mut self) {
        self.done = true;
    }

    /// Add to total fetched
    pub fn add_fetched(&mut self, count: u64) {
        self.total_fetched += count;
    }
}

/// A record produced while draining a window, tagged with the family
/// member it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedRecord {
    /// Stream name (the parent or one of its children)
    pub stream: String,
    /// Raw record
    pub record: RawEntityRecord,
}

impl FetchedRecord {
    /// Tag a record
    pub fn new(stream: impl Into<String>, record: RawEntityRecord) -> Self {
        Self {
            stream: stream.into(),
            record,
        }
    }
}
