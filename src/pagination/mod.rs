//! Pagination module
//!
//! # Overview
//!
//! Queries are paged by offset until the number of records received reaches
//! the total the gateway reports, or an empty page arrives. A window is
//! always fetched from its first page; there is no mid-window checkpoint.
//! Streams with child entities query the children of each parent record as
//! soon as it arrives and yield them right after it.

mod fetcher;
mod types;

pub use fetcher::{window_request, OffsetPaginator, QueryPager, WindowFetcher};
pub use types::{FetchedRecord, NextPage, PaginationState};
