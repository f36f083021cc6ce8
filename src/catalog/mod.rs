//! Entity catalog
//!
//! Static registry mapping each stream name to its remote object, primary
//! key, cursor field, fixed filter, and child streams.
//!
//! # Overview
//!
//! Child streams (invoice lines under invoices) are fetched per parent
//! record, so reading a child always drives the parent's queries. State
//! for a family is kept under the parent's name.

mod registry;
mod types;

pub use registry::{build_streams, Catalog};
pub use types::{SelectedStream, StreamDefinition, DEFAULT_CURSOR_FIELD, DEFAULT_PRIMARY_KEY};
