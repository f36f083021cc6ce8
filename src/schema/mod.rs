//! Record flattening and schema inference
//!
//! # Overview
//!
//! Raw entity records arrive as nested, variably shaped mappings. They are
//! flattened into dot-joined scalar fields, text values are typed (integer,
//! number, boolean, timestamp, string), and the per-stream schema widens as
//! new observations arrive.
//!
//! - **Timestamps**: gateway `MM/DD/YYYY HH:MM:SS` values normalize to
//!   RFC 3339 UTC; timestamp-shaped but invalid values stay strings
//! - **Widening**: integer with number gives number, any other conflict
//!   gives string; nulls never change a type
//! - **Child arrays**: arrays of mappings expand into one record per
//!   element, each carrying the parent's scalar fields

mod flatten;
mod inference;
mod types;

pub use flatten::{flatten, infer_type, infer_value, ENTITY_ID_FIELD};
pub use inference::{merge_schema, InferredSchema};
pub use types::{record_to_json, FieldType, FlatRecord, FlatValue};
