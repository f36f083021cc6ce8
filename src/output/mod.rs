//! Output module
//!
//! Arrow RecordBatch creation and Parquet file writing.
//!
//! # Overview
//!
//! This module provides utilities for:
//! - Mapping inferred stream schemas to Arrow schemas
//! - Converting flattened records to Arrow RecordBatches
//! - Writing Parquet part files per stream at each checkpoint

mod schema;
mod sink;
mod writer;

pub use schema::{arrow_schema, arrow_type, records_to_arrow};
pub use sink::ParquetSink;
pub use writer::{write_batch_to_parquet, ParquetWriter, ParquetWriterConfig};
