//! Flattened records to Arrow
//!
//! Builds Arrow schemas from inferred stream schemas and converts
//! flattened records into RecordBatches column by column.

use crate::error::{Error, Result};
use crate::schema::{FieldType, FlatRecord, FlatValue, InferredSchema};
use arrow::array::{
    ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder,
    TimestampMicrosecondBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

/// Arrow type of a field type. Timestamps are microseconds in UTC.
pub fn arrow_type(field_type: FieldType) -> DataType {
    match field_type {
        FieldType::String => DataType::Utf8,
        FieldType::Integer => DataType::Int64,
        FieldType::Number => DataType::Float64,
        FieldType::Boolean => DataType::Boolean,
        FieldType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
    }
}

/// Arrow schema of an inferred schema; every field is nullable
pub fn arrow_schema(schema: &InferredSchema) -> Schema {
    let fields: Vec<Field> = schema
        .iter()
        .map(|(name, field_type)| Field::new(name, arrow_type(field_type), true))
        .collect();
    Schema::new(fields)
}

/// Convert flattened records to a RecordBatch.
///
/// Values are coerced to the schema first; a field missing from a record
/// is null.
pub fn records_to_arrow(records: &[FlatRecord], schema: &InferredSchema) -> Result<RecordBatch> {
    let arrow = Arc::new(arrow_schema(schema));
    if records.is_empty() {
        return Ok(RecordBatch::new_empty(arrow));
    }

    let columns: Vec<ArrayRef> = schema
        .iter()
        .map(|(name, field_type)| {
            let values = records.iter().map(|record| record.value_as(name, field_type));
            build_column(values, field_type, records.len())
        })
        .collect();

    RecordBatch::try_new(arrow, columns)
        .map_err(|e| Error::output(format!("Failed to create RecordBatch: {e}")))
}

fn build_column(
    values: impl Iterator<Item = FlatValue>,
    field_type: FieldType,
    capacity: usize,
) -> ArrayRef {
    match field_type {
        FieldType::Integer => {
            let mut builder = Int64Builder::with_capacity(capacity);
            for value in values {
                match value {
                    FlatValue::Integer(i) => builder.append_value(i),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        FieldType::Number => {
            let mut builder = Float64Builder::with_capacity(capacity);
            for value in values {
                match value {
                    FlatValue::Number(n) => builder.append_value(n),
                    FlatValue::Integer(i) => builder.append_value(i as f64),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        FieldType::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(capacity);
            for value in values {
                match value {
                    FlatValue::Boolean(b) => builder.append_value(b),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        FieldType::Timestamp => {
            let mut builder = TimestampMicrosecondBuilder::with_capacity(capacity);
            for value in values {
                match value {
                    FlatValue::Timestamp(ts) => builder.append_value(ts.timestamp_micros()),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish().with_timezone("UTC"))
        }
        FieldType::String => {
            let mut builder = StringBuilder::with_capacity(capacity, capacity * 16);
            for value in values {
                match value.as_text() {
                    Some(text) => builder.append_value(text),
                    None => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
    }
}
