//! Schema inference over flattened records

use super::flatten::ENTITY_ID_FIELD;
use super::types::{FieldType, FlatRecord};
use crate::catalog::StreamDefinition;
use crate::types::JsonValue;
use serde::Serialize;
use std::collections::BTreeMap;

/// Observed fields of a stream and their widened types
///
/// A field seen only with null values is tracked without a type until
/// [`InferredSchema::settle`] reports it as string. Fields never disappear
/// and types never narrow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InferredSchema {
    fields: BTreeMap<String, Option<FieldType>>,
}

impl InferredSchema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimal schema every stream starts from: entity id, primary key, and
    /// cursor field
    pub fn for_stream(stream: &StreamDefinition) -> Self {
        let mut schema = Self::new();
        schema.observe(ENTITY_ID_FIELD, Some(FieldType::String));
        schema.observe(&stream.primary_key, Some(FieldType::Integer));
        if let Some(cursor) = stream.cursor_field() {
            schema.observe(cursor, Some(FieldType::Timestamp));
        }
        schema
    }

    /// Record one observation of a field. Returns true when the schema
    /// changed.
    pub fn observe(&mut self, field: &str, observed: Option<FieldType>) -> bool {
        match self.fields.get_mut(field) {
            None => {
                self.fields.insert(field.to_string(), observed);
                true
            }
            Some(existing) => {
                let widened = match (*existing, observed) {
                    (Some(a), Some(b)) => Some(a.widen(b)),
                    (a, b) => a.or(b),
                };
                let changed = widened != *existing;
                *existing = widened;
                changed
            }
        }
    }

    /// Observe every field of a record
    pub fn observe_record(&mut self, record: &FlatRecord) {
        for (field, value) in record {
            self.observe(field, value.field_type());
        }
    }

    /// Widen with every field of another schema
    pub fn merge(&mut self, other: &InferredSchema) {
        for (field, observed) in &other.fields {
            self.observe(field, *observed);
        }
    }

    /// Report fields seen only as null as string
    pub fn settle(&mut self) {
        for observed in self.fields.values_mut() {
            observed.get_or_insert(FieldType::String);
        }
    }

    /// Reported type of a field
    pub fn field_type(&self, field: &str) -> Option<FieldType> {
        self.fields
            .get(field)
            .map(|observed| observed.unwrap_or(FieldType::String))
    }

    /// Fields whose reported type differs from `previous`
    pub fn changes_since(&self, previous: &InferredSchema) -> Vec<(String, FieldType)> {
        self.iter()
            .filter(|(field, field_type)| previous.field_type(field) != Some(*field_type))
            .map(|(field, field_type)| (field.to_string(), field_type))
            .collect()
    }

    /// Fields with their reported types, by name
    pub fn iter(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.unwrap_or(FieldType::String)))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Convert every value of a record to its field's reported type
    pub fn coerce(&self, record: FlatRecord) -> FlatRecord {
        record.coerce_with(|field| self.field_type(field))
    }

    /// JSON Schema object with nullable properties
    pub fn to_json_schema(&self) -> JsonValue {
        let properties: serde_json::Map<String, JsonValue> = self
            .iter()
            .map(|(field, field_type)| (field.to_string(), field_type.json_schema()))
            .collect();
        serde_json::json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": properties,
            "additionalProperties": true
        })
    }
}

/// Add one observation to a schema
pub fn merge_schema(
    mut schema: InferredSchema,
    field: &str,
    observed: Option<FieldType>,
) -> InferredSchema {
    schema.observe(field, observed);
    schema
}
