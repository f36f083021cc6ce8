//! Schema types

use crate::types::JsonValue;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inferred type of a flattened field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Timestamp,
}

impl FieldType {
    /// Widen two observations into a type that holds both. Integer and
    /// number widen to number; any other conflict widens to string.
    pub fn widen(self, other: FieldType) -> FieldType {
        match (self, other) {
            (a, b) if a == b => a,
            (FieldType::Integer, FieldType::Number) | (FieldType::Number, FieldType::Integer) => {
                FieldType::Number
            }
            _ => FieldType::String,
        }
    }

    /// Type name as used in schema messages
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Timestamp => "timestamp",
        }
    }

    /// Map a declared gateway datatype onto a field type
    pub fn from_gateway_datatype(datatype: &str) -> FieldType {
        match datatype.trim().to_ascii_uppercase().as_str() {
            "INTEGER" => FieldType::Integer,
            "DECIMAL" | "CURRENCY" | "NUMBER" | "PERCENT" => FieldType::Number,
            "DATE" | "TIMESTAMP" | "DATETIME" => FieldType::Timestamp,
            "BOOLEAN" => FieldType::Boolean,
            _ => FieldType::String,
        }
    }

    /// JSON Schema property for a nullable field of this type
    pub fn json_schema(self) -> JsonValue {
        match self {
            FieldType::Timestamp => serde_json::json!({
                "type": ["string", "null"],
                "format": "date-time"
            }),
            other => serde_json::json!({ "type": [other.as_str(), "null"] }),
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar value of a flattened record
#[derive(Debug, Clone, PartialEq)]
pub enum FlatValue {
    Null,
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

impl FlatValue {
    /// Type of the value, `None` for null
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            FlatValue::Null => None,
            FlatValue::String(_) => Some(FieldType::String),
            FlatValue::Integer(_) => Some(FieldType::Integer),
            FlatValue::Number(_) => Some(FieldType::Number),
            FlatValue::Boolean(_) => Some(FieldType::Boolean),
            FlatValue::Timestamp(_) => Some(FieldType::Timestamp),
        }
    }

    /// Whether the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, FlatValue::Null)
    }

    /// Text form; timestamps render as RFC 3339 UTC
    pub fn as_text(&self) -> Option<String> {
        match self {
            FlatValue::Null => None,
            FlatValue::String(s) => Some(s.clone()),
            FlatValue::Integer(i) => Some(i.to_string()),
            FlatValue::Number(n) => Some(n.to_string()),
            FlatValue::Boolean(b) => Some(b.to_string()),
            FlatValue::Timestamp(ts) => Some(ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }

    /// Convert to match a (wider) schema type
    pub fn coerce(self, target: FieldType) -> FlatValue {
        match (self, target) {
            (FlatValue::Null, _) => FlatValue::Null,
            (FlatValue::Integer(i), FieldType::Number) => FlatValue::Number(i as f64),
            (value, FieldType::String) if !matches!(value, FlatValue::String(_)) => {
                value.as_text().map_or(FlatValue::Null, FlatValue::String)
            }
            (value, _) => value,
        }
    }

    /// JSON form of the value
    pub fn to_json(&self) -> JsonValue {
        match self {
            FlatValue::Null => JsonValue::Null,
            FlatValue::String(s) => JsonValue::String(s.clone()),
            FlatValue::Integer(i) => JsonValue::from(*i),
            FlatValue::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(JsonValue::Null, JsonValue::Number),
            FlatValue::Boolean(b) => JsonValue::Bool(*b),
            FlatValue::Timestamp(_) => self.as_text().map_or(JsonValue::Null, JsonValue::String),
        }
    }
}

/// A flat mapping of dotted field paths to scalars.
///
/// Values parsed out of gateway text keep that text, so a field widened to
/// string later carries what the gateway sent rather than a re-rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatRecord {
    values: BTreeMap<String, FlatValue>,
    source_text: BTreeMap<String, String>,
}

impl FlatRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field
    pub fn insert(&mut self, field: String, value: FlatValue) {
        self.source_text.remove(&field);
        self.values.insert(field, value);
    }

    /// Set a field parsed from gateway text
    pub fn insert_parsed(&mut self, field: String, value: FlatValue, text: &str) {
        if matches!(value, FlatValue::Null | FlatValue::String(_)) {
            self.source_text.remove(&field);
        } else {
            self.source_text.insert(field.clone(), text.to_string());
        }
        self.values.insert(field, value);
    }

    /// Gateway text a typed value was parsed from
    pub fn source_text(&self, field: &str) -> Option<&str> {
        self.source_text.get(field).map(String::as_str)
    }

    /// A field's value converted to `target`; null when absent
    pub fn value_as(&self, field: &str, target: FieldType) -> FlatValue {
        let Some(value) = self.values.get(field) else {
            return FlatValue::Null;
        };
        if target == FieldType::String && !matches!(value, FlatValue::Null | FlatValue::String(_)) {
            if let Some(text) = self.source_text(field) {
                return FlatValue::String(text.to_string());
            }
        }
        value.clone().coerce(target)
    }

    /// Convert every field that has a target type, keeping source text
    pub fn coerce_with(self, target_of: impl Fn(&str) -> Option<FieldType>) -> FlatRecord {
        let values = self
            .values
            .iter()
            .map(|(field, value)| {
                let value = match target_of(field) {
                    Some(target) => self.value_as(field, target),
                    None => value.clone(),
                };
                (field.clone(), value)
            })
            .collect();
        FlatRecord {
            values,
            source_text: self.source_text,
        }
    }
}

impl std::ops::Deref for FlatRecord {
    type Target = BTreeMap<String, FlatValue>;

    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl FromIterator<(String, FlatValue)> for FlatRecord {
    fn from_iter<I: IntoIterator<Item = (String, FlatValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
            source_text: BTreeMap::new(),
        }
    }
}

impl<'a> IntoIterator for &'a FlatRecord {
    type Item = (&'a String, &'a FlatValue);
    type IntoIter = std::collections::btree_map::Iter<'a, String, FlatValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// JSON object form of a flat record
pub fn record_to_json(record: &FlatRecord) -> JsonValue {
    JsonValue::Object(
        record
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}
