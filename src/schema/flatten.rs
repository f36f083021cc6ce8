//! Record flattening and value inference

use super::types::{FieldType, FlatRecord, FlatValue};
use crate::catalog::StreamDefinition;
use crate::partition::GATEWAY_DATETIME_FORMAT;
use crate::types::{JsonObject, JsonValue, RawEntityRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

/// Field added to every record with the entity it was read from
pub const ENTITY_ID_FIELD: &str = "entity_id";

/// Integers without leading zeros
static INTEGER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?(0|[1-9][0-9]*)$").unwrap());

/// Decimals without leading zeros
static NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?(0|[1-9][0-9]*)\.[0-9]+$").unwrap());

/// Gateway datetime `MM/DD/YYYY[ HH:MM:SS]`
static GATEWAY_DATETIME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}/\d{2}/\d{4}( \d{2}:\d{2}:\d{2})?$").unwrap());

/// RFC 3339 datetime
static RFC3339_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})$").unwrap()
});

// ============================================================================
// Value Inference
// ============================================================================

/// Convert a raw scalar into a typed flat value
pub fn infer_value(value: &JsonValue) -> FlatValue {
    match value {
        JsonValue::Null => FlatValue::Null,
        JsonValue::Bool(b) => FlatValue::Boolean(*b),
        JsonValue::Number(n) => n
            .as_i64()
            .map(FlatValue::Integer)
            .or_else(|| n.as_f64().map(FlatValue::Number))
            .unwrap_or(FlatValue::Null),
        JsonValue::String(s) => infer_text(s),
        JsonValue::Array(_) | JsonValue::Object(_) => FlatValue::String(value.to_string()),
    }
}

/// Inferred type of a raw value, `None` for null or empty text
pub fn infer_type(value: &JsonValue) -> Option<FieldType> {
    infer_value(value).field_type()
}

fn infer_text(raw: &str) -> FlatValue {
    let s = raw.trim();
    if s.is_empty() {
        return FlatValue::Null;
    }

    if INTEGER_REGEX.is_match(s) {
        if let Ok(i) = s.parse::<i64>() {
            return FlatValue::Integer(i);
        }
    }
    if NUMBER_REGEX.is_match(s) {
        if let Ok(n) = s.parse::<f64>() {
            return FlatValue::Number(n);
        }
    }
    if s.eq_ignore_ascii_case("true") || s == "Y" {
        return FlatValue::Boolean(true);
    }
    if s.eq_ignore_ascii_case("false") || s == "N" {
        return FlatValue::Boolean(false);
    }
    if let Some(ts) = parse_timestamp(s) {
        return FlatValue::Timestamp(ts);
    }

    FlatValue::String(raw.to_string())
}

/// Parse timestamp-shaped text; invalid dates yield `None`
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if GATEWAY_DATETIME_REGEX.is_match(s) {
        if s.len() > 10 {
            return NaiveDateTime::parse_from_str(s, GATEWAY_DATETIME_FORMAT)
                .ok()
                .map(|ndt| ndt.and_utc());
        }
        return NaiveDate::parse_from_str(s, "%m/%d/%Y")
            .ok()
            .map(|d| d.and_time(NaiveTime::MIN).and_utc());
    }
    if RFC3339_REGEX.is_match(s) {
        return DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    }
    None
}

// ============================================================================
// Flattening
// ============================================================================

/// Flatten a raw record into one or more flat records.
///
/// Nested mappings become dot-joined paths. Arrays of scalars are kept as a
/// JSON string. Each array of mappings expands into one record per element
/// carrying the parent's scalar fields; several such arrays add up rather
/// than multiply. Sub-trees holding a declared child object are dropped.
pub fn flatten(
    raw: &RawEntityRecord,
    stream: &StreamDefinition,
    entity_id: Option<&str>,
) -> Vec<FlatRecord> {
    let mut base = FlatRecord::new();
    let mut expansions: Vec<(String, Vec<&JsonObject>)> = Vec::new();

    for (key, value) in raw {
        if stream.is_child_object(key) {
            continue;
        }
        walk(key, value, &mut base, Some(&mut expansions));
    }

    base.insert(
        ENTITY_ID_FIELD.to_string(),
        entity_id.map_or(FlatValue::Null, |id| FlatValue::String(id.to_string())),
    );

    if expansions.is_empty() {
        return vec![base];
    }

    expansions
        .into_iter()
        .flat_map(|(path, elements)| {
            let base = &base;
            elements.into_iter().map(move |element| {
                let mut record = base.clone();
                for (key, value) in element {
                    walk(&format!("{path}.{key}"), value, &mut record, None);
                }
                record
            })
        })
        .collect()
}

/// Flatten one value under `path`. Arrays of mappings are collected into
/// `expansions` when given, otherwise kept as JSON text.
fn walk<'a>(
    path: &str,
    value: &'a JsonValue,
    out: &mut FlatRecord,
    mut expansions: Option<&mut Vec<(String, Vec<&'a JsonObject>)>>,
) {
    match value {
        JsonValue::Object(map) => {
            for (key, nested) in map {
                walk(
                    &format!("{path}.{key}"),
                    nested,
                    out,
                    expansions.as_deref_mut(),
                );
            }
        }
        JsonValue::Array(items) if items.is_empty() => {
            out.insert(path.to_string(), FlatValue::Null);
        }
        JsonValue::Array(items) => {
            let objects: Vec<&JsonObject> = items.iter().filter_map(JsonValue::as_object).collect();
            match expansions {
                Some(expansions) if objects.len() == items.len() => {
                    expansions.push((path.to_string(), objects));
                }
                _ => {
                    out.insert(path.to_string(), FlatValue::String(value.to_string()));
                }
            }
        }
        JsonValue::String(text) => {
            out.insert_parsed(path.to_string(), infer_text(text), text);
        }
        scalar => {
            out.insert(path.to_string(), infer_value(scalar));
        }
    }
}
