//! Gateway request and response types

use crate::types::RawEntityRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Credentials
// ============================================================================

/// Sender and user credentials presented on every request
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub sender_id: String,
    pub sender_password: String,
    pub company_id: String,
    pub user_id: String,
    pub user_password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("sender_id", &self.sender_id)
            .field("company_id", &self.company_id)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

/// An API session bound to one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Session id presented instead of a login block
    pub id: String,
    /// Endpoint the session was issued for
    pub endpoint: String,
}

// ============================================================================
// Filters
// ============================================================================

/// Query filter over object fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// All inner filters must match
    And(Vec<Filter>),
    /// `field = value`
    Equal { field: String, value: String },
    /// `field >= value`
    GreaterThanOrEqual { field: String, value: String },
    /// `field < value`
    LessThan { field: String, value: String },
}

impl Filter {
    /// `field = value`
    pub fn equal(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equal {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field >= value`
    pub fn greater_or_equal(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::GreaterThanOrEqual {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field < value`
    pub fn less_than(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::LessThan {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Conjunction of filters; nested conjunctions are flattened and a
    /// single clause collapses to itself. Returns `None` for no clauses.
    pub fn all(filters: impl IntoIterator<Item = Filter>) -> Option<Filter> {
        let mut clauses = Vec::new();
        for filter in filters {
            match filter {
                Filter::And(inner) => clauses.extend(inner),
                other => clauses.push(other),
            }
        }
        match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(Filter::And(clauses)),
        }
    }

    /// Gateway element name of the operator
    pub(crate) fn operator_tag(&self) -> &'static str {
        match self {
            Filter::And(_) => "and",
            Filter::Equal { .. } => "equalto",
            Filter::GreaterThanOrEqual { .. } => "greaterthanorequalto",
            Filter::LessThan { .. } => "lessthan",
        }
    }
}

/// Textual query expression, with single quotes doubled inside values
impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (field, op, value) = match self {
            Filter::And(inner) => {
                for (i, filter) in inner.iter().enumerate() {
                    if i > 0 {
                        write!(f, " AND ")?;
                    }
                    write!(f, "{filter}")?;
                }
                return Ok(());
            }
            Filter::Equal { field, value } => (field, "=", value),
            Filter::GreaterThanOrEqual { field, value } => (field, ">=", value),
            Filter::LessThan { field, value } => (field, "<", value),
        };
        write!(f, "{field} {op} '{}'", value.replace('\'', "''"))
    }
}

// ============================================================================
// Query
// ============================================================================

/// One page request against an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// Remote object name (e.g. `CUSTOMER`)
    pub object: String,
    /// Fields to select; empty or `*` selects every declared field
    pub fields: Vec<String>,
    /// Optional filter
    pub filter: Option<Filter>,
    /// Field to order by so offsets stay stable across pages
    pub order_by: Option<String>,
    /// Zero-based offset of the first record
    pub offset: u32,
    /// Records per page
    pub page_size: u32,
    /// Entity (location) the request runs in
    pub entity_id: Option<String>,
}

impl QueryRequest {
    /// Create a request for the first page of an object
    pub fn new(object: impl Into<String>, page_size: u32) -> Self {
        Self {
            object: object.into(),
            fields: vec!["*".to_string()],
            filter: None,
            order_by: None,
            offset: 0,
            page_size,
            entity_id: None,
        }
    }

    /// Set the filter
    #[must_use]
    pub fn with_filter(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter;
        self
    }

    /// Set the selected fields
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    /// Set the ordering field
    #[must_use]
    pub fn with_order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    /// Set the entity
    #[must_use]
    pub fn with_entity(mut self, entity_id: Option<String>) -> Self {
        self.entity_id = entity_id;
        self
    }

    /// Set the offset
    #[must_use]
    pub fn at_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Whether the field list asks for every declared field
    pub fn selects_all(&self) -> bool {
        self.fields.is_empty() || self.fields.iter().any(|f| f == "*")
    }
}

/// One page of results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    /// Records on this page
    pub records: Vec<RawEntityRecord>,
    /// Size of the full result for the filter
    pub total_count: u64,
}

/// A field declared by an object definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDeclaration {
    /// Field name
    pub name: String,
    /// Declared gateway datatype (e.g. `INTEGER`, `DECIMAL`, `TIMESTAMP`)
    pub datatype: Option<String>,
}
