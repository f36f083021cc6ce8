//! Stream definition types

use crate::gateway::Filter;
use serde::Serialize;

/// Primary key shared by every remote object
pub const DEFAULT_PRIMARY_KEY: &str = "RECORDNO";

/// Modification-time field used as the incremental cursor
pub const DEFAULT_CURSOR_FIELD: &str = "WHENMODIFIED";

/// Static description of one logical stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamDefinition {
    /// Stream name exposed to callers
    pub name: String,
    /// Remote object name
    pub object: String,
    /// Primary key field
    pub primary_key: String,
    /// Cursor field, `None` for streams read in full every run
    pub cursor_field: Option<String>,
    /// Whether windows filter on the cursor field
    pub supports_incremental: bool,
    /// Fixed filter applied to every query (document type, ...)
    #[serde(skip)]
    pub filter: Option<Filter>,
    /// Detail streams fetched for each record of this stream
    pub children: Vec<StreamDefinition>,
    /// On a child: the field holding the parent's primary key
    pub parent_key_field: Option<String>,
}

impl StreamDefinition {
    /// Incremental stream keyed by `RECORDNO` with a `WHENMODIFIED` cursor
    pub fn new(name: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            object: object.into(),
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            cursor_field: Some(DEFAULT_CURSOR_FIELD.to_string()),
            supports_incremental: true,
            filter: None,
            children: Vec::new(),
            parent_key_field: None,
        }
    }

    /// Read in full every run, without a cursor
    #[must_use]
    pub fn full_refresh_only(mut self) -> Self {
        self.supports_incremental = false;
        self.cursor_field = None;
        self
    }

    /// Set the fixed filter
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Add a child stream
    #[must_use]
    pub fn with_child(mut self, child: StreamDefinition) -> Self {
        self.children.push(child);
        self
    }

    /// Link a child to its parent's primary key
    #[must_use]
    pub fn with_parent_key(mut self, field: impl Into<String>) -> Self {
        self.parent_key_field = Some(field.into());
        self
    }

    /// Cursor field name
    pub fn cursor_field(&self) -> Option<&str> {
        self.cursor_field.as_deref()
    }

    /// Whether windows carry a cursor filter and commit a cursor
    pub fn is_incremental(&self) -> bool {
        self.supports_incremental && self.cursor_field.is_some()
    }

    /// Whether any child streams are declared
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// This stream followed by all descendants, depth-first
    pub fn family(&self) -> Vec<&StreamDefinition> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.family());
        }
        out
    }

    /// Whether `key` names one of the declared child objects
    pub fn is_child_object(&self, key: &str) -> bool {
        self.children.iter().any(|c| c.object == key)
    }
}

/// Streams of one parent/child family chosen for a read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedStream {
    /// Top-level definition that drives the queries
    pub definition: StreamDefinition,
    /// Names of family members whose records are emitted
    pub emitted: Vec<String>,
}

impl SelectedStream {
    /// Select a whole family
    pub fn all(definition: StreamDefinition) -> Self {
        let emitted = definition
            .family()
            .iter()
            .map(|d| d.name.clone())
            .collect();
        Self {
            definition,
            emitted,
        }
    }

    /// Stream name used for state and reporting
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Whether records of the named family member are emitted
    pub fn emits(&self, name: &str) -> bool {
        self.emitted.iter().any(|n| n == name)
    }

    /// Whether child queries are needed at all
    pub fn needs_children(&self) -> bool {
        self.definition
            .family()
            .iter()
            .skip(1)
            .any(|d| self.emits(&d.name))
    }
}
