//! In-memory gateway for tests

use super::client::Gateway;
use super::types::{FieldDeclaration, Filter, QueryPage, QueryRequest};
use crate::error::{Error, Result};
use crate::partition::parse_datetime;
use crate::types::{entity_key, RawEntityRecord};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

type FailureRule = Box<dyn Fn(&QueryRequest, usize) -> Option<Error> + Send + Sync>;

/// Serves canned records per object and entity, evaluating filters
#[derive(Default)]
pub struct FakeGateway {
    records: HashMap<(String, String), Vec<RawEntityRecord>>,
    fields: HashMap<String, Vec<FieldDeclaration>>,
    entities: Vec<String>,
    page_cap: Option<u32>,
    latency: Option<Duration>,
    fail_when: Option<FailureRule>,
    calls: Mutex<Vec<QueryRequest>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records of an object as seen from an entity (`None` for the root)
    pub fn with_records(
        mut self,
        object: &str,
        entity_id: Option<&str>,
        records: Vec<serde_json::Value>,
    ) -> Self {
        let records = records
            .into_iter()
            .filter_map(|r| r.as_object().cloned())
            .collect();
        self.records
            .insert((object.to_string(), entity_key(entity_id).to_string()), records);
        self
    }

    pub fn with_fields(mut self, object: &str, fields: &[(&str, &str)]) -> Self {
        let fields = fields
            .iter()
            .map(|(name, datatype)| FieldDeclaration {
                name: (*name).to_string(),
                datatype: Some((*datatype).to_string()),
            })
            .collect();
        self.fields.insert(object.to_string(), fields);
        self
    }

    pub fn with_entities(mut self, entities: &[&str]) -> Self {
        self.entities = entities.iter().map(ToString::to_string).collect();
        self
    }

    /// Return at most `cap` records per page regardless of the request
    pub fn with_page_cap(mut self, cap: u32) -> Self {
        self.page_cap = Some(cap);
        self
    }

    /// Delay every query answer
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail a query when the rule returns an error; the rule also sees the
    /// zero-based number of the call
    pub fn fail_when(
        mut self,
        rule: impl Fn(&QueryRequest, usize) -> Option<Error> + Send + Sync + 'static,
    ) -> Self {
        self.fail_when = Some(Box::new(rule));
        self
    }

    /// Query requests received so far
    pub fn calls(&self) -> Vec<QueryRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, object: &str) -> Vec<QueryRequest> {
        self.calls()
            .into_iter()
            .filter(|c| c.object == object)
            .collect()
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn query(&self, request: &QueryRequest) -> Result<QueryPage> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(request.clone());
            calls.len() - 1
        };

        if let Some(rule) = &self.fail_when {
            if let Some(error) = rule(request, call_number) {
                return Err(error);
            }
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let key = (
            request.object.clone(),
            entity_key(request.entity_id.as_deref()).to_string(),
        );
        let matching: Vec<RawEntityRecord> = self
            .records
            .get(&key)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| request.filter.as_ref().map_or(true, |f| matches(f, r)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let size = self
            .page_cap
            .map_or(request.page_size, |cap| cap.min(request.page_size));
        let records = matching
            .iter()
            .skip(request.offset as usize)
            .take(size as usize)
            .cloned()
            .collect();

        Ok(QueryPage {
            records,
            total_count: matching.len() as u64,
        })
    }

    async fn lookup(
        &self,
        object: &str,
        _entity_id: Option<&str>,
    ) -> Result<Vec<FieldDeclaration>> {
        self.fields
            .get(object)
            .cloned()
            .ok_or_else(|| Error::permission(format!("no access to {object}")))
    }

    async fn entity_ids(&self) -> Result<Vec<String>> {
        Ok(self.entities.clone())
    }
}

fn text<'a>(record: &'a RawEntityRecord, field: &str) -> Option<&'a str> {
    record.get(field).and_then(|v| v.as_str())
}

fn compare(record: &RawEntityRecord, field: &str, value: &str) -> Option<Ordering> {
    let actual = text(record, field)?;
    match (parse_datetime(actual), parse_datetime(value)) {
        (Ok(a), Ok(b)) => Some(a.cmp(&b)),
        _ => Some(actual.cmp(value)),
    }
}

fn matches(filter: &Filter, record: &RawEntityRecord) -> bool {
    match filter {
        Filter::And(inner) => inner.iter().all(|f| matches(f, record)),
        Filter::Equal { field, value } => text(record, field) == Some(value.as_str()),
        Filter::GreaterThanOrEqual { field, value } => {
            compare(record, field, value).is_some_and(|o| o != Ordering::Less)
        }
        Filter::LessThan { field, value } => compare(record, field, value) == Some(Ordering::Less),
    }
}
