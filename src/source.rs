//! The Intacct source
//!
//! Ties the gateway, catalog and engine together behind the `Connector`
//! trait.

use crate::catalog::{Catalog, StreamDefinition};
use crate::config::{SourceConfig, DEFAULT_API_URL, MAX_DAYS, MAX_PAGE_SIZE};
use crate::connector::{CheckResult, Connector, ConnectorSpec, DiscoveredStream};
use crate::engine::{resolve_entities, MessageStream, SyncEngine};
use crate::error::{Error, Result};
use crate::gateway::{Gateway, GatewayClient, QueryRequest};
use crate::schema::{flatten, FieldType, InferredSchema};
use crate::state::State;
use crate::types::{EntitiesMode, SyncMode};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Objects probed by check until one is readable
const PROBE_OBJECTS: [&str; 3] = ["CUSTOMER", "ARINVOICE", "SODOCUMENT"];

/// Order-entry objects whose definitions check must be able to read
const ORDER_ENTRY_OBJECTS: [&str; 3] = ["SODOCUMENT", "SODOCUMENTENTRY", "SODOCUMENTSUBTOTALS"];

/// Source reading Intacct objects through the XML gateway
pub struct IntacctSource {
    config: SourceConfig,
    gateway: Arc<dyn Gateway>,
    catalog: Catalog,
    cancel: CancellationToken,
}

impl IntacctSource {
    /// Create a source talking to the configured gateway
    pub fn new(config: SourceConfig) -> Result<Self> {
        let gateway = GatewayClient::from_config(&config)?;
        Ok(Self::with_gateway(config, Arc::new(gateway)))
    }

    /// Create a source over an existing gateway
    pub fn with_gateway(config: SourceConfig, gateway: Arc<dyn Gateway>) -> Self {
        let catalog = Catalog::from_config(&config);
        Self {
            config,
            gateway,
            catalog,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop reads when `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Stream catalog
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Source config
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Engine for a read
    pub fn engine(&self) -> SyncEngine {
        SyncEngine::new(Arc::clone(&self.gateway), self.config.clone())
            .with_cancellation(self.cancel.clone())
    }

    // ========================================================================
    // Check
    // ========================================================================

    async fn run_check(&self) -> Result<()> {
        let entities = resolve_entities(self.gateway.as_ref(), &self.config).await?;
        if self.config.entities_mode == EntitiesMode::All && entities.is_empty() {
            return Err(Error::gateway(
                "No accessible entities returned by readEntityDetails",
                None,
            ));
        }
        let probe_entity = entities.into_iter().next();

        let mut denied = None;
        for object in PROBE_OBJECTS {
            let request = QueryRequest::new(object, 1)
                .with_fields(vec!["RECORDNO".to_string()])
                .with_entity(probe_entity.clone());
            match self.gateway.query(&request).await {
                Ok(_) => {
                    denied = None;
                    break;
                }
                Err(e @ Error::Permission { .. }) => {
                    debug!(object, "Probe denied: {e}");
                    denied = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        if let Some(e) = denied {
            return Err(e);
        }

        for object in ORDER_ENTRY_OBJECTS {
            self.gateway.lookup(object, probe_entity.as_deref()).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    /// Entity used for lookups and sampling during discovery
    async fn discovery_entity(&self) -> Option<String> {
        match resolve_entities(self.gateway.as_ref(), &self.config).await {
            Ok(ids) => ids.into_iter().next(),
            Err(e) => {
                warn!("Failed to resolve entities for discovery: {e}");
                None
            }
        }
    }

    /// Schema of a stream: the static minimum, widened with the object's
    /// declared fields and sampled records. Falls back to the static schema
    /// on any failure.
    pub async fn stream_schema(
        &self,
        stream: &StreamDefinition,
        entity_id: Option<&str>,
    ) -> InferredSchema {
        let static_schema = InferredSchema::for_stream(stream);
        match self
            .observed_schema(stream, entity_id, static_schema.clone())
            .await
        {
            Ok(schema) => schema,
            Err(e) => {
                warn!(stream = %stream.name, "Schema discovery failed, using static schema: {e}");
                static_schema
            }
        }
    }

    async fn observed_schema(
        &self,
        stream: &StreamDefinition,
        entity_id: Option<&str>,
        mut schema: InferredSchema,
    ) -> Result<InferredSchema> {
        for declaration in self.gateway.lookup(&stream.object, entity_id).await? {
            let field_type = declaration
                .datatype
                .as_deref()
                .map_or(FieldType::String, FieldType::from_gateway_datatype);
            schema.observe(&declaration.name, Some(field_type));
        }

        let sample_size = self.config.schema_sample_size.min(MAX_PAGE_SIZE as usize) as u32;
        if sample_size > 0 {
            let request = QueryRequest::new(&stream.object, sample_size)
                .with_filter(stream.filter.clone())
                .with_entity(entity_id.map(ToString::to_string));
            let page = self.gateway.query(&request).await?;
            debug!(stream = %stream.name, sampled = page.records.len(), "Sampled records");
            for record in &page.records {
                for flat in flatten(record, stream, entity_id) {
                    schema.observe_record(&flat);
                }
            }
        }

        schema.settle();
        Ok(schema)
    }
}

#[async_trait]
impl Connector for IntacctSource {
    fn spec(&self) -> ConnectorSpec {
        connector_spec()
    }

    async fn check(&self) -> Result<CheckResult> {
        info!("Checking connection");
        match self.run_check().await {
            Ok(()) => Ok(CheckResult::success()),
            Err(e) => {
                warn!("Connection check failed: {e}");
                Ok(CheckResult::failure(e.to_string()))
            }
        }
    }

    async fn discover(&self) -> Result<Vec<DiscoveredStream>> {
        let entity = self.discovery_entity().await;
        let mut streams = Vec::new();

        for stream in self.catalog.all_streams() {
            let schema = self.stream_schema(stream, entity.as_deref()).await;
            let supported_sync_modes = if stream.is_incremental() {
                vec![SyncMode::FullRefresh, SyncMode::Incremental]
            } else {
                vec![SyncMode::FullRefresh]
            };
            streams.push(DiscoveredStream {
                name: stream.name.clone(),
                json_schema: schema.to_json_schema(),
                supported_sync_modes,
                source_defined_cursor: stream.is_incremental(),
                default_cursor_field: stream.cursor_field().map(|f| vec![f.to_string()]),
                source_defined_primary_key: vec![vec![stream.primary_key.clone()]],
            });
        }

        info!(streams = streams.len(), "Discovered streams");
        Ok(streams)
    }

    fn read(&self, streams: &[String], state: State, mode: SyncMode) -> Result<MessageStream> {
        let selection = self.catalog.select(streams)?;
        Ok(self.engine().read(selection, state, mode))
    }
}

impl std::fmt::Debug for IntacctSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntacctSource")
            .field("api_url", &self.config.api_url)
            .field("company_id", &self.config.company_id)
            .field("streams", &self.catalog.all_streams().len())
            .finish_non_exhaustive()
    }
}

/// Connector specification; needs no configuration
pub fn connector_spec() -> ConnectorSpec {
    ConnectorSpec {
        name: "source-intacct".to_string(),
        title: "Sage Intacct".to_string(),
        description: Some(
            "Incremental extraction of ledger, customer, receivables and order-entry records"
                .to_string(),
        ),
        connection_specification: connection_specification(),
    }
}

/// JSON Schema of the source configuration
fn connection_specification() -> serde_json::Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "Sage Intacct Source Spec",
        "type": "object",
        "required": ["sender_id", "sender_password", "company_id", "user_id", "user_password"],
        "additionalProperties": true,
        "properties": {
            "sender_id": {"type": "string", "title": "Sender ID"},
            "sender_password": {"type": "string", "title": "Sender password", "airbyte_secret": true},
            "company_id": {"type": "string", "title": "Company ID"},
            "user_id": {"type": "string", "title": "User ID"},
            "user_password": {"type": "string", "title": "User password", "airbyte_secret": true},
            "api_url": {"type": "string", "default": DEFAULT_API_URL},
            "start_date": {
                "type": "string",
                "description": "RFC 3339 or MM/DD/YYYY[ HH:MM:SS]; defaults to 30 days ago"
            },
            "lookback_days": {"type": "integer", "minimum": 0, "maximum": MAX_DAYS, "default": 3},
            "page_size": {"type": "integer", "minimum": 1, "maximum": MAX_PAGE_SIZE, "default": MAX_PAGE_SIZE},
            "slice_step_days": {"type": "integer", "minimum": 1, "maximum": MAX_DAYS, "default": 7},
            "schema_sample_size": {"type": "integer", "minimum": 0, "default": 200},
            "entities_mode": {"type": "string", "enum": ["all", "selected"], "default": "all"},
            "entity_ids": {"type": "array", "items": {"type": "string"}, "default": []},
            "oe_invoice_docparid": {"type": "string", "default": "Sales Invoice"},
            "oe_order_docparid": {"type": "string", "default": "Sales Order"},
            "max_concurrent_streams": {"type": "integer", "minimum": 1, "default": 1},
            "use_sessions": {"type": "boolean", "default": true},
            "http": {
                "type": "object",
                "properties": {
                    "timeout_seconds": {"type": "integer", "default": 60},
                    "request_deadline_seconds": {"type": "integer", "default": 300},
                    "max_retries": {"type": "integer", "default": 3},
                    "backoff_type": {"type": "string", "enum": ["constant", "linear", "exponential"]},
                    "initial_backoff_ms": {"type": "integer"},
                    "max_backoff_ms": {"type": "integer"},
                    "requests_per_second": {"type": "integer", "default": 5}
                }
            }
        }
    })
}
