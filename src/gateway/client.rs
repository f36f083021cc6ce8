//! Gateway client
//!
//! Issues authenticated function calls through the retrying HTTP client,
//! caches per-entity API sessions and object field lists, and retries
//! failures the gateway itself reports as transient.

use super::envelope::{build_request, Authentication, Function};
use super::response::{field_declarations, GatewayResponse};
use super::types::{Credentials, FieldDeclaration, QueryPage, QueryRequest, Session};
use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::http::{calculate_backoff, HttpClient};
use crate::types::entity_key;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Operations the extraction engine needs from the remote system
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Fetch one page of an object
    async fn query(&self, request: &QueryRequest) -> Result<QueryPage>;

    /// Fields declared by an object definition
    async fn lookup(&self, object: &str, entity_id: Option<&str>)
        -> Result<Vec<FieldDeclaration>>;

    /// Entity ids of the company, sorted and de-duplicated
    async fn entity_ids(&self) -> Result<Vec<String>>;
}

/// XML gateway client
pub struct GatewayClient {
    http: HttpClient,
    credentials: Credentials,
    api_url: String,
    use_sessions: bool,
    request_deadline: Duration,
    sessions: Mutex<HashMap<String, Session>>,
    field_cache: RwLock<HashMap<(String, String), Vec<String>>>,
}

impl GatewayClient {
    /// Create a client over an existing HTTP client
    pub fn new(http: HttpClient, credentials: Credentials, api_url: impl Into<String>) -> Self {
        Self {
            http,
            credentials,
            api_url: api_url.into(),
            use_sessions: true,
            request_deadline: Duration::from_secs(300),
            sessions: Mutex::new(HashMap::new()),
            field_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Build a client from the source configuration
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let http = HttpClient::with_config(config.http_client_config())?;
        let credentials = Credentials {
            sender_id: config.sender_id.clone(),
            sender_password: config.sender_password.clone(),
            company_id: config.company_id.clone(),
            user_id: config.user_id.clone(),
            user_password: config.user_password.clone(),
        };
        Ok(Self::new(http, credentials, config.api_url.clone())
            .with_sessions(config.use_sessions)
            .with_request_deadline(config.request_deadline()))
    }

    /// Enable or disable session reuse
    #[must_use]
    pub fn with_sessions(mut self, enabled: bool) -> Self {
        self.use_sessions = enabled;
        self
    }

    /// Bound for one logical request including retries
    #[must_use]
    pub fn with_request_deadline(mut self, deadline: Duration) -> Self {
        self.request_deadline = deadline;
        self
    }

    /// Call a function within the request deadline
    async fn call(&self, entity_id: Option<&str>, function: &Function) -> Result<GatewayResponse> {
        match tokio::time::timeout(
            self.request_deadline,
            self.call_with_retry(entity_id, function),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                timeout_ms: self.request_deadline.as_millis() as u64,
            }),
        }
    }

    /// Retry gateway-reported transient failures with backoff
    async fn call_with_retry(
        &self,
        entity_id: Option<&str>,
        function: &Function,
    ) -> Result<GatewayResponse> {
        let config = self.http.config();
        let max_retries = config.max_retries;
        let mut attempt = 0;

        loop {
            match self.call_once(entity_id, function).await {
                Err(Error::Transient { message }) => {
                    if attempt >= max_retries {
                        return Err(Error::MaxRetriesExceeded {
                            max_retries,
                            last_error: message,
                        });
                    }
                    let delay = calculate_backoff(
                        config.backoff_type,
                        config.initial_backoff,
                        config.max_backoff,
                        attempt,
                    );
                    warn!(
                        "{} reported a transient failure ({}), attempt {}/{}, retrying in {:?}",
                        function.name(),
                        message,
                        attempt + 1,
                        max_retries + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// One call, re-authenticating once if a cached session was rejected
    async fn call_once(&self, entity_id: Option<&str>, function: &Function) -> Result<GatewayResponse> {
        if !self.use_sessions {
            return self
                .send(&self.api_url, Authentication::Login { entity_id }, function)
                .await;
        }

        let session = self.session(entity_id).await?;
        match self
            .send(&session.endpoint, Authentication::Session(&session.id), function)
            .await
        {
            Err(Error::Auth { message }) => {
                warn!(
                    "Session for entity {} rejected ({}), re-authenticating",
                    entity_key(entity_id),
                    message
                );
                self.sessions.lock().await.remove(entity_key(entity_id));
                let session = self.session(entity_id).await?;
                self.send(&session.endpoint, Authentication::Session(&session.id), function)
                    .await
            }
            other => other,
        }
    }

    async fn send(
        &self,
        url: &str,
        auth: Authentication<'_>,
        function: &Function,
    ) -> Result<GatewayResponse> {
        let body = build_request(&self.credentials, auth, function)?;
        debug!("Calling {} at {}", function.name(), url);
        let response = self.http.post_xml(url, &body).await?;
        GatewayResponse::parse(&response)
    }

    /// Cached session for an entity, acquired on first use
    async fn session(&self, entity_id: Option<&str>) -> Result<Session> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(entity_key(entity_id)) {
            return Ok(session.clone());
        }

        debug!("Acquiring API session for entity {}", entity_key(entity_id));
        let response = self
            .send(
                &self.api_url,
                Authentication::Login { entity_id },
                &Function::GetApiSession,
            )
            .await?;
        let session = response.session(&self.api_url)?;
        sessions.insert(entity_key(entity_id).to_string(), session.clone());
        Ok(session)
    }

    /// Field names for an object, looked up once per entity
    async fn field_names(&self, object: &str, entity_id: Option<&str>) -> Result<Vec<String>> {
        let key = (object.to_string(), entity_key(entity_id).to_string());
        if let Some(fields) = self.field_cache.read().await.get(&key) {
            return Ok(fields.clone());
        }

        let names: Vec<String> = self
            .lookup(object, entity_id)
            .await?
            .into_iter()
            .map(|f| f.name)
            .collect();
        if names.is_empty() {
            return Err(Error::malformed(format!(
                "lookup returned no fields for {object}"
            )));
        }

        self.field_cache.write().await.insert(key, names.clone());
        Ok(names)
    }
}

#[async_trait]
impl Gateway for GatewayClient {
    async fn query(&self, request: &QueryRequest) -> Result<QueryPage> {
        let entity_id = request.entity_id.as_deref();
        let fields = if request.selects_all() {
            self.field_names(&request.object, entity_id).await?
        } else {
            request.fields.clone()
        };

        debug!(
            object = %request.object,
            offset = request.offset,
            page_size = request.page_size,
            "query {}",
            request.filter.as_ref().map(ToString::to_string).unwrap_or_default()
        );

        let function = Function::Query {
            request: request.clone(),
            fields,
        };
        self.call(entity_id, &function).await?.query_page()
    }

    async fn lookup(
        &self,
        object: &str,
        entity_id: Option<&str>,
    ) -> Result<Vec<FieldDeclaration>> {
        let function = Function::Lookup {
            object: object.to_string(),
        };
        let records = self.call(entity_id, &function).await?.records()?;
        Ok(records.first().map(field_declarations).unwrap_or_default())
    }

    async fn entity_ids(&self) -> Result<Vec<String>> {
        let records = self
            .call(None, &Function::ReadEntityDetails)
            .await?
            .records()?;

        let mut ids: Vec<String> = records
            .iter()
            .filter_map(|record| {
                ["ENTITYID", "LOCATIONID", "ID"].iter().find_map(|key| {
                    record
                        .get(*key)
                        .and_then(|v| v.as_str())
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(ToString::to_string)
                })
            })
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("api_url", &self.api_url)
            .field("credentials", &self.credentials)
            .field("use_sessions", &self.use_sessions)
            .finish_non_exhaustive()
    }
}
