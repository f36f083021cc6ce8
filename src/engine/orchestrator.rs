//! Stream sync orchestration

use super::types::{Message, MessageStream, Phase, StreamReport, SyncReport};
use crate::catalog::{SelectedStream, StreamDefinition};
use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::gateway::Gateway;
use crate::pagination::{FetchedRecord, WindowFetcher};
use crate::partition::{SlicePlanner, SyncWindow};
use crate::schema::{flatten, FlatRecord, InferredSchema};
use crate::state::{State, StreamState};
use crate::types::{entity_key, EntitiesMode, SyncMode};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Messages buffered between the sync task and the reader
const CHANNEL_CAPACITY: usize = 1024;

type Sender = mpsc::Sender<Result<Message>>;

/// How a stream sync ended early
enum Halt {
    Cancelled,
    Failed(Error),
}

/// Drives the sync of selected streams against a gateway
#[derive(Clone)]
pub struct SyncEngine {
    gateway: Arc<dyn Gateway>,
    config: Arc<SourceConfig>,
    cancel: CancellationToken,
    /// Aborts sibling streams after an authentication failure
    abort: CancellationToken,
    now: Option<DateTime<Utc>>,
}

impl SyncEngine {
    /// Create an engine over a shared gateway
    pub fn new(gateway: Arc<dyn Gateway>, config: SourceConfig) -> Self {
        let cancel = CancellationToken::new();
        Self {
            gateway,
            config: Arc::new(config),
            abort: cancel.child_token(),
            cancel,
            now: None,
        }
    }

    /// Stop when `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.abort = token.child_token();
        self.cancel = token;
        self
    }

    /// Plan against a fixed current time instead of the clock
    #[must_use]
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Token that stops the run
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Source config
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Read the selected streams, starting from `state`.
    ///
    /// The run happens on a spawned task; messages arrive in order per
    /// stream, and a `Report` is always the last message.
    pub fn read(&self, selection: Vec<SelectedStream>, state: State, mode: SyncMode) -> MessageStream {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let engine = self.clone();
        let names: Vec<String> = selection.iter().map(|s| s.name().to_string()).collect();

        tokio::spawn(async move {
            let run_tx = tx.clone();
            let run = tokio::spawn(async move { engine.run(selection, state, mode, &run_tx).await });
            let report = match run.await {
                Ok(report) => report,
                Err(e) => {
                    error!("Sync task ended abnormally: {e}");
                    let reports = names
                        .iter()
                        .map(|name| {
                            let mut report = StreamReport::pending(name);
                            report.last_phase = Phase::Failed;
                            report.fail(format!("Sync task ended abnormally: {e}"));
                            report
                        })
                        .collect();
                    SyncReport::summarize(reports, false, false)
                }
            };
            let _ = tx.send(Ok(Message::Report(report))).await;
        });

        Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|message| (message, rx))
        }))
    }

    async fn run(
        &self,
        selection: Vec<SelectedStream>,
        state: State,
        mode: SyncMode,
        tx: &Sender,
    ) -> SyncReport {
        let now = self.now.unwrap_or_else(Utc::now);
        info!(streams = selection.len(), ?mode, "Starting read");

        let entities = match self.entity_scope().await {
            Ok(entities) => entities,
            Err(e) => {
                error!("Failed to resolve entities: {e}");
                self.emit(tx, Message::error(format!("Failed to resolve entities: {e}")))
                    .await;
                let reports = selection
                    .iter()
                    .map(|s| {
                        let mut report = StreamReport::pending(s.name());
                        report.fail(e.to_string());
                        report
                    })
                    .collect();
                return SyncReport::summarize(reports, e.is_fatal(), false);
            }
        };

        let planner = SlicePlanner::from_config(&self.config, now);
        let concurrency = self.config.max_concurrent_streams.max(1);

        let mut reports: Vec<(usize, StreamReport)> =
            futures::stream::iter(selection.into_iter().enumerate().map(|(i, selected)| {
                let initial = match mode {
                    SyncMode::Incremental => state.get_stream(selected.name()).cloned(),
                    SyncMode::FullRefresh => None,
                };
                let (planner, entities) = (&planner, &entities);
                async move {
                    let report = self
                        .sync_stream(&selected, initial.unwrap_or_default(), planner, entities, now, tx)
                        .await;
                    (i, report)
                }
            }))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        reports.sort_by_key(|(i, _)| *i);
        let reports: Vec<StreamReport> = reports.into_iter().map(|(_, r)| r).collect();

        let fatal = self.abort.is_cancelled() && !self.cancel.is_cancelled();
        let report = SyncReport::summarize(reports, fatal, self.cancel.is_cancelled());
        info!(
            status = %report.status,
            records = report.records_emitted(),
            "Finished read"
        );
        report
    }

    /// Entities to read, `[None]` when the company has none
    async fn entity_scope(&self) -> Result<Vec<Option<String>>> {
        let ids = resolve_entities(self.gateway.as_ref(), &self.config).await?;
        if ids.is_empty() {
            return Ok(vec![None]);
        }
        Ok(ids.into_iter().map(Some).collect())
    }

    /// Sync one stream family across every entity
    async fn sync_stream(
        &self,
        selected: &SelectedStream,
        mut stream_state: StreamState,
        planner: &SlicePlanner,
        entities: &[Option<String>],
        now: DateTime<Utc>,
        tx: &Sender,
    ) -> StreamReport {
        let name = selected.name().to_string();
        let mut report = StreamReport::pending(&name);
        info!(stream = %name, "Starting stream");
        self.emit(tx, Message::info(format!("Starting sync for stream: {name}")))
            .await;

        let mut schemas = StreamSchemas::new(selected);
        for message in schemas.initial_messages() {
            self.emit(tx, message).await;
        }

        for entity in entities {
            let entity = entity.as_deref();
            let result = self
                .sync_entity(
                    selected,
                    entity,
                    &mut stream_state,
                    &mut schemas,
                    planner,
                    now,
                    &mut report,
                    tx,
                )
                .await;

            match result {
                Ok(()) => {}
                Err(Halt::Cancelled) => {
                    warn!(stream = %name, "Stream cancelled");
                    self.emit(tx, Message::warn(format!("Sync cancelled for stream: {name}")))
                        .await;
                    report.cancel();
                    return report;
                }
                Err(Halt::Failed(e)) => {
                    let e = match e {
                        e if e.is_fatal() => {
                            self.abort.cancel();
                            e
                        }
                        e @ Error::Planning { .. } => e,
                        e => Error::stream_fetch(&name, e.to_string()),
                    };
                    error!(stream = %name, entity = ?entity, phase = ?report.last_phase, "{e}");
                    self.emit(tx, Message::error(e.to_string())).await;
                    report.last_phase = Phase::Failed;
                    report.fail(e.to_string());
                    return report;
                }
            }
        }

        report.done();
        info!(
            stream = %name,
            records = report.records_emitted,
            windows = report.windows_committed,
            "Completed stream"
        );
        self.emit(
            tx,
            Message::info(format!(
                "Completed sync for {name}: {} records in {} windows",
                report.records_emitted, report.windows_committed
            )),
        )
        .await;
        report
    }

    /// Plan and sync the windows of one entity, committing after each flush
    #[allow(clippy::too_many_arguments)]
    async fn sync_entity(
        &self,
        selected: &SelectedStream,
        entity: Option<&str>,
        stream_state: &mut StreamState,
        schemas: &mut StreamSchemas,
        planner: &SlicePlanner,
        now: DateTime<Utc>,
        report: &mut StreamReport,
        tx: &Sender,
    ) -> std::result::Result<(), Halt> {
        let definition = &selected.definition;
        let key = entity_key(entity);

        report.last_phase = Phase::Planning;
        let windows = planner
            .plan(definition, stream_state.cursor(key), now)
            .map_err(Halt::Failed)?;
        debug!(stream = %definition.name, entity = key, windows = windows.len(), "Planned windows");

        for window in &windows {
            if self.abort.is_cancelled() {
                return Err(Halt::Cancelled);
            }

            report.last_phase = Phase::FetchingWindow;
            let fetched = tokio::select! {
                biased;
                () = self.abort.cancelled() => return Err(Halt::Cancelled),
                fetched = self.fetch_window(selected, window, entity) => fetched.map_err(Halt::Failed)?,
            };

            report.last_phase = Phase::Flushing;
            let emitted = self
                .flush_window(selected, entity, fetched, schemas, tx)
                .await;
            report.records_emitted += emitted;

            if definition.is_incremental() {
                stream_state.set_cursor(key, window.end);
            }
            stream_state.records_emitted = Some(report.records_emitted);
            let data = serde_json::to_value(&*stream_state).map_err(|e| Halt::Failed(e.into()))?;
            self.emit(tx, Message::state(&definition.name, data)).await;
            report.windows_committed += 1;

            debug!(
                stream = %definition.name,
                entity = key,
                window = %window,
                records = emitted,
                "Committed window"
            );
        }

        Ok(())
    }

    /// Drain every record of a window
    async fn fetch_window(
        &self,
        selected: &SelectedStream,
        window: &SyncWindow,
        entity: Option<&str>,
    ) -> Result<Vec<FetchedRecord>> {
        let mut fetcher = WindowFetcher::new(
            self.gateway.as_ref(),
            &selected.definition,
            window,
            entity,
            self.config.effective_page_size(),
        );
        if !selected.needs_children() {
            fetcher = fetcher.without_children();
        }
        fetcher.collect().await
    }

    /// Flatten, widen the schema, and emit the window's records. Returns
    /// the number of records emitted.
    async fn flush_window(
        &self,
        selected: &SelectedStream,
        entity: Option<&str>,
        fetched: Vec<FetchedRecord>,
        schemas: &mut StreamSchemas,
        tx: &Sender,
    ) -> u64 {
        let family = selected.definition.family();
        let mut flushed: Vec<(String, FlatRecord)> = Vec::new();

        for FetchedRecord { stream, record } in fetched {
            if !selected.emits(&stream) {
                continue;
            }
            let Some(member) = family.iter().find(|d| d.name == stream) else {
                continue;
            };
            for flat in flatten(&record, member, entity) {
                schemas.observe(&stream, &flat);
                flushed.push((stream.clone(), flat));
            }
        }

        for message in schemas.changes() {
            self.emit(tx, message).await;
        }

        let count = flushed.len() as u64;
        for (stream, record) in flushed {
            let record = schemas.coerce(&stream, record);
            self.emit(tx, Message::record(stream, record)).await;
        }
        count
    }

    /// Send a message; a dropped reader stops the run
    async fn emit(&self, tx: &Sender, message: Message) {
        if tx.send(Ok(message)).await.is_err() {
            self.cancel.cancel();
        }
    }
}

/// Entity ids selected by the config, or every entity the gateway reports
pub async fn resolve_entities(gateway: &dyn Gateway, config: &SourceConfig) -> Result<Vec<String>> {
    match config.entities_mode {
        EntitiesMode::Selected => Ok(config.selected_entities()),
        EntitiesMode::All => gateway.entity_ids().await,
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Stream Schemas
// ============================================================================

/// Inferred schemas of the emitted members of one family, with what has
/// been reported so far
struct StreamSchemas {
    current: HashMap<String, InferredSchema>,
    reported: HashMap<String, InferredSchema>,
    order: Vec<String>,
}

impl StreamSchemas {
    fn new(selected: &SelectedStream) -> Self {
        let members: Vec<&StreamDefinition> = selected
            .definition
            .family()
            .into_iter()
            .filter(|d| selected.emits(&d.name))
            .collect();
        Self {
            current: members
                .iter()
                .map(|d| (d.name.clone(), InferredSchema::for_stream(d)))
                .collect(),
            reported: HashMap::new(),
            order: members.iter().map(|d| d.name.clone()).collect(),
        }
    }

    /// Static minimal schema of every member
    fn initial_messages(&mut self) -> Vec<Message> {
        self.changes()
    }

    fn observe(&mut self, stream: &str, record: &FlatRecord) {
        if let Some(schema) = self.current.get_mut(stream) {
            schema.observe_record(record);
        }
    }

    /// Schema messages for fields new or widened since the last call
    fn changes(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        for stream in &self.order {
            let Some(current) = self.current.get_mut(stream) else {
                continue;
            };
            let reported = self.reported.entry(stream.clone()).or_default();
            for (field, field_type) in current.changes_since(reported) {
                messages.push(Message::schema(stream, field, field_type));
            }
            *reported = current.clone();
        }
        messages
    }

    fn coerce(&self, stream: &str, record: FlatRecord) -> FlatRecord {
        match self.current.get(stream) {
            Some(schema) => schema.coerce(record),
            None => record,
        }
    }
}
