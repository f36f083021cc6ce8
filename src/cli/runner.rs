//! CLI runner - executes commands

use crate::cli::commands::{parse_stream_list, Cli, Commands, OutputFormat};
use crate::config::SourceConfig;
use crate::connector::Connector;
use crate::engine::{Message, RunStatus, SyncReport};
use crate::error::{Error, Result};
use crate::output::ParquetSink;
use crate::source::{connector_spec, IntacctSource};
use crate::state::{StateManager, StreamState};
use crate::types::SyncMode;
use futures::StreamExt;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Spec => self.spec(),
            Commands::Check => self.check().await,
            Commands::Discover => self.discover().await,
            Commands::Read {
                streams,
                full_refresh,
                output,
            } => {
                let mode = if *full_refresh {
                    SyncMode::FullRefresh
                } else {
                    SyncMode::Incremental
                };
                self.read(streams.as_deref(), mode, output.as_deref()).await
            }
        }
    }

    /// Load config; inline JSON takes precedence over the file
    fn load_config(&self) -> Result<SourceConfig> {
        if let Some(json_str) = &self.cli.config_json {
            let value: Value = serde_json::from_str(json_str)
                .map_err(|e| Error::config(format!("Invalid config JSON: {e}")))?;
            return SourceConfig::from_value(value);
        }

        match &self.cli.config {
            Some(path) => SourceConfig::from_file(path),
            None => Err(Error::config(
                "No configuration given (use --config or --config-json)",
            )),
        }
    }

    /// Load state; inline JSON takes precedence over the file
    fn load_state(&self) -> Result<StateManager> {
        if let Some(state_json) = &self.cli.state_json {
            StateManager::from_json(state_json)
        } else if let Some(path) = &self.cli.state {
            StateManager::from_file(path)
        } else {
            Ok(StateManager::in_memory())
        }
    }

    fn source(&self) -> Result<IntacctSource> {
        IntacctSource::new(self.load_config()?)
    }

    /// Show spec
    fn spec(&self) -> Result<()> {
        let spec = connector_spec();
        self.output_message(&json!({
            "type": "SPEC",
            "spec": {
                "documentationUrl": "https://developer.intacct.com/web-services/",
                "connectionSpecification": spec.connection_specification
            }
        }));
        Ok(())
    }

    /// Check connection
    async fn check(&self) -> Result<()> {
        let source = self.source()?;
        self.output_message(&log_json(
            "INFO",
            &format!("Checking connection to company {}", source.config().company_id),
        ));

        let result = source.check().await?;
        let (status, message) = if result.success {
            ("SUCCEEDED", "Connection successful".to_string())
        } else {
            (
                "FAILED",
                format!(
                    "Connection failed: {}",
                    result.message.unwrap_or_default()
                ),
            )
        };
        self.output_message(&json!({
            "type": "CONNECTION_STATUS",
            "connectionStatus": {
                "status": status,
                "message": message
            }
        }));
        Ok(())
    }

    /// Discover streams
    async fn discover(&self) -> Result<()> {
        let source = self.source()?;
        let streams = source.discover().await?;
        self.output_message(&json!({
            "type": "CATALOG",
            "catalog": {
                "streams": streams
            }
        }));
        Ok(())
    }

    /// Read streams, persisting every checkpoint
    async fn read(&self, streams: Option<&str>, mode: SyncMode, output: Option<&Path>) -> Result<()> {
        let sync_start = Instant::now();
        if self.cli.format == OutputFormat::Parquet && output.is_none() {
            return Err(Error::config("Parquet format requires --output directory"));
        }

        let cancel = CancellationToken::new();
        let source = self.source()?.with_cancellation(cancel.clone());
        let state = self.load_state()?;
        let mut sink = output.map(|dir| ParquetSink::new(dir, source.catalog()));

        let ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current window");
                ctrl_c.cancel();
            }
        });

        let selection = parse_stream_list(streams);
        let mut messages = source.read(&selection, state.snapshot().await, mode)?;
        let mut report = None;

        while let Some(message) = messages.next().await {
            let message = message?;

            // Part files land before the checkpoint is persisted
            if let Some(sink) = sink.as_mut() {
                sink.handle(&message)?;
            }

            match &message {
                Message::State { stream, data } => {
                    let stream_state: StreamState = serde_json::from_value(data.clone())?;
                    state.set_stream_state(stream, stream_state).await?;
                }
                Message::Report(r) => {
                    report = Some(r.clone());
                    continue;
                }
                Message::Record { .. } if self.cli.format == OutputFormat::Parquet => continue,
                _ => {}
            }
            self.output_message(&message_json(&message));
        }
        cancel.cancel();

        let files = match sink.as_mut() {
            Some(sink) => sink.finish()?,
            None => Vec::new(),
        };

        let report = report.ok_or_else(|| Error::Other("Sync ended without a report".into()))?;
        let duration_ms = sync_start.elapsed().as_millis() as u64;
        info!(
            status = %report.status,
            records = report.records_emitted(),
            duration_ms,
            "Sync finished"
        );

        let mut summary = summary_json(&report, duration_ms);
        summary["trace"]["summary"]["output"] = json!({
            "directory": output.map(|p| p.display().to_string()),
            "files": files.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
            "state_file": self.cli.state.as_ref().map(|p| p.display().to_string()),
        });
        self.output_message(&summary);

        if report.status == RunStatus::Failed {
            return Err(Error::Other(format!(
                "Sync failed: {}",
                report.failed_streams().join(", ")
            )));
        }
        Ok(())
    }

    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json | OutputFormat::Parquet => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}

fn log_json(level: &str, message: &str) -> Value {
    json!({
        "type": "LOG",
        "log": {
            "level": level,
            "message": message
        }
    })
}

/// Protocol line for an engine message
pub fn message_json(msg: &Message) -> Value {
    match msg {
        Message::Record {
            stream, emitted_at, ..
        } => json!({
            "type": "RECORD",
            "record": {
                "stream": stream,
                "data": msg.record_json(),
                "emitted_at": emitted_at.timestamp_millis()
            }
        }),
        Message::State { stream, data } => json!({
            "type": "STATE",
            "state": {
                "type": "STREAM",
                "stream": {
                    "stream_descriptor": {
                        "name": stream
                    },
                    "stream_state": data
                }
            }
        }),
        Message::Schema {
            stream,
            field,
            field_type,
        } => json!({
            "type": "TRACE",
            "trace": {
                "type": "SCHEMA",
                "schema": {
                    "stream": stream,
                    "field": field,
                    "field_type": field_type
                }
            }
        }),
        Message::Log { level, message } => log_json(level.as_str(), message),
        Message::Report(report) => summary_json(report, 0),
    }
}

/// Final run summary
fn summary_json(report: &SyncReport, duration_ms: u64) -> Value {
    json!({
        "type": "TRACE",
        "trace": {
            "type": "SYNC_SUMMARY",
            "summary": {
                "status": report.status,
                "total_records": report.records_emitted(),
                "total_streams": report.streams.len(),
                "failed_streams": report.failed_streams(),
                "duration_ms": duration_ms,
                "streams": report.streams
            }
        }
    })
}
