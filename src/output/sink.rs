//! Parquet sink for read messages

use super::schema::records_to_arrow;
use super::writer::{write_batch_to_parquet, ParquetWriterConfig};
use crate::catalog::Catalog;
use crate::engine::Message;
use crate::error::{Error, Result};
use crate::schema::{FlatRecord, InferredSchema};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Buffers records per stream and writes them to
/// `{dir}/{stream}/part-NNNNN.parquet` whenever the stream's family
/// checkpoints, so a persisted cursor never runs ahead of written data
pub struct ParquetSink {
    dir: PathBuf,
    config: ParquetWriterConfig,
    /// Member stream to family name
    families: HashMap<String, String>,
    schemas: HashMap<String, InferredSchema>,
    buffers: HashMap<String, Vec<FlatRecord>>,
    written: Vec<PathBuf>,
}

impl ParquetSink {
    /// Create a sink writing under `dir`
    pub fn new(dir: impl AsRef<Path>, catalog: &Catalog) -> Self {
        let families = catalog
            .top_level()
            .iter()
            .flat_map(|top| {
                top.family()
                    .into_iter()
                    .map(|member| (member.name.clone(), top.name.clone()))
            })
            .collect();
        Self {
            dir: dir.as_ref().to_path_buf(),
            config: ParquetWriterConfig::default(),
            families,
            schemas: HashMap::new(),
            buffers: HashMap::new(),
            written: Vec::new(),
        }
    }

    /// Use a specific writer config
    #[must_use]
    pub fn with_config(mut self, config: ParquetWriterConfig) -> Self {
        self.config = config;
        self
    }

    /// Take one message. A checkpoint writes every buffered stream of its
    /// family first.
    pub fn handle(&mut self, message: &Message) -> Result<()> {
        match message {
            Message::Schema {
                stream,
                field,
                field_type,
            } => {
                self.schemas
                    .entry(stream.clone())
                    .or_default()
                    .observe(field, Some(*field_type));
            }
            Message::Record { stream, data, .. } => {
                self.buffers
                    .entry(stream.clone())
                    .or_default()
                    .push(data.clone());
            }
            Message::State { stream, .. } => {
                let members: Vec<String> = self
                    .buffers
                    .keys()
                    .filter(|member| self.family_of(member) == stream.as_str())
                    .cloned()
                    .collect();
                for member in members {
                    self.flush_stream(&member)?;
                }
            }
            Message::Log { .. } | Message::Report(_) => {}
        }
        Ok(())
    }

    /// Write whatever is still buffered
    pub fn finish(&mut self) -> Result<Vec<PathBuf>> {
        let streams: Vec<String> = self.buffers.keys().cloned().collect();
        for stream in streams {
            self.flush_stream(&stream)?;
        }
        Ok(self.written.clone())
    }

    /// Files written so far
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn family_of<'a>(&'a self, stream: &'a str) -> &'a str {
        self.families.get(stream).map_or(stream, String::as_str)
    }

    fn flush_stream(&mut self, stream: &str) -> Result<Option<PathBuf>> {
        let records = self.buffers.remove(stream).unwrap_or_default();
        if records.is_empty() {
            return Ok(None);
        }

        let mut schema = self.schemas.get(stream).cloned().unwrap_or_default();
        for record in &records {
            schema.observe_record(record);
        }
        schema.settle();

        let batch = records_to_arrow(&records, &schema)?;
        let dir = self.dir.join(stream);
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::output(format!("Failed to create {}: {e}", dir.display())))?;
        let path = next_part_path(&dir)?;
        let rows = write_batch_to_parquet(&path, &batch, Some(&self.config))?;

        debug!(stream, rows, path = %path.display(), "Wrote part file");
        self.written.push(path.clone());
        Ok(Some(path))
    }
}

/// First unused `part-NNNNN.parquet` in `dir`
fn next_part_path(dir: &Path) -> Result<PathBuf> {
    let existing = std::fs::read_dir(dir)
        .map_err(|e| Error::output(format!("Failed to list {}: {e}", dir.display())))?
        .filter_map(std::result::Result::ok)
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with("part-") && name.ends_with(".parquet"))
        })
        .count();
    Ok(dir.join(format!("part-{existing:05}.parquet")))
}
