//! State manager implementation
//!
//! Provides file-based state persistence with atomic writes.

use super::types::{State, StreamState};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// State manager for persisting and loading cursors
#[derive(Debug)]
pub struct StateManager {
    /// Path to the state file
    path: PathBuf,
    /// Current state (cached)
    state: Arc<RwLock<State>>,
    /// Whether to auto-save on every commit
    auto_save: bool,
}

impl StateManager {
    /// Create a new state manager with the given path
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: Arc::new(RwLock::new(State::new())),
            auto_save: true,
        }
    }

    /// Create a state manager with auto-save disabled
    pub fn without_auto_save(path: impl AsRef<Path>) -> Self {
        Self {
            auto_save: false,
            ..Self::new(path)
        }
    }

    /// Create an in-memory state manager (no file persistence)
    pub fn in_memory() -> Self {
        Self::with_state(State::new())
    }

    /// Create an in-memory state manager holding `state`
    pub fn with_state(state: State) -> Self {
        Self {
            path: PathBuf::new(),
            state: Arc::new(RwLock::new(state)),
            auto_save: false,
        }
    }

    /// Create a state manager from a file, loading existing state if present
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| Error::state(format!("Failed to read state file: {e}")))?;
            parse_state(&contents)?
        } else {
            State::new()
        };

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
            auto_save: true,
        })
    }

    /// Create a state manager from inline JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::with_state(parse_state(json)?))
    }

    /// Save state to a specific file path
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = self.to_json_pretty().await?;
        write_atomic(path.as_ref(), &contents).await
    }

    /// Load state from file
    pub async fn load(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::state(format!("Failed to read state file: {e}")))?;
        let loaded_state = parse_state(&contents)?;

        let mut state = self.state.write().await;
        *state = loaded_state;

        Ok(())
    }

    /// Save current state to file
    pub async fn save(&self) -> Result<()> {
        if self.is_in_memory() {
            return Ok(());
        }
        self.save_to_file(&self.path).await
    }

    /// Get a read lock on the current state
    pub async fn state(&self) -> tokio::sync::RwLockReadGuard<'_, State> {
        self.state.read().await
    }

    /// Copy of the current state
    pub async fn snapshot(&self) -> State {
        self.state.read().await.clone()
    }

    /// Export state as JSON string
    pub async fn to_json(&self) -> Result<String> {
        let state = self.state.read().await;
        serde_json::to_string(&*state)
            .map_err(|e| Error::state(format!("Failed to serialize state: {e}")))
    }

    /// Export state as pretty-printed JSON string
    pub async fn to_json_pretty(&self) -> Result<String> {
        let state = self.state.read().await;
        serde_json::to_string_pretty(&*state)
            .map_err(|e| Error::state(format!("Failed to serialize state: {e}")))
    }

    /// Get a write lock on the current state
    pub async fn state_mut(&self) -> tokio::sync::RwLockWriteGuard<'_, State> {
        self.state.write().await
    }

    /// Get the cursor of a stream within an entity
    pub async fn get_cursor(&self, stream: &str, entity: &str) -> Option<DateTime<Utc>> {
        let state = self.state.read().await;
        state.get_cursor(stream, entity)
    }

    /// Commit the cursor of a stream within an entity
    pub async fn set_cursor(&self, stream: &str, entity: &str, cursor: DateTime<Utc>) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.set_cursor(stream, entity, cursor);
        }

        if self.auto_save {
            self.save().await?;
        }

        Ok(())
    }

    /// Get a copy of a stream's state
    pub async fn get_stream_state(&self, stream: &str) -> Option<StreamState> {
        let state = self.state.read().await;
        state.get_stream(stream).cloned()
    }

    /// Replace a stream's state
    pub async fn set_stream_state(&self, stream: &str, stream_state: StreamState) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.set_stream(stream, stream_state);
        }

        if self.auto_save {
            self.save().await?;
        }

        Ok(())
    }

    /// Clear all state
    pub async fn clear(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            *state = State::new();
        }

        if self.auto_save {
            self.save().await?;
        }

        Ok(())
    }

    /// Clear state for a specific stream
    pub async fn clear_stream(&self, stream: &str) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.clear_stream(stream);
        }

        if self.auto_save {
            self.save().await?;
        }

        Ok(())
    }

    /// Get the state file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if using in-memory mode
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str().is_empty()
    }

    /// Create a checkpoint (alias for save)
    pub async fn checkpoint(&self) -> Result<()> {
        self.save().await
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            state: Arc::clone(&self.state),
            auto_save: self.auto_save,
        }
    }
}

fn parse_state(contents: &str) -> Result<State> {
    if contents.trim().is_empty() {
        return Ok(State::new());
    }
    serde_json::from_str(contents).map_err(|e| Error::state(format!("Failed to parse state: {e}")))
}

/// Write to a temp file first, then rename over the target
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    tokio::fs::write(&temp_path, contents)
        .await
        .map_err(|e| Error::state(format!("Failed to write state file: {e}")))?;

    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|e| Error::state(format!("Failed to rename state file: {e}")))?;

    Ok(())
}
