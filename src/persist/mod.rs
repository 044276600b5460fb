//! Snapshot persistence
//!
//! The whole application state lives under one fixed key; the orchestrator
//! saves after every mutation and loads once at startup. In-memory state stays
//! authoritative when a save fails.

use crate::queue::store::DownloadTask;
use crate::utils::config::Settings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything worth surviving a restart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub tasks: Vec<DownloadTask>,
    pub download_dir: Option<String>,
    pub settings: Settings,
}

/// Persistence collaborator
#[async_trait]
pub trait StateStore: Send + Sync {
    /// `None` on first run (nothing persisted yet).
    async fn load(&self) -> Result<Option<PersistedState>>;

    async fn save(&self, state: &PersistedState) -> Result<()>;
}

/// Single JSON document on disk, written atomically (temp file + rename)
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            path: base_dir.join("state.json"),
        }
    }

    /// Store under the platform data directory, e.g.
    /// `~/.local/share/vidflow/state.json` on Linux.
    pub fn at_default_location() -> Result<Self> {
        let base = dirs::data_dir().context("No platform data directory available")?;
        Ok(Self::new(&base.join("vidflow")))
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self) -> Result<Option<PersistedState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .context("Failed to read state file")?;
        let state = serde_json::from_str(&json).context("Failed to parse state file")?;
        Ok(Some(state))
    }

    async fn save(&self, state: &PersistedState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(state)?;
        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json)
            .await
            .context("Failed to write state file")?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .context("Failed to replace state file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_location_is_under_the_platform_data_dir() {
        let store = JsonStateStore::at_default_location().expect("platform data dir");
        assert!(store.path.ends_with("vidflow/state.json"));
        assert!(store.path.is_absolute());
    }
}
