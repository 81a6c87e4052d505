use crate::models::{ConfigDelta, StoredConfig};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Durable key-value store for the filter configuration.
///
/// Backs the flat `{enabled, usersToHide, targetUsername}` snapshot with a
/// single YAML file. The store is a passive collaborator: the coordinator is
/// the only writer in practice, and each filter engine reads it exactly once
/// at page startup.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    store_dir: Utf8PathBuf,
    store_path: Utf8PathBuf,
}

impl ConfigStore {
    /// Create a new ConfigStore rooted at the specified directory.
    ///
    /// # Arguments
    /// * `store_dir` - Directory holding the store file (created if missing)
    pub fn new<P: AsRef<Utf8Path>>(store_dir: P) -> Result<Self> {
        let store_dir = store_dir.as_ref().to_path_buf();

        if !store_dir.exists() {
            fs::create_dir_all(&store_dir)
                .with_context(|| format!("Failed to create store directory: {}", store_dir))?;
        }

        Ok(Self {
            store_path: store_dir.join("threadmute.yaml"),
            store_dir,
        })
    }

    /// Load the stored configuration snapshot.
    ///
    /// # Returns
    /// The persisted snapshot; a store that has never been written loads as
    /// an empty snapshot with every key unset.
    pub async fn load(&self) -> Result<StoredConfig> {
        if !self.store_path.exists() {
            tracing::debug!(
                "Config store not found at {}, treating as unseeded",
                self.store_path
            );
            return Ok(StoredConfig::default());
        }

        let file_contents = tokio::fs::read_to_string(&self.store_path)
            .await
            .with_context(|| format!("Failed to read config store: {}", self.store_path))?;

        let snapshot: StoredConfig = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse config store: {}", self.store_path))?;

        tracing::debug!("Loaded config store from {}", self.store_path);
        Ok(snapshot)
    }

    /// Save a configuration snapshot, replacing the whole store file.
    ///
    /// # Arguments
    /// * `snapshot` - The snapshot to persist
    pub async fn save(&self, snapshot: &StoredConfig) -> Result<()> {
        let yaml_string = serde_yaml_ng::to_string(snapshot)
            .context("Failed to serialize config store to YAML")?;

        tokio::fs::write(&self.store_path, yaml_string)
            .await
            .with_context(|| format!("Failed to write config store: {}", self.store_path))?;

        tracing::info!("Saved config store to {}", self.store_path);
        Ok(())
    }

    /// Merge a partial update into the store (load, apply, save).
    ///
    /// This is the single key-set write granularity the collaborator offers;
    /// an empty delta skips the write entirely.
    ///
    /// # Returns
    /// The merged snapshot as persisted.
    pub async fn apply(&self, delta: &ConfigDelta) -> Result<StoredConfig> {
        let mut snapshot = self.load().await?;

        if delta.is_empty() {
            return Ok(snapshot);
        }

        snapshot.apply(delta);
        self.save(&snapshot).await?;
        Ok(snapshot)
    }

    /// Get the directory holding the store file.
    pub fn store_dir(&self) -> &Utf8Path {
        &self.store_dir
    }

    /// Get the path of the store file itself.
    pub fn store_path(&self) -> &Utf8Path {
        &self.store_path
    }
}
