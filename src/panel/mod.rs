// Settings panel controller
//
// Headless model of the user-facing settings surface: a draft of the
// filter configuration edited locally, then published through the
// coordinator in one updateConfig. Rendering is out of scope; this module
// owns the validation and messaging the surface needs.

use crate::coordinator::{CoordinatorError, CoordinatorHandle};
use crate::models::{ConfigDelta, FilterConfig, FilterStats};
use crate::store::ConfigStore;
use thiserror::Error;

/// Errors surfaced by the settings panel.
///
/// Validation failures abort the operation before any draft mutation.
#[derive(Error, Debug, PartialEq)]
pub enum PanelError {
    #[error("Please enter a username to hide comments from")]
    EmptyUsername,

    #[error("User \"{0}\" is already in your hide list")]
    DuplicateUsername(String),

    #[error(transparent)]
    Delivery(#[from] CoordinatorError),
}

/// Draft editor for the filter configuration.
///
/// Opens with a snapshot of the store, mutates a local draft, and publishes
/// the whole draft on [`save()`](Self::save). Edits are invisible to the
/// filter engines until saved.
pub struct SettingsPanel {
    coordinator: CoordinatorHandle,
    enabled: bool,
    users_to_hide: Vec<String>,
}

impl SettingsPanel {
    /// Open the panel with the current stored configuration.
    ///
    /// A store read failure falls back to the default configuration, the
    /// same way an unseeded store does.
    pub async fn open(store: &ConfigStore, coordinator: CoordinatorHandle) -> Self {
        let config = match store.load().await {
            Ok(snapshot) => FilterConfig::from_stored(&snapshot),
            Err(e) => {
                tracing::warn!("Failed to load settings, starting from defaults: {}", e);
                FilterConfig::default()
            }
        };

        Self {
            coordinator,
            enabled: config.enabled,
            users_to_hide: config.users_to_hide,
        }
    }

    /// Whether filtering is enabled in the draft.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// The draft block-list, in display order.
    pub fn users(&self) -> &[String] {
        &self.users_to_hide
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Add a username to the draft block-list.
    ///
    /// The name is trimmed first. An empty or already-listed name (compared
    /// case-insensitively) is rejected without touching the draft.
    pub fn add_user(&mut self, username: &str) -> Result<(), PanelError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(PanelError::EmptyUsername);
        }
        if self
            .users_to_hide
            .iter()
            .any(|existing| existing.eq_ignore_ascii_case(username))
        {
            return Err(PanelError::DuplicateUsername(username.to_string()));
        }

        self.users_to_hide.push(username.to_string());
        Ok(())
    }

    /// Remove a username from the draft block-list, by exact match.
    ///
    /// Returns whether anything was removed; removing a name that is not
    /// listed is a no-op.
    pub fn remove_user(&mut self, username: &str) -> bool {
        let before = self.users_to_hide.len();
        self.users_to_hide.retain(|existing| existing != username);
        self.users_to_hide.len() != before
    }

    /// Publish the whole draft through the coordinator.
    ///
    /// The delta always carries both fields, so a save overwrites the stored
    /// configuration with exactly what the panel shows.
    pub async fn save(&self) -> Result<(), PanelError> {
        self.coordinator
            .update_config(ConfigDelta {
                enabled: Some(self.enabled),
                users_to_hide: Some(self.users_to_hide.clone()),
                legacy_username: None,
            })
            .await?;
        Ok(())
    }

    /// Fetch the coordinator's cached stats.
    pub async fn stats(&self) -> Result<FilterStats, PanelError> {
        let stats = self.coordinator.get_stats().await?;
        Ok(stats)
    }
}
