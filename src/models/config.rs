use serde::{Deserialize, Serialize};

/// Username seeded into the block-list when the store has never been written.
pub const DEFAULT_HIDDEN_USER: &str = "Copilot";

/// Persisted configuration snapshot.
///
/// Mirrors the flat key-value layout of the durable store: every key is
/// optional so partially seeded stores round-trip unchanged. `targetUsername`
/// is the deprecated single-user field kept for older consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(rename = "usersToHide", default, skip_serializing_if = "Option::is_none")]
    pub users_to_hide: Option<Vec<String>>,

    #[serde(rename = "targetUsername", default, skip_serializing_if = "Option::is_none")]
    pub target_username: Option<String>,
}

impl StoredConfig {
    /// Merge a partial update into the snapshot. Only fields the delta
    /// defines are overwritten.
    pub fn apply(&mut self, delta: &ConfigDelta) {
        if let Some(enabled) = delta.enabled {
            self.enabled = Some(enabled);
        }
        if let Some(users) = &delta.users_to_hide {
            self.users_to_hide = Some(users.clone());
        }
        if let Some(legacy) = &delta.legacy_username {
            self.target_username = Some(legacy.clone());
        }
    }
}

/// Partial configuration update.
///
/// Travels from the settings panel through the coordinator to every live
/// page instance. Undefined fields leave the receiver's value untouched.
/// `legacy_username` lets older senders that only know the single-user field
/// keep working.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDelta {
    pub enabled: Option<bool>,
    pub users_to_hide: Option<Vec<String>>,
    pub legacy_username: Option<String>,
}

impl ConfigDelta {
    /// True when no field is defined and applying would be a no-op write.
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.users_to_hide.is_none() && self.legacy_username.is_none()
    }
}

/// A filter engine's live configuration cache.
///
/// Initialized from the store once at page startup, then only mutated by
/// pushes from the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    pub enabled: bool,
    pub users_to_hide: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            users_to_hide: vec![DEFAULT_HIDDEN_USER.to_string()],
        }
    }
}

impl FilterConfig {
    /// Build the cache from a stored snapshot.
    ///
    /// Fallback chain for the block-list: `usersToHide`, else the legacy
    /// `targetUsername` wrapped in a one-element list, else the default seed.
    /// `enabled` defaults to true when unset.
    pub fn from_stored(snapshot: &StoredConfig) -> Self {
        let users_to_hide = snapshot
            .users_to_hide
            .clone()
            .or_else(|| snapshot.target_username.clone().map(|user| vec![user]))
            .unwrap_or_else(|| vec![DEFAULT_HIDDEN_USER.to_string()]);

        Self {
            enabled: snapshot.enabled.unwrap_or(true),
            users_to_hide,
        }
    }

    /// Merge a pushed partial update into the cache.
    ///
    /// A delta carrying only the legacy single username replaces the whole
    /// block-list with that one entry; when `usersToHide` is present it wins
    /// and the legacy field is ignored.
    pub fn apply(&mut self, delta: &ConfigDelta) {
        if let Some(enabled) = delta.enabled {
            self.enabled = enabled;
        }
        if let Some(users) = &delta.users_to_hide {
            self.users_to_hide = users.clone();
        } else if let Some(legacy) = &delta.legacy_username {
            self.users_to_hide = vec![legacy.clone()];
        }
    }

    /// Check whether an author name is on the block-list.
    ///
    /// Comparison is case-insensitive; block-list order is irrelevant here.
    pub fn hides(&self, author: &str) -> bool {
        self.users_to_hide
            .iter()
            .any(|user| user.eq_ignore_ascii_case(author))
    }
}
