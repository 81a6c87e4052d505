//! Data models shared across the threadmute components.
//!
//! This module contains the core data structures passed between the
//! coordinator, the per-page filter engines, and the settings panel:
//! - [`FilterConfig`]: a page instance's live configuration cache
//! - [`ConfigDelta`]: a partial configuration update, merged field-wise
//! - [`StoredConfig`]: the persisted key-value snapshot (camelCase keys)
//! - [`FilterStats`]: the hidden-comment counter mirrored by the coordinator
//!
//! # Architecture Note
//!
//! Only [`StoredConfig`] is serialized; deltas and caches travel over
//! in-process channels. All merge logic lives on the types themselves so the
//! coordinator and engine handlers stay thin.

pub mod config;
pub mod stats;

pub use config::{ConfigDelta, DEFAULT_HIDDEN_USER, FilterConfig, StoredConfig};
pub use stats::FilterStats;
