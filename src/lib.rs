// ThreadMute - Block-list comment filtering for GitHub discussion pages
//
// This is the library crate containing the filtering engine and the
// cross-context configuration synchronization protocol. Embedders wire a
// page Document, the shared Coordinator, and a SettingsPanel together.

pub mod coordinator;
pub mod dom;
pub mod engine;
pub mod logging;
pub mod models;
pub mod panel;
pub mod store;

// Re-export commonly used types for convenience
pub use coordinator::{Coordinator, CoordinatorHandle, SitePattern};
pub use dom::{Document, Marker, NodeId, PageEvent};
pub use engine::{EngineSettings, FilterEngine, PageFilter};
pub use models::{ConfigDelta, FilterConfig, FilterStats, StoredConfig};
pub use panel::SettingsPanel;
pub use store::ConfigStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
