// Filter engine module
//
// One FilterEngine runs per loaded page. It owns the page's configuration
// cache and hidden-element records, scans the document for block-listed
// authors, toggles container visibility, and reports the hidden count to the
// coordinator. The observer submodule drives it from the page's event
// stream.

use crate::coordinator::CoordinatorHandle;
use crate::dom::{Document, Marker, NodeId};
use crate::models::{ConfigDelta, FilterConfig};
use crate::store::ConfigStore;
use std::collections::HashMap;
use std::time::Duration;

pub mod observer;

pub use observer::PageFilter;

/// Lifecycle of a filter engine instance.
///
/// `Active` and `Suppressed` toggle on every config push that changes
/// `enabled`; there is no terminal state, the instance lives as long as the
/// page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Loading,
    Active,
    Suppressed,
}

/// One hidden container and the display value it had before the engine hid
/// it.
///
/// Records live from hide until the next restore. A rescan that re-hides the
/// same container carries the original pre-hide value forward instead of
/// recording the `none` the engine itself wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiddenRecord {
    pub node: NodeId,
    pub prior_display: Option<String>,
}

/// Tunables for one filter engine instance.
///
/// The marker sets describe GitHub's comment markup by default:
///
/// - `container_markers`: the timeline entries the primary pass enumerates
/// - `author_markers`: author links inside a container (`a.author`)
/// - `fallback_author_markers`: the wider author shape the fallback pass
///   starts from (`a[data-hovercard-type="user"]`)
/// - `fallback_container_markers`: what counts as a container when walking
///   up from a fallback author match
/// - `watch_markers`: inserted subtrees worth rescanning for
///
/// The delays are race-avoidance heuristics, not correctness guarantees;
/// tests shrink them.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Wait after config load before the first scan, letting host scripts
    /// finish populating the page.
    pub settle_delay: Duration,

    /// Wait after an in-place navigation before rescanning.
    pub navigation_delay: Duration,

    /// Trailing-edge debounce for mutation-triggered rescans.
    pub debounce_delay: Duration,

    pub container_markers: Vec<Marker>,
    pub author_markers: Vec<Marker>,
    pub fallback_author_markers: Vec<Marker>,
    pub fallback_container_markers: Vec<Marker>,
    pub watch_markers: Vec<Marker>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            navigation_delay: Duration::from_millis(1000),
            debounce_delay: Duration::from_millis(300),
            container_markers: vec![
                Marker::class("js-timeline-item"),
                Marker::class("TimelineItem"),
            ],
            author_markers: vec![Marker::tag_class("a", "author")],
            fallback_author_markers: vec![Marker::tag_attr("a", "data-hovercard-type", "user")],
            fallback_container_markers: vec![
                Marker::class("js-timeline-item"),
                Marker::class("TimelineItem"),
                Marker::class("js-comment-container"),
            ],
            watch_markers: vec![
                Marker::class("js-comment-container"),
                Marker::class("js-timeline-item"),
                Marker::class("TimelineItem"),
                Marker::class("review-comment"),
            ],
        }
    }
}

/// Per-page comment filter.
///
/// The engine reads the config store exactly once at startup; afterwards its
/// cache is only mutated by pushes relayed through the coordinator. Scans
/// are full re-evaluations: the records list is rebuilt every time, and
/// visibility is only ever un-done by [`restore()`](Self::restore).
pub struct FilterEngine {
    document: Document,
    coordinator: CoordinatorHandle,
    settings: EngineSettings,
    config: FilterConfig,
    hidden: Vec<HiddenRecord>,
    state: EngineState,
}

impl FilterEngine {
    /// Create an engine for a page document.
    ///
    /// The engine starts with the default configuration cache until
    /// [`load_config()`](Self::load_config) runs.
    pub fn new(
        document: Document,
        coordinator: CoordinatorHandle,
        settings: EngineSettings,
    ) -> Self {
        Self {
            document,
            coordinator,
            settings,
            config: FilterConfig::default(),
            hidden: Vec::new(),
            state: EngineState::Uninitialized,
        }
    }

    /// Initialize the configuration cache from the store.
    ///
    /// This is the engine's only store access. A read failure keeps the
    /// default cache and is logged, matching the assumption that storage
    /// normally succeeds.
    pub async fn load_config(&mut self, store: &ConfigStore) {
        self.state = EngineState::Loading;

        match store.load().await {
            Ok(snapshot) => {
                self.config = FilterConfig::from_stored(&snapshot);
            }
            Err(e) => {
                tracing::warn!("Failed to load config from store, keeping defaults: {}", e);
            }
        }

        self.state = if self.config.enabled {
            EngineState::Active
        } else {
            EngineState::Suppressed
        };
        tracing::debug!(
            "Filter config loaded: enabled={}, users={:?}",
            self.config.enabled,
            self.config.users_to_hide
        );
    }

    /// Re-evaluate the whole document and hide block-listed comments.
    ///
    /// No-op while disabled. Otherwise the records list is rebuilt from
    /// scratch: containers the engine hid earlier that no longer match stay
    /// hidden but lose their record (only `restore()` un-hides).
    ///
    /// Two phases: the primary pass enumerates candidate containers and
    /// checks each one's author elements (first match hides the container);
    /// the fallback pass runs only when the primary pass hid nothing, walks
    /// up from author elements instead, and skips containers hidden by
    /// anything other than this engine.
    ///
    /// # Returns
    /// The number of containers recorded hidden by this scan.
    pub fn scan(&mut self) -> usize {
        if !self.config.enabled {
            return self.hidden.len();
        }

        // Records are the authority on what this engine hid; a rescan
        // carries each pre-hide display value forward.
        let previous: HashMap<NodeId, Option<String>> = self
            .hidden
            .drain(..)
            .map(|record| (record.node, record.prior_display))
            .collect();

        let mut count = 0;

        let containers = self.document.select(&self.settings.container_markers);
        for container in containers {
            let authors = self
                .document
                .select_within(container, &self.settings.author_markers);
            for author in authors {
                let name = self.document.text_content(author);
                if self.config.hides(name.trim()) {
                    self.hide(container, &previous);
                    count += 1;
                    // First matching author wins; one hide per container.
                    break;
                }
            }
        }

        let mut used_fallback = false;
        if count == 0 {
            used_fallback = true;
            let authors = self.document.select(&self.settings.fallback_author_markers);
            for author in authors {
                let name = self.document.text_content(author);
                if !self.config.hides(name.trim()) {
                    continue;
                }
                let container = match self
                    .document
                    .closest(author, &self.settings.fallback_container_markers)
                {
                    Some(container) => container,
                    None => continue,
                };
                if self.hidden.iter().any(|record| record.node == container) {
                    // Already hidden this scan.
                    continue;
                }
                if self.document.is_hidden(container) && !previous.contains_key(&container) {
                    // Hidden by something other than this engine; leave it.
                    continue;
                }
                self.hide(container, &previous);
                count += 1;
            }
        }

        tracing::debug!(
            "Scan hid {} containers{}",
            count,
            if used_fallback { " (fallback pass)" } else { "" }
        );
        self.report_stats();
        count
    }

    /// Return every recorded container to its pre-hide display value and
    /// reset the count to zero.
    pub fn restore(&mut self) {
        for record in self.hidden.drain(..) {
            self.document.set_display(record.node, record.prior_display);
        }
        tracing::debug!("Restored all hidden containers");
        self.report_stats();
    }

    /// Merge a pushed config delta into the cache and react immediately:
    /// rescan while enabled, restore otherwise.
    ///
    /// Persistence is the coordinator's job; this only touches the cache.
    pub fn apply_config(&mut self, delta: &ConfigDelta) {
        self.config.apply(delta);
        self.state = if self.config.enabled {
            EngineState::Active
        } else {
            EngineState::Suppressed
        };
        tracing::debug!(
            "Config push applied: enabled={}, users={:?}",
            self.config.enabled,
            self.config.users_to_hide
        );

        if self.config.enabled {
            self.scan();
        } else {
            self.restore();
        }
    }

    /// Current configuration cache.
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Number of containers currently recorded hidden.
    pub fn hidden_count(&self) -> usize {
        self.hidden.len()
    }

    /// The hidden-element records from the most recent scan.
    pub fn hidden_records(&self) -> &[HiddenRecord] {
        &self.hidden
    }

    /// The page document this engine filters.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The engine's tunables.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub(crate) fn coordinator(&self) -> &CoordinatorHandle {
        &self.coordinator
    }

    fn hide(&mut self, node: NodeId, previous: &HashMap<NodeId, Option<String>>) {
        let prior_display = match previous.get(&node) {
            Some(prior) => prior.clone(),
            None => self.document.display(node),
        };
        self.document.set_display(node, Some("none".to_string()));
        self.hidden.push(HiddenRecord {
            node,
            prior_display,
        });
    }

    /// Report the current hidden count to the coordinator, fire-and-forget.
    ///
    /// Suppressed entirely while the page is not visible; the messaging
    /// channel may already be torn down then.
    fn report_stats(&self) {
        if !self.document.is_visible() {
            tracing::debug!("Page not visible, suppressing stats report");
            return;
        }
        if let Err(e) = self.coordinator.report_stats(self.hidden.len()) {
            tracing::warn!("Failed to report stats to coordinator: {}", e);
        }
    }
}
