// Coordinator module
//
// The coordinator is the process-wide singleton behind the settings panel and
// every per-page filter engine. It owns the canonical stats cache, seeds the
// config store on install, and relays configuration changes to registered
// pages. Components never share memory with it; everything goes through the
// command channel.

use crate::models::{ConfigDelta, DEFAULT_HIDDEN_USER, FilterStats};
use crate::store::ConfigStore;
use anyhow::Result;
use indexmap::IndexMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

pub mod site;

pub use site::{DEFAULT_SITE_PATTERN, SitePattern};

/// Command channel capacity. Bounded so a stalled coordinator surfaces as
/// delivery failures instead of unbounded memory growth.
const COMMAND_CHANNEL_CAPACITY: usize = 100;

/// Per-page delta channel capacity.
const PAGE_CHANNEL_CAPACITY: usize = 16;

/// Errors surfaced to callers talking to the coordinator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    /// The coordinator task has exited; no request can succeed anymore.
    #[error("coordinator is no longer running")]
    Unavailable,

    /// The command channel is full; the fire-and-forget send was dropped.
    #[error("coordinator command channel is full")]
    Saturated,
}

/// Opaque identifier of a registered page instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId(u64);

/// A page instance's registration with the coordinator.
///
/// `deltas` is the private channel configuration pushes arrive on, in send
/// order for this page.
pub struct PageRegistration {
    pub id: PageId,
    pub deltas: mpsc::Receiver<ConfigDelta>,
}

enum CoordinatorRequest {
    UpdateConfig {
        delta: ConfigDelta,
        reply: oneshot::Sender<()>,
    },
    GetStats {
        reply: oneshot::Sender<FilterStats>,
    },
    ReportStats {
        hidden_comments: usize,
    },
    RegisterPage {
        url: String,
        reply: oneshot::Sender<PageRegistration>,
    },
    UnregisterPage {
        id: PageId,
    },
}

struct PageLink {
    url: String,
    deltas_tx: mpsc::Sender<ConfigDelta>,
}

/// Process-wide coordination task state.
///
/// Owns the stats cache and the page registry. Configuration is not cached
/// here: the store holds the durable copy and each engine holds the live
/// copy, so the coordinator merely merges and relays.
pub struct Coordinator {
    store: ConfigStore,
    site: SitePattern,
    stats: FilterStats,
    pages: IndexMap<PageId, PageLink>,
    next_page_id: u64,
}

impl Coordinator {
    /// Seed or migrate the config store, as the install hook does.
    ///
    /// Rules: an unset `enabled` becomes true; an unset block-list migrates
    /// from the legacy single username when present, otherwise seeds the
    /// default and writes the legacy field alongside it. Only the computed
    /// delta is written, so repeated invocations are no-ops.
    ///
    /// # Returns
    /// The delta that was applied; empty when the store was already seeded.
    pub async fn install(store: &ConfigStore) -> Result<ConfigDelta> {
        let snapshot = store.load().await?;
        let mut delta = ConfigDelta::default();

        if snapshot.enabled.is_none() {
            delta.enabled = Some(true);
        }
        if snapshot.users_to_hide.is_none() {
            match &snapshot.target_username {
                Some(legacy) => {
                    delta.users_to_hide = Some(vec![legacy.clone()]);
                }
                None => {
                    delta.users_to_hide = Some(vec![DEFAULT_HIDDEN_USER.to_string()]);
                    delta.legacy_username = Some(DEFAULT_HIDDEN_USER.to_string());
                }
            }
        }

        if delta.is_empty() {
            tracing::debug!("Config store already seeded, install is a no-op");
        } else {
            store.apply(&delta).await?;
            tracing::info!("Seeded config store on install: {:?}", delta);
        }
        Ok(delta)
    }

    /// Start the coordinator task and return a handle to it.
    ///
    /// The task runs detached and exits once every handle has been dropped.
    pub fn spawn(store: ConfigStore, site: SitePattern) -> CoordinatorHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let coordinator = Self {
            store,
            site,
            stats: FilterStats::default(),
            pages: IndexMap::new(),
            next_page_id: 0,
        };
        tokio::spawn(coordinator.run(command_rx));
        CoordinatorHandle { command_tx }
    }

    async fn run(mut self, mut command_rx: mpsc::Receiver<CoordinatorRequest>) {
        tracing::debug!("Coordinator task started");

        while let Some(request) = command_rx.recv().await {
            match request {
                CoordinatorRequest::UpdateConfig { delta, reply } => {
                    self.handle_update_config(delta).await;
                    // Ignore send errors - the requester may have given up
                    let _ = reply.send(());
                }
                CoordinatorRequest::GetStats { reply } => {
                    let _ = reply.send(self.stats);
                }
                CoordinatorRequest::ReportStats { hidden_comments } => {
                    // Latest write wins; pages are not aggregated.
                    self.stats.hidden_comments = hidden_comments;
                }
                CoordinatorRequest::RegisterPage { url, reply } => {
                    let registration = self.handle_register_page(url);
                    let id = registration.id;
                    if reply.send(registration).is_err() {
                        // Requester vanished before receiving its channel.
                        self.pages.shift_remove(&id);
                    }
                }
                CoordinatorRequest::UnregisterPage { id } => {
                    if self.pages.shift_remove(&id).is_some() {
                        tracing::debug!("Unregistered page {:?}", id);
                    }
                }
            }
        }

        tracing::debug!("Coordinator task terminated");
    }

    /// Merge, persist, and fan out a configuration update.
    ///
    /// The persisted delta additionally rewrites the legacy username to the
    /// new head of the block-list; the broadcast forwards the original
    /// partial untouched. Persist failures are logged and do not abort the
    /// broadcast.
    async fn handle_update_config(&mut self, delta: ConfigDelta) {
        let mut stored_delta = delta.clone();
        if let Some(users) = &delta.users_to_hide {
            if let Some(first) = users.first() {
                stored_delta.legacy_username = Some(first.clone());
            }
        }

        match self.store.apply(&stored_delta).await {
            Ok(snapshot) => {
                tracing::debug!(
                    "Applied config update: enabled={:?}, users={:?}",
                    snapshot.enabled,
                    snapshot.users_to_hide
                );
            }
            Err(e) => {
                tracing::error!("Failed to persist config update: {}", e);
            }
        }

        let mut closed_pages = Vec::new();
        for (id, link) in &self.pages {
            if !self.site.matches(&link.url) {
                continue;
            }
            match link.deltas_tx.try_send(delta.clone()) {
                Ok(_) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        "Delta channel full for page {:?} ({}), dropping update for it",
                        id,
                        link.url
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::warn!(
                        "Delta channel closed for page {:?} ({}), pruning registration",
                        id,
                        link.url
                    );
                    closed_pages.push(*id);
                }
            }
        }
        for id in closed_pages {
            self.pages.shift_remove(&id);
        }
    }

    fn handle_register_page(&mut self, url: String) -> PageRegistration {
        let id = PageId(self.next_page_id);
        self.next_page_id += 1;

        let (deltas_tx, deltas_rx) = mpsc::channel(PAGE_CHANNEL_CAPACITY);
        tracing::debug!("Registered page {:?} at {}", id, url);
        self.pages.insert(id, PageLink { url, deltas_tx });

        PageRegistration {
            id,
            deltas: deltas_rx,
        }
    }
}

/// Cloneable handle for talking to the coordinator task.
///
/// Request/response operations (`update_config`, `get_stats`,
/// `register_page`) await a reply; fire-and-forget operations
/// (`report_stats`, `unregister_page`) never block the caller.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    command_tx: mpsc::Sender<CoordinatorRequest>,
}

impl CoordinatorHandle {
    /// Send a configuration update: merge into the store, persist, broadcast
    /// to every registered page on the target site.
    ///
    /// Resolves once the coordinator has persisted and fanned out the delta.
    /// Per-page delivery failures are logged by the coordinator and never
    /// surface here.
    pub async fn update_config(&self, delta: ConfigDelta) -> Result<(), CoordinatorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(CoordinatorRequest::UpdateConfig {
                delta,
                reply: reply_tx,
            })
            .await
            .map_err(|_| CoordinatorError::Unavailable)?;
        reply_rx.await.map_err(|_| CoordinatorError::Unavailable)
    }

    /// Fetch the coordinator's cached stats.
    ///
    /// The value is whatever the most recent scan reported; it can be stale
    /// until the next scan runs.
    pub async fn get_stats(&self) -> Result<FilterStats, CoordinatorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(CoordinatorRequest::GetStats { reply: reply_tx })
            .await
            .map_err(|_| CoordinatorError::Unavailable)?;
        reply_rx.await.map_err(|_| CoordinatorError::Unavailable)
    }

    /// Report a page's hidden-comment count, fire-and-forget.
    ///
    /// Never blocks; the caller is expected to log a failure and move on.
    pub fn report_stats(&self, hidden_comments: usize) -> Result<(), CoordinatorError> {
        match self
            .command_tx
            .try_send(CoordinatorRequest::ReportStats { hidden_comments })
        {
            Ok(_) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(CoordinatorError::Saturated),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(CoordinatorError::Unavailable),
        }
    }

    /// Register a page instance to receive configuration broadcasts.
    ///
    /// # Arguments
    /// * `url` - The page's URL, checked against the site pattern at each
    ///   broadcast
    pub async fn register_page(&self, url: &str) -> Result<PageRegistration, CoordinatorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(CoordinatorRequest::RegisterPage {
                url: url.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| CoordinatorError::Unavailable)?;
        reply_rx.await.map_err(|_| CoordinatorError::Unavailable)
    }

    /// Drop a page from the registry, fire-and-forget.
    ///
    /// A coordinator that is already gone has no registry left to clean.
    pub fn unregister_page(&self, id: PageId) {
        let _ = self
            .command_tx
            .try_send(CoordinatorRequest::UnregisterPage { id });
    }
}
