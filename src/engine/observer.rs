// Page filter runtime
//
// Drives one FilterEngine from the page's event stream. The task:
// - loads the config cache and registers the page with the coordinator
// - runs the first scan after a settle delay
// - debounces mutation-triggered rescans (trailing edge)
// - schedules a delayed rescan after in-place navigation
// - applies config pushes relayed by the coordinator
//
// Rescan timers are re-armed by later triggers, so only the last trigger in
// a burst fires.

use super::{EngineSettings, FilterEngine};
use crate::coordinator::CoordinatorHandle;
use crate::dom::{Document, PageEvent};
use crate::models::ConfigDelta;
use crate::store::ConfigStore;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Handle to a spawned per-page filter task.
///
/// Dropping the handle without calling [`shutdown()`](Self::shutdown) also
/// stops the task; shutdown just makes the stop orderly (the page is
/// unregistered from the coordinator before the task exits).
pub struct PageFilter {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PageFilter {
    /// Spawn the filter task for a page document.
    pub fn spawn(
        document: Document,
        store: ConfigStore,
        coordinator: CoordinatorHandle,
        settings: EngineSettings,
    ) -> Self {
        let engine = FilterEngine::new(document, coordinator, settings);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(engine, store, shutdown_rx));
        Self { shutdown_tx, task }
    }

    /// Request the task to stop and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

async fn run(mut engine: FilterEngine, store: ConfigStore, mut shutdown_rx: watch::Receiver<bool>) {
    tracing::debug!("Page filter task started");

    // Subscribe before the settle delay so early insertions are not missed.
    let mut events_rx = engine.document().subscribe();

    engine.load_config(&store).await;

    let location = engine.document().location();
    let (page_id, mut deltas_rx, mut deltas_open) =
        match engine.coordinator().register_page(&location).await {
            Ok(registration) => (Some(registration.id), registration.deltas, true),
            Err(e) => {
                tracing::warn!("Failed to register page with coordinator: {}", e);
                // Closed placeholder channel; the guard below keeps it unpolled.
                let (_tx, rx) = mpsc::channel::<ConfigDelta>(1);
                (None, rx, false)
            }
        };

    // First scan waits out the settle delay. Mutation rescans and navigation
    // rescans each re-arm their own deadline.
    let mut scan_at: Option<Instant> = Some(Instant::now() + engine.settings().settle_delay);
    let mut debounce_at: Option<Instant> = None;

    loop {
        tokio::select! {
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            delta = deltas_rx.recv(), if deltas_open => {
                match delta {
                    Some(delta) => engine.apply_config(&delta),
                    None => {
                        tracing::debug!("Config push channel closed");
                        deltas_open = false;
                    }
                }
            }

            event = events_rx.recv() => {
                match event {
                    Ok(PageEvent::SubtreeInserted { roots }) => {
                        let relevant = roots.iter().any(|&root| {
                            engine
                                .document()
                                .subtree_matches(root, &engine.settings().watch_markers)
                        });
                        if relevant {
                            debounce_at =
                                Some(Instant::now() + engine.settings().debounce_delay);
                        }
                    }
                    Ok(PageEvent::LocationChanged { url }) => {
                        tracing::debug!("Page navigated in place to {}", url);
                        scan_at = Some(Instant::now() + engine.settings().navigation_delay);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "Page event stream lagged, {} events skipped; scheduling rescan",
                            skipped
                        );
                        debounce_at = Some(Instant::now() + engine.settings().debounce_delay);
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!("Page event stream closed");
                        break;
                    }
                }
            }

            _ = tokio::time::sleep_until(scan_at.unwrap_or_else(Instant::now)),
                if scan_at.is_some() =>
            {
                scan_at = None;
                engine.scan();
            }

            _ = tokio::time::sleep_until(debounce_at.unwrap_or_else(Instant::now)),
                if debounce_at.is_some() =>
            {
                debounce_at = None;
                engine.scan();
            }
        }
    }

    if let Some(id) = page_id {
        engine.coordinator().unregister_page(id);
    }
    tracing::debug!("Page filter task terminated gracefully");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{Coordinator, SitePattern};
    use crate::dom::Marker;
    use camino::Utf8PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_settings() -> EngineSettings {
        EngineSettings {
            settle_delay: Duration::from_millis(10),
            navigation_delay: Duration::from_millis(20),
            debounce_delay: Duration::from_millis(10),
            ..EngineSettings::default()
        }
    }

    fn create_test_setup() -> (ConfigStore, CoordinatorHandle, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store_dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let store = ConfigStore::new(&store_dir).unwrap();
        let coordinator = Coordinator::spawn(store.clone(), SitePattern::github());
        (store, coordinator, temp_dir)
    }

    #[tokio::test]
    async fn test_first_scan_runs_after_settle_delay() {
        let (store, coordinator, _temp_dir) = create_test_setup();
        let document = Document::from_html(
            "https://github.com/owner/repo/issues/1",
            r#"<div class="TimelineItem"><a class="author">Copilot</a></div>"#,
        );

        let filter = PageFilter::spawn(
            document.clone(),
            store,
            coordinator.clone(),
            test_settings(),
        );

        tokio::time::sleep(Duration::from_millis(150)).await;

        let container = document.select(&[Marker::class("TimelineItem")])[0];
        assert!(document.is_hidden(container));
        assert_eq!(coordinator.get_stats().await.unwrap().hidden_comments, 1);

        filter.shutdown().await;
    }

    #[tokio::test]
    async fn test_inserted_comment_hidden_after_debounce() {
        let (store, coordinator, _temp_dir) = create_test_setup();
        let document = Document::from_html(
            "https://github.com/owner/repo/issues/1",
            r#"<div class="TimelineItem"><a class="author">alice</a></div>"#,
        );

        let filter = PageFilter::spawn(
            document.clone(),
            store,
            coordinator.clone(),
            test_settings(),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        let inserted = document.insert_html(
            document.root(),
            r#"<div class="TimelineItem"><a class="author">Copilot</a></div>"#,
        );
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(document.is_hidden(inserted[0]));
        assert_eq!(coordinator.get_stats().await.unwrap().hidden_comments, 1);

        filter.shutdown().await;
    }

    #[tokio::test]
    async fn test_irrelevant_insertion_does_not_hide() {
        let (store, coordinator, _temp_dir) = create_test_setup();
        let document = Document::from_html("https://github.com/owner/repo/issues/1", "");

        let filter = PageFilter::spawn(
            document.clone(),
            store,
            coordinator.clone(),
            test_settings(),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        // No watched marker anywhere in the inserted subtree.
        let inserted = document.insert_html(
            document.root(),
            r#"<div class="sidebar"><a class="author">Copilot</a></div>"#,
        );
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(!document.is_hidden(inserted[0]));

        filter.shutdown().await;
    }

    #[tokio::test]
    async fn test_navigation_triggers_delayed_rescan() {
        let (store, coordinator, _temp_dir) = create_test_setup();
        let document = Document::from_html("https://github.com/owner/repo/issues/1", "");

        // No watch markers, so mutation debouncing never fires and the
        // navigation rescan is the only path to a new scan.
        let settings = EngineSettings {
            watch_markers: vec![],
            ..test_settings()
        };
        let filter = PageFilter::spawn(document.clone(), store, coordinator.clone(), settings);
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Simulate an in-place navigation swapping the timeline content.
        let inserted = document.insert_html(
            document.root(),
            r#"<div class="TimelineItem"><a class="author">Copilot</a></div>"#,
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!document.is_hidden(inserted[0]));

        document.navigate("https://github.com/owner/repo/issues/2");
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(document.is_hidden(inserted[0]));

        filter.shutdown().await;
    }

    #[tokio::test]
    async fn test_config_push_received_while_running() {
        let (store, coordinator, _temp_dir) = create_test_setup();
        let document = Document::from_html(
            "https://github.com/owner/repo/issues/1",
            r#"<div class="TimelineItem"><a class="author">Copilot</a></div>"#,
        );

        let filter = PageFilter::spawn(
            document.clone(),
            store,
            coordinator.clone(),
            test_settings(),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        let container = document.select(&[Marker::class("TimelineItem")])[0];
        assert!(document.is_hidden(container));

        coordinator
            .update_config(ConfigDelta {
                enabled: Some(false),
                ..ConfigDelta::default()
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!document.is_hidden(container));

        filter.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_unregisters_page() {
        let (store, coordinator, _temp_dir) = create_test_setup();
        let document = Document::from_html("https://github.com/owner/repo/issues/1", "");

        let filter = PageFilter::spawn(
            document.clone(),
            store,
            coordinator.clone(),
            test_settings(),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        filter.shutdown().await;

        // A push after shutdown must not reach the torn-down page; it only
        // needs to not error on the coordinator side.
        coordinator
            .update_config(ConfigDelta {
                users_to_hide: Some(vec!["ghost".to_string()]),
                ..ConfigDelta::default()
            })
            .await
            .unwrap();
    }
}
