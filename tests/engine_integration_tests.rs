//! Integration tests for the filter engine's scan and restore semantics
//!
//! These tests verify:
//! - Case-insensitive author matching, one hide per container
//! - Idempotent rescans with carried-forward display state
//! - Exact prior-visibility restoration
//! - Primary/fallback pass interplay
//! - Stats reporting and page-visibility suppression

use camino::Utf8PathBuf;
use tempfile::TempDir;
use threadmute::coordinator::SitePattern;
use threadmute::models::ConfigDelta;
use threadmute::{
    ConfigStore, Coordinator, CoordinatorHandle, Document, EngineSettings, FilterEngine, Marker,
};
use tokio::time::{Duration, sleep};

fn create_test_engine(html: &str) -> (FilterEngine, CoordinatorHandle, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store_dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    let store = ConfigStore::new(&store_dir).unwrap();
    let coordinator = Coordinator::spawn(store, SitePattern::github());

    let document = Document::from_html("https://github.com/owner/repo/issues/1", html);
    let engine = FilterEngine::new(document, coordinator.clone(), EngineSettings::default());
    (engine, coordinator, temp_dir)
}

fn users(names: &[&str]) -> ConfigDelta {
    ConfigDelta {
        users_to_hide: Some(names.iter().map(|n| n.to_string()).collect()),
        ..ConfigDelta::default()
    }
}

#[tokio::test]
async fn test_blocked_author_hidden_and_counted_once_any_casing() {
    let (mut engine, _coordinator, _temp_dir) = create_test_engine(
        r#"
        <div class="TimelineItem">
            <a class="author" href="/copilot">COPILOT</a>
        </div>
        "#,
    );

    assert_eq!(engine.scan(), 1);
    assert_eq!(engine.hidden_count(), 1);

    let container = engine.hidden_records()[0].node;
    assert!(engine.document().is_hidden(container));
}

#[tokio::test]
async fn test_scan_twice_yields_same_set_and_count() {
    let (mut engine, _coordinator, _temp_dir) = create_test_engine(
        r#"
        <div class="TimelineItem"><a class="author">Copilot</a></div>
        <div class="TimelineItem"><a class="author">alice</a></div>
        <div class="js-timeline-item"><a class="author">copilot</a></div>
        "#,
    );

    let first_count = engine.scan();
    let first_records = engine.hidden_records().to_vec();

    let second_count = engine.scan();
    let second_records = engine.hidden_records().to_vec();

    assert_eq!(first_count, 2);
    assert_eq!(second_count, first_count);
    assert_eq!(second_records, first_records);
}

#[tokio::test]
async fn test_restore_returns_exact_prior_display() {
    let (mut engine, coordinator, _temp_dir) = create_test_engine(
        r#"
        <div class="TimelineItem"><a class="author">Copilot</a></div>
        <div class="TimelineItem" style="display: flex"><a class="author">copilot</a></div>
        "#,
    );

    assert_eq!(engine.scan(), 2);
    let plain = engine.hidden_records()[0].node;
    let flexed = engine.hidden_records()[1].node;
    assert!(engine.document().is_hidden(plain));
    assert!(engine.document().is_hidden(flexed));

    engine.restore();

    assert_eq!(engine.document().display(plain), None);
    assert_eq!(engine.document().display(flexed), Some("flex".to_string()));
    assert_eq!(engine.hidden_count(), 0);

    sleep(Duration::from_millis(50)).await;
    assert_eq!(coordinator.get_stats().await.unwrap().hidden_comments, 0);
}

#[tokio::test]
async fn test_rescan_carries_forward_original_display() {
    let (mut engine, _coordinator, _temp_dir) = create_test_engine(
        r#"<div class="TimelineItem" style="display: grid"><a class="author">Copilot</a></div>"#,
    );

    engine.scan();
    assert_eq!(
        engine.hidden_records()[0].prior_display,
        Some("grid".to_string())
    );

    // The container now carries display:none; a rescan must not record that
    // as the value to restore to.
    engine.scan();
    assert_eq!(
        engine.hidden_records()[0].prior_display,
        Some("grid".to_string())
    );

    let container = engine.hidden_records()[0].node;
    engine.restore();
    assert_eq!(engine.document().display(container), Some("grid".to_string()));
}

#[tokio::test]
async fn test_container_hidden_once_with_multiple_blocked_authors() {
    let (mut engine, _coordinator, _temp_dir) = create_test_engine(
        r#"
        <div class="TimelineItem">
            <a class="author">alice</a>
            <a class="author">bob</a>
        </div>
        "#,
    );
    engine.apply_config(&users(&["alice", "bob"]));

    assert_eq!(engine.hidden_count(), 1);
}

#[tokio::test]
async fn test_fallback_pass_hides_via_closest_ancestor() {
    let (mut engine, _coordinator, _temp_dir) = create_test_engine(
        r#"
        <div class="js-comment-container">
            <div class="comment-body">
                <a data-hovercard-type="user" href="/copilot">Copilot</a>
            </div>
        </div>
        "#,
    );

    assert_eq!(engine.scan(), 1);
    let container = engine.hidden_records()[0].node;
    let node = engine.document().node(container).unwrap();
    assert!(node.classes.contains(&"js-comment-container".to_string()));
}

#[tokio::test]
async fn test_fallback_never_double_hides_one_container() {
    let (mut engine, _coordinator, _temp_dir) = create_test_engine(
        r#"
        <div class="js-comment-container">
            <a data-hovercard-type="user">Copilot</a>
            <a data-hovercard-type="user">Copilot</a>
        </div>
        "#,
    );

    assert_eq!(engine.scan(), 1);
    assert_eq!(engine.hidden_count(), 1);
}

#[tokio::test]
async fn test_fallback_skips_containers_hidden_by_host_page() {
    let (mut engine, _coordinator, _temp_dir) = create_test_engine(
        r#"
        <div class="js-comment-container" style="display: none">
            <a data-hovercard-type="user">Copilot</a>
        </div>
        "#,
    );

    assert_eq!(engine.scan(), 0);
    assert_eq!(engine.hidden_count(), 0);

    // Still hidden, but not ours to restore.
    let container = engine
        .document()
        .select(&[Marker::class("js-comment-container")])[0];
    assert!(engine.document().is_hidden(container));
    engine.restore();
    assert!(engine.document().is_hidden(container));
}

#[tokio::test]
async fn test_fallback_only_runs_when_primary_hides_nothing() {
    let (mut engine, _coordinator, _temp_dir) = create_test_engine(
        r#"
        <div class="TimelineItem"><a class="author">Copilot</a></div>
        <div class="js-comment-container">
            <a data-hovercard-type="user">Copilot</a>
        </div>
        "#,
    );

    assert_eq!(engine.scan(), 1);

    // The fallback-only container is untouched because the primary pass
    // already hid something.
    let container = engine
        .document()
        .select(&[Marker::class("js-comment-container")])[0];
    assert!(!engine.document().is_hidden(container));
}

#[tokio::test]
async fn test_unmatched_previously_hidden_container_stays_hidden() {
    let (mut engine, _coordinator, _temp_dir) = create_test_engine(
        r#"<div class="TimelineItem"><a class="author">Copilot</a></div>"#,
    );

    engine.scan();
    let container = engine.hidden_records()[0].node;
    assert!(engine.document().is_hidden(container));

    // The push drops Copilot from the list and triggers a rescan. The
    // container no longer matches, so it loses its record, but nothing
    // restores its visibility.
    engine.apply_config(&users(&["zed"]));
    assert_eq!(engine.hidden_count(), 0);
    assert!(engine.document().is_hidden(container));

    engine.restore();
    assert!(engine.document().is_hidden(container));
}

#[tokio::test]
async fn test_legacy_only_delta_replaces_block_list() {
    let (mut engine, _coordinator, _temp_dir) = create_test_engine(
        r#"<div class="TimelineItem"><a class="author">ann</a></div>"#,
    );

    engine.apply_config(&ConfigDelta {
        legacy_username: Some("ann".to_string()),
        ..ConfigDelta::default()
    });

    assert_eq!(engine.config().users_to_hide, vec!["ann"]);
    assert_eq!(engine.hidden_count(), 1);
}

#[tokio::test]
async fn test_stats_reported_after_scan() {
    let (mut engine, coordinator, _temp_dir) = create_test_engine(
        r#"
        <div class="TimelineItem"><a class="author">Copilot</a></div>
        <div class="TimelineItem"><a class="author">alice</a></div>
        <div class="TimelineItem"><a class="author">bob</a></div>
        "#,
    );

    engine.scan();
    sleep(Duration::from_millis(50)).await;

    assert_eq!(coordinator.get_stats().await.unwrap().hidden_comments, 1);
}

#[tokio::test]
async fn test_stats_suppressed_while_page_not_visible() {
    let (mut engine, coordinator, _temp_dir) = create_test_engine(
        r#"<div class="TimelineItem"><a class="author">Copilot</a></div>"#,
    );

    engine.document().set_visible(false);
    engine.scan();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(coordinator.get_stats().await.unwrap().hidden_comments, 0);

    engine.document().set_visible(true);
    engine.scan();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(coordinator.get_stats().await.unwrap().hidden_comments, 1);
}
