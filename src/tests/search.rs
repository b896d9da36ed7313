use std::sync::{Arc, RwLock};

use crate::app::{RetrievalOrchestrator, SearchMode};
use crate::config::SearchConfig;
use crate::items::SourceKind;
use crate::semantic::VectorSpace;

use super::fakes::{put, Fixture};

const QUERY: &str = "where did I put the keys";

/// Three clipboard rows at created_at 100/200/300, text vectors at
/// increasing distance from the query.
fn timeline() -> (Fixture, [u64; 3]) {
    let fx = Fixture::new();
    fx.text.pin(QUERY, &[0.0, 0.0, 0.0, 0.0]);

    let mut vectors = fx.open_vectors();
    let mut ids = [0; 3];
    for (i, created_at) in [100, 200, 300].into_iter().enumerate() {
        let item = fx.insert_row(&format!("note {i}"), SourceKind::Clipboard, created_at);
        put(&mut vectors, VectorSpace::Text, item.id, &[i as f32 + 1.0, 0.0, 0.0, 0.0]);
        ids[i] = item.id;
    }
    vectors.save().unwrap();

    (fx, ids)
}

fn hit_ids(hits: &[crate::app::SearchHit]) -> Vec<u64> {
    hits.iter().map(|h| h.item.id).collect()
}

#[test]
fn results_are_ordered_by_distance() {
    let (fx, ids) = timeline();
    let app = fx.service();

    let hits = app.search(QUERY, Some(10), SearchMode::Text, None).unwrap();
    assert_eq!(hit_ids(&hits), ids.to_vec());
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert!((hits[2].score - 9.0).abs() < 1e-6);
}

#[test]
fn after_filter_keeps_strictly_newer_items() {
    let (fx, ids) = timeline();
    let app = fx.service();

    let hits = app.search(QUERY, Some(10), SearchMode::Text, Some(150)).unwrap();
    assert_eq!(hit_ids(&hits), vec![ids[1], ids[2]]);
}

#[test]
fn no_eligible_items_returns_empty_without_encoding() {
    let (fx, _) = timeline();
    let app = fx.service();

    let hits = app.search(QUERY, Some(10), SearchMode::All, Some(1_000)).unwrap();
    assert!(hits.is_empty());
    assert_eq!(fx.text.calls(), 0);
    assert_eq!(fx.query.calls(), 0);
}

#[test]
fn empty_text_space_returns_empty() {
    let fx = Fixture::new();
    fx.insert_row("a row with no vector", SourceKind::Clipboard, 1);
    let app = fx.service();

    let hits = app.search("anything at all", Some(5), SearchMode::Text, None).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn zero_k_and_blank_query_return_empty() {
    let (fx, _) = timeline();
    let app = fx.service();

    assert!(app.search(QUERY, Some(0), SearchMode::All, None).unwrap().is_empty());
    assert!(app.search("   ", Some(5), SearchMode::All, None).unwrap().is_empty());
}

#[test]
fn k_truncates_results() {
    let (fx, ids) = timeline();
    let app = fx.service();

    let hits = app.search(QUERY, Some(2), SearchMode::Text, None).unwrap();
    assert_eq!(hit_ids(&hits), vec![ids[0], ids[1]]);
}

#[test]
fn huge_k_returns_everything() {
    let (fx, ids) = timeline();
    let app = fx.service();

    let hits = app.search(QUERY, Some(usize::MAX), SearchMode::Text, None).unwrap();
    assert_eq!(hit_ids(&hits), ids.to_vec());

    let filtered = app.search(QUERY, Some(usize::MAX), SearchMode::All, Some(150)).unwrap();
    assert_eq!(hit_ids(&filtered), vec![ids[1], ids[2]]);

    let empty = Fixture::new().service();
    assert!(empty.search("nothing indexed", Some(usize::MAX), SearchMode::All, None).unwrap().is_empty());
}

#[test]
fn default_k_comes_from_config() {
    let (mut fx, _) = timeline();
    fx.config.search.default_k = 1;
    let app = fx.service();

    assert_eq!(app.search(QUERY, None, SearchMode::Text, None).unwrap().len(), 1);
}

#[test]
fn item_in_both_spaces_appears_once_at_lower_distance() {
    let fx = Fixture::new();
    fx.text.pin("receipt", &[0.0, 0.0, 0.0, 0.0]);
    fx.query.pin("receipt", &[0.0, 0.0, 0.0]);

    let shot = fx.insert_row("Receipt from the cafe", SourceKind::Screenshot, 10);
    let clip = fx.insert_row("cafe receipt total", SourceKind::Clipboard, 20);

    let mut vectors = fx.open_vectors();
    put(&mut vectors, VectorSpace::Text, shot.id, &[1.0, 0.0, 0.0, 0.0]);
    put(&mut vectors, VectorSpace::Image, shot.id, &[0.3, 0.0, 0.0]);
    put(&mut vectors, VectorSpace::Text, clip.id, &[0.5, 0.0, 0.0, 0.0]);

    let app = fx.service_with(vectors);
    let hits = app.search("receipt", Some(10), SearchMode::All, None).unwrap();

    assert_eq!(hit_ids(&hits), vec![shot.id, clip.id]);
    assert_eq!(hits[0].space, VectorSpace::Image);
    assert!((hits[0].score - 0.09).abs() < 1e-6);
}

#[test]
fn clipboard_only_excludes_screenshots() {
    let fx = Fixture::new();
    fx.text.pin("password", &[0.0, 0.0, 0.0, 0.0]);

    let shot = fx.insert_row("password reset screen", SourceKind::Screenshot, 10);
    let clip = fx.insert_row("password manager link", SourceKind::Clipboard, 10);

    let mut vectors = fx.open_vectors();
    put(&mut vectors, VectorSpace::Text, shot.id, &[0.1, 0.0, 0.0, 0.0]);
    put(&mut vectors, VectorSpace::Text, clip.id, &[2.0, 0.0, 0.0, 0.0]);

    let app = fx.service_with(vectors);

    let clip_hits = app.search("password", Some(10), SearchMode::ClipboardOnly, None).unwrap();
    assert_eq!(hit_ids(&clip_hits), vec![clip.id]);

    let text_hits = app.search("password", Some(10), SearchMode::Text, None).unwrap();
    assert_eq!(hit_ids(&text_hits), vec![shot.id, clip.id]);
}

#[test]
fn images_mode_searches_only_the_image_space() {
    let fx = Fixture::new();
    fx.query.pin("sunset", &[0.0, 0.0, 0.0]);

    let beach = fx.insert_row("beach.png", SourceKind::Screenshot, 10);
    let note = fx.insert_row("sunset photo ideas", SourceKind::Clipboard, 10);

    let mut vectors = fx.open_vectors();
    put(&mut vectors, VectorSpace::Image, beach.id, &[0.2, 0.2, 0.2]);
    put(&mut vectors, VectorSpace::Text, note.id, &[0.0, 0.0, 0.0, 0.0]);

    let app = fx.service_with(vectors);
    let hits = app.search("sunset", Some(10), SearchMode::Images, None).unwrap();

    assert_eq!(hit_ids(&hits), vec![beach.id]);
    assert_eq!(fx.text.calls(), 0);
}

#[test]
fn deleted_items_are_not_returned() {
    let (fx, ids) = timeline();
    let app = fx.service();
    app.delete_item(ids[0]).unwrap();

    let hits = app.search(QUERY, Some(10), SearchMode::Text, None).unwrap();
    assert_eq!(hit_ids(&hits), vec![ids[1], ids[2]]);
}

#[test]
fn search_survives_restart() {
    let fx = Fixture::new();
    let (stats, before) = {
        let app = fx.service();
        app.ingest_text("quarterly report draft").unwrap();
        app.ingest_text("grocery list for sunday").unwrap();
        app.ingest_screenshot(&fx.screenshot("chart.png", b"chart")).unwrap();
        (
            app.stats().unwrap(),
            app.search("quarterly report", Some(3), SearchMode::All, None).unwrap(),
        )
    };

    let app = fx.service();
    assert_eq!(app.stats().unwrap(), stats);
    assert_eq!(
        app.search("quarterly report", Some(3), SearchMode::All, None).unwrap(),
        before
    );
}

#[test]
fn filtered_depth_is_bounded() {
    let fx = Fixture::new();
    let orchestrator = RetrievalOrchestrator::new(
        fx.store.clone(),
        fx.text.clone(),
        fx.query.clone(),
        Arc::new(RwLock::new(fx.open_vectors())),
        SearchConfig::default(),
    );

    // unfiltered
    assert_eq!(orchestrator.depth(10, None, 5), 20);
    // k * 10 wins
    assert_eq!(orchestrator.depth(2, Some(1_000), 10_000), 20);
    // eligible * 2 wins
    assert_eq!(orchestrator.depth(10, Some(3), 10_000), 6);
    // space size wins
    assert_eq!(orchestrator.depth(10, Some(1_000), 40), 40);
    // hard cap
    assert_eq!(orchestrator.depth(100, Some(10_000), 10_000), 500);
    // empty space
    assert_eq!(orchestrator.depth(10, Some(5), 0), 0);
}
