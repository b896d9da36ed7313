use crate::app::{AppError, RebuildReport};
use crate::extract::NO_TEXT_DETECTED;
use crate::items::{ItemCreate, ItemStore, SourceKind};
use crate::semantic::{hash_file, hash_text, VectorSpace};

use super::fakes::Fixture;

fn legacy_row(fx: &Fixture, text: &str, source: SourceKind, blob_ref: Option<String>) -> u64 {
    fx.store
        .create(ItemCreate {
            text: text.to_string(),
            source,
            blob_ref,
            content_hash: String::new(),
            created_at: 1,
        })
        .unwrap()
        .id
}

#[test]
fn backfill_fills_missing_hashes_once() {
    let fx = Fixture::new();
    let app = fx.service();

    let asset = fx.screenshot("legacy.png", b"legacy pixels");
    let clip = legacy_row(&fx, "old clipboard text", SourceKind::Clipboard, None);
    let shot = legacy_row(
        &fx,
        "old screenshot text",
        SourceKind::Screenshot,
        Some(asset.to_string_lossy().into_owned()),
    );
    let orphan = legacy_row(
        &fx,
        "screenshot whose file is gone",
        SourceKind::Screenshot,
        Some("/nonexistent/gone.png".to_string()),
    );
    let hashed = app.ingest_text("already has a hash").unwrap().item_id().unwrap();
    let before = app.get_item(hashed).unwrap().content_hash;

    assert_eq!(app.backfill_hashes().unwrap(), 3);

    assert_eq!(app.get_item(clip).unwrap().content_hash, hash_text("old clipboard text"));
    assert_eq!(app.get_item(shot).unwrap().content_hash, hash_file(&asset).unwrap());
    assert_eq!(
        app.get_item(orphan).unwrap().content_hash,
        hash_text("screenshot whose file is gone")
    );
    assert_eq!(app.get_item(hashed).unwrap().content_hash, before);

    assert_eq!(app.backfill_hashes().unwrap(), 0);
}

#[test]
fn backfilled_rows_become_exact_duplicates() {
    let fx = Fixture::new();
    let app = fx.service();
    let id = legacy_row(&fx, "copied before hashing existed", SourceKind::Clipboard, None);

    // without a hash the row is invisible to exact matching
    assert_eq!(fx.store.find_by_hash(&hash_text("copied before hashing existed")).unwrap(), None);

    app.backfill_hashes().unwrap();
    assert_eq!(
        fx.store.find_by_hash(&hash_text("copied before hashing existed")).unwrap(),
        Some(id)
    );
}

#[test]
fn rebuild_drops_stale_slots_and_skips_missing_assets() {
    let fx = Fixture::new();
    let app = fx.service();

    let gone = app.ingest_text("clipboard text to delete").unwrap().item_id().unwrap();
    app.ingest_text("clipboard text to keep").unwrap();
    let shot = fx.screenshot("slide.png", b"slide pixels");
    fx.extractor.set("slide.png", "Quarterly roadmap slide");
    app.ingest_screenshot(&shot).unwrap();
    // a screenshot row with sentinel text and no asset on disk
    fx.insert_row(NO_TEXT_DETECTED, SourceKind::Screenshot, 5);

    app.delete_item(gone).unwrap();
    let stale = app.stats().unwrap();
    assert_eq!(stale.text_vectors, 3);
    assert_eq!(stale.image_vectors, 1);

    let mut progress = Vec::new();
    let report = app
        .rebuild_from_store(|done, total| progress.push((done, total)))
        .unwrap();

    assert_eq!(
        report,
        RebuildReport {
            items: 3,
            text_vectors: 2,
            image_vectors: 1,
            skipped: 1,
        }
    );
    assert_eq!(progress.last(), Some(&(3, 3)));

    let stats = app.stats().unwrap();
    assert_eq!(stats.text_vectors, 2);
    assert_eq!(stats.image_vectors, 1);
    assert_eq!(stats.indexed_items, 2);

    // rebuilt spaces are on disk
    let reopened = fx.open_vectors();
    assert_eq!(reopened.len(VectorSpace::Text), 2);
    assert_eq!(reopened.len(VectorSpace::Image), 1);
}

#[test]
fn rebuild_falls_back_when_batch_encoding_fails() {
    let fx = Fixture::new();
    let app = fx.service();
    app.ingest_text("first clipboard entry").unwrap();
    app.ingest_text("second clipboard entry").unwrap();

    fx.text.set_failing(true);
    let report = app.rebuild_from_store(|_, _| {}).unwrap();

    assert_eq!(report.items, 2);
    assert_eq!(report.text_vectors, 0);
    assert_eq!(report.skipped, 2);
    assert_eq!(app.stats().unwrap().text_vectors, 0);
}

#[test]
fn rebuild_of_empty_store_is_empty() {
    let fx = Fixture::new();
    let app = fx.service();

    let report = app.rebuild_from_store(|_, _| {}).unwrap();
    assert_eq!(report, RebuildReport::default());
}

#[test]
fn asset_path_requires_row_and_file() {
    let fx = Fixture::new();
    let app = fx.service();

    let shot = fx.screenshot("kept.png", b"kept");
    let id = app.ingest_screenshot(&shot).unwrap().item_id().unwrap();
    assert_eq!(app.asset_path(id).unwrap(), std::fs::canonicalize(&shot).unwrap());

    std::fs::remove_file(&shot).unwrap();
    assert!(matches!(app.asset_path(id), Err(AppError::NotFound)));

    let clip = app.ingest_text("no asset for clipboard").unwrap().item_id().unwrap();
    assert!(matches!(app.asset_path(clip), Err(AppError::NotFound)));
    assert!(matches!(app.asset_path(9_999), Err(AppError::NotFound)));
}

#[test]
fn deleting_missing_item_is_not_found() {
    let fx = Fixture::new();
    let app = fx.service();

    assert!(matches!(app.delete_item(77), Err(AppError::NotFound)));

    let id = app.ingest_text("delete me please").unwrap().item_id().unwrap();
    app.delete_item(id).unwrap();
    assert!(matches!(app.get_item(id), Err(AppError::NotFound)));
    assert!(matches!(app.delete_item(id), Err(AppError::NotFound)));
}
