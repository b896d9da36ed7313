//! Deterministic stand-ins for the model-backed collaborators, plus a
//! fixture that wires a full service inside a temp directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use xxhash_rust::xxh64::xxh64;

use crate::app::{AppFactory, AppService, Encoders};
use crate::config::Config;
use crate::extract::TextExtractor;
use crate::items::{BackendCsv, ContentItem, ItemCreate, ItemStore, SourceKind};
use crate::processed::ProcessedCache;
use crate::semantic::{
    DualVectorStore, EmbeddingError, ImageEncoder, ImageQueryEncoder, TextEncoder, VectorSpace,
};

pub const TEXT_DIM: usize = 4;
pub const IMAGE_DIM: usize = 3;

/// Spread-out pseudo-random vector so unrelated inputs land far apart.
fn hashed_vector(key: &[u8], dims: usize) -> Vec<f32> {
    (0..dims)
        .map(|seed| (xxh64(key, seed as u64) % 1000) as f32 / 100.0)
        .collect()
}

/// Shared behavior of the fakes: pinned vectors by key, hashed fallback,
/// switchable failure, call counter.
#[derive(Default)]
struct Table {
    pinned: Mutex<HashMap<String, Vec<f32>>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl Table {
    fn lookup(&self, key: &str, dims: usize) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbeddingError::EmbeddingFailed("fake failure".to_string()));
        }

        let pinned = self.pinned.lock().unwrap();
        Ok(pinned
            .get(key)
            .cloned()
            .unwrap_or_else(|| hashed_vector(key.as_bytes(), dims)))
    }
}

#[derive(Default)]
pub struct FakeTextEncoder {
    table: Table,
}

impl FakeTextEncoder {
    pub fn pin(&self, text: &str, vector: &[f32]) {
        self.table
            .pinned
            .lock()
            .unwrap()
            .insert(text.to_string(), vector.to_vec());
    }

    pub fn set_failing(&self, failing: bool) {
        self.table.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.table.calls.load(Ordering::SeqCst)
    }
}

impl TextEncoder for FakeTextEncoder {
    fn dimensions(&self) -> usize {
        TEXT_DIM
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.table.lookup(text, TEXT_DIM)
    }
}

/// Keys image vectors by file name.
#[derive(Default)]
pub struct FakeImageEncoder {
    table: Table,
}

impl FakeImageEncoder {
    pub fn pin(&self, file_name: &str, vector: &[f32]) {
        self.table
            .pinned
            .lock()
            .unwrap()
            .insert(file_name.to_string(), vector.to_vec());
    }

    pub fn set_failing(&self, failing: bool) {
        self.table.failing.store(failing, Ordering::SeqCst);
    }
}

impl ImageEncoder for FakeImageEncoder {
    fn dimensions(&self) -> usize {
        IMAGE_DIM
    }

    fn embed_image(&self, path: &Path) -> Result<Vec<f32>, EmbeddingError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.table.lookup(&name, IMAGE_DIM)
    }
}

#[derive(Default)]
pub struct FakeQueryEncoder {
    table: Table,
}

impl FakeQueryEncoder {
    pub fn pin(&self, query: &str, vector: &[f32]) {
        self.table
            .pinned
            .lock()
            .unwrap()
            .insert(query.to_string(), vector.to_vec());
    }

    pub fn calls(&self) -> usize {
        self.table.calls.load(Ordering::SeqCst)
    }
}

impl ImageQueryEncoder for FakeQueryEncoder {
    fn dimensions(&self) -> usize {
        IMAGE_DIM
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.table.lookup(text, IMAGE_DIM)
    }
}

/// Returns whatever text was registered for a file name, or the sentinel.
#[derive(Default)]
pub struct FakeExtractor {
    texts: Mutex<HashMap<String, String>>,
}

impl FakeExtractor {
    pub fn set(&self, file_name: &str, text: &str) {
        self.texts
            .lock()
            .unwrap()
            .insert(file_name.to_string(), text.to_string());
    }
}

impl TextExtractor for FakeExtractor {
    fn extract(&self, path: &Path) -> String {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.texts
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .unwrap_or_else(|| crate::extract::NO_TEXT_DETECTED.to_string())
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.index.text_dim = TEXT_DIM;
    config.index.image_dim = IMAGE_DIM;
    config.models.text_model = "fake-text".to_string();
    config.models.image_model = "fake-image".to_string();
    config
}

/// A service over a temp directory, with handles on every fake.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub config: Config,
    pub store: Arc<BackendCsv>,
    pub text: Arc<FakeTextEncoder>,
    pub image: Arc<FakeImageEncoder>,
    pub query: Arc<FakeQueryEncoder>,
    pub extractor: Arc<FakeExtractor>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let store = Arc::new(BackendCsv::load(&dir.path().join("items.csv")).unwrap());

        Self {
            dir,
            config,
            store,
            text: Arc::new(FakeTextEncoder::default()),
            image: Arc::new(FakeImageEncoder::default()),
            query: Arc::new(FakeQueryEncoder::default()),
            extractor: Arc::new(FakeExtractor::default()),
        }
    }

    pub fn index_dir(&self) -> PathBuf {
        self.dir.path().join("index")
    }

    pub fn open_vectors(&self) -> DualVectorStore {
        let (text, image) = AppFactory::space_specs(&self.config);
        DualVectorStore::open(&self.index_dir(), &text, &image).unwrap()
    }

    pub fn service_with(&self, vectors: DualVectorStore) -> AppService {
        let processed = ProcessedCache::load(
            &self.dir.path().join("processed_screenshots.json"),
            self.config.index.save_interval,
        )
        .unwrap();

        AppService::new(
            self.config.clone(),
            self.store.clone(),
            vectors,
            self.encoders(),
            processed,
        )
    }

    pub fn encoders(&self) -> Encoders {
        Encoders {
            text: self.text.clone(),
            image: self.image.clone(),
            image_query: self.query.clone(),
            extractor: self.extractor.clone(),
        }
    }

    /// Service over whatever index is currently saved on disk.
    pub fn service(&self) -> AppService {
        self.service_with(self.open_vectors())
    }

    /// Write a fake screenshot asset and return its path.
    pub fn screenshot(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    /// Insert a row directly, bypassing ingestion.
    pub fn insert_row(&self, text: &str, source: SourceKind, created_at: i64) -> ContentItem {
        self.store
            .create(ItemCreate {
                text: text.to_string(),
                source,
                blob_ref: match source {
                    SourceKind::Screenshot => Some(format!("/nonexistent/{text}.png")),
                    SourceKind::Clipboard => None,
                },
                content_hash: crate::semantic::hash_text(text),
                created_at,
            })
            .unwrap()
    }
}

/// Shorthand for adding a vector to a space.
pub fn put(vectors: &mut DualVectorStore, space: VectorSpace, item_id: u64, vector: &[f32]) {
    vectors.add(space, vector, item_id).unwrap();
}
