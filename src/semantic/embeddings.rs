//! Encoders that turn content into vectors.
//!
//! The core only sees the three traits below. The fastembed-backed models
//! implement them for production use:
//! - [`EmbeddingModel`] wraps a fastembed text model (MiniLM for the text
//!   space, CLIP's text tower for image-space queries)
//! - [`ImageModel`] wraps fastembed's CLIP vision model
//!
//! Models are constructed once by the factory and shared behind `Arc`.

use fastembed::{ImageEmbedding, ImageInitOptions, InitOptions, TextEmbedding};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Mutex;
use std::time::Duration;

use crate::semantic::index::l2_normalize;

/// Default download timeout for model files (5 minutes)
const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Encodes text into the text space.
pub trait TextEncoder: Send + Sync {
    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Encodes an image asset into the image space. Output is L2-normalized.
pub trait ImageEncoder: Send + Sync {
    fn dimensions(&self) -> usize;

    fn embed_image(&self, path: &Path) -> Result<Vec<f32>, EmbeddingError>;
}

/// Encodes a text query into the image space, same geometry as [`ImageEncoder`].
pub trait ImageQueryEncoder: Send + Sync {
    fn dimensions(&self) -> usize;

    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),

    #[error("Model download timed out after {0}s")]
    DownloadTimeout(u64),
}

/// SHA256 hash of a model name, stored in index headers to detect encoder changes.
pub fn model_id_hash(model_name: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(model_name.as_bytes());
    hasher.finalize().into()
}

/// Run a model constructor on its own thread and give up after `timeout`.
///
/// First use downloads the model files, which can hang on a bad network.
/// A loader that times out is left to finish in the background and its
/// result is dropped.
fn load_within<T, F>(timeout: Duration, load: F) -> Result<T, EmbeddingError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, EmbeddingError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("model-loader".to_string())
        .spawn(move || {
            let _ = tx.send(load());
        })
        .map_err(|e| EmbeddingError::InitFailed(format!("Failed to spawn model loader: {}", e)))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(EmbeddingError::DownloadTimeout(timeout.as_secs())),
        Err(RecvTimeoutError::Disconnected) => Err(EmbeddingError::InitFailed(
            "Model loader exited without a result".to_string(),
        )),
    }
}

fn models_dir(cache_dir: &Path) -> Result<PathBuf, EmbeddingError> {
    let models_dir = cache_dir.join("models");
    std::fs::create_dir_all(&models_dir).map_err(|e| {
        EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
    })?;
    Ok(models_dir)
}

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct EmbeddingModel {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl EmbeddingModel {
    /// Create a new embedding model with the given name.
    ///
    /// The model will be downloaded on first use if not cached.
    /// Models are cached in the `models/` subdirectory of `cache_dir`. Loading
    /// fails with `DownloadTimeout` once `download_timeout` (default 5 minutes)
    /// has passed.
    pub fn new(
        model_name: &str,
        cache_dir: PathBuf,
        download_timeout: Option<Duration>,
    ) -> Result<Self, EmbeddingError> {
        let model_enum = Self::parse_model_name(model_name)?;
        let timeout = download_timeout.unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT);

        let cache = models_dir(&cache_dir)?;

        let (model, dimensions) = load_within(timeout, move || {
            let options = InitOptions::new(model_enum)
                .with_cache_dir(cache)
                .with_show_download_progress(true);
            let mut model = TextEmbedding::try_new(options)
                .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;
            let dimensions = Self::probe_dimensions(&mut model)?;
            Ok((model, dimensions))
        })?;

        log::info!("loaded text model '{model_name}' ({dimensions} dims)");

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    pub fn name(&self) -> &str {
        &self.model_name
    }

    pub fn model_id_hash(&self) -> [u8; 32] {
        model_id_hash(&self.model_name)
    }

    fn embed_raw(&self, texts: Vec<&str>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        model
            .embed(texts, None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))
    }

    /// Parse model name string to fastembed enum.
    fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
        match name.to_lowercase().as_str() {
            "all-minilm-l6-v2" | "allminiml6v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "all-minilm-l6-v2-q" | "allminiml6v2q" => {
                Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q)
            }
            "bge-small-en-v1.5" | "bgesmallenv15" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "clip-vit-b-32" | "clipvitb32" => Ok(fastembed::EmbeddingModel::ClipVitB32),
            _ => Err(EmbeddingError::InvalidModel(format!(
                "Unknown model: {}. Supported models: all-MiniLM-L6-v2, bge-small-en-v1.5, clip-vit-b-32 (add -q suffix to MiniLM for quantized)",
                name
            ))),
        }
    }

    /// Probe the model to determine embedding dimensions.
    fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
    }
}

impl TextEncoder for EmbeddingModel {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_raw(vec![text])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.embed_raw(texts.iter().map(String::as_str).collect())
    }
}

/// CLIP text tower used as the query side of the image space.
impl ImageQueryEncoder for EmbeddingModel {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = TextEncoder::embed(self, text)?;
        l2_normalize(&mut vector);
        Ok(vector)
    }
}

/// Wrapper around fastembed's ImageEmbedding model.
pub struct ImageModel {
    model: Mutex<ImageEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl ImageModel {
    pub fn new(
        model_name: &str,
        cache_dir: PathBuf,
        download_timeout: Option<Duration>,
    ) -> Result<Self, EmbeddingError> {
        let (model_enum, dimensions) = match model_name.to_lowercase().as_str() {
            "clip-vit-b-32" | "clipvitb32" => (fastembed::ImageEmbeddingModel::ClipVitB32, 512),
            _ => {
                return Err(EmbeddingError::InvalidModel(format!(
                    "Unknown image model: {}. Supported models: clip-vit-b-32",
                    model_name
                )))
            }
        };

        let cache = models_dir(&cache_dir)?;
        let timeout = download_timeout.unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT);

        let model = load_within(timeout, move || {
            let options = ImageInitOptions::new(model_enum)
                .with_cache_dir(cache)
                .with_show_download_progress(true);
            ImageEmbedding::try_new(options).map_err(|e| EmbeddingError::InitFailed(e.to_string()))
        })?;

        log::info!("loaded image model '{model_name}' ({dimensions} dims)");

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    pub fn name(&self) -> &str {
        &self.model_name
    }
}

impl ImageEncoder for ImageModel {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_image(&self, path: &Path) -> Result<Vec<f32>, EmbeddingError> {
        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let mut vector = model
            .embed(vec![path], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))?;

        l2_normalize(&mut vector);
        Ok(vector)
    }
}
