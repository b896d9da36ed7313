use crate::{
    app::service::{AppService, Encoders},
    config::Config,
    extract::UnavailableExtractor,
    items::BackendCsv,
    processed::ProcessedCache,
    semantic::{DualVectorStore, EmbeddingModel, ImageModel, SpaceSpec},
};
use anyhow::{bail, Context, Result};
use homedir::my_home;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Application factory for creating and configuring application components
pub struct AppFactory;

/// How the vector spaces are opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    /// Load what is on disk; stored dimensions and models must match
    Load,
    /// Start from empty spaces, used by rebuild
    Fresh,
}

impl AppFactory {
    /// Wire the production service: CSV store, fastembed encoders, on-disk index.
    pub fn create_app_service(paths: &AppPaths, mode: IndexMode) -> Result<AppService> {
        let config = Self::create_config(&paths.base_path)?;

        let store = BackendCsv::load(&paths.items_path)
            .with_context(|| format!("failed to open {}", paths.items_path.display()))?;

        let vectors = Self::open_vectors(paths, &config, mode)?;
        let encoders = Self::create_encoders(paths, &config)?;
        Self::check_dimensions(&config, &encoders)?;

        let processed = ProcessedCache::load(&paths.processed_path, config.index.save_interval)
            .context("failed to load processed screenshot cache")?;

        Ok(AppService::new(
            config,
            Arc::new(store),
            vectors,
            encoders,
            processed,
        ))
    }

    /// Encoders must produce vectors of the configured size for their space.
    pub fn check_dimensions(config: &Config, encoders: &Encoders) -> Result<()> {
        let text_dim = config.index.text_dim;
        let image_dim = config.index.image_dim;
        let checks = [
            ("text model", encoders.text.dimensions(), "index.text_dim", text_dim),
            ("image model", encoders.image.dimensions(), "index.image_dim", image_dim),
            ("image query model", encoders.image_query.dimensions(), "index.image_dim", image_dim),
        ];

        for (role, got, key, expected) in checks {
            if got != expected {
                bail!("{role} produces {got}-dim vectors but {key} is {expected}");
            }
        }
        Ok(())
    }

    pub fn space_specs(config: &Config) -> (SpaceSpec, SpaceSpec) {
        (
            SpaceSpec {
                dimensions: config.index.text_dim,
                model: config.models.text_model.clone(),
            },
            SpaceSpec {
                dimensions: config.index.image_dim,
                model: config.models.image_model.clone(),
            },
        )
    }

    fn open_vectors(paths: &AppPaths, config: &Config, mode: IndexMode) -> Result<DualVectorStore> {
        let (text, image) = Self::space_specs(config);

        let vectors = match mode {
            IndexMode::Load => DualVectorStore::open(&paths.index_path, &text, &image)
                .context("failed to load vector index, run `clipmind rebuild` if the models changed")?,
            IndexMode::Fresh => DualVectorStore::empty(&paths.index_path, &text, &image)?,
        };

        Ok(vectors)
    }

    fn create_encoders(paths: &AppPaths, config: &Config) -> Result<Encoders> {
        let timeout = Some(Duration::from_secs(config.models.download_timeout_secs));

        let text = EmbeddingModel::new(&config.models.text_model, paths.base_path.clone(), timeout)
            .context("failed to load text model")?;
        let image_query =
            EmbeddingModel::new(&config.models.image_model, paths.base_path.clone(), timeout)
                .context("failed to load image query model")?;
        let image = ImageModel::new(&config.models.image_model, paths.base_path.clone(), timeout)
            .context("failed to load image model")?;

        Ok(Encoders {
            text: Arc::new(text),
            image: Arc::new(image),
            image_query: Arc::new(image_query),
            extractor: Arc::new(UnavailableExtractor),
        })
    }

    /// Get application paths, creating the base directory
    pub fn get_paths() -> Result<AppPaths> {
        let paths = AppPaths::new(&Self::get_base_path()?);

        std::fs::create_dir_all(&paths.base_path)
            .context("Failed to create application base directory")?;

        Ok(paths)
    }

    /// Create configuration with validation
    pub fn create_config(base_path: &Path) -> Result<Config> {
        Config::load_with(base_path)
    }

    /// Get the base path for the application
    fn get_base_path() -> Result<PathBuf> {
        if let Ok(base_path) = std::env::var("CLIPMIND_BASE_PATH") {
            return Ok(PathBuf::from(base_path));
        }

        let home = my_home()
            .context("Could not determine home directory")?
            .context("Home directory path is empty")?;

        Ok(home.join(".local/share/clipmind"))
    }
}

/// Application paths structure
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_path: PathBuf,
    pub items_path: PathBuf,
    pub index_path: PathBuf,
    pub processed_path: PathBuf,
}

impl AppPaths {
    pub fn new(base_path: &Path) -> Self {
        Self {
            base_path: base_path.to_path_buf(),
            items_path: base_path.join("items.csv"),
            index_path: base_path.join("index"),
            processed_path: base_path.join("processed_screenshots.json"),
        }
    }
}
