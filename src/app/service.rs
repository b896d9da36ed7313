use crate::{
    app::{
        errors::AppError,
        ingest::{IngestOutcome, Ingestor, RebuildReport},
        maintenance,
        orchestrator::{RetrievalOrchestrator, SearchHit, SearchMode},
    },
    config::Config,
    extract::TextExtractor,
    items::{ContentItem, ItemStore, SourceKind},
    processed::ProcessedCache,
    semantic::{
        Deduplicator, DualVectorStore, ImageEncoder, ImageQueryEncoder, RawContent, TextEncoder,
        VectorSpace,
    },
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// The collaborators the engine is wired from.
#[derive(Clone)]
pub struct Encoders {
    pub text: Arc<dyn TextEncoder>,
    pub image: Arc<dyn ImageEncoder>,
    pub image_query: Arc<dyn ImageQueryEncoder>,
    pub extractor: Arc<dyn TextExtractor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_items: usize,
    pub clipboard_items: usize,
    pub screenshot_items: usize,
    pub text_vectors: usize,
    pub image_vectors: usize,
    /// Distinct items with at least one vector, stale slots included
    pub indexed_items: usize,
    pub text_dim: usize,
    pub image_dim: usize,
}

pub struct AppService {
    config: Config,
    store: Arc<dyn ItemStore>,
    vectors: Arc<RwLock<DualVectorStore>>,
    ingestor: Ingestor,
    orchestrator: RetrievalOrchestrator,
}

impl AppService {
    pub fn new(
        config: Config,
        store: Arc<dyn ItemStore>,
        vectors: DualVectorStore,
        encoders: Encoders,
        processed: ProcessedCache,
    ) -> Self {
        let vectors = Arc::new(RwLock::new(vectors));

        let dedup = Deduplicator::new(
            store.clone(),
            encoders.text.clone(),
            vectors.clone(),
            config.dedup.clone(),
        );

        let ingestor = Ingestor::new(
            store.clone(),
            dedup,
            vectors.clone(),
            encoders.text.clone(),
            encoders.image.clone(),
            encoders.extractor.clone(),
            processed,
            config.index.save_interval,
        );

        let orchestrator = RetrievalOrchestrator::new(
            store.clone(),
            encoders.text,
            encoders.image_query,
            vectors.clone(),
            config.search.clone(),
        );

        Self {
            config,
            store,
            vectors,
            ingestor,
            orchestrator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ingest_one(&self, raw: RawContent) -> Result<IngestOutcome, AppError> {
        self.ingestor.ingest_one(raw)
    }

    pub fn ingest_text(&self, text: &str) -> Result<IngestOutcome, AppError> {
        self.ingest_one(RawContent::Text(text.trim().to_string()))
    }

    pub fn ingest_screenshot(&self, path: &Path) -> Result<IngestOutcome, AppError> {
        self.ingest_one(RawContent::Screenshot(path.to_path_buf()))
    }

    pub fn search(
        &self,
        query: &str,
        k: Option<usize>,
        mode: SearchMode,
        after: Option<i64>,
    ) -> Result<Vec<SearchHit>, AppError> {
        let k = k.unwrap_or(self.config.search.default_k);
        self.orchestrator.search(query, k, mode, after)
    }

    pub fn rebuild_from_store<F>(&self, on_progress: F) -> Result<RebuildReport, AppError>
    where
        F: FnMut(usize, usize),
    {
        self.ingestor.rebuild_from_store(on_progress)
    }

    pub fn backfill_hashes(&self) -> Result<usize, AppError> {
        Ok(maintenance::backfill_hashes(self.store.as_ref())?)
    }

    pub fn get_item(&self, id: u64) -> Result<ContentItem, AppError> {
        self.store.get(id)?.ok_or(AppError::NotFound)
    }

    /// Removes the row only; its vectors stay behind until the next rebuild.
    pub fn delete_item(&self, id: u64) -> Result<(), AppError> {
        if !self.store.delete(id)? {
            return Err(AppError::NotFound);
        }
        log::info!("deleted item={id}");
        Ok(())
    }

    pub fn recent(&self, source: Option<SourceKind>, limit: usize) -> Result<Vec<ContentItem>, AppError> {
        Ok(self.store.recent(source, limit)?)
    }

    /// Path of a screenshot's asset, if the row and file still exist.
    pub fn asset_path(&self, id: u64) -> Result<PathBuf, AppError> {
        let item = self.get_item(id)?;
        let path = item.blob_ref.map(PathBuf::from).ok_or(AppError::NotFound)?;

        if !path.exists() {
            log::warn!("item={id} asset missing at {}", path.display());
            return Err(AppError::NotFound);
        }
        Ok(path)
    }

    pub fn stats(&self) -> Result<StoreStats, AppError> {
        let vectors = self
            .vectors
            .read()
            .map_err(|_| AppError::poisoned("vector store"))?;
        let index = vectors.stats();

        Ok(StoreStats {
            total_items: self.store.count(None)?,
            clipboard_items: self.store.count(Some(SourceKind::Clipboard))?,
            screenshot_items: self.store.count(Some(SourceKind::Screenshot))?,
            text_vectors: index.text_vectors,
            image_vectors: index.image_vectors,
            indexed_items: index.total_items,
            text_dim: vectors.dimensions(VectorSpace::Text),
            image_dim: vectors.dimensions(VectorSpace::Image),
        })
    }

    /// Persist anything still pending.
    pub fn flush(&self) -> Result<(), AppError> {
        self.ingestor.flush()
    }
}
