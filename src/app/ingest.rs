//! Ingestion path: dedup, row insert, vector insert, periodic persist.
//! Also replays the whole store into fresh spaces on rebuild.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;

use crate::{
    app::errors::AppError,
    extract::{is_sentinel, TextExtractor},
    items::{ContentItem, ItemCreate, ItemStore, SourceKind},
    processed::ProcessedCache,
    semantic::{
        preview, DedupDecision, Deduplicator, DualVectorStore, ImageEncoder, RawContent,
        TextEncoder, VectorSpace,
    },
};

/// Clipboard rows encoded per batch during rebuild
const REBUILD_BATCH_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// Row created; `indexed` is false when no vector could be produced
    Accepted { item_id: u64, indexed: bool },
    Rejected { decision: DedupDecision },
    /// Screenshot path was handled by an earlier run
    AlreadyProcessed,
}

impl IngestOutcome {
    pub fn decision(&self) -> Option<DedupDecision> {
        match self {
            IngestOutcome::Accepted { .. } => Some(DedupDecision::Accept),
            IngestOutcome::Rejected { decision } => Some(decision.clone()),
            IngestOutcome::AlreadyProcessed => None,
        }
    }

    pub fn item_id(&self) -> Option<u64> {
        match self {
            IngestOutcome::Accepted { item_id, .. } => Some(*item_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub items: usize,
    pub text_vectors: usize,
    pub image_vectors: usize,
    /// Rows (or one of their modalities) left without a vector
    pub skipped: usize,
}

pub struct Ingestor {
    store: Arc<dyn ItemStore>,
    dedup: Deduplicator,
    vectors: Arc<RwLock<DualVectorStore>>,
    text_encoder: Arc<dyn TextEncoder>,
    image_encoder: Arc<dyn ImageEncoder>,
    extractor: Arc<dyn TextExtractor>,
    processed: Mutex<ProcessedCache>,
    save_interval: usize,
    unsaved: AtomicUsize,
}

impl Ingestor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ItemStore>,
        dedup: Deduplicator,
        vectors: Arc<RwLock<DualVectorStore>>,
        text_encoder: Arc<dyn TextEncoder>,
        image_encoder: Arc<dyn ImageEncoder>,
        extractor: Arc<dyn TextExtractor>,
        processed: ProcessedCache,
        save_interval: usize,
    ) -> Self {
        Self {
            store,
            dedup,
            vectors,
            text_encoder,
            image_encoder,
            extractor,
            processed: Mutex::new(processed),
            save_interval: save_interval.max(1),
            unsaved: AtomicUsize::new(0),
        }
    }

    pub fn ingest_one(&self, raw: RawContent) -> Result<IngestOutcome, AppError> {
        match &raw {
            RawContent::Text(text) => self.ingest_text(&raw, text),
            RawContent::Screenshot(path) => self.ingest_screenshot(&raw, path),
        }
    }

    fn ingest_text(&self, raw: &RawContent, text: &str) -> Result<IngestOutcome, AppError> {
        let assessment = self.dedup.assess(raw)?;
        if !assessment.decision.is_accept() {
            log::debug!("rejected clipboard text: {:?}", assessment.decision);
            return Ok(IngestOutcome::Rejected {
                decision: assessment.decision,
            });
        }

        let item = self.store.create(ItemCreate {
            text: text.to_string(),
            source: SourceKind::Clipboard,
            blob_ref: None,
            content_hash: assessment.content_hash.unwrap_or_default(),
            created_at: chrono::Utc::now().timestamp(),
        })?;

        let indexed = match assessment.embedding {
            Some(embedding) => self.add_vector(VectorSpace::Text, &embedding, item.id)?,
            None => false,
        };

        log::info!(
            "accepted item={} source=clipboard indexed={indexed} text={:?}",
            item.id,
            preview(&item.text)
        );
        self.note_accepted()?;

        Ok(IngestOutcome::Accepted {
            item_id: item.id,
            indexed,
        })
    }

    fn ingest_screenshot(&self, raw: &RawContent, path: &Path) -> Result<IngestOutcome, AppError> {
        if self.lock_processed()?.is_processed(path) {
            return Ok(IngestOutcome::AlreadyProcessed);
        }

        let assessment = self.dedup.assess(raw)?;
        if !assessment.decision.is_accept() {
            log::debug!("rejected screenshot {}: {:?}", path.display(), assessment.decision);
            self.lock_processed()?.mark_processed(path)?;
            return Ok(IngestOutcome::Rejected {
                decision: assessment.decision,
            });
        }

        // the asset was just hashed, so it exists and resolves
        let path = std::fs::canonicalize(path)?;
        let path = path.as_path();

        let text = self.extractor.extract(path);
        let item = self.store.create(ItemCreate {
            text,
            source: SourceKind::Screenshot,
            blob_ref: Some(path.to_string_lossy().into_owned()),
            content_hash: assessment.content_hash.unwrap_or_default(),
            created_at: chrono::Utc::now().timestamp(),
        })?;

        let mut indexed = match self.image_encoder.embed_image(path) {
            Ok(embedding) => self.add_vector(VectorSpace::Image, &embedding, item.id)?,
            Err(err) => {
                log::warn!("item={} image encoding failed: {err}", item.id);
                false
            }
        };

        if !is_sentinel(&item.text) {
            indexed &= self.index_text(&item)?;
        }

        log::info!("accepted item={} source=screenshot indexed={indexed}", item.id);
        self.lock_processed()?.mark_processed(path)?;
        self.note_accepted()?;

        Ok(IngestOutcome::Accepted {
            item_id: item.id,
            indexed,
        })
    }

    fn index_text(&self, item: &ContentItem) -> Result<bool, AppError> {
        match self.text_encoder.embed(&item.text) {
            Ok(embedding) => self.add_vector(VectorSpace::Text, &embedding, item.id),
            Err(err) => {
                log::warn!("item={} text encoding failed: {err}", item.id);
                Ok(false)
            }
        }
    }

    /// A vector the encoder got wrong is logged and dropped, the row stays.
    fn add_vector(&self, space: VectorSpace, vector: &[f32], item_id: u64) -> Result<bool, AppError> {
        let mut vectors = self
            .vectors
            .write()
            .map_err(|_| AppError::poisoned("vector store"))?;

        match vectors.add(space, vector, item_id) {
            Ok(_) => Ok(true),
            Err(err) => {
                log::warn!("item={item_id} space={space} not indexed: {err}");
                Ok(false)
            }
        }
    }

    fn note_accepted(&self) -> Result<(), AppError> {
        let unsaved = self.unsaved.fetch_add(1, Ordering::SeqCst) + 1;
        if unsaved >= self.save_interval {
            self.flush()?;
        }
        Ok(())
    }

    fn lock_processed(&self) -> Result<std::sync::MutexGuard<'_, ProcessedCache>, AppError> {
        self.processed
            .lock()
            .map_err(|_| AppError::poisoned("processed cache"))
    }

    /// Persist both spaces and the processed screenshot set.
    pub fn flush(&self) -> Result<(), AppError> {
        {
            let vectors = self
                .vectors
                .read()
                .map_err(|_| AppError::poisoned("vector store"))?;
            vectors.save()?;
        }
        self.unsaved.store(0, Ordering::SeqCst);
        self.lock_processed()?.flush()?;
        Ok(())
    }

    /// Clear both spaces and re-encode every row in id order, then save once.
    pub fn rebuild_from_store<F>(&self, mut on_progress: F) -> Result<RebuildReport, AppError>
    where
        F: FnMut(usize, usize),
    {
        let items = self.store.scan()?;
        let total = items.len();
        let mut report = RebuildReport {
            items: total,
            ..Default::default()
        };

        log::info!("rebuilding index from {total} items");

        self.vectors
            .write()
            .map_err(|_| AppError::poisoned("vector store"))?
            .clear();

        let mut done = 0;
        let mut pending: Vec<&ContentItem> = Vec::with_capacity(REBUILD_BATCH_SIZE);

        for item in &items {
            match item.source {
                SourceKind::Clipboard => {
                    pending.push(item);
                    if pending.len() == REBUILD_BATCH_SIZE {
                        done += pending.len();
                        self.rebuild_text_batch(&pending, &mut report)?;
                        pending.clear();
                        on_progress(done, total);
                    }
                }
                SourceKind::Screenshot => {
                    self.rebuild_screenshot(item, &mut report)?;
                    done += 1;
                    on_progress(done, total);
                }
            }
        }

        if !pending.is_empty() {
            done += pending.len();
            self.rebuild_text_batch(&pending, &mut report)?;
            on_progress(done, total);
        }

        self.flush()?;

        log::info!(
            "rebuild done: text_vectors={} image_vectors={} skipped={}",
            report.text_vectors,
            report.image_vectors,
            report.skipped
        );

        Ok(report)
    }

    fn rebuild_text_batch(
        &self,
        batch: &[&ContentItem],
        report: &mut RebuildReport,
    ) -> Result<(), AppError> {
        let texts: Vec<String> = batch.iter().map(|item| item.text.clone()).collect();

        let embeddings = match self.text_encoder.embed_batch(&texts) {
            Ok(embeddings) if embeddings.len() == batch.len() => Some(embeddings),
            Ok(embeddings) => {
                log::warn!(
                    "encoder returned {} vectors for {} texts, retrying one at a time",
                    embeddings.len(),
                    batch.len()
                );
                None
            }
            Err(err) => {
                log::warn!("batch encoding failed, retrying one at a time: {err}");
                None
            }
        };

        match embeddings {
            Some(embeddings) => {
                for (item, embedding) in batch.iter().zip(embeddings) {
                    let added = self.add_vector(VectorSpace::Text, &embedding, item.id)?;
                    tally(report, VectorSpace::Text, added);
                }
            }
            None => {
                for item in batch {
                    tally(report, VectorSpace::Text, self.index_text(item)?);
                }
            }
        }
        Ok(())
    }

    fn rebuild_screenshot(&self, item: &ContentItem, report: &mut RebuildReport) -> Result<(), AppError> {
        if !is_sentinel(&item.text) {
            tally(report, VectorSpace::Text, self.index_text(item)?);
        }

        let asset = item.blob_ref.as_deref().map(Path::new).filter(|p| p.exists());
        let Some(asset) = asset else {
            log::warn!("item={} asset missing, no image vector", item.id);
            report.skipped += 1;
            return Ok(());
        };

        let added = match self.image_encoder.embed_image(asset) {
            Ok(embedding) => self.add_vector(VectorSpace::Image, &embedding, item.id)?,
            Err(err) => {
                log::warn!("item={} image encoding failed: {err}", item.id);
                false
            }
        };
        tally(report, VectorSpace::Image, added);
        Ok(())
    }
}

fn tally(report: &mut RebuildReport, space: VectorSpace, added: bool) {
    match (added, space) {
        (true, VectorSpace::Text) => report.text_vectors += 1,
        (true, VectorSpace::Image) => report.image_vectors += 1,
        (false, _) => report.skipped += 1,
    }
}
