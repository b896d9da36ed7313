//! Query path: filter pushdown, per-space retrieval, hydrate, merge.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::{
    app::errors::AppError,
    config::SearchConfig,
    items::{ContentItem, ItemFilter, ItemStore, SourceKind},
    semantic::{DualVectorStore, ImageQueryEncoder, SearchResult, TextEncoder, VectorSpace},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Both spaces, any source
    #[default]
    All,
    /// Text space, any source
    Text,
    /// Image space, screenshots only
    Images,
    /// Text space, clipboard items only
    ClipboardOnly,
}

impl SearchMode {
    pub fn spaces(&self) -> &'static [VectorSpace] {
        match self {
            SearchMode::All => &[VectorSpace::Text, VectorSpace::Image],
            SearchMode::Text | SearchMode::ClipboardOnly => &[VectorSpace::Text],
            SearchMode::Images => &[VectorSpace::Image],
        }
    }

    pub fn source(&self) -> Option<SourceKind> {
        match self {
            SearchMode::Images => Some(SourceKind::Screenshot),
            SearchMode::ClipboardOnly => Some(SourceKind::Clipboard),
            SearchMode::All | SearchMode::Text => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub item: ContentItem,
    /// Squared L2 distance, lower is closer
    pub score: f32,
    /// Space the best match came from
    pub space: VectorSpace,
}

struct Candidate {
    item_id: u64,
    distance: f32,
    space: VectorSpace,
}

pub struct RetrievalOrchestrator {
    store: Arc<dyn ItemStore>,
    text_encoder: Arc<dyn TextEncoder>,
    query_encoder: Arc<dyn ImageQueryEncoder>,
    vectors: Arc<RwLock<DualVectorStore>>,
    config: SearchConfig,
}

impl RetrievalOrchestrator {
    pub fn new(
        store: Arc<dyn ItemStore>,
        text_encoder: Arc<dyn TextEncoder>,
        query_encoder: Arc<dyn ImageQueryEncoder>,
        vectors: Arc<RwLock<DualVectorStore>>,
        config: SearchConfig,
    ) -> Self {
        Self {
            store,
            text_encoder,
            query_encoder,
            vectors,
            config,
        }
    }

    /// Up to `k` items closest to `query`, ascending by distance, each item once.
    ///
    /// `after` keeps items strictly newer than the given timestamp.
    pub fn search(
        &self,
        query: &str,
        k: usize,
        mode: SearchMode,
        after: Option<i64>,
    ) -> Result<Vec<SearchHit>, AppError> {
        if k == 0 || query.trim().is_empty() {
            return Ok(vec![]);
        }

        let filter = ItemFilter {
            after,
            source: mode.source(),
        };

        let eligible = if filter.is_active() {
            let ids = self.store.ids_matching(&filter)?;
            if ids.is_empty() {
                log::debug!("no eligible items for {filter:?}");
                return Ok(vec![]);
            }
            Some(ids)
        } else {
            None
        };

        let spaces = mode.spaces();
        let run = |space: VectorSpace| -> Result<Vec<SearchResult>, AppError> {
            if spaces.contains(&space) {
                self.retrieve(space, query, k, eligible.as_ref())
            } else {
                Ok(vec![])
            }
        };

        let (text, image) = rayon::join(|| run(VectorSpace::Text), || run(VectorSpace::Image));

        let mut candidates: Vec<Candidate> = Vec::new();
        for (space, results) in [(VectorSpace::Text, text?), (VectorSpace::Image, image?)] {
            candidates.extend(
                results
                    .into_iter()
                    .filter(|r| eligible.as_ref().map_or(true, |ids| ids.contains(&r.item_id)))
                    .map(|r| Candidate {
                        item_id: r.item_id,
                        distance: r.distance,
                        space,
                    }),
            );
        }

        let ids: Vec<u64> = candidates
            .iter()
            .map(|c| c.item_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let mut rows = self.store.get_many(&ids)?;

        Ok(merge(candidates, &mut rows, k))
    }

    fn retrieve(
        &self,
        space: VectorSpace,
        query: &str,
        k: usize,
        eligible: Option<&HashSet<u64>>,
    ) -> Result<Vec<SearchResult>, AppError> {
        let total = self.read_vectors()?.len(space);
        let depth = self.depth(k, eligible.map(HashSet::len), total);
        if total == 0 || depth == 0 {
            log::debug!("space={space} skipped (vectors={total} depth={depth})");
            return Ok(vec![]);
        }

        let embedding = match space {
            VectorSpace::Text => self.text_encoder.embed(query)?,
            VectorSpace::Image => self.query_encoder.embed_query(query)?,
        };

        let results = self.read_vectors()?.search(space, &embedding, depth)?;
        log::debug!("space={space} depth={depth} candidates={}", results.len());
        Ok(results)
    }

    /// Candidate depth for one space. Filtered searches over-fetch so that
    /// enough survivors remain after the eligible-set filter.
    pub fn depth(&self, k: usize, eligible: Option<usize>, total: usize) -> usize {
        match eligible {
            Some(eligible) => {
                let cap = eligible
                    .saturating_mul(2)
                    .min(total)
                    .min(self.config.max_depth);
                k.saturating_mul(self.config.overfetch_factor).min(cap)
            }
            None => k.saturating_mul(self.config.unfiltered_factor),
        }
    }

    fn read_vectors(&self) -> Result<std::sync::RwLockReadGuard<'_, DualVectorStore>, AppError> {
        self.vectors
            .read()
            .map_err(|_| AppError::poisoned("vector store"))
    }
}

/// Sort by distance, keep each item's best hit, drop rows that vanished and
/// image hits that aren't screenshots, truncate to `k`.
fn merge(
    mut candidates: Vec<Candidate>,
    rows: &mut HashMap<u64, ContentItem>,
    k: usize,
) -> Vec<SearchHit> {
    candidates.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut seen = HashSet::new();
    let mut hits = Vec::with_capacity(k.min(candidates.len()));

    for candidate in candidates {
        if hits.len() == k {
            break;
        }

        let Some(item) = rows.get(&candidate.item_id) else {
            continue;
        };
        if candidate.space == VectorSpace::Image && item.source != SourceKind::Screenshot {
            continue;
        }
        if !seen.insert(candidate.item_id) {
            continue;
        }

        if let Some(item) = rows.remove(&candidate.item_id) {
            hits.push(SearchHit {
                item,
                score: candidate.distance,
                space: candidate.space,
            });
        }
    }

    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: u64, source: SourceKind) -> ContentItem {
        ContentItem {
            id,
            text: format!("item {id}"),
            source,
            blob_ref: None,
            content_hash: String::new(),
            created_at: 0,
        }
    }

    fn candidate(item_id: u64, distance: f32, space: VectorSpace) -> Candidate {
        Candidate {
            item_id,
            distance,
            space,
        }
    }

    #[test]
    fn test_mode_routing() {
        assert_eq!(SearchMode::All.spaces().len(), 2);
        assert_eq!(SearchMode::Text.source(), None);
        assert_eq!(SearchMode::Images.spaces(), &[VectorSpace::Image]);
        assert_eq!(SearchMode::Images.source(), Some(SourceKind::Screenshot));
        assert_eq!(SearchMode::ClipboardOnly.spaces(), &[VectorSpace::Text]);
        assert_eq!(SearchMode::ClipboardOnly.source(), Some(SourceKind::Clipboard));
    }

    #[test]
    fn test_merge_keeps_lowest_distance_per_item() {
        let mut rows: HashMap<u64, ContentItem> = [
            (1, item(1, SourceKind::Screenshot)),
            (2, item(2, SourceKind::Clipboard)),
        ]
        .into_iter()
        .collect();

        let hits = merge(
            vec![
                candidate(1, 0.9, VectorSpace::Text),
                candidate(2, 0.5, VectorSpace::Text),
                candidate(1, 0.2, VectorSpace::Image),
            ],
            &mut rows,
            10,
        );

        let got: Vec<(u64, f32, VectorSpace)> =
            hits.iter().map(|h| (h.item.id, h.score, h.space)).collect();
        assert_eq!(
            got,
            vec![(1, 0.2, VectorSpace::Image), (2, 0.5, VectorSpace::Text)]
        );
    }

    #[test]
    fn test_merge_drops_stale_and_non_screenshot_image_hits() {
        let mut rows: HashMap<u64, ContentItem> = [
            (1, item(1, SourceKind::Clipboard)),
            (3, item(3, SourceKind::Screenshot)),
        ]
        .into_iter()
        .collect();

        let hits = merge(
            vec![
                candidate(1, 0.1, VectorSpace::Image),
                candidate(2, 0.2, VectorSpace::Text),
                candidate(3, 0.3, VectorSpace::Image),
            ],
            &mut rows,
            10,
        );

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item.id, 3);
    }

    #[test]
    fn test_merge_truncates_after_dedup() {
        let mut rows: HashMap<u64, ContentItem> = (1..=3)
            .map(|id| (id, item(id, SourceKind::Screenshot)))
            .collect();

        let hits = merge(
            vec![
                candidate(1, 0.1, VectorSpace::Text),
                candidate(1, 0.15, VectorSpace::Image),
                candidate(2, 0.2, VectorSpace::Text),
                candidate(3, 0.3, VectorSpace::Text),
            ],
            &mut rows,
            2,
        );

        let ids: Vec<u64> = hits.iter().map(|h| h.item.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
