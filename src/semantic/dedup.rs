//! Admission control for new content: junk filtering, exact duplicates by
//! content hash, near duplicates by nearest neighbor in the text space.

use std::collections::HashSet;
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::config::DedupConfig;
use crate::items::{ItemStore, StoreError};
use crate::semantic::dual::{DualVectorStore, VectorSpace};
use crate::semantic::embeddings::TextEncoder;
use crate::semantic::index::IndexError;
use crate::semantic::preprocess::{hash_file, hash_text};

/// Neighbors inspected when looking past stale slots
const NEAR_DUPLICATE_CANDIDATES: usize = 8;

/// Content offered for ingestion.
#[derive(Debug, Clone)]
pub enum RawContent {
    /// Clipboard text, already trimmed by the capture layer
    Text(String),
    /// Screenshot asset on disk
    Screenshot(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "pattern", rename_all = "snake_case")]
pub enum JunkReason {
    TooShort,
    Whitespace,
    RepeatedChar,
    NoAlphanumeric,
    Boilerplate(String),
}

impl Display for JunkReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JunkReason::TooShort => f.write_str("too short"),
            JunkReason::Whitespace => f.write_str("whitespace only"),
            JunkReason::RepeatedChar => f.write_str("single repeated character"),
            JunkReason::NoAlphanumeric => f.write_str("no alphanumeric characters"),
            JunkReason::Boilerplate(pattern) => write!(f, "boilerplate '{pattern}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum DedupDecision {
    Accept,
    RejectExactDuplicate { existing_id: u64 },
    RejectNearDuplicate { existing_id: u64, similarity: f32 },
    RejectJunk { reason: JunkReason },
}

impl DedupDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, DedupDecision::Accept)
    }
}

/// Decision plus what was computed along the way, so accepted content
/// doesn't get hashed or encoded twice.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub decision: DedupDecision,
    pub content_hash: Option<String>,
    /// Text-space vector, when one was produced
    pub embedding: Option<Vec<f32>>,
}

impl Assessment {
    fn rejected(decision: DedupDecision, content_hash: Option<String>) -> Self {
        Self {
            decision,
            content_hash,
            embedding: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to read asset: {0}")]
    Io(#[from] std::io::Error),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("vector store lock poisoned")]
    Poisoned,
}

/// Junk rules, checked in order. Text only.
pub fn is_junk(text: &str, config: &DedupConfig) -> Option<JunkReason> {
    if text.chars().count() < config.min_length {
        return Some(JunkReason::TooShort);
    }

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(JunkReason::Whitespace);
    }

    if trimmed.chars().collect::<HashSet<_>>().len() == 1 {
        return Some(JunkReason::RepeatedChar);
    }

    if !text.chars().any(char::is_alphanumeric) {
        return Some(JunkReason::NoAlphanumeric);
    }

    let lower = text.to_lowercase();
    config
        .junk_patterns
        .iter()
        .find(|pattern| lower.contains(&pattern.to_lowercase()))
        .map(|pattern| JunkReason::Boilerplate(pattern.clone()))
}

pub struct Deduplicator {
    store: Arc<dyn ItemStore>,
    encoder: Arc<dyn TextEncoder>,
    vectors: Arc<RwLock<DualVectorStore>>,
    config: DedupConfig,
}

impl Deduplicator {
    pub fn new(
        store: Arc<dyn ItemStore>,
        encoder: Arc<dyn TextEncoder>,
        vectors: Arc<RwLock<DualVectorStore>>,
        config: DedupConfig,
    ) -> Self {
        Self {
            store,
            encoder,
            vectors,
            config,
        }
    }

    pub fn evaluate(&self, raw: &RawContent) -> Result<DedupDecision, DedupError> {
        Ok(self.assess(raw)?.decision)
    }

    pub fn assess(&self, raw: &RawContent) -> Result<Assessment, DedupError> {
        match raw {
            RawContent::Text(text) => self.assess_text(text),
            RawContent::Screenshot(path) => {
                let hash = hash_file(path)?;
                if let Some(existing_id) = self.store.find_by_hash(&hash)? {
                    return Ok(Assessment::rejected(
                        DedupDecision::RejectExactDuplicate { existing_id },
                        Some(hash),
                    ));
                }

                Ok(Assessment {
                    decision: DedupDecision::Accept,
                    content_hash: Some(hash),
                    embedding: None,
                })
            }
        }
    }

    fn assess_text(&self, text: &str) -> Result<Assessment, DedupError> {
        if let Some(reason) = is_junk(text, &self.config) {
            return Ok(Assessment::rejected(DedupDecision::RejectJunk { reason }, None));
        }

        let hash = hash_text(text);
        if let Some(existing_id) = self.store.find_by_hash(&hash)? {
            return Ok(Assessment::rejected(
                DedupDecision::RejectExactDuplicate { existing_id },
                Some(hash),
            ));
        }

        let embedding = match self.encoder.embed(text) {
            Ok(embedding) => embedding,
            Err(err) => {
                log::warn!("near-duplicate check skipped, encoder failed: {err}");
                return Ok(Assessment {
                    decision: DedupDecision::Accept,
                    content_hash: Some(hash),
                    embedding: None,
                });
            }
        };

        if let Some((existing_id, distance)) = self.nearest_live_neighbor(&embedding)? {
            if distance < self.config.near_duplicate_threshold {
                let similarity = 1.0 - distance / self.config.similarity_divisor;
                return Ok(Assessment::rejected(
                    DedupDecision::RejectNearDuplicate {
                        existing_id,
                        similarity,
                    },
                    Some(hash),
                ));
            }
        }

        Ok(Assessment {
            decision: DedupDecision::Accept,
            content_hash: Some(hash),
            embedding: Some(embedding),
        })
    }

    /// Closest text-space neighbor whose row still exists.
    fn nearest_live_neighbor(&self, embedding: &[f32]) -> Result<Option<(u64, f32)>, DedupError> {
        let candidates = {
            let vectors = self.vectors.read().map_err(|_| DedupError::Poisoned)?;
            vectors.search(VectorSpace::Text, embedding, NEAR_DUPLICATE_CANDIDATES)?
        };

        let ids: Vec<u64> = candidates.iter().map(|c| c.item_id).collect();
        let live = self.store.get_many(&ids)?;

        Ok(candidates
            .into_iter()
            .find(|c| live.contains_key(&c.item_id))
            .map(|c| (c.item_id, c.distance)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_junk_rules() {
        let config = DedupConfig::default();

        assert_eq!(is_junk("aaaa", &config), Some(JunkReason::TooShort));
        assert_eq!(is_junk("   ", &config), Some(JunkReason::TooShort));
        assert_eq!(is_junk("🙂🙂", &config), Some(JunkReason::TooShort));
        assert_eq!(is_junk("ok", &config), Some(JunkReason::TooShort));
        assert_eq!(is_junk("        ", &config), Some(JunkReason::Whitespace));
        assert_eq!(is_junk("  zzzzzz ", &config), Some(JunkReason::RepeatedChar));
        assert_eq!(is_junk("!!?? --", &config), Some(JunkReason::NoAlphanumeric));
        assert_eq!(
            is_junk("Link Copied to Clipboard!", &config),
            Some(JunkReason::Boilerplate("copied to clipboard".to_string()))
        );

        assert_eq!(is_junk("hello world", &config), None);
    }

    #[test]
    fn test_min_length_counts_characters() {
        let config = DedupConfig::default();
        // five characters, more than five bytes
        assert_eq!(is_junk("héllo", &config), None);
    }

    #[test]
    fn test_decision_serializes_tagged() {
        let json = serde_json::to_value(DedupDecision::RejectExactDuplicate { existing_id: 3 }).unwrap();
        assert_eq!(json["decision"], "reject_exact_duplicate");
        assert_eq!(json["existing_id"], 3);
    }
}
