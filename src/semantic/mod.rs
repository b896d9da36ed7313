//! Vector indexing infrastructure.
//!
//! # Architecture
//!
//! - `index`: flat in-memory index with exact squared-L2 search
//! - `storage`: binary persistence for one space (vectors + id map)
//! - `dual`: the text and image spaces side by side
//! - `embeddings`: encoder traits and their fastembed implementations
//! - `dedup`: junk, exact and near-duplicate admission checks
//! - `preprocess`: content hashing and previews

pub mod dedup;
pub mod dual;
pub mod embeddings;
mod index;
mod preprocess;
mod storage;

pub use dedup::{Assessment, DedupDecision, DedupError, Deduplicator, JunkReason, RawContent};
pub use dual::{DualVectorStore, IndexStats, SpaceSpec, VectorSpace};
pub use embeddings::{
    EmbeddingError, EmbeddingModel, ImageEncoder, ImageModel, ImageQueryEncoder, TextEncoder,
};
pub use index::{l2_normalize, squared_l2, IndexError, SearchResult, VectorIndex};
pub use preprocess::{hash_file, hash_text, preview};
pub use storage::{VectorStorage, VectorStorageError};
