use crate::{
    items::StoreError,
    semantic::{DedupError, EmbeddingError, IndexError, VectorStorageError},
};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("item not found")]
    NotFound,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("dedup error: {0}")]
    Dedup(#[from] DedupError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("index storage error: {0}")]
    Storage(#[from] VectorStorageError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub(crate) fn poisoned(what: &str) -> Self {
        AppError::Internal(format!("{what} lock poisoned"))
    }
}
