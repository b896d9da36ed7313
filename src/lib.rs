//! Personal content indexing and retrieval: copied text and screenshots go in
//! through a deduplicating ingestor, free-text queries come back out ranked
//! across a text space and an image space.

pub mod app;
pub mod config;
pub mod extract;
pub mod items;
pub mod processed;
pub mod semantic;
pub mod storage;

#[cfg(test)]
mod tests;
