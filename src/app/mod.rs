pub mod errors;
pub mod factory;
pub mod ingest;
pub mod maintenance;
pub mod orchestrator;
pub mod service;

pub use errors::AppError;
pub use factory::{AppFactory, AppPaths, IndexMode};
pub use ingest::{IngestOutcome, Ingestor, RebuildReport};
pub use orchestrator::{RetrievalOrchestrator, SearchHit, SearchMode};
pub use service::{AppService, Encoders, StoreStats};
