//! Engine error types.

use thiserror::Error;

/// Errors from the crawl loops.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("catalog error: {0}")]
    Catalog(#[from] arkive_catalog::CatalogError),

    #[error("fetch error: {0}")]
    Fetch(#[from] arkive_fetch::FetchError),

    #[error("object store error: {0}")]
    Store(#[from] arkive_objects::StoreError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("worker task failed: {0}")]
    Worker(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
