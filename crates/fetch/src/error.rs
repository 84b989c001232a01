//! Fetch error types.

use thiserror::Error;

/// Fetch operation errors.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{url}: unexpected status {status}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("fetcher worker pool is shut down")]
    PoolClosed,

    #[error("object store error: {0}")]
    Store(#[from] arkive_objects::StoreError),
}

/// Result type for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;
