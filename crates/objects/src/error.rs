//! Object store error types.

use std::path::PathBuf;
use thiserror::Error;

/// Object store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}: not a directory")]
    NotADirectory(PathBuf),

    #[error("invalid object hash: {0:?}")]
    InvalidHash(String),

    #[error("expected {expected} bytes, got {actual} (temporary file kept at {temp})")]
    SizeMismatch {
        expected: u64,
        actual: u64,
        temp: PathBuf,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for object store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
