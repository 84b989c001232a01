//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected manifest version {0:?}")]
    ManifestVersion(String),

    #[error("manifest line {line}: {message}")]
    ManifestParse { line: usize, message: String },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
