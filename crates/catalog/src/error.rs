//! Catalog error types.

use thiserror::Error;

/// Catalog operation errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Filter(#[from] crate::filter::FilterError),
}

impl CatalogError {
    /// Whether this error is a unique-constraint violation. Repeat build
    /// discovery hits these as its steady state and swallows them.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            CatalogError::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}

/// Result type for catalog operations.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;
