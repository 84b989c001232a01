//! The relational catalog: servers, builds, candidate files, and the
//! headers/metadata recorded for them.
//!
//! All persistent state other than object content lives here, in a single
//! embedded SQLite database with foreign keys enforced. Action functions
//! are generic over [`sqlx::SqliteExecutor`] so the same body runs against
//! the pool, a single connection, or a transaction.

pub mod actions;
pub mod error;
pub mod filter;
pub mod models;
pub mod store;

pub use error::{CatalogError, CatalogResult};
pub use filter::{Filter, FilterError, FilterQuery};
pub use models::{Build, Candidate, ContentMetadata, HeaderRecord};
pub use store::Catalog;
