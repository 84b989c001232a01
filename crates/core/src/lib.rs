//! Core domain types and shared logic for the arkive archiver.
//!
//! This crate defines the vocabulary used across all other crates:
//! - The file lifecycle flags bitfield and its progress labels
//! - Artifact URL shaping
//! - The runtime configuration file format
//! - The deploy-history lexer
//! - The package-manifest decoder

pub mod config;
pub mod error;
pub mod flags;
pub mod history;
pub mod manifest;
pub mod url;

pub use config::Config;
pub use error::{Error, Result};
pub use flags::FileFlags;
pub use history::BuildRecord;
pub use manifest::ManifestEntry;
pub use url::{build_file_url, sanitize_base_url};
