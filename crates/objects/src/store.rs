//! Object store layout and hash helpers.

use crate::error::{StoreError, StoreResult};
use std::path::{Path, PathBuf};
use tokio::fs;

/// A content-addressed object store rooted at a directory.
#[derive(Clone, Debug)]
pub struct ObjectStore {
    root: PathBuf,
}

/// Size and name of a stored object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Content size in bytes.
    pub size: u64,
    /// Object name, which is its content hash.
    pub name: String,
}

/// Whether a string is a valid object hash: 32 lowercase hex characters.
pub fn is_hash(s: &str) -> bool {
    s.len() == 32 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Derive an object hash from an HTTP ETag. Strips an optional weak prefix
/// (`W/`, case-insensitive), surrounding double quotes, and anything after
/// the first `-`, then lowercases and validates. Returns `None` when the
/// remainder is not a hash.
pub fn hash_from_etag(etag: &str) -> Option<String> {
    let mut etag = etag.to_ascii_lowercase();
    if let Some(rest) = etag.strip_prefix("w/") {
        etag = rest.to_string();
    }
    let etag = etag.trim_matches('"');
    let etag = match etag.split_once('-') {
        Some((prefix, _)) => prefix,
        None => etag,
    };
    is_hash(etag).then(|| etag.to_string())
}

impl ObjectStore {
    /// Open a store rooted at an existing directory.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        match std::fs::symlink_metadata(&root) {
            Ok(meta) if meta.is_dir() => Ok(Self { root }),
            Ok(_) => Err(StoreError::NotADirectory(root)),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The path an object of the given hash would occupy, or `None` when
    /// the hash is invalid.
    pub fn path(&self, hash: &str) -> Option<PathBuf> {
        if !is_hash(hash) {
            return None;
        }
        Some(self.root.join(&hash[..2]).join(hash))
    }

    /// Whether an object with the given hash is present.
    pub async fn exists(&self, hash: &str) -> bool {
        match self.path(hash) {
            Some(path) => fs::symlink_metadata(&path).await.is_ok(),
            None => false,
        }
    }

    /// Size and name of the object with the given hash, or `None` when it
    /// does not exist or the hash is invalid.
    pub async fn stat(&self, hash: &str) -> Option<ObjectMeta> {
        let path = self.path(hash)?;
        let meta = fs::symlink_metadata(&path).await.ok()?;
        Some(ObjectMeta {
            size: meta.len(),
            name: hash.to_string(),
        })
    }
}
