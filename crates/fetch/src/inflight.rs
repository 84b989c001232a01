//! The in-flight content-hash set.

use dashmap::DashSet;

/// Hashes currently being (or already) downloaded within a batch. The only
/// contract is atomic test-and-insert; the caller owns the set for the
/// lifetime of a batch and never clears it mid-batch.
#[derive(Debug, Default)]
pub struct InflightSet {
    hashes: DashSet<String>,
}

impl InflightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim a hash. Returns `false` when some other worker
    /// already holds it.
    pub fn try_claim(&self, hash: &str) -> bool {
        self.hashes.insert(hash.to_string())
    }

    /// Whether the hash has been claimed.
    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}
