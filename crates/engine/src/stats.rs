//! Per-status response histogram.

use std::collections::BTreeMap;
use std::fmt;

/// Counts responses by HTTP status. Transport errors are recorded under
/// status 0 but left out of the display.
#[derive(Debug, Default)]
pub struct Stats {
    counts: BTreeMap<u16, u64>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one response with the given status.
    pub fn record(&mut self, status: u16) {
        *self.counts.entry(status).or_insert(0) += 1;
    }

    /// The count recorded for a status.
    pub fn count(&self, status: u16) -> u64 {
        self.counts.get(&status).copied().unwrap_or(0)
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (status, count) in &self.counts {
            if *status == 0 {
                continue;
            }
            writeln!(f, "status {status} returned by {count} files")?;
        }
        Ok(())
    }
}
