//! The crawl loops: build discovery, the batched fetch-commit sweep, and
//! filename discovery from stored package manifests.

pub mod discover;
pub mod error;
pub mod filenames;
pub mod stats;
pub mod sweep;

pub use discover::discover_builds;
pub use error::{EngineError, EngineResult};
pub use filenames::find_new_filenames;
pub use stats::Stats;
pub use sweep::{run_sweep, SweepOptions, DEFAULT_BATCH};
