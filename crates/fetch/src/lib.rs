//! Rate-limited concurrent HTTP fetching.
//!
//! A [`Fetcher`] owns a fixed pool of worker tasks fed through a bounded
//! channel; every request waits on a shared token-bucket limiter before it
//! is sent. A per-batch [`InflightSet`] keeps two workers from streaming
//! the same content to disk.

pub mod error;
pub mod fetcher;
pub mod inflight;
pub mod limiter;

pub use error::{FetchError, FetchResult};
pub use fetcher::{ContentOutcome, Fetcher, DEFAULT_WORKERS};
pub use inflight::InflightSet;
pub use limiter::RateLimiter;
