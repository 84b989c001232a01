//! Token-bucket request rate limiting.

use crate::error::{FetchError, FetchResult};
use governor::{DefaultDirectRateLimiter, Quota};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A shared token-bucket limiter over all workers. A non-positive rate
/// disables limiting entirely.
pub struct RateLimiter {
    inner: Option<DefaultDirectRateLimiter>,
}

impl RateLimiter {
    /// Create a limiter allowing `rate` requests per second.
    pub fn new(rate: f64) -> Self {
        if rate <= 0.0 {
            return Self { inner: None };
        }
        let period = Duration::from_secs_f64(1.0 / rate);
        // A zero period (infinite rate) has no quota; treat it as unlimited.
        let inner = Quota::with_period(period).map(governor::RateLimiter::direct);
        Self { inner }
    }

    /// Wait until a request may proceed, or until cancelled.
    pub async fn wait(&self, cancel: &CancellationToken) -> FetchResult<()> {
        let Some(limiter) = &self.inner else {
            return Ok(());
        };
        tokio::select! {
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            _ = limiter.until_ready() => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn negative_rate_is_unlimited() {
        let limiter = RateLimiter::new(-1.0);
        let cancel = CancellationToken::new();
        for _ in 0..1000 {
            limiter.wait(&cancel).await.unwrap();
        }
    }

    #[tokio::test]
    async fn cancelled_wait_returns_immediately() {
        // One permit per hour: the second wait would block for a long time.
        let limiter = RateLimiter::new(1.0 / 3600.0);
        let cancel = CancellationToken::new();
        limiter.wait(&cancel).await.unwrap();

        cancel.cancel();
        match limiter.wait(&cancel).await {
            Err(FetchError::Cancelled) => {}
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn positive_rate_spaces_requests() {
        let limiter = RateLimiter::new(1000.0);
        let cancel = CancellationToken::new();
        let start = std::time::Instant::now();
        for _ in 0..5 {
            limiter.wait(&cancel).await.unwrap();
        }
        // Four waits after the initial permit, 1ms apart.
        assert!(start.elapsed() >= Duration::from_millis(3));
    }
}
