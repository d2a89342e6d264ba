//! Token-bucket admission with random jitter
//!
//! Burst capacity is one, so consecutive waits are spaced by at least
//! `1 / rps` seconds regardless of jitter.

use governor::{DefaultDirectRateLimiter, Quota};
use rand::Rng;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("rate limit wait cancelled")]
pub struct WaitCancelled;

pub struct RateLimiter {
    limiter: DefaultDirectRateLimiter,
    max_jitter: Duration,
}

impl RateLimiter {
    /// `rps` of zero is treated as one
    pub fn new(rps: u32, max_jitter: Duration) -> Self {
        let rps = NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rps).allow_burst(NonZeroU32::MIN);

        Self {
            limiter: DefaultDirectRateLimiter::direct(quota),
            max_jitter,
        }
    }

    /// Block until admitted, then sleep a random jitter
    ///
    /// Both phases return early with [`WaitCancelled`] once `cancel` fires.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), WaitCancelled> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WaitCancelled),
            _ = self.limiter.until_ready() => {}
        }

        let jitter = self.jitter();
        if jitter.is_zero() {
            return Ok(());
        }
        cancellable_sleep(jitter, cancel).await
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }
}

async fn cancellable_sleep(duration: Duration, cancel: &CancellationToken) -> Result<(), WaitCancelled> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(WaitCancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_jitter", &self.max_jitter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::TorConfig;
    use std::time::Instant;

    #[tokio::test]
    async fn test_waits_are_spaced() {
        let limiter = RateLimiter::new(10, Duration::ZERO);
        let cancel = CancellationToken::new();

        let start = Instant::now();
        for _ in 0..5 {
            limiter.wait(&cancel).await.unwrap();
        }

        // first call is immediate, the other four wait ~100ms each
        assert!(start.elapsed() >= Duration::from_millis(380));
    }

    #[tokio::test]
    async fn test_cancelled_wait() {
        let limiter = RateLimiter::new(1, Duration::ZERO);
        let cancel = CancellationToken::new();

        limiter.wait(&cancel).await.unwrap();
        cancel.cancel();
        assert_eq!(limiter.wait(&cancel).await, Err(WaitCancelled));
    }

    #[tokio::test]
    async fn test_default_rate_is_one_per_second() {
        let config = TorConfig::default();
        assert_eq!(config.rate_limit_rps, 1);

        let limiter = RateLimiter::new(config.rate_limit_rps, Duration::ZERO);
        let cancel = CancellationToken::new();

        limiter.wait(&cancel).await.unwrap();
        let start = Instant::now();
        limiter.wait(&cancel).await.unwrap();

        // burst of one: the second admission waits a full period
        assert!(start.elapsed() >= Duration::from_millis(950));
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_admission() {
        let limiter = RateLimiter::new(1, Duration::ZERO);
        let cancel = CancellationToken::new();
        limiter.wait(&cancel).await.unwrap();

        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            }
        });

        let start = Instant::now();
        assert_eq!(limiter.wait(&cancel).await, Err(WaitCancelled));
        assert!(start.elapsed() < Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_jitter_sleep() {
        let cancel = CancellationToken::new();
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                cancel.cancel();
            }
        });

        let start = tokio::time::Instant::now();
        let result = cancellable_sleep(Duration::from_secs(60), &cancel).await;
        assert_eq!(result, Err(WaitCancelled));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_zero_rps_treated_as_one() {
        let limiter = RateLimiter::new(0, Duration::ZERO);
        let cancel = CancellationToken::new();
        assert!(limiter.wait(&cancel).await.is_ok());
    }
}
