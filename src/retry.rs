/*!
 * Bounded retry with exponential backoff for collaborator calls.
 *
 * Only transient failures (see [`ProviderError::is_transient`]) are retried;
 * anything else is returned on the first attempt.
 */

use std::future::Future;
use std::time::Duration;

use log::{error, warn};
use rand::Rng;

use crate::app_config::RetryConfig;
use crate::errors::ProviderError;

/// Retry policy shared by every stage that talks to a collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Base backoff in milliseconds, doubled on each retry
    pub backoff_base_ms: u64,
    /// Upper bound for a single backoff
    pub max_backoff_ms: u64,
    /// Add up to 25% random jitter to each backoff
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base_ms: u64) -> Self {
        Self {
            max_retries,
            backoff_base_ms,
            max_backoff_ms: 30_000,
            jitter: false,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.retry_count,
            backoff_base_ms: config.retry_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
            jitter: config.jitter,
        }
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    /// Backoff before retry number `retry` (1-based), without jitter
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(20);
        let backoff_ms = self
            .backoff_base_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(backoff_ms)
    }

    /// Run `call` until it succeeds, fails non-transiently, or the budget is spent
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let mut backoff = self.backoff_for(attempt);
                    if self.jitter && !backoff.is_zero() {
                        let extra = rand::rng().random_range(0..=backoff.as_millis() as u64 / 4);
                        backoff += Duration::from_millis(extra);
                    }
                    warn!(
                        "{} failed: {} - retry {}/{} in {:?}",
                        operation, e, attempt, self.max_retries, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    if e.is_transient() {
                        error!("{} failed after {} attempts: {}", operation, attempt + 1, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}
