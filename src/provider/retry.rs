//! Bounded retry with exponential backoff for idempotent provider calls
//!
//! Only analysis calls go through here. Streaming chat is never retried
//! because a partially relayed stream cannot be replayed.

use crate::error::ProviderError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Maximum backoff duration in milliseconds (30 seconds)
///
/// Prevents unbounded sleeps from exponential overflow. With base=100ms:
/// - Attempt 9 would be 25.6 seconds (under cap)
/// - Attempt 10 would be 51.2 seconds (capped to 30s)
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Attempt budget and backoff base for one retried operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_backoff_ms: u64,
}

impl RetryPolicy {
    /// Create a policy
    ///
    /// # Errors
    /// Returns an error if `max_attempts` is 0 (at least 1 attempt is required)
    pub fn new(max_attempts: usize, base_backoff_ms: u64) -> Result<Self, &'static str> {
        if max_attempts == 0 {
            return Err("max_attempts must be at least 1");
        }
        Ok(Self {
            max_attempts,
            base_backoff_ms,
        })
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Backoff after the given failed attempt (1-indexed)
    ///
    /// `base * 2^(attempt-1)`, capped at [`MAX_BACKOFF_MS`]:
    /// with base=100ms that is 100ms, 200ms, 400ms, ...
    pub fn backoff_ms(&self, attempt: usize) -> u64 {
        let exponent = (attempt as u32).saturating_sub(1);
        self.base_backoff_ms
            .saturating_mul(2_u64.saturating_pow(exponent))
            .min(MAX_BACKOFF_MS)
    }

    /// Backoff with up to 10% random jitter added
    pub fn backoff_with_jitter(&self, attempt: usize) -> Duration {
        let base = self.backoff_ms(attempt);
        let jitter = if base >= 10 {
            rand::rng().random_range(0..=base / 10)
        } else {
            0
        };
        Duration::from_millis(base.saturating_add(jitter).min(MAX_BACKOFF_MS))
    }
}

/// Run `attempt_fn` until it succeeds, fails permanently, or the budget runs out
///
/// `attempt_fn` receives the 1-indexed attempt number. Non-retryable errors
/// (see [`ProviderError::is_retryable`]) are returned immediately.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut attempt_fn: F,
) -> Result<T, ProviderError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 1;
    loop {
        match attempt_fn(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation, attempt, "Provider call succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < policy.max_attempts() => {
                let delay = policy.backoff_with_jitter(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts(),
                    error = %e,
                    error_kind = e.kind(),
                    backoff_ms = delay.as_millis() as u64,
                    "Transient provider failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts(),
                    error = %e,
                    error_kind = e.kind(),
                    "Provider call failed"
                );
                return Err(e);
            }
        }
    }
}
