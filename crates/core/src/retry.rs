//! Bounded retry policies
//!
//! A [`RetryPolicy`] describes how many times an operation may be retried and
//! how long to wait between attempts. Two shapes are supported: a fixed delay
//! (used by the ingestion harness, which waits a constant interval between
//! failed runs) and exponential backoff with optional jitter (used for
//! connection establishment at startup).
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use vidfeed_core::retry::{retry_with_backoff, RetryPolicy};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let value = retry_with_backoff(
//!     || async { Ok::<_, std::io::Error>("connected") },
//!     RetryPolicy::exponential(3, Duration::from_millis(100), Duration::from_secs(2)),
//!     |err: &std::io::Error| err.kind() == std::io::ErrorKind::ConnectionRefused,
//! )
//! .await?;
//! assert_eq!(value, "connected");
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Delay growth between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed,
    /// `base * 2^attempt`, capped at `max_delay`
    Exponential,
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt (0 means no retries)
    pub max_retries: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,

    /// Delay growth
    pub backoff: Backoff,

    /// Whether to add up to 30% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    /// 3 retries, exponential from 100ms up to 5s, with jitter
    fn default() -> Self {
        Self::exponential(3, Duration::from_millis(100), Duration::from_secs(5))
    }
}

impl RetryPolicy {
    /// Fixed-delay policy without jitter
    ///
    /// ```
    /// use std::time::Duration;
    /// use vidfeed_core::retry::RetryPolicy;
    ///
    /// let policy = RetryPolicy::fixed(5, Duration::from_secs(60));
    /// assert_eq!(policy.delay_for(0), Duration::from_secs(60));
    /// assert_eq!(policy.delay_for(4), Duration::from_secs(60));
    /// ```
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: delay,
            max_delay: delay,
            backoff: Backoff::Fixed,
            jitter: false,
        }
    }

    /// Exponential backoff policy with jitter
    pub fn exponential(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            backoff: Backoff::Exponential,
            jitter: true,
        }
    }

    /// Disable jitter, mostly useful for deterministic tests
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Whether another retry is allowed after `retries_so_far` retries
    pub fn allows_retry(&self, retries_so_far: u32) -> bool {
        retries_so_far < self.max_retries
    }

    /// Delay before retry number `attempt` (0-indexed)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;

        let delay_ms = match self.backoff {
            Backoff::Fixed => base_ms,
            Backoff::Exponential => base_ms
                .saturating_mul(2_u64.saturating_pow(attempt))
                .min(max_ms),
        };

        let final_ms = if self.jitter {
            let jitter_range = (delay_ms as f64 * 0.3) as u64;
            if jitter_range > 0 {
                let nanos = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .subsec_nanos() as u64;
                delay_ms.saturating_add(nanos % (jitter_range + 1))
            } else {
                delay_ms
            }
        } else {
            delay_ms
        };

        Duration::from_millis(final_ms)
    }
}

/// Retries an async operation according to `policy`
///
/// Only errors for which `is_retryable` returns true are retried; anything
/// else is returned immediately.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    mut operation: F,
    policy: RetryPolicy,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                tracing::debug!(attempt, total_attempts = attempt + 1, "Operation succeeded");
                return Ok(result);
            }
            Err(error) => {
                if !policy.allows_retry(attempt) {
                    tracing::warn!(
                        attempt,
                        max_retries = policy.max_retries,
                        "All retry attempts exhausted"
                    );
                    return Err(error);
                }

                if !is_retryable(&error) {
                    tracing::debug!(attempt, "Error is not retryable, failing immediately");
                    return Err(error);
                }

                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    max_retries = policy.max_retries,
                    "Retrying after delay"
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
