//! Resilience: bounded retry with exponential backoff.
//!
//! ```text
//! attempt 1 ──fail(retriable)──► sleep base ──► attempt 2 ──fail──► sleep 2·base ──► ...
//!     │                                                                 │
//!     └─fail(non-retriable)──► RetryExhausted { attempts: 1 }           └─► capped at max_delay
//! ```
//!
//! Only errors whose [`RetryCategory`](crate::error::RetryCategory) is
//! retriable are attempted again. Everything else returns on the spot.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::error::StageError;

/// Retry policy for transient stage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = a single attempt).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based): `base · 2^(retry-1)`, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(retry - 1);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Total attempts this policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    /// Default: 2 retries, 2s initial backoff, 30s max.
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// All attempts failed, or a non-retriable error stopped the loop early.
#[derive(Debug, Clone, Error)]
#[error("gave up after {attempts} attempt(s): {last}")]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last: StageError,
}

/// Run `op` until it succeeds, fails non-retriably, or the policy is spent.
///
/// `op` receives the 1-based attempt number.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, RetryExhausted>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, StageError>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !e.is_retriable() || attempt >= max_attempts {
                    return Err(RetryExhausted { attempts: attempt, last: e });
                }
                let backoff = policy.backoff(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    category = %e.retry_category(),
                    error = %e,
                    "Retriable stage error, backing off"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}
