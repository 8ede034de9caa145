//! The single read path every provider call goes through. Rate limited calls are retried on a
//! fixed doubling schedule, anything else fails straight away.

use std::{future::Future, time::Duration};

use backoff::{backoff::Backoff, Error};
use thiserror::Error;
use tracing::warn;

use super::ProviderError;

pub const MAX_ATTEMPTS: u32 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Waits are multiples of this unit.
    pub unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            unit: Duration::from_secs(1),
        }
    }
}

/// Waits `2^n` units after the n-th rate limited attempt, and gives up instead of waiting once
/// `max_attempts` attempts have been made. With the defaults: 2s, 4s, 8s, 16s, then give up.
#[derive(Debug)]
pub struct RateLimitBackoff {
    policy: RetryPolicy,
    failed_attempts: u32,
}

impl RateLimitBackoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failed_attempts: 0,
        }
    }
}

impl Backoff for RateLimitBackoff {
    fn reset(&mut self) {
        self.failed_attempts = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.failed_attempts += 1;
        if self.failed_attempts >= self.policy.max_attempts {
            None
        } else {
            let factor = 2u32.saturating_pow(self.failed_attempts);
            Some(self.policy.unit.saturating_mul(factor))
        }
    }
}

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("still rate limited after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        last: ProviderError,
    },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

pub async fn with_rate_limit_retry<T, F, Fut>(
    policy: &RetryPolicy,
    call: &'static str,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let result = backoff::future::retry_notify(
        RateLimitBackoff::new(*policy),
        || {
            let attempt = operation();
            async move {
                attempt.await.map_err(|err| {
                    if err.is_rate_limit() {
                        Error::transient(err)
                    } else {
                        Error::permanent(err)
                    }
                })
            }
        },
        |err: ProviderError, wait: Duration| {
            warn!(%err, ?wait, call, "provider rate limited us, backing off");
        },
    )
    .await;

    // Only rate limits are transient, a rate limit coming out of the retry loop means we ran
    // out of attempts.
    result.map_err(|err| {
        if err.is_rate_limit() {
            RetryError::Exhausted {
                attempts: policy.max_attempts,
                last: err,
            }
        } else {
            RetryError::Provider(err)
        }
    })
}
