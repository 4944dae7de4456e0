//! Bounded retry with fixed or exponential backoff
//!
//! Wraps a fallible async operation. The combinator never retries forever:
//! it gives up after `max_attempts` and hands back the last error.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;

/// Delay strategy between attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Backoff {
    /// Same delay before every retry
    Fixed {
        #[serde(with = "humantime_serde")]
        delay: Duration,
    },
    /// `initial * multiplier^attempt`, capped at `max`
    Exponential {
        #[serde(with = "humantime_serde")]
        initial: Duration,
        multiplier: f32,
        #[serde(with = "humantime_serde")]
        max: Duration,
        /// Apply ±10% jitter to spread out retries
        #[serde(default)]
        jitter: bool,
    },
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,

    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    /// Five attempts, one second apart.
    fn default() -> Self {
        Self::fixed(5, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed { delay },
        }
    }

    pub fn exponential(max_attempts: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential {
                initial,
                multiplier: 2.0,
                max,
                jitter: true,
            },
        }
    }

    /// Delay to wait after the given zero-based failed attempt.
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        match &self.backoff {
            Backoff::Fixed { delay } => *delay,
            Backoff::Exponential {
                initial,
                multiplier,
                max,
                jitter,
            } => {
                use rand::Rng;

                let base_ms = initial.as_millis() as f32;
                let mut backoff_ms = base_ms * multiplier.powi(attempt as i32);
                if *jitter {
                    backoff_ms *= rand::rng().random_range(0.9..=1.1);
                }
                Duration::from_millis(backoff_ms as u64).min(*max)
            }
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".into());
        }
        if let Backoff::Exponential { multiplier, .. } = self.backoff
            && multiplier < 1.0
        {
            return Err(format!("multiplier must be >= 1.0, got {multiplier}"));
        }
        Ok(())
    }
}

/// Returned when every attempt failed
#[derive(Debug, Error)]
#[error("{operation} failed after {attempts} attempts: {last}")]
pub struct RetryError<E: std::error::Error + 'static> {
    pub operation: String,
    pub attempts: u32,
    #[source]
    pub last: E,
}

/// Retry an async operation according to `policy`
///
/// # Example
///
/// ```rust,ignore
/// let policy = RetryPolicy::fixed(5, Duration::from_secs(1));
/// let token = retry(&policy, "renew token", || exchange.renew_token(&client)).await?;
/// ```
pub async fn retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation: &str,
    mut f: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + 'static,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(operation, attempts = attempt + 1, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                tracing::warn!(
                    operation,
                    attempt = attempt + 1,
                    max_attempts,
                    error = %e,
                    "Retry attempt failed"
                );

                attempt += 1;
                if attempt >= max_attempts {
                    return Err(RetryError {
                        operation: operation.to_string(),
                        attempts: attempt,
                        last: e,
                    });
                }

                let backoff = policy.backoff_duration(attempt - 1);
                tracing::debug!(
                    operation,
                    backoff_ms = backoff.as_millis() as u64,
                    "Backing off before next retry"
                );
                sleep(backoff).await;
            }
        }
    }
}
