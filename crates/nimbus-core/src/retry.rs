//! Bounded retry with exponential backoff.
//!
//! Coordinators never retry lease or precondition failures. The only place
//! this policy runs is the copy monitor's attribute re-fetch, where a
//! transient transport failure should not abort a long wait.

use std::future::Future;
use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, TRACING_TARGET_RETRY};

/// Configuration for retry behavior on failed operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 means no retries)
    #[cfg_attr(
        feature = "config",
        arg(long = "retry-max-attempts", env = "RETRY_MAX_ATTEMPTS", default_value = "3")
    )]
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff duration
    #[cfg_attr(feature = "config", arg(skip = Duration::from_millis(100)))]
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    #[cfg_attr(feature = "config", arg(skip = Duration::from_secs(5)))]
    #[serde(default = "default_max_backoff")]
    pub max_backoff: Duration,

    /// Backoff multiplier for exponential backoff
    #[cfg_attr(feature = "config", arg(skip = 2.0))]
    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(100)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(5)
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            backoff_multiplier: default_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy.
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            ..Self::default()
        }
    }

    /// Create a policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Set the maximum backoff duration.
    #[must_use]
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Set the backoff multiplier.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Backoff before retry number `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let millis = (self.initial_backoff.as_millis() as f64)
            * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(millis as u64).min(self.max_backoff)
    }

    /// Retry an async operation while it fails with a retryable error.
    ///
    /// See [`Error::is_retryable`].
    pub async fn retry<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry_if(operation, Error::is_retryable).await
    }

    /// Retry an async operation while `should_retry` accepts the error.
    pub async fn retry_if<F, Fut, T, P>(&self, mut operation: F, mut should_retry: P) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: FnMut(&Error) -> bool,
    {
        let mut attempt = 0;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !should_retry(&err) {
                tracing::debug!(
                    target: TRACING_TARGET_RETRY,
                    error = %err,
                    "Non-retryable error, failing immediately"
                );
                return Err(err);
            }

            if attempt >= self.max_attempts {
                tracing::warn!(
                    target: TRACING_TARGET_RETRY,
                    error = %err,
                    attempts = attempt + 1,
                    "Retry attempts exhausted"
                );
                return Err(err);
            }

            let backoff = self.backoff(attempt);
            tracing::debug!(
                target: TRACING_TARGET_RETRY,
                attempt = attempt + 1,
                max_attempts = self.max_attempts,
                backoff_ms = backoff.as_millis(),
                error = %err,
                "Retrying operation after backoff"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}
