//! Copy monitor configuration.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use nimbus_core::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Default interval between copy status polls: 2 seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// Default budget for a copy to complete: 5 minutes.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default number of retries for a failed attribute fetch.
pub const DEFAULT_FETCH_RETRIES: u32 = 3;

/// Default backoff before the first attribute fetch retry: 200 milliseconds.
pub const DEFAULT_FETCH_BACKOFF_MS: u64 = 200;

/// Configuration for the copy monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct CopyMonitorConfig {
    /// Interval between copy status polls in seconds
    #[cfg_attr(
        feature = "config",
        arg(long = "copy-poll-interval", env = "COPY_POLL_INTERVAL", default_value = "2")
    )]
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Budget for a copy to complete in seconds
    #[cfg_attr(
        feature = "config",
        arg(long = "copy-timeout", env = "COPY_TIMEOUT", default_value = "300")
    )]
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries for a transiently failing attribute fetch
    #[cfg_attr(
        feature = "config",
        arg(long = "copy-fetch-retries", env = "COPY_FETCH_RETRIES", default_value = "3")
    )]
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,

    /// Backoff before the first attribute fetch retry in milliseconds
    #[cfg_attr(
        feature = "config",
        arg(long = "copy-fetch-backoff", env = "COPY_FETCH_BACKOFF", default_value = "200")
    )]
    #[serde(default = "default_fetch_backoff_ms")]
    pub fetch_backoff_ms: u64,
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_fetch_retries() -> u32 {
    DEFAULT_FETCH_RETRIES
}

fn default_fetch_backoff_ms() -> u64 {
    DEFAULT_FETCH_BACKOFF_MS
}

impl Default for CopyMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            timeout_secs: default_timeout_secs(),
            fetch_retries: default_fetch_retries(),
            fetch_backoff_ms: default_fetch_backoff_ms(),
        }
    }
}

impl CopyMonitorConfig {
    /// Returns the poll interval, using the default if zero.
    pub fn poll_interval(&self) -> Duration {
        match self.poll_interval_secs {
            0 => Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    /// Returns the completion budget.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Retry policy applied to each attribute fetch.
    pub fn fetch_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.fetch_retries,
            Duration::from_millis(self.fetch_backoff_ms),
        )
    }

    /// Set the poll interval in seconds.
    #[must_use]
    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    /// Set the completion budget in seconds.
    #[must_use]
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the number of attribute fetch retries.
    #[must_use]
    pub fn with_fetch_retries(mut self, retries: u32) -> Self {
        self.fetch_retries = retries;
        self
    }

    /// Set the backoff before the first attribute fetch retry in milliseconds.
    #[must_use]
    pub fn with_fetch_backoff(mut self, millis: u64) -> Self {
        self.fetch_backoff_ms = millis;
        self
    }
}
