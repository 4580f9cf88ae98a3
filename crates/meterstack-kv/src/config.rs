//! Retry configuration for [`Database::run`](crate::Database::run).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// How transactions are retried after a retryable commit failure.
///
/// # Examples
///
/// ```
/// use meterstack_kv::RetryConfig;
///
/// let config = RetryConfig::default();
/// assert_eq!(config.max_attempts, 5);
/// assert_eq!(config.backoff(0).as_millis(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Total attempts before giving up, including the first one.
    #[builder(default = 5)]
    pub max_attempts: u32,

    /// Backoff before the first retry, in milliseconds.
    #[builder(default = 1)]
    pub initial_backoff_ms: u64,

    /// Upper bound on any single backoff, in milliseconds.
    #[builder(default = 100)]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 1,
            max_backoff_ms: 100,
        }
    }
}

impl RetryConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `METERSTACK_TX_MAX_ATTEMPTS` | `5` |
    /// | `METERSTACK_TX_INITIAL_BACKOFF_MS` | `1` |
    /// | `METERSTACK_TX_MAX_BACKOFF_MS` | `100` |
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(n) = parse_env("METERSTACK_TX_MAX_ATTEMPTS") {
            config.max_attempts = n;
        }
        if let Some(n) = parse_env("METERSTACK_TX_INITIAL_BACKOFF_MS") {
            config.initial_backoff_ms = n;
        }
        if let Some(n) = parse_env("METERSTACK_TX_MAX_BACKOFF_MS") {
            config.max_backoff_ms = n;
        }

        config
    }

    /// Backoff to wait after the failed attempt number `attempt` (0-based).
    ///
    /// Doubles per attempt and never exceeds `max_backoff_ms`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
