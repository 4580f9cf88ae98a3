//! Accounting backend configuration.
//!
//! Provides [`AccountConfig`]. Values are loaded from environment variables
//! by [`AccountConfig::from_env`], falling back to the defaults below.

use meterstack_kv::RetryConfig;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::keyspace::KeyspaceConfig;

/// Default number of entities scanned per refresh batch.
pub const DEFAULT_REFRESH_BATCH_SIZE: usize = 10_000;

/// Accounting backend configuration.
///
/// # Examples
///
/// ```
/// use meterstack_account::config::AccountConfig;
///
/// let config = AccountConfig::default();
/// assert!(config.autocreate);
/// assert_eq!(config.refresh_batch_size, 10_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct AccountConfig {
    /// Create missing accounts on their first container update.
    #[builder(default = true)]
    pub autocreate: bool,

    /// Entities scanned per refresh batch.
    #[builder(default = DEFAULT_REFRESH_BATCH_SIZE)]
    pub refresh_batch_size: usize,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,

    /// Transaction retry policy.
    #[builder(default)]
    pub retry: RetryConfig,

    /// Subspace prefixes.
    #[builder(default)]
    pub keyspace: KeyspaceConfig,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            autocreate: true,
            refresh_batch_size: DEFAULT_REFRESH_BATCH_SIZE,
            log_level: String::from("info"),
            retry: RetryConfig::default(),
            keyspace: KeyspaceConfig::default(),
        }
    }
}

impl AccountConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `METERSTACK_AUTOCREATE` | `true` |
    /// | `METERSTACK_REFRESH_BATCH_SIZE` | `10000` |
    /// | `LOG_LEVEL` | `info` |
    ///
    /// The retry policy is read by [`RetryConfig::from_env`].
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self {
            retry: RetryConfig::from_env(),
            ..Self::default()
        };

        if let Ok(v) = std::env::var("METERSTACK_AUTOCREATE") {
            config.autocreate = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("METERSTACK_REFRESH_BATCH_SIZE") {
            if let Ok(n) = v.parse::<usize>() {
                if n > 0 {
                    config.refresh_batch_size = n;
                }
            }
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }
}

/// Parse a string as a boolean, accepting `"1"`, `"true"`, `"yes"` and `"on"`
/// (case-insensitive).
pub(crate) fn parse_bool(value: &str) -> bool {
    let value = value.trim();
    value == "1"
        || value.eq_ignore_ascii_case("true")
        || value.eq_ignore_ascii_case("yes")
        || value.eq_ignore_ascii_case("on")
}
