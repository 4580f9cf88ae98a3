//! Key layout of the accounting store.
//!
//! Every entity lives in its own disjoint subspace:
//!
//! | Subspace | Key | Value |
//! |---|---|---|
//! | `accounts:` | (account) | `1` |
//! | `account:` | (account, field) | field value |
//! | `containers:` | (account, container) | `1` |
//! | `container:` | (account, container, field) | field value |
//! | `ct-to-delete:` | (account, container, `deleted`) | dtime |
//! | `buckets:` | (account, bucket) | `0` |
//! | `bucket-names:` | (bucket) | `0` |
//! | `bucket:` | (bucket, field) | field value |
//! | `metadata:` | (account, key) | value |
//! | `refresh:` | (`bucket`, bucket) or (`container`, account, container) | pass id |
//!
//! Counters are little-endian signed 32-bit integers so the store's atomic
//! add applies to them directly.

use meterstack_kv::Subspace;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::AccountError;

/// Field names used inside entity subspaces.
pub mod field {
    /// Account id.
    pub const ID: &str = "id";
    /// Object counter.
    pub const OBJECTS: &str = "objects";
    /// Byte counter.
    pub const BYTES: &str = "bytes";
    /// Account creation time.
    pub const CTIME: &str = "ctime";
    /// Container name, present while the container row is live.
    pub const NAME: &str = "name";
    /// Last modification time.
    pub const MTIME: &str = "mtime";
    /// Deletion time.
    pub const DTIME: &str = "dtime";
    /// Container to bucket back-reference.
    pub const BUCKET: &str = "bucket";
    /// Bucket owner.
    pub const ACCOUNT: &str = "account";
    /// Bucket replication flag.
    pub const REPLICATION_ENABLED: &str = "replication_enabled";
    /// Pending-delete marker.
    pub const DELETED: &str = "deleted";
}

/// Name prefix of the accounts holding container shards.
pub const SHARD_ACCOUNT_PREFIX: &str = ".shards_";

/// Marker in the name of containers holding multipart segments.
pub const SEGMENTS_MARKER: &str = "+segments";

/// Shard account of `account`.
#[must_use]
pub fn shard_account(account: &str) -> String {
    format!("{SHARD_ACCOUNT_PREFIX}{account}")
}

/// Whether `account` is a shard account.
#[must_use]
pub fn is_shard_account(account: &str) -> bool {
    account.starts_with(SHARD_ACCOUNT_PREFIX)
}

/// Whether `container` holds multipart segments.
#[must_use]
pub fn is_segments_container(container: &str) -> bool {
    container.contains(SEGMENTS_MARKER)
}

/// Encode a reported container total, which must fit the stored width.
pub fn encode_counter(value: i64) -> Result<[u8; 4], AccountError> {
    i32::try_from(value)
        .map(i32::to_le_bytes)
        .map_err(|_| AccountError::CounterOverflow { value })
}

/// Encode an aggregate counter or delta modulo 2^32.
///
/// Aggregates wrap the way the store's atomic add does, so a counter
/// recomputed from its children equals the one accumulated by adds.
///
/// # Examples
///
/// ```
/// use meterstack_account::keyspace::{decode_counter, wrap_counter};
///
/// assert_eq!(decode_counter(&wrap_counter(-3)), -3);
/// assert_eq!(decode_counter(&wrap_counter(i64::from(i32::MAX) + 1)), i64::from(i32::MIN));
/// ```
#[must_use]
pub fn wrap_counter(value: i64) -> [u8; 4] {
    let bytes = value.to_le_bytes();
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}

/// Decode a little-endian signed counter of up to eight bytes.
#[must_use]
pub fn decode_counter(raw: &[u8]) -> i64 {
    if raw.is_empty() {
        return 0;
    }
    let len = raw.len().min(8);
    let fill = if raw[len - 1] & 0x80 == 0 { 0x00 } else { 0xFF };
    let mut bytes = [fill; 8];
    bytes[..len].copy_from_slice(&raw[..len]);
    i64::from_le_bytes(bytes)
}

/// Subspace prefixes.
///
/// # Examples
///
/// ```
/// use meterstack_account::keyspace::KeyspaceConfig;
///
/// let config = KeyspaceConfig::builder().bucket_prefix("b:".into()).build();
/// assert_eq!(config.bucket_prefix, "b:");
/// assert_eq!(config.accounts_prefix, "accounts:");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct KeyspaceConfig {
    /// Account existence index.
    #[builder(default = String::from("accounts:"))]
    pub accounts_prefix: String,
    /// Account rows.
    #[builder(default = String::from("account:"))]
    pub account_prefix: String,
    /// Per-account container listing index.
    #[builder(default = String::from("containers:"))]
    pub containers_list_prefix: String,
    /// Container rows.
    #[builder(default = String::from("container:"))]
    pub container_prefix: String,
    /// Pending-delete markers.
    #[builder(default = String::from("ct-to-delete:"))]
    pub containers_to_delete_prefix: String,
    /// Per-account bucket listing index.
    #[builder(default = String::from("buckets:"))]
    pub bucket_list_prefix: String,
    /// Global bucket index.
    #[builder(default = String::from("bucket-names:"))]
    pub bucket_names_prefix: String,
    /// Bucket rows.
    #[builder(default = String::from("bucket:"))]
    pub bucket_prefix: String,
    /// Account metadata.
    #[builder(default = String::from("metadata:"))]
    pub metadata_prefix: String,
    /// Refresh pass records.
    #[builder(default = String::from("refresh:"))]
    pub refresh_prefix: String,
}

impl Default for KeyspaceConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Resolved subspaces.
#[derive(Debug, Clone)]
pub struct Keyspace {
    accounts: Subspace,
    account: Subspace,
    containers: Subspace,
    container: Subspace,
    to_delete: Subspace,
    buckets: Subspace,
    bucket_names: Subspace,
    bucket: Subspace,
    metadata: Subspace,
    refresh: Subspace,
}

impl Keyspace {
    /// Build the subspaces from their prefixes.
    #[must_use]
    pub fn new(config: &KeyspaceConfig) -> Self {
        Self {
            accounts: Subspace::new(&[config.accounts_prefix.as_str()]),
            account: Subspace::new(&[config.account_prefix.as_str()]),
            containers: Subspace::new(&[config.containers_list_prefix.as_str()]),
            container: Subspace::new(&[config.container_prefix.as_str()]),
            to_delete: Subspace::new(&[config.containers_to_delete_prefix.as_str()]),
            buckets: Subspace::new(&[config.bucket_list_prefix.as_str()]),
            bucket_names: Subspace::new(&[config.bucket_names_prefix.as_str()]),
            bucket: Subspace::new(&[config.bucket_prefix.as_str()]),
            metadata: Subspace::new(&[config.metadata_prefix.as_str()]),
            refresh: Subspace::new(&[config.refresh_prefix.as_str()]),
        }
    }

    /// The account existence index.
    #[must_use]
    pub fn accounts(&self) -> &Subspace {
        &self.accounts
    }

    /// Existence flag of `account`.
    #[must_use]
    pub fn account_exists(&self, account: &str) -> Vec<u8> {
        self.accounts.pack(&[account])
    }

    /// One field of an account row.
    #[must_use]
    pub fn account_field(&self, account: &str, name: &str) -> Vec<u8> {
        self.account.pack(&[account, name])
    }

    /// Every field of an account row.
    #[must_use]
    pub fn account_row(&self, account: &str) -> Subspace {
        self.account.subspace(&[account])
    }

    /// Container rows of `account`, keyed by (container, field).
    #[must_use]
    pub fn container_rows(&self, account: &str) -> Subspace {
        self.container.subspace(&[account])
    }

    /// Container listing index of `account`, keyed by (container).
    #[must_use]
    pub fn container_index(&self, account: &str) -> Subspace {
        self.containers.subspace(&[account])
    }

    /// Pending-delete marker of a container.
    #[must_use]
    pub fn pending_delete(&self, account: &str, container: &str) -> Vec<u8> {
        self.to_delete.pack(&[account, container, field::DELETED])
    }

    /// Bucket listing index of `account`, keyed by (bucket).
    #[must_use]
    pub fn bucket_index(&self, account: &str) -> Subspace {
        self.buckets.subspace(&[account])
    }

    /// Global index entry of `bucket`.
    #[must_use]
    pub fn bucket_name(&self, bucket: &str) -> Vec<u8> {
        self.bucket_names.pack(&[bucket])
    }

    /// Bucket rows, keyed by (bucket, field).
    #[must_use]
    pub fn bucket_rows(&self) -> &Subspace {
        &self.bucket
    }

    /// One field of a bucket row.
    #[must_use]
    pub fn bucket_field(&self, bucket: &str, name: &str) -> Vec<u8> {
        self.bucket.pack(&[bucket, name])
    }

    /// Account metadata, keyed by (account, key).
    #[must_use]
    pub fn metadata(&self) -> &Subspace {
        &self.metadata
    }

    /// Refresh pass record of a bucket.
    #[must_use]
    pub fn bucket_refresh(&self, bucket: &str) -> Vec<u8> {
        self.refresh.pack(&["bucket", bucket])
    }

    /// Refresh pass record of a sharded container.
    #[must_use]
    pub fn container_refresh(&self, account: &str, container: &str) -> Vec<u8> {
        self.refresh.pack(&["container", account, container])
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new(&KeyspaceConfig::default())
    }
}
