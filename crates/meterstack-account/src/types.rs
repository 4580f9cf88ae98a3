//! Public request and result types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::timestamp::Timestamp;

/// Outcome of [`create_account`](crate::AccountBackend::create_account).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountCreation {
    /// The account was created.
    Created,
    /// The account already existed; nothing was written.
    AlreadyExists,
}

/// Successful outcome of [`update_container`](crate::AccountBackend::update_container).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerUpdate {
    /// The container row was created or updated.
    Updated,
    /// The container was deleted and its counts folded out.
    Deleted,
}

/// A container event reported by a front-end service.
///
/// # Examples
///
/// ```
/// use meterstack_account::{Timestamp, UpdateContainerRequest};
///
/// let req = UpdateContainerRequest::builder()
///     .account("acct")
///     .name("photos")
///     .mtime(Timestamp::now())
///     .object_count(5)
///     .bytes_used(500)
///     .build();
/// assert!(req.autocreate_container);
/// assert_eq!(req.dtime, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
pub struct UpdateContainerRequest {
    /// Owning account.
    #[builder(setter(into))]
    pub account: String,
    /// Container name.
    #[builder(setter(into))]
    pub name: String,
    /// Modification time; `None` means "never".
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub mtime: Option<Timestamp>,
    /// Deletion time; `None` means "never".
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub dtime: Option<Timestamp>,
    /// Total objects in the container; `None` means zero.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub object_count: Option<i64>,
    /// Total bytes in the container; `None` means zero.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub bytes_used: Option<i64>,
    /// Bucket the container belongs to.
    #[builder(default, setter(strip_option, into))]
    #[serde(default)]
    pub bucket_name: Option<String>,
    /// Create the account when missing; `None` uses the backend default.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub autocreate_account: Option<bool>,
    /// Create the container row when missing.
    #[builder(default = true)]
    #[serde(default = "default_true")]
    pub autocreate_container: bool,
}

fn default_true() -> bool {
    true
}

/// Account summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Account id.
    pub id: String,
    /// Creation time.
    pub ctime: Timestamp,
    /// Object counter.
    pub objects: i64,
    /// Byte counter.
    pub bytes: i64,
    /// Number of listed containers.
    pub containers: usize,
    /// Number of buckets owned.
    pub buckets: usize,
    /// Account metadata.
    pub metadata: BTreeMap<String, String>,
}

/// One container, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Owning account.
    pub account: String,
    /// Container name.
    pub name: String,
    /// Last modification time.
    pub mtime: Timestamp,
    /// Deletion time.
    pub dtime: Timestamp,
    /// Object counter.
    pub objects: i64,
    /// Byte counter.
    pub bytes: i64,
    /// Bucket back-reference.
    pub bucket: Option<String>,
    /// Replication flag of the bucket, `false` without a bucket.
    pub replication_enabled: bool,
}

/// One bucket, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    /// Bucket name.
    pub name: String,
    /// Owning account, unset until a non-shard container registers it.
    pub account: Option<String>,
    /// Object counter.
    pub objects: i64,
    /// Byte counter.
    pub bytes: i64,
    /// Last modification time.
    pub mtime: Timestamp,
    /// Replication flag.
    pub replication_enabled: bool,
    /// Every other property.
    pub metadata: BTreeMap<String, String>,
}

/// Backend status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Number of known accounts.
    pub account_count: usize,
}
