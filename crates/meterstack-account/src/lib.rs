//! Accounting backend for a distributed object store.
//!
//! Front-end services report container states; [`AccountBackend`] turns them
//! into object and byte counters for accounts and buckets, lists containers
//! and buckets page by page, and recomputes drifted counters on demand.
//!
//! # Architecture
//!
//! ```text
//! AccountBackend (ops::{account, container, list, bucket, metadata, refresh})
//!        |
//!        v
//! Keyspace + MetadataStore + listing::EntityCursor
//!        |
//!        v
//! meterstack_kv::Database (transactions, atomic add, snapshot reads)
//! ```
//!
//! # Usage
//!
//! ```
//! use meterstack_account::{AccountBackend, AccountConfig, Timestamp, UpdateContainerRequest};
//!
//! let backend = AccountBackend::in_memory(AccountConfig::default());
//! let req = UpdateContainerRequest::builder()
//!     .account("acct")
//!     .name("photos")
//!     .mtime(Timestamp::now())
//!     .object_count(5)
//!     .bytes_used(500)
//!     .build();
//! backend.update_container(&req).unwrap();
//! let info = backend.info_account("acct").unwrap();
//! assert_eq!((info.objects, info.bytes), (5, 500));
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod keyspace;
pub mod listing;
pub mod metadata;
pub mod ops;
pub mod timestamp;
pub mod types;
pub mod validation;

pub use backend::AccountBackend;
pub use config::AccountConfig;
pub use error::{AccountError, AccountResult, ErrorKind};
pub use listing::{BucketEntry, ContainerEntry, ListParams, Listing, ListingEntry};
pub use ops::refresh::{RefreshPass, RefreshStep};
pub use timestamp::Timestamp;
pub use types::{
    AccountCreation, AccountInfo, BucketInfo, ContainerInfo, ContainerUpdate, Status,
    UpdateContainerRequest,
};
