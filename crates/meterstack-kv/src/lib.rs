//! Ordered transactional key-value store for meterstack.
//!
//! Keys are packed tuples of strings, grouped into disjoint [`Subspace`]s.
//! A [`Database`] hands out optimistic [`Transaction`]s that read a
//! consistent snapshot, buffer their writes, and fail at commit with
//! [`KvError::NotCommitted`] when a newer commit wrote something they read.
//! [`Database::run`] wraps the whole cycle in a bounded retry loop.
//!
//! # Architecture
//!
//! ```text
//! Database::run (retry + backoff)
//!        |
//!        v
//! Transaction (snapshot + own writes + conflict ranges)
//!        |
//!        v
//! MemoryStore (Arc<BTreeMap> snapshots, commit history)
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod store;
pub mod subspace;
pub mod transaction;
pub mod tuple;

pub use config::RetryConfig;
pub use database::Database;
pub use error::{KvError, KvResult};
pub use store::MemoryStore;
pub use subspace::{KeyRange, Subspace};
pub use transaction::{KeyValue, Transaction};
