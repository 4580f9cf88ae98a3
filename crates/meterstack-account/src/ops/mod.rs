//! Accounting operations.
//!
//! This module contains the implementations of all backend operations,
//! organized into submodules by category. Each submodule adds methods to
//! [`crate::backend::AccountBackend`].
//!
//! Mutations run through [`meterstack_kv::Database::run`], so conflicts are
//! retried transparently; read paths use snapshot reads.

pub mod account;
pub mod bucket;
pub mod container;
pub mod list;
pub mod metadata;
pub mod refresh;
