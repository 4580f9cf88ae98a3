//! Accounting backend facade.
//!
//! [`AccountBackend`] owns the store handle, the configuration and the
//! resolved key layout. The public operations are implemented in the
//! [`crate::ops`] submodules as methods on this type.

use meterstack_kv::{Database, Transaction};

use crate::config::AccountConfig;
use crate::keyspace::Keyspace;
use crate::metadata::MetadataStore;

/// The accounting backend.
///
/// Cloning is cheap: clones share the same store.
///
/// # Examples
///
/// ```
/// use meterstack_account::{AccountBackend, AccountConfig, AccountCreation};
///
/// let backend = AccountBackend::in_memory(AccountConfig::default());
/// assert_eq!(backend.create_account("acct").unwrap(), AccountCreation::Created);
/// assert_eq!(backend.list_accounts().unwrap(), vec!["acct".to_owned()]);
/// ```
#[derive(Debug, Clone)]
pub struct AccountBackend {
    /// Store handle.
    pub(crate) db: Database,
    /// Backend configuration.
    pub(crate) config: AccountConfig,
    /// Resolved subspaces.
    pub(crate) keys: Keyspace,
}

impl AccountBackend {
    /// Create a backend over an existing store.
    #[must_use]
    pub fn new(db: Database, config: AccountConfig) -> Self {
        let keys = Keyspace::new(&config.keyspace);
        Self { db, config, keys }
    }

    /// Create a backend over a fresh in-memory store using the configured
    /// retry policy.
    #[must_use]
    pub fn in_memory(config: AccountConfig) -> Self {
        let db = Database::new(config.retry.clone());
        Self::new(db, config)
    }

    /// The store handle.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// The backend configuration.
    #[must_use]
    pub fn config(&self) -> &AccountConfig {
        &self.config
    }

    /// The resolved key layout.
    #[must_use]
    pub fn keyspace(&self) -> &Keyspace {
        &self.keys
    }

    /// Close the store; every later operation fails with `ServiceBusy`.
    pub fn close(&self) {
        self.db.close();
    }

    pub(crate) fn account_metadata(&self) -> MetadataStore {
        MetadataStore::new(self.keys.metadata().clone())
    }

    pub(crate) fn bucket_properties(&self) -> MetadataStore {
        MetadataStore::new(self.keys.bucket_rows().clone())
    }

    /// Whether `account` is registered, read without conflicts.
    pub(crate) fn account_exists_snapshot(&self, tr: &Transaction, account: &str) -> bool {
        tr.get_snapshot(&self.keys.account_exists(account)).is_some()
    }
}
