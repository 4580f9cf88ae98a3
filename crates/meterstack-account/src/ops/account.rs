//! Account lifecycle operations.
//!
//! Implements `create_account`, `delete_account`, `info_account`,
//! `list_accounts`, `flush_account` and `status`.

use meterstack_kv::Transaction;
use tracing::{debug, info};

use crate::backend::AccountBackend;
use crate::error::{AccountError, AccountResult};
use crate::keyspace::{decode_counter, field, wrap_counter};
use crate::timestamp::Timestamp;
use crate::types::{AccountCreation, AccountInfo, Status};
use crate::validation::require_id;

impl AccountBackend {
    /// Create an account. Creating an existing account is a successful no-op.
    pub fn create_account(&self, account: &str) -> AccountResult<AccountCreation> {
        require_id(account, "account")?;
        let outcome = self.db.run(|tr| {
            if tr.get(&self.keys.account_exists(account)).is_some() {
                return Ok::<_, AccountError>(AccountCreation::AlreadyExists);
            }
            self.write_new_account(tr, account, Timestamp::now());
            Ok(AccountCreation::Created)
        })?;

        match outcome {
            AccountCreation::Created => info!(account = %account, "account created"),
            AccountCreation::AlreadyExists => debug!(account = %account, "account already exists"),
        }
        Ok(outcome)
    }

    /// Write a fresh account row with zeroed counters.
    pub(crate) fn write_new_account(
        &self,
        tr: &mut Transaction,
        account: &str,
        ctime: Timestamp,
    ) {
        let zero = wrap_counter(0);
        tr.set(&self.keys.account_exists(account), b"1");
        tr.set(&self.keys.account_field(account, field::ID), account.as_bytes());
        tr.set(&self.keys.account_field(account, field::OBJECTS), &zero);
        tr.set(&self.keys.account_field(account, field::BYTES), &zero);
        tr.set(
            &self.keys.account_field(account, field::CTIME),
            ctime.normal().as_bytes(),
        );
    }

    /// Delete an account that owns no container.
    ///
    /// The account row, its metadata and both of its listing indices are
    /// removed. Fails with [`AccountError::AccountNotEmpty`] while any
    /// container row remains.
    pub fn delete_account(&self, account: &str) -> AccountResult<()> {
        require_id(account, "account")?;
        let rows = self.keys.container_rows(account);

        {
            let tr = self.db.begin()?;
            if !self.account_exists_snapshot(&tr, account) {
                return Err(AccountError::no_such_account(account));
            }
            if !tr.get_range_snapshot(&rows.range(), 1).is_empty() {
                info!(account = %account, "account to delete is not empty");
                return Err(AccountError::AccountNotEmpty {
                    account: account.to_owned(),
                });
            }
        }

        self.db.run(|tr| {
            if tr.get(&self.keys.account_exists(account)).is_none() {
                return Err(AccountError::no_such_account(account));
            }
            // A container created since the check above must abort the delete.
            if !tr.get_range(&rows.range(), 1).is_empty() {
                return Err(AccountError::AccountNotEmpty {
                    account: account.to_owned(),
                });
            }
            tr.clear_subspace(&self.keys.account_row(account));
            tr.clear(&self.keys.account_exists(account));
            self.account_metadata().clear(tr, account);
            tr.clear_subspace(&self.keys.container_index(account));
            tr.clear_subspace(&self.keys.bucket_index(account));
            Ok(())
        })?;

        info!(account = %account, "account deleted");
        Ok(())
    }

    /// Summary of an account: counters, listed containers, owned buckets
    /// and metadata.
    pub fn info_account(&self, account: &str) -> AccountResult<AccountInfo> {
        require_id(account, "account")?;
        let tr = self.db.begin()?;
        if !self.account_exists_snapshot(&tr, account) {
            return Err(AccountError::no_such_account(account));
        }

        let read = |name: &str| tr.get_snapshot(&self.keys.account_field(account, name));
        let objects = read(field::OBJECTS).map_or(0, |v| decode_counter(&v));
        let bytes = read(field::BYTES).map_or(0, |v| decode_counter(&v));
        let ctime = read(field::CTIME).map_or(Timestamp::ZERO, |v| Timestamp::decode(&v));

        let containers = tr
            .get_range_snapshot(&self.keys.container_index(account).range(), 0)
            .len();
        let buckets = tr
            .get_range_snapshot(&self.keys.bucket_index(account).range(), 0)
            .len();
        let metadata = self.account_metadata().get(&tr, account)?;

        Ok(AccountInfo {
            id: account.to_owned(),
            ctime,
            objects,
            bytes,
            containers,
            buckets,
            metadata,
        })
    }

    /// Every account id in ascending order.
    pub fn list_accounts(&self) -> AccountResult<Vec<String>> {
        let tr = self.db.begin()?;
        let space = self.keys.accounts();
        let mut accounts = Vec::new();
        for (key, _) in tr.get_range_snapshot(&space.range(), 0) {
            if let Some(id) = space.unpack(&key)?.into_iter().next() {
                accounts.push(id);
            }
        }
        Ok(accounts)
    }

    /// Zero the account counters and forget every container of the account.
    pub fn flush_account(&self, account: &str) -> AccountResult<()> {
        require_id(account, "account")?;
        self.db.run(|tr| {
            if tr.get(&self.keys.account_exists(account)).is_none() {
                return Err(AccountError::no_such_account(account));
            }
            let zero = wrap_counter(0);
            tr.set(&self.keys.account_field(account, field::OBJECTS), &zero);
            tr.set(&self.keys.account_field(account, field::BYTES), &zero);
            tr.clear_subspace(&self.keys.container_index(account));
            tr.clear_subspace(&self.keys.container_rows(account));
            Ok(())
        })?;
        info!(account = %account, "account flushed");
        Ok(())
    }

    /// Backend status.
    pub fn status(&self) -> AccountResult<Status> {
        let tr = self.db.begin()?;
        let account_count = tr
            .get_range_snapshot(&self.keys.accounts().range(), 0)
            .len();
        debug!(account_count, "status");
        Ok(Status { account_count })
    }
}
