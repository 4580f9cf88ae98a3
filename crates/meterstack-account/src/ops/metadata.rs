//! Account metadata operations.

use std::collections::BTreeMap;

use tracing::debug;

use crate::backend::AccountBackend;
use crate::error::{AccountError, AccountResult};
use crate::timestamp::Timestamp;
use crate::validation::require_id;

impl AccountBackend {
    /// Metadata of an account.
    pub fn get_account_metadata(&self, account: &str) -> AccountResult<BTreeMap<String, String>> {
        require_id(account, "account")?;
        let tr = self.db.begin()?;
        if !self.account_exists_snapshot(&tr, account) {
            return Err(AccountError::no_such_account(account));
        }
        self.account_metadata().get(&tr, account)
    }

    /// Delete then set metadata keys of an account.
    ///
    /// A missing account is created first when `autocreate` is enabled.
    pub fn update_account_metadata(
        &self,
        account: &str,
        set: &BTreeMap<String, String>,
        delete: &[String],
    ) -> AccountResult<()> {
        require_id(account, "account")?;
        let store = self.account_metadata();
        self.db.run(|tr| {
            if tr.get(&self.keys.account_exists(account)).is_none() {
                if !self.config.autocreate {
                    return Err(AccountError::no_such_account(account));
                }
                self.write_new_account(tr, account, Timestamp::now());
            }
            store.update(tr, account, set, delete);
            Ok(())
        })?;
        debug!(account = %account, set = set.len(), deleted = delete.len(), "account metadata updated");
        Ok(())
    }
}
