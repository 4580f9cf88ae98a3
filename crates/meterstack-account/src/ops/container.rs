//! Container update protocol.
//!
//! Front-end services report the absolute state of a container (`mtime`,
//! `dtime`, totals) whenever it changes. Reports arrive concurrently, late
//! and duplicated; [`AccountBackend::update_container`] turns each one into
//! counter deltas exactly once:
//!
//! - a report that does not advance `mtime` or `dtime` is rejected as stale;
//! - `dtime >= mtime` deletes the row and folds its counts out of the
//!   aggregates, leaving a pending-delete marker behind;
//! - otherwise the new totals replace the stored ones and the difference is
//!   added to the account and bucket counters.

use meterstack_kv::Transaction;
use tracing::debug;

use crate::backend::AccountBackend;
use crate::config::parse_bool;
use crate::error::{AccountError, AccountResult};
use crate::keyspace::{
    decode_counter, encode_counter, field, is_segments_container, is_shard_account, wrap_counter,
};
use crate::timestamp::Timestamp;
use crate::types::{ContainerInfo, ContainerUpdate, UpdateContainerRequest};
use crate::validation::require_id;

/// Result of one update transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateOutcome {
    Updated,
    Deleted,
    NoAccount,
    NoContainer,
    NoUpdateNeeded,
}

/// One applied container change, as seen by its bucket.
#[derive(Debug)]
struct ContainerChange<'a> {
    account: &'a str,
    container: &'a str,
    mtime: Timestamp,
    deleted: bool,
    /// The stored row already named a bucket.
    associated: bool,
    inc_objects: i64,
    inc_bytes: i64,
    total_objects: i64,
    total_bytes: i64,
}

/// Stored state of a container row.
#[derive(Debug, Default)]
struct RowState {
    mtime: Timestamp,
    dtime: Timestamp,
    objects: i64,
    bytes: i64,
}

impl RowState {
    fn read(tr: &mut Transaction, key: impl Fn(&str) -> Vec<u8>) -> Self {
        let mut time = |f: &str| tr.get(&key(f)).map_or(Timestamp::ZERO, |v| Timestamp::decode(&v));
        let mtime = time(field::MTIME);
        let dtime = time(field::DTIME);
        Self {
            mtime,
            dtime,
            objects: tr.get(&key(field::OBJECTS)).map_or(0, |v| decode_counter(&v)),
            bytes: tr.get(&key(field::BYTES)).map_or(0, |v| decode_counter(&v)),
        }
    }
}

impl AccountBackend {
    /// Apply one container report.
    ///
    /// # Errors
    ///
    /// - [`AccountError::NoSuchAccount`] when the account is missing and may
    ///   not be created.
    /// - [`AccountError::NoSuchContainer`] when the row is missing and may not
    ///   be created, or the report predates a recorded deletion.
    /// - [`AccountError::StaleUpdate`] when the report does not advance the
    ///   stored times.
    pub fn update_container(&self, req: &UpdateContainerRequest) -> AccountResult<ContainerUpdate> {
        require_id(&req.account, "account")?;
        require_id(&req.name, "container")?;
        let account = req.account.as_str();
        let name = req.name.as_str();

        let outcome = self.db.run(|tr| self.apply_container_update(tr, req))?;
        debug!(account = %account, container = %name, ?outcome, "update_container");

        match outcome {
            UpdateOutcome::Updated => Ok(ContainerUpdate::Updated),
            UpdateOutcome::Deleted => Ok(ContainerUpdate::Deleted),
            UpdateOutcome::NoAccount => Err(AccountError::no_such_account(account)),
            UpdateOutcome::NoContainer => Err(AccountError::no_such_container(account, name)),
            UpdateOutcome::NoUpdateNeeded => Err(AccountError::StaleUpdate {
                account: account.to_owned(),
                container: name.to_owned(),
            }),
        }
    }

    fn apply_container_update(
        &self,
        tr: &mut Transaction,
        req: &UpdateContainerRequest,
    ) -> AccountResult<UpdateOutcome> {
        let account = req.account.as_str();
        let name = req.name.as_str();
        let new_mtime = req.mtime.unwrap_or_default();
        let new_dtime = req.dtime.unwrap_or_default();
        let total_objects = req.object_count.unwrap_or(0);
        let total_bytes = req.bytes_used.unwrap_or(0);

        if tr.get(&self.keys.account_exists(account)).is_none() {
            if req.autocreate_account.unwrap_or(self.config.autocreate) {
                self.write_new_account(tr, account, Timestamp::now());
            } else {
                return Ok(UpdateOutcome::NoAccount);
            }
        }

        let rows = self.keys.container_rows(account);
        let key = |f: &str| rows.pack(&[name, f]);
        let present = tr.get(&key(field::NAME)).is_some();
        if !req.autocreate_container && !present {
            return Ok(UpdateOutcome::NoContainer);
        }

        let pending_delete = self.keys.pending_delete(account, name);
        let deleted_at = tr
            .get(&pending_delete)
            .map_or(Timestamp::ZERO, |v| Timestamp::decode(&v));

        let state = if present {
            RowState::read(tr, &key)
        } else if new_mtime < deleted_at {
            // Late report for a container deleted since.
            return Ok(UpdateOutcome::NoContainer);
        } else {
            RowState::default()
        };

        if !req.autocreate_container && state.dtime >= state.mtime {
            return Ok(UpdateOutcome::NoContainer);
        }
        if new_mtime <= state.mtime && new_dtime <= state.dtime {
            return Ok(UpdateOutcome::NoUpdateNeeded);
        }

        let mut mtime = state.mtime.max(new_mtime);
        let dtime = state.dtime.max(new_dtime);

        // Read before the deletion branch clears the row.
        let stored_bucket = tr
            .get(&key(field::BUCKET))
            .map(|v| String::from_utf8_lossy(&v).into_owned())
            .filter(|b| !b.is_empty());

        let index_key = self.keys.container_index(account).pack(&[name]);
        let (inc_objects, inc_bytes, deleted) = if dtime >= mtime {
            mtime = dtime;
            tr.clear_range(&rows.entity_range(&[name]));
            tr.clear(&index_key);
            tr.set(&pending_delete, dtime.normal().as_bytes());
            (-state.objects, -state.bytes, true)
        } else if mtime > state.mtime {
            tr.set(&key(field::OBJECTS), &encode_counter(total_objects)?);
            tr.set(&key(field::BYTES), &encode_counter(total_bytes)?);
            tr.set(&index_key, b"1");
            tr.set(&key(field::NAME), name.as_bytes());
            tr.set(&key(field::MTIME), mtime.normal().as_bytes());
            tr.set(&key(field::DTIME), dtime.normal().as_bytes());
            (total_objects - state.objects, total_bytes - state.bytes, false)
        } else {
            return Ok(UpdateOutcome::NoUpdateNeeded);
        };

        for (counter, inc) in [(field::OBJECTS, inc_objects), (field::BYTES, inc_bytes)] {
            if inc != 0 {
                tr.atomic_add(&self.keys.account_field(account, counter), &wrap_counter(inc));
            }
        }

        let bucket = req
            .bucket_name
            .as_deref()
            .filter(|b| !b.is_empty())
            .or(stored_bucket.as_deref());
        if let Some(bucket) = bucket {
            let change = ContainerChange {
                account,
                container: name,
                mtime,
                deleted,
                associated: stored_bucket.is_some(),
                inc_objects,
                inc_bytes,
                total_objects,
                total_bytes,
            };
            self.apply_bucket_change(tr, bucket, &change);
        }

        Ok(if deleted {
            UpdateOutcome::Deleted
        } else {
            UpdateOutcome::Updated
        })
    }

    /// Carry an applied container change over to its bucket.
    ///
    /// A container not yet associated with the bucket contributes its whole
    /// new totals, or nothing when the change is its deletion. Deleting the
    /// root container removes the bucket.
    fn apply_bucket_change(&self, tr: &mut Transaction, bucket: &str, change: &ContainerChange<'_>) {
        let (mut inc_objects, inc_bytes) = match (change.associated, change.deleted) {
            (true, _) => (change.inc_objects, change.inc_bytes),
            (false, true) => (0, 0),
            (false, false) => (change.total_objects, change.total_bytes),
        };

        if change.deleted && bucket == change.container {
            tr.clear(&self.keys.bucket_index(change.account).pack(&[bucket]));
            tr.clear(&self.keys.bucket_name(bucket));
            tr.clear_range(&self.keys.bucket_rows().entity_range(&[bucket]));
            return;
        }

        if is_segments_container(change.container) {
            inc_objects = 0;
        }
        tr.atomic_add(
            &self.keys.bucket_field(bucket, field::OBJECTS),
            &wrap_counter(inc_objects),
        );
        tr.atomic_add(
            &self.keys.bucket_field(bucket, field::BYTES),
            &wrap_counter(inc_bytes),
        );
        if !change.mtime.is_zero() {
            tr.set(
                &self.keys.bucket_field(bucket, field::MTIME),
                change.mtime.normal().as_bytes(),
            );
        }
        if change.deleted {
            return;
        }

        if !is_shard_account(change.account) {
            tr.set(
                &self.keys.bucket_field(bucket, field::ACCOUNT),
                change.account.as_bytes(),
            );
        }
        let rows = self.keys.container_rows(change.account);
        tr.set(&rows.pack(&[change.container, field::BUCKET]), bucket.as_bytes());
        if bucket == change.container {
            tr.set(&self.keys.bucket_index(change.account).pack(&[bucket]), b"0");
            tr.set(&self.keys.bucket_name(bucket), b"0");
        }
    }

    /// Stored state of one container, with the replication flag of its
    /// bucket.
    pub fn get_container_info(&self, account: &str, name: &str) -> AccountResult<ContainerInfo> {
        require_id(account, "account")?;
        require_id(name, "container")?;
        let tr = self.db.begin()?;
        let rows = self.keys.container_rows(account);
        let read = |f: &str| tr.get_snapshot(&rows.pack(&[name, f]));

        if read(field::NAME).is_none() {
            return Err(AccountError::no_such_container(account, name));
        }
        let bucket = read(field::BUCKET)
            .map(|v| String::from_utf8_lossy(&v).into_owned())
            .filter(|b| !b.is_empty());
        let replication_enabled = bucket
            .as_deref()
            .and_then(|b| {
                tr.get_snapshot(&self.keys.bucket_field(b, field::REPLICATION_ENABLED))
            })
            .is_some_and(|v| parse_bool(&String::from_utf8_lossy(&v)));

        Ok(ContainerInfo {
            account: account.to_owned(),
            name: name.to_owned(),
            mtime: read(field::MTIME).map_or(Timestamp::ZERO, |v| Timestamp::decode(&v)),
            dtime: read(field::DTIME).map_or(Timestamp::ZERO, |v| Timestamp::decode(&v)),
            objects: read(field::OBJECTS).map_or(0, |v| decode_counter(&v)),
            bytes: read(field::BYTES).map_or(0, |v| decode_counter(&v)),
            bucket,
            replication_enabled,
        })
    }
}
