//! Listing operations.
//!
//! Implements `list_containers` and `list_buckets` on top of
//! [`crate::listing::list_entities`].

use crate::backend::AccountBackend;
use crate::error::AccountResult;
use crate::keyspace::{decode_counter, field};
use crate::listing::{container_entry, list_entities, BucketEntry, ContainerEntry, ListParams, Listing};
use crate::timestamp::Timestamp;
use crate::validation::require_id;

/// Fields of a container row.
pub const CONTAINER_FIELDS: usize = 6;

impl AccountBackend {
    /// One page of the containers of `account`.
    pub fn list_containers(
        &self,
        account: &str,
        params: &ListParams,
    ) -> AccountResult<Listing<ContainerEntry>> {
        require_id(account, "account")?;
        let tr = self.db.begin()?;
        let rows = self.keys.container_rows(account);
        list_entities(&tr, &rows, params, CONTAINER_FIELDS, |entity| {
            Ok(Some(container_entry(entity)))
        })
    }

    /// One page of the buckets owned by `account`, with live counters.
    ///
    /// Buckets are never grouped: `delimiter` and `s3_buckets_only` are
    /// ignored.
    pub fn list_buckets(
        &self,
        account: &str,
        params: &ListParams,
    ) -> AccountResult<Listing<BucketEntry>> {
        require_id(account, "account")?;
        let params = ListParams {
            delimiter: None,
            s3_buckets_only: false,
            ..params.clone()
        };
        let tr = self.db.begin()?;
        let index = self.keys.bucket_index(account);
        list_entities(&tr, &index, &params, 1, |entity| {
            let read = |f: &str| tr.get_snapshot(&self.keys.bucket_field(&entity.name, f));
            Ok(Some(BucketEntry {
                name: entity.name.clone(),
                objects: read(field::OBJECTS).map_or(0, |v| decode_counter(&v)),
                bytes: read(field::BYTES).map_or(0, |v| decode_counter(&v)),
                mtime: read(field::MTIME).map_or(Timestamp::ZERO, |v| Timestamp::decode(&v)),
            }))
        })
    }
}
