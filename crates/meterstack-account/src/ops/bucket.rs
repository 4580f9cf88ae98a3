//! Bucket lookup and property operations.
//!
//! Implements `get_bucket_info` and `update_bucket_metadata`. Bucket rows are
//! created by the container update protocol; this module only reads them and
//! manages their free-form properties.

use std::collections::BTreeMap;

use tracing::debug;

use crate::backend::AccountBackend;
use crate::config::parse_bool;
use crate::error::{AccountError, AccountResult};
use crate::keyspace::{decode_counter, field};
use crate::timestamp::Timestamp;
use crate::types::BucketInfo;
use crate::validation::require_id;

/// Properties owned by the accounting engine.
const RESERVED_PROPERTIES: [&str; 4] = [field::OBJECTS, field::BYTES, field::ACCOUNT, field::MTIME];

fn bucket_info(bucket: &str, mut props: BTreeMap<String, Vec<u8>>) -> BucketInfo {
    let text = |v: Vec<u8>| String::from_utf8_lossy(&v).into_owned();
    let account = props.remove(field::ACCOUNT).map(text).filter(|a| !a.is_empty());
    let objects = props.remove(field::OBJECTS).map_or(0, |v| decode_counter(&v));
    let bytes = props.remove(field::BYTES).map_or(0, |v| decode_counter(&v));
    let mtime = props
        .remove(field::MTIME)
        .map_or(Timestamp::ZERO, |v| Timestamp::decode(&v));
    let replication_enabled = props
        .remove(field::REPLICATION_ENABLED)
        .is_some_and(|v| parse_bool(&text(v)));
    let metadata = props.into_iter().map(|(k, v)| (k, text(v))).collect();

    BucketInfo {
        name: bucket.to_owned(),
        account,
        objects,
        bytes,
        mtime,
        replication_enabled,
        metadata,
    }
}

impl AccountBackend {
    /// Every stored property of a bucket.
    pub fn get_bucket_info(&self, bucket: &str) -> AccountResult<BucketInfo> {
        require_id(bucket, "bucket")?;
        let tr = self.db.begin()?;
        let props = self.bucket_properties().get_raw(&tr, bucket)?;
        if props.is_empty() {
            return Err(AccountError::no_such_bucket(bucket));
        }
        Ok(bucket_info(bucket, props))
    }

    /// Delete then set free-form bucket properties, returning the updated
    /// bucket.
    ///
    /// Counters, owner and mtime are maintained by the engine and cannot be
    /// changed here.
    pub fn update_bucket_metadata(
        &self,
        bucket: &str,
        set: &BTreeMap<String, String>,
        delete: &[String],
    ) -> AccountResult<BucketInfo> {
        require_id(bucket, "bucket")?;
        if let Some(key) = set
            .keys()
            .chain(delete)
            .find(|k| RESERVED_PROPERTIES.contains(&k.as_str()))
        {
            return Err(AccountError::BadRequest(format!(
                "bucket property {key} is read-only"
            )));
        }

        let store = self.bucket_properties();
        self.db.run(|tr| {
            let row = self.keys.bucket_rows().entity_range(&[bucket]);
            if tr.get_range(&row, 1).is_empty() {
                return Err(AccountError::no_such_bucket(bucket));
            }
            store.update(tr, bucket, set, delete);
            Ok(())
        })?;
        debug!(bucket = %bucket, set = set.len(), deleted = delete.len(), "bucket properties updated");

        self.get_bucket_info(bucket)
    }
}
