//! Aggregate recomputation.
//!
//! Counters maintained by [`AccountBackend::update_container`] drift when
//! reports are lost. A refresh recomputes an aggregate from its children:
//!
//! - `refresh_account` overwrites the account counters with the sum of its
//!   container rows.
//! - `refresh_bucket` rebuilds the bucket counters from the owner's containers
//!   registered to the bucket, in batches of separate transactions.
//!
//! Both first fold hash-sharded containers: the rows named
//! `<logical>-<hash>-<timestamp>[-<index>]` under the shard account are
//! summed into the logical container row.
//!
//! A multi-batch pass is a [`RefreshPass`]. Its random id is recorded in the
//! store when it begins; every batch re-reads the record and fails with
//! [`AccountError::RefreshSuperseded`] once another pass has replaced it, so
//! two passes never interleave their batches on one aggregate. Shard folds
//! also claim a per-container record shared by account and bucket refreshes.

use meterstack_kv::Transaction;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::AccountBackend;
use crate::error::{AccountError, AccountResult};
use crate::keyspace::{field, is_segments_container, shard_account, wrap_counter};
use crate::listing::{Entity, EntityCursor};
use crate::ops::list::CONTAINER_FIELDS;
use crate::validation::require_id;

/// Hex digits of the hash component of a shard name.
const SHARD_HASH_LEN: usize = 64;

/// Digits of the timestamp component of a shard name.
const SHARD_TIMESTAMP_LEN: usize = 16;

/// Logical container of a shard name, `None` when the name is malformed.
///
/// # Examples
///
/// ```
/// use meterstack_account::ops::refresh::logical_container;
///
/// let hash = "A".repeat(64);
/// let shard = format!("photos-{hash}-1700000000000000-3");
/// assert_eq!(logical_container(&shard), Some("photos"));
/// assert_eq!(logical_container("photos-1"), None);
/// ```
#[must_use]
pub fn logical_container(shard: &str) -> Option<&str> {
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    let timestamp = |s: &str| s.len() == SHARD_TIMESTAMP_LEN && digits(s);
    let hash = |s: &str| s.len() == SHARD_HASH_LEN && s.bytes().all(|b| b.is_ascii_hexdigit());

    let parts: Vec<&str> = shard.rsplitn(4, '-').collect();
    if let &[index, ts, h, logical] = parts.as_slice() {
        if digits(index) && timestamp(ts) && hash(h) && !logical.is_empty() {
            return Some(logical);
        }
    }
    let parts: Vec<&str> = shard.rsplitn(3, '-').collect();
    match *parts.as_slice() {
        [ts, h, logical] if timestamp(ts) && hash(h) && !logical.is_empty() => Some(logical),
        _ => None,
    }
}

/// Outcome of one [`RefreshPass::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStep {
    /// More batches remain.
    Continue,
    /// The pass is complete.
    Done,
}

#[derive(Debug)]
enum Phase {
    /// Folding the shards of `containers[index]`.
    Shards {
        containers: Vec<String>,
        index: usize,
        progress: ShardProgress,
    },
    /// Summing the owner's containers into the bucket.
    Bucket { marker: Option<String> },
    Done,
}

/// Where the fold of one container's shards stands.
#[derive(Debug, Default)]
struct ShardProgress {
    marker: Option<String>,
    /// The logical counters were reset by an earlier batch.
    zeroed: bool,
}

/// Progress of one shard batch.
#[derive(Debug)]
struct ShardBatch {
    next_marker: Option<String>,
    zeroed: bool,
}

impl ShardBatch {
    /// Whether the container has no shard left after this batch.
    fn is_last(&self, marker: Option<&str>) -> bool {
        self.next_marker.is_none() || self.next_marker.as_deref() == marker
    }
}

/// One bucket refresh pass, driven batch by batch.
///
/// Created by [`AccountBackend::begin_bucket_refresh`]. Dropping the pass
/// cancels it; a later pass starts over from scratch.
#[derive(Debug)]
pub struct RefreshPass {
    backend: AccountBackend,
    id: String,
    bucket: String,
    owner: String,
    batch_size: usize,
    phase: Phase,
}

impl RefreshPass {
    /// Pass id recorded in the store.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The bucket being refreshed.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The account owning the bucket.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Whether every batch has run.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self.phase, Phase::Done)
    }

    /// Run one batch in its own transaction.
    pub fn step(&mut self) -> AccountResult<RefreshStep> {
        let backend = &self.backend;
        let record = backend.keys.bucket_refresh(&self.bucket);
        match &mut self.phase {
            Phase::Shards {
                containers,
                index,
                progress,
            } => {
                let Some(container) = containers.get(*index) else {
                    self.phase = Phase::Bucket { marker: None };
                    return Ok(RefreshStep::Continue);
                };
                let batch = backend.db.run(|tr| {
                    verify_pass(tr, &record, &self.id, &self.bucket)?;
                    backend.claimed_shard_batch(tr, &self.owner, container, progress, self.batch_size, &self.id)
                })?;
                if batch.is_last(progress.marker.as_deref()) {
                    *index += 1;
                    *progress = ShardProgress::default();
                } else {
                    progress.marker = batch.next_marker;
                    progress.zeroed = batch.zeroed;
                }
                Ok(RefreshStep::Continue)
            }
            Phase::Bucket { marker } => {
                let next = backend.db.run(|tr| {
                    verify_pass(tr, &record, &self.id, &self.bucket)?;
                    let next = backend.bucket_batch(
                        tr,
                        &self.owner,
                        &self.bucket,
                        marker.as_deref(),
                        self.batch_size,
                    )?;
                    if next.is_none() || next == *marker {
                        tr.clear(&record);
                    }
                    Ok::<_, AccountError>(next)
                })?;
                if next.is_none() || next == *marker {
                    self.phase = Phase::Done;
                    info!(bucket = %self.bucket, pass = %self.id, "bucket refreshed");
                    Ok(RefreshStep::Done)
                } else {
                    *marker = next;
                    Ok(RefreshStep::Continue)
                }
            }
            Phase::Done => Ok(RefreshStep::Done),
        }
    }

    /// Run every remaining batch.
    pub fn run(&mut self) -> AccountResult<()> {
        while self.step()? == RefreshStep::Continue {}
        Ok(())
    }
}

/// Fail unless the pass record still holds `id`.
fn verify_pass(tr: &mut Transaction, record: &[u8], id: &str, target: &str) -> AccountResult<()> {
    if tr.get(record).as_deref() == Some(id.as_bytes()) {
        return Ok(());
    }
    Err(AccountError::RefreshSuperseded {
        target: target.to_owned(),
    })
}

fn new_pass_id() -> String {
    Uuid::new_v4().to_string()
}

impl AccountBackend {
    /// Start a bucket refresh pass.
    ///
    /// The pass replaces any pass already running on the bucket.
    pub fn begin_bucket_refresh(&self, bucket: &str, batch_size: usize) -> AccountResult<RefreshPass> {
        require_id(bucket, "bucket")?;
        let id = new_pass_id();
        let owner = self.db.run(|tr| {
            let owner = tr
                .get(&self.keys.bucket_field(bucket, field::ACCOUNT))
                .map(|v| String::from_utf8_lossy(&v).into_owned())
                .filter(|a| !a.is_empty())
                .ok_or_else(|| AccountError::no_such_bucket(bucket))?;
            if tr.get(&self.keys.account_exists(&owner)).is_none() {
                return Err(AccountError::no_such_account(&owner));
            }
            tr.set(&self.keys.bucket_refresh(bucket), id.as_bytes());
            Ok::<_, AccountError>(owner)
        })?;

        let containers = self.sharded_candidates(&owner, Some(bucket))?;
        debug!(bucket = %bucket, owner = %owner, pass = %id, sharded = containers.len(), "bucket refresh started");
        Ok(RefreshPass {
            backend: self.clone(),
            id,
            bucket: bucket.to_owned(),
            owner,
            batch_size: batch_size.max(1),
            phase: Phase::Shards {
                containers,
                index: 0,
                progress: ShardProgress::default(),
            },
        })
    }

    /// Recompute the counters of a bucket from its containers.
    pub fn refresh_bucket(&self, bucket: &str, batch_size: usize) -> AccountResult<()> {
        self.begin_bucket_refresh(bucket, batch_size)?.run()
    }

    /// Recompute the counters of an account from its containers, folding
    /// sharded containers first.
    pub fn refresh_account(&self, account: &str) -> AccountResult<()> {
        require_id(account, "account")?;
        let batch_size = self.config.refresh_batch_size.max(1);
        for container in self.sharded_candidates(account, None)? {
            self.fold_container_shards(account, &container, batch_size)?;
        }

        let rows = self.keys.container_rows(account);
        let (objects, bytes) = self.db.run(|tr| {
            if tr.get(&self.keys.account_exists(account)).is_none() {
                return Err(AccountError::no_such_account(account));
            }
            let mut objects = 0_i64;
            let mut bytes = 0_i64;
            for entity in EntityCursor::new(tr, &rows, rows.range().begin, rows.range().end, CONTAINER_FIELDS) {
                let entity = entity?;
                objects += entity.counter(field::OBJECTS);
                bytes += entity.counter(field::BYTES);
            }
            tr.set(
                &self.keys.account_field(account, field::OBJECTS),
                &wrap_counter(objects),
            );
            tr.set(
                &self.keys.account_field(account, field::BYTES),
                &wrap_counter(bytes),
            );
            Ok((objects, bytes))
        })?;

        info!(account = %account, objects, bytes, "account refreshed");
        Ok(())
    }

    /// Containers of `account` whose shards may need folding: every
    /// container, or those registered to `bucket`. Empty unless the shard
    /// account exists.
    fn sharded_candidates(&self, account: &str, bucket: Option<&str>) -> AccountResult<Vec<String>> {
        let tr = self.db.begin()?;
        if !self.account_exists_snapshot(&tr, &shard_account(account)) {
            return Ok(Vec::new());
        }
        let rows = self.keys.container_rows(account);
        let mut names = Vec::new();
        for entity in EntityCursor::new(&tr, &rows, rows.range().begin, rows.range().end, CONTAINER_FIELDS) {
            let entity = entity?;
            if bucket.is_none_or(|b| entity.field(field::BUCKET) == Some(b.as_bytes())) {
                names.push(entity.name);
            }
        }
        Ok(names)
    }

    /// Fold the shards of one container in a pass of its own.
    fn fold_container_shards(&self, account: &str, container: &str, batch_size: usize) -> AccountResult<()> {
        let id = new_pass_id();
        let mut progress = ShardProgress::default();
        loop {
            let batch = self
                .db
                .run(|tr| self.claimed_shard_batch(tr, account, container, &progress, batch_size, &id))?;
            if batch.is_last(progress.marker.as_deref()) {
                break;
            }
            progress.marker = batch.next_marker;
            progress.zeroed = batch.zeroed;
        }
        debug!(account = %account, container = %container, "shards folded");
        Ok(())
    }

    /// One shard batch of `container` on behalf of pass `id`.
    ///
    /// The first batch claims the container's refresh record, later batches
    /// verify it and the last one clears it. Account and bucket refreshes
    /// folding the same container thus supersede each other.
    fn claimed_shard_batch(
        &self,
        tr: &mut Transaction,
        account: &str,
        container: &str,
        progress: &ShardProgress,
        batch_size: usize,
        id: &str,
    ) -> AccountResult<ShardBatch> {
        let record = self.keys.container_refresh(account, container);
        let marker = progress.marker.as_deref();
        if marker.is_none() {
            tr.set(&record, id.as_bytes());
        } else {
            verify_pass(tr, &record, id, &format!("{account}/{container}"))?;
        }
        let batch = self.fold_shard_batch(tr, account, container, marker, batch_size, progress.zeroed)?;
        if batch.is_last(marker) {
            tr.clear(&record);
        }
        Ok(batch)
    }

    /// Sum one batch of shards of `container` into its logical row.
    ///
    /// The first batch finding shards zeroes the logical counters; the
    /// returned marker is `None` once the shards are exhausted.
    fn fold_shard_batch(
        &self,
        tr: &mut Transaction,
        account: &str,
        container: &str,
        marker: Option<&str>,
        batch_size: usize,
        zeroed: bool,
    ) -> AccountResult<ShardBatch> {
        let shards = self.keys.container_rows(&shard_account(account));
        let prefix = format!("{container}-");
        let mut begin = shards.name_prefix_start(&prefix);
        if let Some(marker) = marker {
            begin = begin.max(shards.after_entity(marker));
        }
        let end = shards.after_name_prefix(&prefix);

        let mut objects = 0_i64;
        let mut bytes = 0_i64;
        let mut found = false;
        let mut scanned = 0;
        let mut last = None;
        {
            let mut cursor = EntityCursor::new(tr, &shards, begin, end, CONTAINER_FIELDS);
            cursor.set_batch(batch_size);
            for entity in cursor.by_ref().take(batch_size) {
                let entity = entity?;
                scanned += 1;
                match logical_container(&entity.name) {
                    Some(logical) if logical == container => {
                        found = true;
                        add_counts(&entity, &mut objects, &mut bytes);
                    }
                    Some(_) => {}
                    None => warn!(account = %account, shard = %entity.name, "malformed shard name"),
                }
                last = Some(entity.name);
            }
        }

        let mut zeroed = zeroed;
        if found {
            let rows = self.keys.container_rows(account);
            if !zeroed {
                let zero = wrap_counter(0);
                tr.set(&rows.pack(&[container, field::OBJECTS]), &zero);
                tr.set(&rows.pack(&[container, field::BYTES]), &zero);
                zeroed = true;
            }
            tr.atomic_add(&rows.pack(&[container, field::OBJECTS]), &wrap_counter(objects));
            tr.atomic_add(&rows.pack(&[container, field::BYTES]), &wrap_counter(bytes));
        }

        Ok(ShardBatch {
            next_marker: if scanned == batch_size { last } else { None },
            zeroed,
        })
    }

    /// Sum one batch of the owner's containers registered to `bucket` into
    /// the bucket counters. The first batch resets the counters.
    fn bucket_batch(
        &self,
        tr: &mut Transaction,
        owner: &str,
        bucket: &str,
        marker: Option<&str>,
        batch_size: usize,
    ) -> AccountResult<Option<String>> {
        let rows = self.keys.container_rows(owner);
        let mut begin = rows.range().begin;
        if let Some(marker) = marker {
            begin = begin.max(rows.after_entity(marker));
        }

        let mut objects = 0_i64;
        let mut bytes = 0_i64;
        let mut scanned = 0;
        let mut last = None;
        {
            let mut cursor = EntityCursor::new(tr, &rows, begin, rows.range().end, CONTAINER_FIELDS);
            cursor.set_batch(batch_size);
            for entity in cursor.by_ref().take(batch_size) {
                let entity = entity?;
                scanned += 1;
                if entity.field(field::BUCKET) == Some(bucket.as_bytes()) {
                    add_counts(&entity, &mut objects, &mut bytes);
                }
                last = Some(entity.name);
            }
        }

        let objects_key = self.keys.bucket_field(bucket, field::OBJECTS);
        let bytes_key = self.keys.bucket_field(bucket, field::BYTES);
        if marker.is_none() {
            let zero = wrap_counter(0);
            tr.set(&objects_key, &zero);
            tr.set(&bytes_key, &zero);
        }
        tr.atomic_add(&objects_key, &wrap_counter(objects));
        tr.atomic_add(&bytes_key, &wrap_counter(bytes));

        Ok(if scanned == batch_size { last } else { None })
    }
}

/// Add a container's counters, skipping objects of segment containers.
fn add_counts(entity: &Entity, objects: &mut i64, bytes: &mut i64) {
    if !is_segments_container(&entity.name) {
        *objects += entity.counter(field::OBJECTS);
    }
    *bytes += entity.counter(field::BYTES);
}
