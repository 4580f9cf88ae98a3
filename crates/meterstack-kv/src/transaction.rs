//! Optimistic read/write transactions.

use std::collections::BTreeMap;
use std::iter::Peekable;
use std::sync::Arc;

use crate::error::KvResult;
use crate::store::{MemoryStore, Mutation, Snapshot, add_le};
use crate::subspace::{KeyRange, Subspace};

/// A key and its value.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// A transaction over a fixed read version.
///
/// Reads see the snapshot taken at begin plus the transaction's own writes.
/// Conflict-registering reads ([`get`](Self::get), [`get_range`](Self::get_range))
/// make the commit fail if a newer commit wrote any of the keys read;
/// snapshot reads do not.
#[derive(Debug)]
pub struct Transaction {
    store: Arc<MemoryStore>,
    snapshot: Snapshot,
    read_version: u64,
    /// Own writes; `None` marks a key cleared by this transaction.
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    cleared: Vec<KeyRange>,
    mutations: Vec<Mutation>,
    read_conflicts: Vec<KeyRange>,
    write_conflicts: Vec<KeyRange>,
}

impl Transaction {
    pub(crate) fn begin(store: Arc<MemoryStore>) -> KvResult<Self> {
        let (snapshot, read_version) = store.snapshot()?;
        Ok(Self {
            store,
            snapshot,
            read_version,
            writes: BTreeMap::new(),
            cleared: Vec::new(),
            mutations: Vec::new(),
            read_conflicts: Vec::new(),
            write_conflicts: Vec::new(),
        })
    }

    /// Version of the snapshot this transaction reads.
    #[must_use]
    pub fn read_version(&self) -> u64 {
        self.read_version
    }

    /// Read one key, registering a read conflict on it.
    #[must_use]
    pub fn get(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.read_conflicts.push(KeyRange::single(key));
        self.visible(key)
    }

    /// Read one key without registering a read conflict.
    #[must_use]
    pub fn get_snapshot(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.visible(key)
    }

    /// Read up to `limit` pairs of `range` in key order (`0` means no limit),
    /// registering a read conflict on the part of the range that was observed.
    #[must_use]
    pub fn get_range(&mut self, range: &KeyRange, limit: usize) -> Vec<KeyValue> {
        let rows = self.scan(range, limit);
        let observed_end = match rows.last() {
            Some((last, _)) if limit > 0 && rows.len() == limit => KeyRange::single(last).end,
            _ => range.end.clone(),
        };
        self.read_conflicts
            .push(KeyRange::new(range.begin.clone(), observed_end));
        rows
    }

    /// Read up to `limit` pairs of `range` without registering read conflicts.
    #[must_use]
    pub fn get_range_snapshot(&self, range: &KeyRange, limit: usize) -> Vec<KeyValue> {
        self.scan(range, limit)
    }

    /// Write a value.
    pub fn set(&mut self, key: &[u8], value: &[u8]) {
        self.writes.insert(key.to_vec(), Some(value.to_vec()));
        self.write_conflicts.push(KeyRange::single(key));
        self.mutations
            .push(Mutation::Set(key.to_vec(), value.to_vec()));
    }

    /// Remove a key.
    pub fn clear(&mut self, key: &[u8]) {
        self.writes.insert(key.to_vec(), None);
        self.write_conflicts.push(KeyRange::single(key));
        self.mutations.push(Mutation::Clear(key.to_vec()));
    }

    /// Remove every key in `range`.
    pub fn clear_range(&mut self, range: &KeyRange) {
        if range.is_empty() {
            return;
        }
        let own: Vec<Vec<u8>> = self
            .writes
            .range(range.begin.clone()..range.end.clone())
            .map(|(k, _)| k.clone())
            .collect();
        for key in own {
            self.writes.remove(&key);
        }
        self.cleared.push(range.clone());
        self.write_conflicts.push(range.clone());
        self.mutations.push(Mutation::ClearRange(range.clone()));
    }

    /// Remove every key inside `subspace`.
    pub fn clear_subspace(&mut self, subspace: &Subspace) {
        self.clear_range(&subspace.range());
    }

    /// Atomically add a little-endian integer to the value at `key`.
    ///
    /// The sum is computed against the committed value at commit time, so two
    /// transactions adding to the same key never conflict with each other.
    pub fn atomic_add(&mut self, key: &[u8], operand: &[u8]) {
        let current = self.visible(key);
        let sum = add_le(current.as_deref(), operand);
        self.writes.insert(key.to_vec(), Some(sum));
        self.write_conflicts.push(KeyRange::single(key));
        self.mutations
            .push(Mutation::Add(key.to_vec(), operand.to_vec()));
    }

    /// Commit the buffered writes, returning the commit version.
    ///
    /// A transaction without writes commits trivially at its read version.
    pub fn commit(self) -> KvResult<u64> {
        self.store.commit(
            self.read_version,
            &self.read_conflicts,
            self.write_conflicts,
            &self.mutations,
        )
    }

    fn is_cleared(&self, key: &[u8]) -> bool {
        self.cleared.iter().any(|r| r.contains(key))
    }

    fn visible(&self, key: &[u8]) -> Option<Vec<u8>> {
        if let Some(own) = self.writes.get(key) {
            return own.clone();
        }
        if self.is_cleared(key) {
            return None;
        }
        self.snapshot.get(key).cloned()
    }

    fn scan(&self, range: &KeyRange, limit: usize) -> Vec<KeyValue> {
        if range.is_empty() {
            return Vec::new();
        }
        let bounds = range.begin.clone()..range.end.clone();
        let committed = self
            .snapshot
            .range(bounds.clone())
            .filter(|(k, _)| !self.writes.contains_key(*k) && !self.is_cleared(k))
            .map(|(k, v)| (k.clone(), v.clone()));
        let own = self
            .writes
            .range(bounds)
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.clone())));

        let merged = Merge {
            left: committed.peekable(),
            right: own.peekable(),
        };
        if limit == 0 {
            merged.collect()
        } else {
            merged.take(limit).collect()
        }
    }
}

/// Merge of two key-ordered iterators with disjoint keys.
struct Merge<L: Iterator<Item = KeyValue>, R: Iterator<Item = KeyValue>> {
    left: Peekable<L>,
    right: Peekable<R>,
}

impl<L, R> Iterator for Merge<L, R>
where
    L: Iterator<Item = KeyValue>,
    R: Iterator<Item = KeyValue>,
{
    type Item = KeyValue;

    fn next(&mut self) -> Option<KeyValue> {
        match (self.left.peek(), self.right.peek()) {
            (Some((l, _)), Some((r, _))) => {
                if l < r {
                    self.left.next()
                } else {
                    self.right.next()
                }
            }
            (Some(_), None) => self.left.next(),
            (None, _) => self.right.next(),
        }
    }
}
