//! In-memory ordered store with versioned snapshots.
//!
//! The committed state is an immutable `BTreeMap` behind an `Arc`. A
//! transaction pins the map current at its begin and reads from it without
//! holding any lock; a commit swaps in a new map under the store mutex and
//! records the key ranges it wrote so later commits can detect conflicts.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{KvError, KvResult};
use crate::subspace::KeyRange;

/// Committed key/value map shared by snapshots.
pub type Snapshot = Arc<BTreeMap<Vec<u8>, Vec<u8>>>;

/// Commits retained for conflict detection by default.
pub const DEFAULT_HISTORY: usize = 4096;

/// A buffered write replayed against the live map at commit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Store a value.
    Set(Vec<u8>, Vec<u8>),
    /// Remove one key.
    Clear(Vec<u8>),
    /// Remove every key in a range.
    ClearRange(KeyRange),
    /// Little-endian add of the operand to the current value.
    Add(Vec<u8>, Vec<u8>),
}

#[derive(Debug)]
struct StoreState {
    data: Snapshot,
    version: u64,
    /// Write-conflict ranges per committed version, oldest first.
    history: VecDeque<(u64, Vec<KeyRange>)>,
    /// Read versions below this can no longer be checked for conflicts.
    oldest_checkable: u64,
    closed: bool,
}

/// The shared store behind a [`Database`](crate::Database) handle.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    history_capacity: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }
}

impl MemoryStore {
    /// Create an empty store retaining `capacity` commits for conflict checks.
    #[must_use]
    pub fn with_history(capacity: usize) -> Self {
        Self {
            state: Mutex::new(StoreState {
                data: Arc::new(BTreeMap::new()),
                version: 0,
                history: VecDeque::new(),
                oldest_checkable: 0,
                closed: false,
            }),
            history_capacity: capacity.max(1),
        }
    }

    /// Current committed map and its version.
    pub(crate) fn snapshot(&self) -> KvResult<(Snapshot, u64)> {
        let state = self.state.lock();
        if state.closed {
            return Err(KvError::Closed);
        }
        Ok((Arc::clone(&state.data), state.version))
    }

    /// Latest committed version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    /// Number of committed keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().data.len()
    }

    /// Whether the store holds no key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.data = Arc::new(BTreeMap::new());
        state.history.clear();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Validate and apply a transaction's buffered writes.
    ///
    /// Fails with [`KvError::NotCommitted`] when a range the transaction read
    /// was written by a commit newer than `read_version`.
    pub(crate) fn commit(
        &self,
        read_version: u64,
        read_conflicts: &[KeyRange],
        write_conflicts: Vec<KeyRange>,
        mutations: &[Mutation],
    ) -> KvResult<u64> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(KvError::Closed);
        }
        if mutations.is_empty() {
            return Ok(read_version);
        }
        if read_version < state.oldest_checkable {
            return Err(KvError::TransactionTooOld);
        }

        let conflicted = state
            .history
            .iter()
            .filter(|(version, _)| *version > read_version)
            .any(|(_, written)| {
                written
                    .iter()
                    .any(|w| read_conflicts.iter().any(|r| r.intersects(w)))
            });
        if conflicted {
            debug!(read_version, "commit rejected by conflicting write");
            return Err(KvError::NotCommitted);
        }

        let data = Arc::make_mut(&mut state.data);
        for mutation in mutations {
            apply(data, mutation);
        }

        state.version += 1;
        let version = state.version;
        state.history.push_back((version, write_conflicts));
        while state.history.len() > self.history_capacity {
            if let Some((dropped, _)) = state.history.pop_front() {
                state.oldest_checkable = dropped;
            }
        }

        Ok(version)
    }
}

fn apply(data: &mut BTreeMap<Vec<u8>, Vec<u8>>, mutation: &Mutation) {
    match mutation {
        Mutation::Set(key, value) => {
            data.insert(key.clone(), value.clone());
        }
        Mutation::Clear(key) => {
            data.remove(key);
        }
        Mutation::ClearRange(range) => {
            if !range.is_empty() {
                let doomed: Vec<Vec<u8>> = data
                    .range(range.begin.clone()..range.end.clone())
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in doomed {
                    data.remove(&key);
                }
            }
        }
        Mutation::Add(key, operand) => {
            let sum = add_le(data.get(key).map(Vec::as_slice), operand);
            data.insert(key.clone(), sum);
        }
    }
}

/// Little-endian two's-complement addition.
///
/// The result has the operand's width: a shorter existing value is
/// zero-extended, a longer one truncated, and a missing one treated as zero.
#[must_use]
pub fn add_le(existing: Option<&[u8]>, operand: &[u8]) -> Vec<u8> {
    let existing = existing.unwrap_or_default();
    let mut out = Vec::with_capacity(operand.len());
    let mut carry = 0_u16;
    for (i, byte) in operand.iter().enumerate() {
        let current = u16::from(existing.get(i).copied().unwrap_or(0));
        let total = current + u16::from(*byte) + carry;
        out.push(total.to_le_bytes()[0]);
        carry = total >> 8;
    }
    out
}
