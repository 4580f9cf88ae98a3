//! Shared database handle and the transaction retry loop.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{KvError, KvResult};
use crate::store::MemoryStore;
use crate::transaction::Transaction;

/// Cloneable handle to an ordered transactional store.
///
/// # Examples
///
/// ```
/// use meterstack_kv::{Database, KvError};
///
/// let db = Database::default();
/// db.run(|tr| {
///     tr.set(b"greeting", b"hello");
///     Ok::<_, KvError>(())
/// })
/// .unwrap();
/// let value = db.run(|tr| Ok::<_, KvError>(tr.get(b"greeting"))).unwrap();
/// assert_eq!(value.as_deref(), Some(&b"hello"[..]));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Database {
    store: Arc<MemoryStore>,
    retry: RetryConfig,
}

impl Database {
    /// Open a fresh in-memory store with the given retry policy.
    #[must_use]
    pub fn new(retry: RetryConfig) -> Self {
        Self {
            store: Arc::new(MemoryStore::default()),
            retry,
        }
    }

    /// Wrap an existing store.
    #[must_use]
    pub fn with_store(store: Arc<MemoryStore>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    /// The retry policy used by [`run`](Self::run).
    #[must_use]
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Begin a transaction at the latest committed version.
    pub fn begin(&self) -> KvResult<Transaction> {
        Transaction::begin(Arc::clone(&self.store))
    }

    /// Run `body` in a transaction and commit it, retrying on conflicts.
    ///
    /// The body may run several times and must not have side effects outside
    /// the transaction. An `Err` from the body aborts without committing and
    /// is returned as is. Retryable commit failures are retried with
    /// exponential backoff; once the attempts are spent the call fails with
    /// [`KvError::RetriesExhausted`].
    pub fn run<T, E, F>(&self, mut body: F) -> Result<T, E>
    where
        F: FnMut(&mut Transaction) -> Result<T, E>,
        E: From<KvError>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let mut tr = self.begin()?;
            let value = body(&mut tr)?;
            match tr.commit() {
                Ok(_) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        warn!(attempts = attempt, error = %e, "transaction retries exhausted");
                        return Err(KvError::RetriesExhausted { attempts: attempt }.into());
                    }
                    let delay = self.retry.backoff(attempt - 1);
                    debug!(attempt, delay_ms = delay.as_millis(), error = %e, "retrying transaction");
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Close the store; every later transaction fails with [`KvError::Closed`].
    pub fn close(&self) {
        self.store.close();
    }

    /// Whether [`close`](Self::close) was called on any clone of this handle.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.store.is_closed()
    }
}
