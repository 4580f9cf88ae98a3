//! Store error types.

/// Errors raised by the ordered key-value store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KvError {
    /// A key read by the transaction was written by a later commit.
    #[error("transaction not committed due to a conflicting commit")]
    NotCommitted,

    /// The transaction's read version fell out of the retained commit window.
    #[error("transaction is too old to commit")]
    TransactionTooOld,

    /// The database handle was closed.
    #[error("database is closed")]
    Closed,

    /// Every attempt of a retry loop hit a retryable error.
    #[error("transaction retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
    },

    /// A key could not be decoded as a tuple.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

impl KvError {
    /// Whether running the transaction again may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotCommitted | Self::TransactionTooOld)
    }
}

/// Convenience result type for store operations.
pub type KvResult<T> = Result<T, KvError>;
