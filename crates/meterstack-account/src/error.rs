//! Accounting error types.
//!
//! Defines [`AccountError`], the error enum returned by every
//! [`AccountBackend`](crate::AccountBackend) operation, and [`ErrorKind`], the
//! coarse classification an outer HTTP layer maps to status codes.
//!
//! # Usage
//!
//! ```
//! use meterstack_account::error::{AccountError, ErrorKind};
//!
//! let err = AccountError::NoSuchAccount {
//!     account: "acct".to_owned(),
//! };
//! assert_eq!(err.kind(), ErrorKind::NotFound);
//! assert_eq!(err.kind().status_code(), 404);
//! ```

use meterstack_kv::KvError;

/// Accounting backend error type.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    /// The account does not exist.
    #[error("account not found: {account}")]
    NoSuchAccount {
        /// The missing account id.
        account: String,
    },

    /// The container does not exist, or the event refers to a deleted one.
    #[error("container not found: {account}/{container}")]
    NoSuchContainer {
        /// The account the container was looked up in.
        account: String,
        /// The missing container name.
        container: String,
    },

    /// The bucket does not exist or has no owner.
    #[error("bucket not found: {bucket}")]
    NoSuchBucket {
        /// The missing bucket name.
        bucket: String,
    },

    /// The event is not newer than the recorded container state.
    #[error("no update needed, event older than last container update: {account}/{container}")]
    StaleUpdate {
        /// The account of the container.
        account: String,
        /// The container name.
        container: String,
    },

    /// The account still owns containers.
    #[error("account is not empty: {account}")]
    AccountNotEmpty {
        /// The account id.
        account: String,
    },

    /// A newer refresh pass started on the same aggregate.
    #[error("refresh pass superseded: {target}")]
    RefreshSuperseded {
        /// The bucket or container being refreshed.
        target: String,
    },

    /// A required identifier is missing or a value is malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A counter does not fit the stored 32-bit representation.
    #[error("counter out of range: {value}")]
    CounterOverflow {
        /// The value that did not fit.
        value: i64,
    },

    /// The store refused the transaction or is unavailable.
    #[error("service busy: {0}")]
    ServiceBusy(#[from] KvError),

    /// Unexpected internal failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An account, container or bucket is absent.
    NotFound,
    /// The request conflicts with the current state.
    Conflict,
    /// The request is malformed.
    BadRequest,
    /// Transient store failure; the caller should retry later.
    ServiceBusy,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// HTTP status code conventionally used for this kind.
    #[must_use]
    pub fn status_code(self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::BadRequest => 400,
            Self::ServiceBusy => 503,
            Self::Internal => 500,
        }
    }
}

impl AccountError {
    /// Classify the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoSuchAccount { .. } | Self::NoSuchContainer { .. } | Self::NoSuchBucket { .. } => {
                ErrorKind::NotFound
            }
            Self::StaleUpdate { .. } | Self::AccountNotEmpty { .. } | Self::RefreshSuperseded { .. } => {
                ErrorKind::Conflict
            }
            Self::BadRequest(_) | Self::CounterOverflow { .. } => ErrorKind::BadRequest,
            Self::ServiceBusy(KvError::InvalidKey(_)) | Self::Internal(_) => ErrorKind::Internal,
            Self::ServiceBusy(_) => ErrorKind::ServiceBusy,
        }
    }

    pub(crate) fn no_such_account(account: &str) -> Self {
        Self::NoSuchAccount {
            account: account.to_owned(),
        }
    }

    pub(crate) fn no_such_container(account: &str, container: &str) -> Self {
        Self::NoSuchContainer {
            account: account.to_owned(),
            container: container.to_owned(),
        }
    }

    pub(crate) fn no_such_bucket(bucket: &str) -> Self {
        Self::NoSuchBucket {
            bucket: bucket.to_owned(),
        }
    }
}

/// Convenience result type for accounting operations.
pub type AccountResult<T> = Result<T, AccountError>;
