//! Error types for the writer pool
//!
//! A single enum covering every way acquiring, locking, or unlocking a
//! table writer can fail. Errors carry a short diagnostic string; none of
//! them are retried inside the pool (see `DESIGN.md`).

use std::fmt;
use std::io;

/// Unified error type for pool operations
#[derive(Debug, Clone)]
pub enum PoolError {
    /// The pool is shutting down or has shut down; non-retryable for the
    /// lifetime of the process.
    PoolClosed,
    /// Another live thread owns the writer. Retryable after back-off.
    /// Carries the reinterpreted ownership reason (never empty, see P9).
    EntryUnavailable { reason: String },
    /// The entry is administratively locked. Carries the reinterpreted
    /// reason of whoever (possibly the caller itself) holds the lock.
    EntryLocked { reason: String },
    /// The underlying writer constructor failed. Cached on the entry and
    /// re-served to the same thread on its next attempt (P6).
    CreationFailed(String),
    /// `unlock` called on an entry this thread did not lock.
    NotLockOwner,
    /// `unlock` called on an entry that isn't administratively locked, or
    /// one whose writer is unexpectedly present while locked.
    NotLocked,
}

impl PoolError {
    pub(crate) fn creation_failed(errno: Option<i32>, message: impl Into<String>) -> Self {
        let message = message.into();
        match errno {
            Some(errno) => PoolError::CreationFailed(format!("{} [errno={}]", message, errno)),
            None => PoolError::CreationFailed(message),
        }
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::PoolClosed => write!(f, "writer pool is closed"),
            PoolError::EntryUnavailable { reason } => {
                write!(f, "could not get, busy [reason={}]", reason)
            }
            PoolError::EntryLocked { reason } => {
                write!(f, "table is locked [reason={}]", reason)
            }
            PoolError::CreationFailed(msg) => write!(f, "could not open writer: {}", msg),
            PoolError::NotLockOwner => write!(f, "caller does not hold the lock"),
            PoolError::NotLocked => write!(f, "table is not locked"),
        }
    }
}

impl std::error::Error for PoolError {}

impl From<io::Error> for PoolError {
    fn from(e: io::Error) -> Self {
        PoolError::creation_failed(e.raw_os_error(), e.to_string())
    }
}

/// Result type alias for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;
