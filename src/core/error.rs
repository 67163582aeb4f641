//! Error types for store, lease, lock, and registration operations.
//!
//! Every variant names the operation or key it concerns so callers can tell a
//! stuck lock apart from an unreachable store without parsing messages.

use thiserror::Error;

/// Common leasehold error conditions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LeaseholdError {
    /// Transport failure talking to the store (connection refused, reset, unavailable).
    #[error("store unavailable during {operation}: {message}")]
    StoreUnavailable {
        operation: &'static str,
        message: String,
    },

    /// The per-request deadline elapsed before the store answered.
    #[error("{operation} exceeded deadline of {timeout_ms}ms")]
    DeadlineExceeded {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// No key matched a single-key or prefix read.
    #[error("key not found: {key}")]
    KeyNotFound { key: String },

    /// A single-key read matched more than one key; use prefix reads instead.
    #[error("key {key} matched {count} entries; use a prefix read")]
    AmbiguousKey { key: String, count: usize },

    /// Lock acquisition exhausted its attempt budget.
    #[error("lock {key} unavailable after {attempts} attempts")]
    LockUnavailable { key: String, attempts: u32 },

    /// Release was called on a lock key with no value.
    #[error("lock {key} is not held")]
    LockNotHeld { key: String },

    /// The lock key holds something other than a decimal lease id.
    #[error("lock {key} holds malformed value {value:?}")]
    MalformedLockValue { key: String, value: String },

    /// A registration's lease expired or was revoked; the record is gone.
    #[error("registration {key} lost (lease {lease_id})")]
    RegistrationLost { key: String, lease_id: i64 },

    /// The store refused to grant a lease.
    #[error("lease grant for ttl {ttl_seconds}s failed: {message}")]
    LeaseGrantFailed { ttl_seconds: i64, message: String },

    /// The lease does not exist (never granted, expired, or revoked).
    #[error("lease {lease_id} not found")]
    LeaseNotFound { lease_id: i64 },

    /// The store rejected the request (invalid argument, permission, precondition).
    #[error("store rejected {operation}: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },

    /// A stored value could not be decoded as UTF-8.
    #[error("value for {key} is not valid UTF-8")]
    InvalidValue { key: String },
}

impl LeaseholdError {
    /// Create a StoreUnavailable error.
    pub fn unavailable(operation: &'static str, message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            operation,
            message: message.into(),
        }
    }

    /// Create a Rejected error.
    pub fn rejected(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Rejected {
            operation,
            message: message.into(),
        }
    }

    /// Create a KeyNotFound error.
    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    /// Check if this error is a transient transport condition worth retrying.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable { .. } | Self::DeadlineExceeded { .. }
        )
    }

    /// Check if this error reports a missing key or lock.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::KeyNotFound { .. } | Self::LockNotHeld { .. } | Self::LeaseNotFound { .. }
        )
    }
}

/// Result type using LeaseholdError.
pub type LeaseholdResult<T> = Result<T, LeaseholdError>;
