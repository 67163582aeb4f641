//! gRPC status to client error mapping.
//!
//! - UNAVAILABLE, DEADLINE_EXCEEDED, CANCELLED, ABORTED, RESOURCE_EXHAUSTED and
//!   UNKNOWN (transport resets surface as UNKNOWN) → StoreUnavailable
//! - NOT_FOUND "requested lease not found" → LeaseNotFound
//! - everything else → Rejected

use crate::core::error::LeaseholdError;
use tonic::{Code, Status};

/// Message etcd attaches to lease lookups that miss.
const LEASE_NOT_FOUND: &str = "requested lease not found";

/// Map a gRPC status returned by `operation`.
pub fn status_to_error(operation: &'static str, status: &Status) -> LeaseholdError {
    match status.code() {
        Code::Unavailable
        | Code::DeadlineExceeded
        | Code::Cancelled
        | Code::Aborted
        | Code::ResourceExhausted
        | Code::Unknown => LeaseholdError::unavailable(operation, status.message()),
        _ => LeaseholdError::rejected(operation, status.message()),
    }
}

/// Map a gRPC status returned by a lease operation on `lease_id`.
pub fn lease_status_to_error(operation: &'static str, lease_id: i64, status: &Status) -> LeaseholdError {
    if status.code() == Code::NotFound && status.message().contains(LEASE_NOT_FOUND) {
        return LeaseholdError::LeaseNotFound { lease_id };
    }
    status_to_error(operation, status)
}
