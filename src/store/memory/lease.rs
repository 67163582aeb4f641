//! Lease table for the in-memory store.
//!
//! Lease records track TTL, the renewal deadline and the keys bound to them.
//! Deadlines use the tokio clock so paused-time tests drive expiry.

use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

/// A lease record.
#[derive(Debug, Clone)]
pub struct LeaseRecord {
    /// Unique lease identifier.
    pub lease_id: i64,

    /// Granted TTL in seconds.
    pub ttl_seconds: i64,

    /// Instant the lease expires unless renewed.
    pub deadline: Instant,

    /// Keys attached to this lease.
    pub attached_keys: HashSet<Vec<u8>>,
}

impl LeaseRecord {
    /// Create a new lease.
    pub fn new(lease_id: i64, ttl_seconds: i64, now: Instant) -> Self {
        Self {
            lease_id,
            ttl_seconds,
            deadline: now + Self::ttl_duration(ttl_seconds),
            attached_keys: HashSet::new(),
        }
    }

    fn ttl_duration(ttl_seconds: i64) -> Duration {
        Duration::from_secs(ttl_seconds.max(0) as u64)
    }

    /// Check if the lease has expired at `now`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// Remaining TTL at `now`, rounded up to whole seconds.
    pub fn remaining_ttl_at(&self, now: Instant) -> i64 {
        let remaining = self.deadline.saturating_duration_since(now);
        let secs = remaining.as_secs() as i64;
        if remaining.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    /// Extend the deadline by a full TTL from `now`.
    pub fn keepalive(&mut self, now: Instant) {
        self.deadline = now + Self::ttl_duration(self.ttl_seconds);
    }
}

/// Active leases indexed by id.
#[derive(Debug)]
pub struct LeaseTable {
    leases: HashMap<i64, LeaseRecord>,

    /// Next lease ID for auto-generation.
    next_lease_id: i64,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self {
            leases: HashMap::new(),
            next_lease_id: 1,
        }
    }

    /// Get the number of active leases.
    pub fn lease_count(&self) -> usize {
        self.leases.len()
    }

    /// Check if a lease exists and has not expired.
    pub fn is_live(&self, lease_id: i64, now: Instant) -> bool {
        self.leases
            .get(&lease_id)
            .is_some_and(|l| !l.is_expired_at(now))
    }

    /// Get a lease by ID.
    pub fn get(&self, lease_id: i64) -> Option<&LeaseRecord> {
        self.leases.get(&lease_id)
    }

    /// Grant a new lease and return its id.
    pub fn grant(&mut self, ttl_seconds: i64, now: Instant) -> i64 {
        let id = self.next_lease_id;
        self.next_lease_id += 1;
        self.leases.insert(id, LeaseRecord::new(id, ttl_seconds, now));
        id
    }

    /// Remove a lease, returning it if it existed.
    pub fn revoke(&mut self, lease_id: i64) -> Option<LeaseRecord> {
        self.leases.remove(&lease_id)
    }

    /// Renew a lease. Returns false if it is missing or already expired.
    pub fn keepalive(&mut self, lease_id: i64, now: Instant) -> bool {
        match self.leases.get_mut(&lease_id) {
            Some(lease) if !lease.is_expired_at(now) => {
                lease.keepalive(now);
                true
            }
            _ => false,
        }
    }

    /// Attach a key to a lease.
    pub fn attach_key(&mut self, lease_id: i64, key: Vec<u8>) -> bool {
        if let Some(lease) = self.leases.get_mut(&lease_id) {
            lease.attached_keys.insert(key);
            true
        } else {
            false
        }
    }

    /// Detach a key from a lease.
    pub fn detach_key(&mut self, lease_id: i64, key: &[u8]) -> bool {
        self.leases
            .get_mut(&lease_id)
            .is_some_and(|lease| lease.attached_keys.remove(key))
    }

    /// Remaining TTL in seconds for a live lease.
    pub fn remaining_ttl(&self, lease_id: i64, now: Instant) -> Option<i64> {
        self.leases
            .get(&lease_id)
            .filter(|l| !l.is_expired_at(now))
            .map(|l| l.remaining_ttl_at(now))
    }
}

impl Default for LeaseTable {
    fn default() -> Self {
        Self::new()
    }
}
