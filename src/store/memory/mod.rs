//! In-memory store with etcd semantics.
//!
//! Serves the whole [`Store`] trait from a single mutex-guarded state: a KV
//! state machine, a lease table and a watch hub. Lease expiry runs on the tokio
//! clock, so tests using paused time can step through TTLs deterministically.
//!
//! [`MemoryStore::fail_next_requests`] injects transport failures for exercising
//! retry paths.

pub mod lease;
pub mod state_machine;
pub mod watch;

use crate::core::error::{LeaseholdError, LeaseholdResult};
use crate::store::{
    KeepAliveAck, KeepAliveStream, KeyRange, LeaseGrant, RangeResult, Store, Txn, TxnOp,
    TxnOpResult, TxnResult, WatchStream,
};
use async_trait::async_trait;
use lease::LeaseTable;
use parking_lot::Mutex;
use state_machine::KvStateMachine;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use watch::WatchHub;

/// Buffered keep-alive acknowledgements per stream.
const KEEPALIVE_BUFFER: usize = 16;

/// Floor on the renewal period.
const MIN_KEEPALIVE_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct Inner {
    kv: KvStateMachine,
    leases: LeaseTable,
    watches: WatchHub,
}

impl Inner {
    fn flush_events(&mut self) {
        let events = self.kv.take_events();
        self.watches.dispatch(&events);
    }

    fn check_lease(&self, lease: i64, now: Instant) -> LeaseholdResult<()> {
        if lease != 0 && !self.leases.is_live(lease, now) {
            return Err(LeaseholdError::LeaseNotFound { lease_id: lease });
        }
        Ok(())
    }

    fn apply_put(&mut self, key: Vec<u8>, value: Vec<u8>, lease: i64, revision: i64) {
        if lease != 0 {
            self.leases.attach_key(lease, key.clone());
        }
        if let Some(prev) = self.kv.put(key.clone(), value, revision, lease) {
            if prev.lease != 0 && prev.lease != lease {
                self.leases.detach_key(prev.lease, &key);
            }
        }
    }

    fn apply_delete(&mut self, range: &KeyRange, revision: i64) -> i64 {
        let deleted = self.kv.delete_range(range, revision);
        for kv in &deleted {
            if kv.lease != 0 {
                self.leases.detach_key(kv.lease, &kv.key);
            }
        }
        deleted.len() as i64
    }

    /// Remove a lease and every key bound to it at one revision.
    fn drop_lease(&mut self, lease_id: i64) -> bool {
        let Some(record) = self.leases.revoke(lease_id) else {
            return false;
        };

        let revision = self.kv.next_revision();
        let mut keys: Vec<_> = record.attached_keys.into_iter().collect();
        keys.sort();
        for key in keys {
            self.kv.delete(&key, revision);
        }
        self.flush_events();
        true
    }

    fn apply_txn(&mut self, txn: Txn, now: Instant) -> LeaseholdResult<TxnResult> {
        let succeeded = self.kv.evaluate_all(&txn.compare);
        let ops = if succeeded { txn.success } else { txn.failure };

        for op in &ops {
            if let TxnOp::Put { lease, .. } = op {
                self.check_lease(*lease, now)?;
            }
        }

        let revision = self.kv.next_revision();
        let mut responses = Vec::with_capacity(ops.len());
        for op in ops {
            let response = match op {
                TxnOp::Range(range) => {
                    TxnOpResult::Range(self.kv.range(&range).into_iter().cloned().collect())
                }
                TxnOp::Put { key, value, lease } => {
                    self.apply_put(key, value, lease, revision);
                    TxnOpResult::Put { revision }
                }
                TxnOp::DeleteRange(range) => TxnOpResult::DeleteRange {
                    deleted: self.apply_delete(&range, revision),
                },
            };
            responses.push(response);
        }
        self.flush_events();

        Ok(TxnResult {
            succeeded,
            revision: self.kv.current_revision(),
            responses,
        })
    }
}

/// In-process [`Store`] implementation.
///
/// Cloning shares the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    injected_failures: Arc<AtomicU32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` requests with `StoreUnavailable`.
    pub fn fail_next_requests(&self, count: u32) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    /// Number of live leases.
    pub fn lease_count(&self) -> usize {
        self.inner.lock().leases.lease_count()
    }

    /// Number of registered watches.
    pub fn watch_count(&self) -> usize {
        self.inner.lock().watches.watch_count()
    }

    /// Current store revision.
    pub fn revision(&self) -> i64 {
        self.inner.lock().kv.current_revision()
    }

    /// Remove a lease as if its TTL had run out.
    ///
    /// Returns false if the lease does not exist.
    pub fn expire_lease(&self, lease_id: i64) -> bool {
        self.inner.lock().drop_lease(lease_id)
    }

    fn check_fault(&self, operation: &'static str) -> LeaseholdResult<()> {
        let taken = self
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if taken.is_ok() {
            return Err(LeaseholdError::unavailable(operation, "injected failure"));
        }
        Ok(())
    }

    /// Spawn the task that reaps a lease once its deadline passes.
    fn spawn_expiry(&self, lease_id: i64) {
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                let Some(deadline) = lease_deadline(&inner, lease_id) else {
                    return;
                };
                tokio::time::sleep_until(deadline).await;

                let Some(strong) = inner.upgrade() else {
                    return;
                };
                let expired = {
                    let mut guard = strong.lock();
                    let now = Instant::now();
                    match guard.leases.get(lease_id).map(|l| l.is_expired_at(now)) {
                        None => return,
                        Some(true) => guard.drop_lease(lease_id),
                        Some(false) => false,
                    }
                };
                if expired {
                    tracing::debug!(lease_id, "lease expired");
                    return;
                }
            }
        });
    }
}

fn lease_deadline(inner: &Weak<Mutex<Inner>>, lease_id: i64) -> Option<Instant> {
    let inner = inner.upgrade()?;
    let guard = inner.lock();
    guard.leases.get(lease_id).map(|l| l.deadline)
}

fn keepalive_interval(ttl_seconds: i64) -> Duration {
    let ttl = Duration::from_secs(ttl_seconds.max(1) as u64);
    (ttl / 3).max(MIN_KEEPALIVE_INTERVAL)
}

#[async_trait]
impl Store for MemoryStore {
    async fn range(&self, range: KeyRange) -> LeaseholdResult<RangeResult> {
        self.check_fault("range")?;
        let guard = self.inner.lock();
        Ok(RangeResult {
            revision: guard.kv.current_revision(),
            kvs: guard.kv.range(&range).into_iter().cloned().collect(),
        })
    }

    async fn put(&self, key: Vec<u8>, value: Vec<u8>, lease: i64) -> LeaseholdResult<i64> {
        self.check_fault("put")?;
        let mut guard = self.inner.lock();
        guard.check_lease(lease, Instant::now())?;

        let revision = guard.kv.next_revision();
        guard.apply_put(key, value, lease, revision);
        guard.flush_events();
        Ok(revision)
    }

    async fn delete_range(&self, range: KeyRange) -> LeaseholdResult<i64> {
        self.check_fault("delete_range")?;
        let mut guard = self.inner.lock();
        let revision = guard.kv.next_revision();
        let deleted = guard.apply_delete(&range, revision);
        guard.flush_events();
        Ok(deleted)
    }

    async fn txn(&self, txn: Txn) -> LeaseholdResult<TxnResult> {
        self.check_fault("txn")?;
        self.inner.lock().apply_txn(txn, Instant::now())
    }

    async fn lease_grant(&self, ttl_seconds: i64) -> LeaseholdResult<LeaseGrant> {
        self.check_fault("lease_grant")?;
        if ttl_seconds <= 0 {
            return Err(LeaseholdError::LeaseGrantFailed {
                ttl_seconds,
                message: "ttl must be positive".to_string(),
            });
        }

        let id = self.inner.lock().leases.grant(ttl_seconds, Instant::now());
        self.spawn_expiry(id);
        tracing::trace!(lease_id = id, ttl_seconds, "lease granted");
        Ok(LeaseGrant { id, ttl_seconds })
    }

    async fn lease_revoke(&self, lease_id: i64) -> LeaseholdResult<()> {
        self.check_fault("lease_revoke")?;
        if self.inner.lock().drop_lease(lease_id) {
            Ok(())
        } else {
            Err(LeaseholdError::LeaseNotFound { lease_id })
        }
    }

    async fn lease_time_to_live(&self, lease_id: i64) -> LeaseholdResult<Option<i64>> {
        self.check_fault("lease_time_to_live")?;
        Ok(self.inner.lock().leases.remaining_ttl(lease_id, Instant::now()))
    }

    async fn lease_keep_alive(&self, lease_id: i64) -> LeaseholdResult<KeepAliveStream> {
        self.check_fault("lease_keep_alive")?;
        let ttl_seconds = {
            let guard = self.inner.lock();
            match guard.leases.get(lease_id) {
                Some(lease) if !lease.is_expired_at(Instant::now()) => lease.ttl_seconds,
                _ => return Err(LeaseholdError::LeaseNotFound { lease_id }),
            }
        };

        let (tx, rx) = mpsc::channel(KEEPALIVE_BUFFER);
        let inner = Arc::downgrade(&self.inner);
        let interval = keepalive_interval(ttl_seconds);

        tokio::spawn(async move {
            loop {
                let renewed = match inner.upgrade() {
                    Some(inner) => inner.lock().leases.keepalive(lease_id, Instant::now()),
                    None => false,
                };
                if !renewed {
                    tracing::debug!(lease_id, "keep-alive stopped, lease gone");
                    break;
                }

                let ack = KeepAliveAck {
                    lease_id,
                    ttl_seconds,
                };
                if tx.send(ack).await.is_err() {
                    break;
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = tx.closed() => break,
                }
            }
        });

        Ok(KeepAliveStream::new(rx))
    }

    async fn watch(&self, range: KeyRange) -> LeaseholdResult<WatchStream> {
        self.check_fault("watch")?;
        let (_, rx) = self.inner.lock().watches.create(range);
        Ok(WatchStream::new(rx))
    }
}
