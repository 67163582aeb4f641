//! Store abstraction.
//!
//! The [`Store`] trait is the narrow slice of the etcd v3 API that the client
//! needs: ranged reads, puts with optional lease binding, ranged deletes,
//! compare-then-execute transactions, leases with keep-alive streams, and watches.
//!
//! Two implementations ship with the crate:
//! - [`memory::MemoryStore`] - in-process store with etcd semantics, used in tests
//! - [`etcd::EtcdStore`] - gRPC backend (feature `etcd`)

#[cfg(feature = "etcd")]
pub mod etcd;
pub mod memory;

use crate::core::error::LeaseholdResult;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A key range in etcd form.
///
/// - empty `range_end`: the single key `key`
/// - `range_end == [0]`: every key `>= key`
/// - otherwise: `[key, range_end)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// Start of the range (inclusive).
    pub key: Vec<u8>,
    /// End of the range (exclusive), or one of the markers above.
    pub range_end: Vec<u8>,
}

impl KeyRange {
    /// A range covering exactly one key.
    pub fn single(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            range_end: Vec::new(),
        }
    }

    /// A range covering every key that starts with `prefix`.
    pub fn prefix(prefix: impl Into<Vec<u8>>) -> Self {
        let key = prefix.into();
        let range_end = prefix_range_end(&key);
        Self { key, range_end }
    }

    /// Check if this range is a single key.
    pub fn is_single(&self) -> bool {
        self.range_end.is_empty()
    }

    /// Check if a key falls inside this range.
    pub fn contains(&self, key: &[u8]) -> bool {
        if self.range_end.is_empty() {
            key == self.key.as_slice()
        } else if self.range_end == [0] {
            key >= self.key.as_slice()
        } else {
            key >= self.key.as_slice() && key < self.range_end.as_slice()
        }
    }
}

/// Compute the exclusive upper bound of a prefix scan.
///
/// Increments the last byte that is not 0xff and truncates after it. A prefix
/// that is empty or all 0xff has no upper bound and yields `[0]`.
pub fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    vec![0]
}

/// A stored key-value pair with its MVCC metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Revision at which the key was last created; 0 means absent.
    pub create_revision: i64,
    /// Revision of the last modification.
    pub mod_revision: i64,
    /// Number of modifications since creation.
    pub version: i64,
    /// Bound lease id, 0 if none.
    pub lease: i64,
}

/// Result of a ranged read.
#[derive(Debug, Clone, Default)]
pub struct RangeResult {
    /// Store revision the read was served at.
    pub revision: i64,
    /// Matching entries in key order.
    pub kvs: Vec<KeyValue>,
}

/// Compare target for transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompareTarget {
    Version(i64),
    CreateRevision(i64),
    ModRevision(i64),
    Value(Vec<u8>),
    Lease(i64),
}

/// Compare operator for transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareResult {
    Equal,
    NotEqual,
    Greater,
    Less,
}

/// A transaction guard evaluated against one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compare {
    pub key: Vec<u8>,
    pub target: CompareTarget,
    pub result: CompareResult,
}

impl Compare {
    /// Guard that holds when `key` does not currently exist.
    pub fn key_absent(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            target: CompareTarget::CreateRevision(0),
            result: CompareResult::Equal,
        }
    }

    /// Guard on the value of `key`.
    pub fn value(key: impl Into<Vec<u8>>, result: CompareResult, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            target: CompareTarget::Value(value.into()),
            result,
        }
    }
}

/// An operation inside a transaction branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOp {
    Range(KeyRange),
    Put {
        key: Vec<u8>,
        value: Vec<u8>,
        lease: i64,
    },
    DeleteRange(KeyRange),
}

/// The outcome of one transaction operation, in branch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOpResult {
    Range(Vec<KeyValue>),
    Put { revision: i64 },
    DeleteRange { deleted: i64 },
}

/// Compare-then-execute transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Txn {
    /// All compares must hold for the success branch.
    pub compare: Vec<Compare>,
    pub success: Vec<TxnOp>,
    pub failure: Vec<TxnOp>,
}

impl Txn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a compare.
    pub fn when(mut self, compare: Compare) -> Self {
        self.compare.push(compare);
        self
    }

    /// Add an operation to the success branch.
    pub fn and_then(mut self, op: TxnOp) -> Self {
        self.success.push(op);
        self
    }

    /// Add an operation to the failure branch.
    pub fn or_else(mut self, op: TxnOp) -> Self {
        self.failure.push(op);
        self
    }
}

/// Transaction outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxnResult {
    /// Whether the success branch ran.
    pub succeeded: bool,
    /// Store revision after the transaction.
    pub revision: i64,
    pub responses: Vec<TxnOpResult>,
}

/// A granted lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseGrant {
    pub id: i64,
    /// TTL the store actually granted, in seconds.
    pub ttl_seconds: i64,
}

/// One keep-alive acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveAck {
    pub lease_id: i64,
    /// Remaining TTL after the renewal, in seconds.
    pub ttl_seconds: i64,
}

/// Stream of keep-alive acknowledgements for one lease.
///
/// The stream ends when the lease is gone or the store stops renewing it.
/// Dropping the stream stops renewal.
#[derive(Debug)]
pub struct KeepAliveStream {
    rx: mpsc::Receiver<KeepAliveAck>,
}

impl KeepAliveStream {
    pub fn new(rx: mpsc::Receiver<KeepAliveAck>) -> Self {
        Self { rx }
    }

    /// Wait for the next acknowledgement; `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<KeepAliveAck> {
        self.rx.recv().await
    }
}

/// Watch event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Key was created or updated.
    Put,
    /// Key was deleted.
    Delete,
}

impl EventType {
    /// Stable textual tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change to a watched key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub event_type: EventType,
    /// Current state for Put; the deleted key (empty value) for Delete.
    pub kv: KeyValue,
}

/// Stream of watch events. Dropping it cancels the watch.
#[derive(Debug)]
pub struct WatchStream {
    rx: mpsc::UnboundedReceiver<WatchEvent>,
}

impl WatchStream {
    pub fn new(rx: mpsc::UnboundedReceiver<WatchEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the next event; `None` once the watch has ended.
    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }
}

/// The coordination store the client talks to.
///
/// Implementations map their transport failures to
/// [`LeaseholdError::StoreUnavailable`](crate::core::error::LeaseholdError::StoreUnavailable)
/// and report unknown leases as
/// [`LeaseholdError::LeaseNotFound`](crate::core::error::LeaseholdError::LeaseNotFound).
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Read every key in `range`.
    async fn range(&self, range: KeyRange) -> LeaseholdResult<RangeResult>;

    /// Write `key = value`, bound to `lease` when non-zero. Returns the new revision.
    async fn put(&self, key: Vec<u8>, value: Vec<u8>, lease: i64) -> LeaseholdResult<i64>;

    /// Delete every key in `range`. Returns the number of keys deleted.
    async fn delete_range(&self, range: KeyRange) -> LeaseholdResult<i64>;

    /// Run a compare-then-execute transaction atomically.
    async fn txn(&self, txn: Txn) -> LeaseholdResult<TxnResult>;

    /// Grant a lease with the requested TTL.
    async fn lease_grant(&self, ttl_seconds: i64) -> LeaseholdResult<LeaseGrant>;

    /// Revoke a lease, deleting every key bound to it.
    async fn lease_revoke(&self, lease_id: i64) -> LeaseholdResult<()>;

    /// Remaining TTL of a lease in seconds, or None if it does not exist.
    async fn lease_time_to_live(&self, lease_id: i64) -> LeaseholdResult<Option<i64>>;

    /// Start renewing a lease until the returned stream is dropped.
    async fn lease_keep_alive(&self, lease_id: i64) -> LeaseholdResult<KeepAliveStream>;

    /// Subscribe to changes in `range` from now on.
    async fn watch(&self, range: KeyRange) -> LeaseholdResult<WatchStream>;
}
