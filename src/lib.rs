//! Leasehold - etcd v3 convenience client with lease-backed coordination.
//!
//! Leasehold wraps an etcd v3 store with get/put/delete and prefix operations,
//! prefix watches, and two lease-backed coordination primitives: a distributed
//! lock and a liveness registrar. Both rely on the store deleting a key when the
//! lease bound to it is revoked or expires.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Coordination                           │
//! │        DistributedLock        │        Registrar                │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Client handle                           │
//! │     KV │ Prefix ops │ Watch │ LeaseManager │ request deadlines  │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Store abstraction                        │
//! │        EtcdStore (tonic gRPC)     │     MemoryStore (tests)     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::error`] - Error types
//! - [`core::telemetry`] - tracing subscriber setup
//!
//! ## Client
//! - [`client::kv`] - Basic KV and prefix operations
//! - [`client::lease`] - Lease grant, revoke and renewal
//! - [`client::lock`] - Distributed lock
//! - [`client::registrar`] - Liveness registration
//! - [`client::watch`] - Prefix watches
//!
//! ## Store
//! - [`store`] - The `Store` trait and its request/response types
//! - [`store::memory`] - In-process store
//! - `store::etcd` - etcd v3 gRPC backend (feature `etcd`)
//!
//! ## Networking
//! - [`net::tls`] - TLS material for the store connection
//!
//! # Key Invariants
//!
//! - A lock key's value is the decimal id of the lease it is bound to
//! - At most one holder per lock key, enforced by the store's compare-and-put
//! - A registration reports at most one loss, then stops

// Core infrastructure
pub mod core;

// Client handle and coordination primitives
pub mod client;

// Store abstraction and backends
pub mod store;

// Networking
pub mod net;

// Re-exports for convenience
pub use self::core::{config, error, telemetry};
pub use client::lease::{LeaseManager, LeaseToken};
pub use client::lock::{DistributedLock, LockOptions};
pub use client::registrar::{Registrar, Registration};
pub use client::watch::{WatchEvent, WatchHandle, WatchSubscription};
pub use client::Client;
pub use error::{LeaseholdError, LeaseholdResult};
pub use store::memory::MemoryStore;
pub use store::{EventType, Store};
