//! Networking layer.
//!
//! - [`tls`] - TLS material for the store connection
//!
//! Transport itself is tonic's; see `store::etcd`.

pub mod tls;
