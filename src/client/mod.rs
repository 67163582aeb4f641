//! Client handle and the coordination primitives built on it.
//!
//! - [`kv`] - get/put/delete and prefix operations (methods on [`Client`])
//! - [`lease`] - lease minting, revocation and renewal
//! - [`lock`] - lease-backed mutual exclusion
//! - [`registrar`] - heartbeat-backed liveness registration
//! - [`watch`] - prefix watches (methods on [`Client`])

pub mod kv;
pub mod lease;
pub mod lock;
pub mod registrar;
pub mod watch;

use crate::core::config::Config;
use crate::core::error::{LeaseholdError, LeaseholdResult};
use crate::store::Store;
use lease::LeaseManager;
use lock::DistributedLock;
use registrar::Registrar;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Handle to a coordination store.
///
/// Cheap to clone; every clone shares the same store connection and
/// configuration. Foreground calls are bounded by `store.request_timeout_ms`.
#[derive(Clone)]
pub struct Client {
    store: Arc<dyn Store>,
    config: Arc<Config>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoints", &self.config.store.endpoints)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Validate `config` and connect to the etcd endpoints it names.
    #[cfg(feature = "etcd")]
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let store = crate::store::etcd::EtcdStore::connect(&config.store).await?;
        Ok(Self::with_store(Arc::new(store), config))
    }

    /// Build a client over any store implementation.
    pub fn with_store(store: Arc<dyn Store>, config: Config) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Lease manager sharing this client.
    pub fn lease_manager(&self) -> LeaseManager {
        LeaseManager::new(self.clone())
    }

    /// Distributed lock using the `[lock]` defaults.
    pub fn lock(&self) -> DistributedLock {
        DistributedLock::new(self.clone())
    }

    /// Liveness registrar using the `[registration]` defaults.
    pub fn registrar(&self) -> Registrar {
        Registrar::new(self.clone())
    }

    /// Run a store call under the request deadline.
    pub(crate) async fn call<T, F>(&self, operation: &'static str, fut: F) -> LeaseholdResult<T>
    where
        F: Future<Output = LeaseholdResult<T>>,
    {
        with_deadline(operation, self.config.store.request_timeout(), fut).await
    }
}

/// Bound `fut` by `timeout`, mapping expiry to `DeadlineExceeded`.
pub(crate) async fn with_deadline<T, F>(
    operation: &'static str,
    timeout: Duration,
    fut: F,
) -> LeaseholdResult<T>
where
    F: Future<Output = LeaseholdResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(LeaseholdError::DeadlineExceeded {
            operation,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
