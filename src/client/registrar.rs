//! Liveness registration.
//!
//! A registration is a key bound to a lease that a background task keeps
//! renewing. When the renewal stream ends (lease revoked, expired or the
//! store dropped it), the task waits `registration.loss_backoff_ms`, reports
//! one `RegistrationLost` on the caller's failure channel and exits. There is
//! no automatic re-registration.

use super::lease::{LeaseManager, LeaseToken};
use super::Client;
use crate::core::error::{LeaseholdError, LeaseholdResult};
use crate::store::KeepAliveStream;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Creates registrations.
#[derive(Debug, Clone)]
pub struct Registrar {
    client: Client,
    leases: LeaseManager,
}

impl Registrar {
    pub fn new(client: Client) -> Self {
        Self {
            leases: client.lease_manager(),
            client,
        }
    }

    /// Failure channel sized by `registration.failure_channel_capacity`.
    pub fn failure_channel(
        &self,
    ) -> (mpsc::Sender<LeaseholdError>, mpsc::Receiver<LeaseholdError>) {
        mpsc::channel(self.client.config().registration.failure_channel_capacity)
    }

    /// Register `key = value` under a fresh lease of `ttl_seconds`.
    ///
    /// If the write or renewal setup fails, the fresh lease is revoked.
    pub async fn register(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: i64,
        failures: mpsc::Sender<LeaseholdError>,
    ) -> LeaseholdResult<Registration> {
        let token = self.leases.grant(ttl_seconds).await?;

        match self.register_with_lease(token, key, value, failures).await {
            Ok(registration) => Ok(registration),
            Err(e) => {
                self.leases.revoke_quietly(&token).await;
                Err(e)
            }
        }
    }

    /// Register `key = value` under the configured default TTL.
    pub async fn register_default(
        &self,
        key: &str,
        value: &str,
        failures: mpsc::Sender<LeaseholdError>,
    ) -> LeaseholdResult<Registration> {
        let ttl_seconds = self.client.config().registration.ttl_seconds;
        self.register(key, value, ttl_seconds, failures).await
    }

    /// Register `key = value` under a lease the caller already holds.
    pub async fn register_with_lease(
        &self,
        lease: LeaseToken,
        key: &str,
        value: &str,
        failures: mpsc::Sender<LeaseholdError>,
    ) -> LeaseholdResult<Registration> {
        self.client.put_with_lease(key, value, &lease).await?;
        let stream = self.leases.renew_continuously(&lease).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let renewal = RenewalLoop {
            key: key.to_string(),
            lease,
            stream,
            shutdown_rx,
            failures,
            loss_backoff: self.client.config().registration.loss_backoff(),
        };
        let task = tokio::spawn(renewal.run());

        tracing::info!(key = %key, lease_id = lease.id(), "registration started");
        Ok(Registration {
            key: key.to_string(),
            lease,
            leases: self.leases.clone(),
            shutdown_tx,
            task: Some(task),
        })
    }
}

struct RenewalLoop {
    key: String,
    lease: LeaseToken,
    stream: KeepAliveStream,
    shutdown_rx: watch::Receiver<bool>,
    failures: mpsc::Sender<LeaseholdError>,
    loss_backoff: Duration,
}

impl RenewalLoop {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    tracing::debug!(key = %self.key, "renewal stopped");
                    return;
                }
                ack = self.stream.next() => match ack {
                    Some(ack) => {
                        tracing::trace!(key = %self.key, ttl_seconds = ack.ttl_seconds, "lease renewed");
                    }
                    None => break,
                }
            }
        }

        let lease_id = self.lease.id();
        tracing::warn!(key = %self.key, lease_id, "registration lost");

        tokio::select! {
            _ = tokio::time::sleep(self.loss_backoff) => {}
            _ = self.shutdown_rx.changed() => return,
        }

        let lost = LeaseholdError::RegistrationLost {
            key: self.key.clone(),
            lease_id,
        };
        tokio::select! {
            result = self.failures.send(lost) => {
                if result.is_err() {
                    tracing::debug!(key = %self.key, "failure receiver dropped");
                }
            }
            _ = self.shutdown_rx.changed() => {}
        }
    }
}

/// A live registration.
///
/// Dropping it stops renewal; the record then disappears when the lease TTL
/// runs out.
#[derive(Debug)]
pub struct Registration {
    key: String,
    lease: LeaseToken,
    leases: LeaseManager,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Registration {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn lease(&self) -> LeaseToken {
        self.lease
    }

    /// Whether the renewal task is still running.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop renewal and revoke the lease, removing the record immediately.
    pub async fn stop(mut self) -> LeaseholdResult<()> {
        self.halt().await;
        self.leases.revoke(&self.lease).await?;
        tracing::info!(key = %self.key, lease_id = self.lease.id(), "registration stopped");
        Ok(())
    }

    /// Stop renewal without revoking; the record expires with its lease.
    pub async fn cancel(mut self) {
        self.halt().await;
        tracing::info!(key = %self.key, lease_id = self.lease.id(), "registration cancelled");
    }

    async fn halt(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(key = %self.key, error = %e, "renewal task failed");
            }
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}
