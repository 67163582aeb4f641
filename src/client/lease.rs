//! Lease manager.

use super::{with_deadline, Client};
use crate::core::error::{LeaseholdError, LeaseholdResult};
use crate::store::KeepAliveStream;

/// A store-issued lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseToken {
    id: i64,
    ttl_seconds: i64,
}

impl LeaseToken {
    pub(crate) fn new(id: i64, ttl_seconds: i64) -> Self {
        Self { id, ttl_seconds }
    }

    /// Store lease id.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// TTL granted by the store, in seconds.
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }
}

/// Grants, revokes and renews leases.
#[derive(Debug, Clone)]
pub struct LeaseManager {
    client: Client,
}

impl LeaseManager {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Grant a lease with the given TTL.
    pub async fn grant(&self, ttl_seconds: i64) -> LeaseholdResult<LeaseToken> {
        if ttl_seconds <= 0 {
            return Err(LeaseholdError::LeaseGrantFailed {
                ttl_seconds,
                message: "ttl must be positive".to_string(),
            });
        }

        let grant = self
            .client
            .call("lease_grant", self.client.store.lease_grant(ttl_seconds))
            .await?;
        tracing::debug!(lease_id = grant.id, ttl_seconds = grant.ttl_seconds, "lease granted");
        Ok(LeaseToken::new(grant.id, grant.ttl_seconds))
    }

    /// Revoke a lease, deleting every key bound to it.
    ///
    /// Idempotent: a lease that no longer exists counts as revoked. Bounded by
    /// `lease.revoke_timeout_ms` rather than the request timeout.
    pub async fn revoke(&self, token: &LeaseToken) -> LeaseholdResult<()> {
        self.revoke_id(token.id).await
    }

    pub(crate) async fn revoke_id(&self, lease_id: i64) -> LeaseholdResult<()> {
        let timeout = self.client.config.lease.revoke_timeout();
        let result = with_deadline(
            "lease_revoke",
            timeout,
            self.client.store.lease_revoke(lease_id),
        )
        .await;

        match result {
            Ok(()) => {
                tracing::debug!(lease_id, "lease revoked");
                Ok(())
            }
            Err(LeaseholdError::LeaseNotFound { .. }) => {
                tracing::debug!(lease_id, "lease already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Revoke and log instead of failing.
    pub(crate) async fn revoke_quietly(&self, token: &LeaseToken) {
        if let Err(e) = self.revoke(token).await {
            tracing::warn!(lease_id = token.id, error = %e, "failed to revoke lease");
        }
    }

    /// Start renewing a lease. Renewal stops when the stream is dropped.
    pub async fn renew_continuously(&self, token: &LeaseToken) -> LeaseholdResult<KeepAliveStream> {
        self.client
            .call("lease_keep_alive", self.client.store.lease_keep_alive(token.id))
            .await
    }

    /// Remaining TTL in seconds, or None once the lease is gone.
    pub async fn time_to_live(&self, token: &LeaseToken) -> LeaseholdResult<Option<i64>> {
        self.client
            .call(
                "lease_time_to_live",
                self.client.store.lease_time_to_live(token.id),
            )
            .await
    }
}
