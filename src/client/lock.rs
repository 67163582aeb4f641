//! Lease-backed distributed lock.
//!
//! The lock key holds the decimal id of the holder's lease and is bound to
//! that lease, so a holder that stops renewing loses the lock when the TTL
//! runs out. Acquisition is a single compare-and-put transaction guarded on
//! the key's create revision being 0, retried at a fixed interval.
//!
//! ```text
//! Idle ──acquire──▶ Acquiring ──txn ok──▶ Held ──release──▶ Released
//!                       │
//!                       └──attempts exhausted──▶ Failed
//! ```

use super::lease::{LeaseManager, LeaseToken};
use super::Client;
use crate::core::config::LockConfig;
use crate::core::error::{LeaseholdError, LeaseholdResult};
use crate::store::{Compare, KeyRange, Txn, TxnOp, TxnOpResult};
use std::time::Duration;

/// Acquisition tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// TTL of the lease bound to the lock key.
    pub ttl_seconds: i64,
    /// Attempts before giving up with `LockUnavailable`.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub retry_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self::from(&LockConfig::default())
    }
}

impl From<&LockConfig> for LockOptions {
    fn from(config: &LockConfig) -> Self {
        Self {
            ttl_seconds: config.ttl_seconds,
            max_attempts: config.max_attempts,
            retry_interval: config.retry_interval(),
        }
    }
}

/// Mutual exclusion over a caller-chosen key.
#[derive(Debug, Clone)]
pub struct DistributedLock {
    client: Client,
    leases: LeaseManager,
    options: LockOptions,
}

impl DistributedLock {
    /// Create a lock using the client's `[lock]` configuration.
    pub fn new(client: Client) -> Self {
        let options = LockOptions::from(&client.config().lock);
        Self {
            leases: client.lease_manager(),
            client,
            options,
        }
    }

    /// Override the acquisition options.
    pub fn with_options(mut self, options: LockOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    /// Acquire `key`, retrying until it is free or attempts run out.
    ///
    /// Transport errors consume an attempt; any other error aborts.
    pub async fn acquire(&self, key: &str) -> LeaseholdResult<LeaseToken> {
        let max_attempts = self.options.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.attempt(key).await {
                Ok(Some(token)) => {
                    tracing::info!(key = %key, lease_id = token.id(), attempt, "lock acquired");
                    return Ok(token);
                }
                Ok(None) => {}
                Err(e) if e.is_retriable() => {
                    tracing::warn!(key = %key, attempt, error = %e, "lock attempt failed");
                }
                Err(e) => return Err(e),
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.options.retry_interval).await;
            }
        }

        tracing::info!(key = %key, attempts = max_attempts, "lock unavailable");
        Err(LeaseholdError::LockUnavailable {
            key: key.to_string(),
            attempts: max_attempts,
        })
    }

    /// Make one acquisition attempt. `Ok(None)` means the lock is held elsewhere.
    pub async fn try_acquire(&self, key: &str) -> LeaseholdResult<Option<LeaseToken>> {
        let token = self.attempt(key).await?;
        if let Some(token) = &token {
            tracing::info!(key = %key, lease_id = token.id(), "lock acquired");
        }
        Ok(token)
    }

    async fn attempt(&self, key: &str) -> LeaseholdResult<Option<LeaseToken>> {
        let token = self.leases.grant(self.options.ttl_seconds).await?;

        let txn = Txn::new()
            .when(Compare::key_absent(key))
            .and_then(TxnOp::Put {
                key: key.into(),
                value: token.id().to_string().into_bytes(),
                lease: token.id(),
            })
            .or_else(TxnOp::Range(KeyRange::single(key)));

        match self.client.call("txn", self.client.store.txn(txn)).await {
            Ok(result) if result.succeeded => Ok(Some(token)),
            Ok(result) => {
                if let Some(TxnOpResult::Range(kvs)) = result.responses.first() {
                    if let Some(current) = kvs.first() {
                        tracing::debug!(
                            key = %key,
                            holder = %String::from_utf8_lossy(&current.value),
                            "lock held elsewhere"
                        );
                    }
                }
                self.leases.revoke_quietly(&token).await;
                Ok(None)
            }
            Err(e) => {
                self.leases.revoke_quietly(&token).await;
                Err(e)
            }
        }
    }

    /// Release `key` by revoking the lease named in its value.
    ///
    /// The value must name the lease the key is bound to; otherwise the key
    /// is left alone and `MalformedLockValue` is returned. Errors are returned
    /// as-is; release never retries.
    pub async fn release(&self, key: &str) -> LeaseholdResult<()> {
        let (lease_id, bound) = self
            .read_lock(key)
            .await?
            .ok_or_else(|| LeaseholdError::LockNotHeld {
                key: key.to_string(),
            })?;

        if bound != lease_id {
            tracing::warn!(
                key = %key,
                lease_id,
                bound_lease = bound,
                "lock value does not match bound lease"
            );
            return Err(LeaseholdError::MalformedLockValue {
                key: key.to_string(),
                value: lease_id.to_string(),
            });
        }

        self.leases.revoke_id(lease_id).await?;
        tracing::info!(key = %key, lease_id, "lock released");
        Ok(())
    }

    /// Lease id currently holding `key`, if any.
    pub async fn holder(&self, key: &str) -> LeaseholdResult<Option<i64>> {
        Ok(self.read_lock(key).await?.map(|(lease_id, _)| lease_id))
    }

    /// Read `key` as a lock: the lease id in its value and the lease it is bound to.
    async fn read_lock(&self, key: &str) -> LeaseholdResult<Option<(i64, i64)>> {
        let result = self
            .client
            .call("range", self.client.store().range(KeyRange::single(key)))
            .await?;
        let Some(kv) = result.kvs.into_iter().next() else {
            return Ok(None);
        };

        let value = String::from_utf8_lossy(&kv.value);
        let lease_id = parse_lock_value(key, &value)?;
        Ok(Some((lease_id, kv.lease)))
    }
}

/// Parse a lock value: a positive decimal lease id with nothing around it.
pub fn parse_lock_value(key: &str, value: &str) -> LeaseholdResult<i64> {
    let malformed = || LeaseholdError::MalformedLockValue {
        key: key.to_string(),
        value: value.to_string(),
    };

    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    match value.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(malformed()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_lease_ids() {
        assert_eq!(parse_lock_value("l", "7587869128306519812").unwrap(), 7587869128306519812);
        assert_eq!(parse_lock_value("l", "1").unwrap(), 1);
    }

    #[test]
    fn rejects_anything_else() {
        for value in ["", "0", "-5", "+5", " 5", "5 ", "0x1f", "abc", "99999999999999999999"] {
            let err = parse_lock_value("l", value).unwrap_err();
            assert!(
                matches!(err, LeaseholdError::MalformedLockValue { .. }),
                "{value:?} -> {err:?}"
            );
        }
    }

    #[test]
    fn default_options_match_config_defaults() {
        let options = LockOptions::default();
        assert_eq!(options.ttl_seconds, 300);
        assert_eq!(options.max_attempts, 600);
        assert_eq!(options.retry_interval, Duration::from_secs(1));
    }
}
