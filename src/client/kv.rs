//! Basic KV operations.
//!
//! Thin pass-through calls to the store. Keys and values cross the API as
//! UTF-8 strings; stored bytes that are not UTF-8 fail with `InvalidValue`.

use super::lease::LeaseToken;
use super::Client;
use crate::core::error::{LeaseholdError, LeaseholdResult};
use crate::store::{Compare, KeyRange, KeyValue, Txn, TxnOp};
use std::collections::BTreeMap;

/// A value with its revision metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
    /// Revision at which the key was created.
    pub create_revision: i64,
    /// Revision of the last write.
    pub mod_revision: i64,
    /// Writes since creation.
    pub version: i64,
    /// Bound lease id, 0 if none.
    pub lease: i64,
}

impl TryFrom<KeyValue> for Entry {
    type Error = LeaseholdError;

    fn try_from(kv: KeyValue) -> LeaseholdResult<Self> {
        let key = decode_key(kv.key)?;
        let value = String::from_utf8(kv.value)
            .map_err(|_| LeaseholdError::InvalidValue { key: key.clone() })?;
        Ok(Self {
            key,
            value,
            create_revision: kv.create_revision,
            mod_revision: kv.mod_revision,
            version: kv.version,
            lease: kv.lease,
        })
    }
}

fn decode_key(key: Vec<u8>) -> LeaseholdResult<String> {
    String::from_utf8(key).map_err(|e| LeaseholdError::InvalidValue {
        key: String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

impl Client {
    /// Read a single key.
    pub async fn get(&self, key: &str) -> LeaseholdResult<String> {
        Ok(self.get_entry(key).await?.value)
    }

    /// Read a single key with its metadata.
    pub async fn get_entry(&self, key: &str) -> LeaseholdResult<Entry> {
        let result = self
            .call("range", self.store.range(KeyRange::single(key)))
            .await?;

        let mut kvs = result.kvs.into_iter();
        match (kvs.next(), kvs.len()) {
            (None, _) => Err(LeaseholdError::key_not_found(key)),
            (Some(kv), 0) => Entry::try_from(kv),
            (Some(_), rest) => Err(LeaseholdError::AmbiguousKey {
                key: key.to_string(),
                count: rest + 1,
            }),
        }
    }

    /// Read every key starting with `prefix`.
    ///
    /// Fails with `KeyNotFound` when nothing matches.
    pub async fn get_prefix(&self, prefix: &str) -> LeaseholdResult<BTreeMap<String, String>> {
        let result = self
            .call("range", self.store.range(KeyRange::prefix(prefix)))
            .await?;
        if result.kvs.is_empty() {
            return Err(LeaseholdError::key_not_found(prefix));
        }

        result
            .kvs
            .into_iter()
            .map(|kv| Entry::try_from(kv).map(|e| (e.key, e.value)))
            .collect()
    }

    /// Write `key = value`. Returns the store revision of the write.
    pub async fn put(&self, key: &str, value: &str) -> LeaseholdResult<i64> {
        let revision = self
            .call("put", self.store.put(key.into(), value.into(), 0))
            .await?;
        tracing::debug!(key = %key, revision, "put");
        Ok(revision)
    }

    /// Write `key = value` bound to `lease`; the key disappears with the lease.
    pub async fn put_with_lease(&self, key: &str, value: &str, lease: &LeaseToken) -> LeaseholdResult<i64> {
        let revision = self
            .call("put", self.store.put(key.into(), value.into(), lease.id()))
            .await?;
        tracing::debug!(key = %key, lease_id = lease.id(), revision, "put with lease");
        Ok(revision)
    }

    /// Write `key = value` only if `key` does not exist.
    ///
    /// Returns whether the write happened. `lease` of `None` writes an
    /// unbound key.
    pub async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        lease: Option<&LeaseToken>,
    ) -> LeaseholdResult<bool> {
        let txn = Txn::new()
            .when(Compare::key_absent(key))
            .and_then(TxnOp::Put {
                key: key.into(),
                value: value.into(),
                lease: lease.map(LeaseToken::id).unwrap_or(0),
            });
        let result = self.call("txn", self.store.txn(txn)).await?;
        Ok(result.succeeded)
    }

    /// Delete a single key. Returns the number of keys deleted (0 or 1).
    pub async fn delete(&self, key: &str) -> LeaseholdResult<i64> {
        let deleted = self
            .call("delete_range", self.store.delete_range(KeyRange::single(key)))
            .await?;
        tracing::debug!(key = %key, deleted, "delete");
        Ok(deleted)
    }

    /// Delete every key starting with `prefix`. Returns the number deleted.
    pub async fn delete_prefix(&self, prefix: &str) -> LeaseholdResult<i64> {
        let deleted = self
            .call("delete_range", self.store.delete_range(KeyRange::prefix(prefix)))
            .await?;
        tracing::debug!(prefix = %prefix, deleted, "delete prefix");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_rejects_non_utf8_values() {
        let kv = KeyValue {
            key: b"bin".to_vec(),
            value: vec![0xff, 0xfe],
            ..KeyValue::default()
        };
        assert_eq!(
            Entry::try_from(kv).unwrap_err(),
            LeaseholdError::InvalidValue { key: "bin".into() }
        );
    }
}
