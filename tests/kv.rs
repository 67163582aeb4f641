//! Basic KV operation tests.

mod common;

use leasehold::LeaseholdError;
use std::collections::BTreeMap;

// ============================================================================
// Single-key operations
// ============================================================================

#[tokio::test]
async fn get_missing_key_is_not_found() {
    let (client, _) = common::memory_client();

    let err = client.get("never/written").await.unwrap_err();
    assert_eq!(err, LeaseholdError::key_not_found("never/written"));
}

#[tokio::test]
async fn put_then_get() {
    let (client, _) = common::memory_client();

    client.put("config/mode", "active").await.unwrap();
    assert_eq!(client.get("config/mode").await.unwrap(), "active");

    client.put("config/mode", "standby").await.unwrap();
    assert_eq!(client.get("config/mode").await.unwrap(), "standby");
}

#[tokio::test]
async fn put_returns_increasing_revisions() {
    let (client, store) = common::memory_client();

    let first = client.put("a", "1").await.unwrap();
    let second = client.put("b", "2").await.unwrap();
    assert!(second > first);
    assert_eq!(store.revision(), second);
}

#[tokio::test]
async fn get_entry_reports_metadata() {
    let (client, _) = common::memory_client();

    let created = client.put("k", "v1").await.unwrap();
    let modified = client.put("k", "v2").await.unwrap();

    let entry = client.get_entry("k").await.unwrap();
    assert_eq!(entry.value, "v2");
    assert_eq!(entry.create_revision, created);
    assert_eq!(entry.mod_revision, modified);
    assert_eq!(entry.version, 2);
    assert_eq!(entry.lease, 0);
}

#[tokio::test]
async fn delete_removes_key() {
    let (client, _) = common::memory_client();

    client.put("a", "1").await.unwrap();
    assert_eq!(client.delete("a").await.unwrap(), 1);
    assert_eq!(client.delete("a").await.unwrap(), 0);
    assert!(client.get("a").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn put_if_absent_writes_once() {
    let (client, _) = common::memory_client();

    assert!(client.put_if_absent("leader", "node-1", None).await.unwrap());
    assert!(!client.put_if_absent("leader", "node-2", None).await.unwrap());
    assert_eq!(client.get("leader").await.unwrap(), "node-1");
}

#[tokio::test]
async fn put_with_lease_disappears_on_revoke() {
    let (client, _) = common::memory_client();
    let leases = client.lease_manager();

    let token = leases.grant(30).await.unwrap();
    client.put_with_lease("ephemeral", "x", &token).await.unwrap();
    assert_eq!(client.get_entry("ephemeral").await.unwrap().lease, token.id());

    leases.revoke(&token).await.unwrap();
    assert!(client.get("ephemeral").await.unwrap_err().is_not_found());
}

// ============================================================================
// Prefix operations
// ============================================================================

#[tokio::test]
async fn get_prefix_returns_exactly_prefixed_keys() {
    let (client, _) = common::memory_client();

    client.put("svc/b", "2").await.unwrap();
    client.put("svc/a", "1").await.unwrap();
    client.put("svc0", "outside").await.unwrap();
    client.put("other/a", "outside").await.unwrap();

    let entries = client.get_prefix("svc/").await.unwrap();
    let expected: BTreeMap<String, String> = [("svc/a", "1"), ("svc/b", "2")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    assert_eq!(entries, expected);
}

#[tokio::test]
async fn get_prefix_empty_is_not_found() {
    let (client, _) = common::memory_client();

    client.put("x", "1").await.unwrap();
    let err = client.get_prefix("missing/").await.unwrap_err();
    assert_eq!(err, LeaseholdError::key_not_found("missing/"));
}

#[tokio::test]
async fn delete_prefix_removes_only_prefixed_keys() {
    let (client, _) = common::memory_client();

    client.put("jobs/1", "a").await.unwrap();
    client.put("jobs/2", "b").await.unwrap();
    client.put("jobsx", "c").await.unwrap();

    assert_eq!(client.delete_prefix("jobs/").await.unwrap(), 2);
    assert!(client.get_prefix("jobs/").await.is_err());
    assert_eq!(client.get("jobsx").await.unwrap(), "c");
}

#[tokio::test]
async fn prefix_scenario() {
    let (client, _) = common::memory_client();

    client.put("a/1", "x").await.unwrap();
    client.put("a/2", "y").await.unwrap();

    let entries = client.get_prefix("a").await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries["a/1"], "x");
    assert_eq!(entries["a/2"], "y");

    client.delete("a/1").await.unwrap();
    assert_eq!(
        client.get("a/1").await.unwrap_err(),
        LeaseholdError::key_not_found("a/1")
    );
}

// ============================================================================
// Failure surfacing
// ============================================================================

#[tokio::test]
async fn transport_failures_surface_as_unavailable() {
    let (client, store) = common::memory_client();

    store.fail_next_requests(1);
    let err = client.put("a", "1").await.unwrap_err();
    assert!(matches!(err, LeaseholdError::StoreUnavailable { operation: "put", .. }));

    client.put("a", "1").await.unwrap();
}

#[tokio::test]
async fn non_utf8_values_are_rejected() {
    let (client, store) = common::memory_client();

    leasehold::Store::put(&store, b"bin".to_vec(), vec![0xff, 0x00], 0)
        .await
        .unwrap();
    assert_eq!(
        client.get("bin").await.unwrap_err(),
        LeaseholdError::InvalidValue { key: "bin".into() }
    );
}
