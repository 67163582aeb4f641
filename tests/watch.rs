//! Watch tests.

mod common;

use leasehold::EventType;
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Subscriptions
// ============================================================================

#[tokio::test]
async fn watch_prefix_sees_puts_and_deletes() {
    let (client, _) = common::memory_client();
    let mut watch = client.watch_prefix("svc/").await.unwrap();

    client.put("svc/a", "1").await.unwrap();
    client.put("elsewhere", "x").await.unwrap();
    client.delete("svc/a").await.unwrap();

    let put = watch.next().await.unwrap();
    assert_eq!(put.key, "svc/a");
    assert_eq!(put.value, "1");
    assert_eq!(put.event_type, EventType::Put);

    let delete = watch.next().await.unwrap();
    assert_eq!(delete.key, "svc/a");
    assert_eq!(delete.value, "");
    assert_eq!(delete.event_type, EventType::Delete);
}

#[tokio::test]
async fn watch_starts_from_now() {
    let (client, _) = common::memory_client();
    client.put("svc/old", "1").await.unwrap();

    let mut watch = client.watch_prefix("svc/").await.unwrap();
    client.put("svc/new", "2").await.unwrap();

    assert_eq!(watch.next().await.unwrap().key, "svc/new");
}

#[tokio::test(start_paused = true)]
async fn lease_expiry_is_observed_as_delete() {
    let (client, _) = common::memory_client();
    let token = client.lease_manager().grant(2).await.unwrap();
    client.put_with_lease("svc/ephemeral", "up", &token).await.unwrap();

    let mut watch = client.watch_prefix("svc/").await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    let event = watch.next().await.unwrap();
    assert_eq!(event.key, "svc/ephemeral");
    assert_eq!(event.event_type, EventType::Delete);
}

#[tokio::test]
async fn dropped_subscription_is_pruned() {
    let (client, store) = common::memory_client();

    let watch = client.watch_prefix("svc/").await.unwrap();
    assert_eq!(store.watch_count(), 1);
    drop(watch);

    client.put("svc/a", "1").await.unwrap();
    assert_eq!(store.watch_count(), 0);
}

// ============================================================================
// Three-channel fan-out
// ============================================================================

#[tokio::test]
async fn watch_prefix_into_fans_out_three_channels() {
    let (client, _) = common::memory_client();
    let (key_tx, mut keys) = mpsc::channel(8);
    let (value_tx, mut values) = mpsc::channel(8);
    let (type_tx, mut types) = mpsc::channel(8);

    let handle = client
        .watch_prefix_into("jobs/", key_tx, value_tx, type_tx)
        .await
        .unwrap();

    client.put("jobs/1", "queued").await.unwrap();
    client.delete("jobs/1").await.unwrap();

    assert_eq!(keys.recv().await.unwrap(), "jobs/1");
    assert_eq!(values.recv().await.unwrap(), "queued");
    assert_eq!(types.recv().await.unwrap(), "PUT");

    assert_eq!(keys.recv().await.unwrap(), "jobs/1");
    assert_eq!(values.recv().await.unwrap(), "");
    assert_eq!(types.recv().await.unwrap(), "DELETE");

    assert!(handle.is_active());
    handle.cancel().await;

    // Forwarding task has exited and released its senders.
    assert!(keys.recv().await.is_none());
}

#[tokio::test]
async fn watch_prefix_into_stops_when_a_receiver_drops() {
    let (client, _) = common::memory_client();
    let (key_tx, keys) = mpsc::channel(8);
    let (value_tx, _values) = mpsc::channel(8);
    let (type_tx, _types) = mpsc::channel(8);

    let handle = client
        .watch_prefix_into("jobs/", key_tx, value_tx, type_tx)
        .await
        .unwrap();
    drop(keys);

    client.put("jobs/1", "queued").await.unwrap();

    for _ in 0..10 {
        if !handle.is_active() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(!handle.is_active());
}
