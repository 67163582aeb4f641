//! Distributed lock tests.

mod common;

use leasehold::{DistributedLock, LeaseholdError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Acquire / release
// ============================================================================

#[tokio::test]
async fn acquire_writes_decimal_lease_id() {
    let (client, _) = common::memory_client();
    let lock = client.lock();

    let token = lock.acquire("locks/job").await.unwrap();

    let entry = client.get_entry("locks/job").await.unwrap();
    assert_eq!(entry.value, token.id().to_string());
    assert_eq!(entry.lease, token.id());
    assert_eq!(lock.holder("locks/job").await.unwrap(), Some(token.id()));
}

#[tokio::test]
async fn release_makes_key_acquirable() {
    let (client, _) = common::memory_client();
    let lock = client.lock();

    lock.acquire("locks/job").await.unwrap();
    lock.release("locks/job").await.unwrap();

    assert!(client.get("locks/job").await.unwrap_err().is_not_found());
    assert_eq!(lock.holder("locks/job").await.unwrap(), None);
    assert!(lock.try_acquire("locks/job").await.unwrap().is_some());
}

#[tokio::test]
async fn try_acquire_reports_contention() {
    let (client, store) = common::memory_client();
    let lock = client.lock();

    let holder = lock.try_acquire("locks/job").await.unwrap().unwrap();
    assert!(lock.try_acquire("locks/job").await.unwrap().is_none());

    // The losing attempt's lease is cleaned up.
    assert_eq!(store.lease_count(), 1);
    assert_eq!(lock.holder("locks/job").await.unwrap(), Some(holder.id()));
}

#[tokio::test]
async fn release_absent_lock_is_not_held() {
    let (client, _) = common::memory_client();

    let err = client.lock().release("locks/none").await.unwrap_err();
    assert_eq!(
        err,
        LeaseholdError::LockNotHeld {
            key: "locks/none".to_string()
        }
    );
}

#[tokio::test]
async fn release_malformed_value_is_rejected() {
    let (client, _) = common::memory_client();
    client.put("locks/bad", "not-a-lease").await.unwrap();

    let err = client.lock().release("locks/bad").await.unwrap_err();
    assert_eq!(
        err,
        LeaseholdError::MalformedLockValue {
            key: "locks/bad".to_string(),
            value: "not-a-lease".to_string()
        }
    );
    assert_eq!(client.get("locks/bad").await.unwrap(), "not-a-lease");
}

#[tokio::test]
async fn release_unbound_value_is_rejected() {
    let (client, store) = common::memory_client();
    client.put("locks/stale", "999").await.unwrap();

    let err = client.lock().release("locks/stale").await.unwrap_err();
    assert_eq!(
        err,
        LeaseholdError::MalformedLockValue {
            key: "locks/stale".to_string(),
            value: "999".to_string()
        }
    );
    assert_eq!(client.get("locks/stale").await.unwrap(), "999");
    assert_eq!(store.lease_count(), 0);
}

#[tokio::test]
async fn release_value_naming_another_lease_is_rejected() {
    let (client, _) = common::memory_client();
    let leases = client.lease_manager();
    let bound = leases.grant(30).await.unwrap();
    let other = leases.grant(30).await.unwrap();
    client
        .put_with_lease("locks/job", &other.id().to_string(), &bound)
        .await
        .unwrap();

    let err = client.lock().release("locks/job").await.unwrap_err();
    assert!(matches!(err, LeaseholdError::MalformedLockValue { .. }));
    assert!(leases.time_to_live(&other).await.unwrap().is_some());
    assert!(leases.time_to_live(&bound).await.unwrap().is_some());
}

#[tokio::test]
async fn release_after_lease_expired_leaves_key_free() {
    let (client, store) = common::memory_client();
    let lock = client.lock();

    let token = lock.acquire("locks/job").await.unwrap();
    // Lease gone: the store already dropped the key, so there is nothing to release.
    assert!(store.expire_lease(token.id()));
    assert_eq!(
        lock.release("locks/job").await.unwrap_err(),
        LeaseholdError::LockNotHeld {
            key: "locks/job".to_string()
        }
    );
    assert!(lock.try_acquire("locks/job").await.unwrap().is_some());
}

#[tokio::test]
async fn non_utf8_lock_value_is_malformed() {
    let (client, store) = common::memory_client();
    leasehold::Store::put(&store, b"locks/bin".to_vec(), vec![b'1', 0xff], 0)
        .await
        .unwrap();

    let err = client.lock().holder("locks/bin").await.unwrap_err();
    assert_eq!(
        err,
        LeaseholdError::MalformedLockValue {
            key: "locks/bin".to_string(),
            value: "1\u{fffd}".to_string()
        }
    );
    assert!(matches!(
        client.lock().release("locks/bin").await.unwrap_err(),
        LeaseholdError::MalformedLockValue { .. }
    ));
}

// ============================================================================
// Retry behavior
// ============================================================================

#[tokio::test(start_paused = true)]
async fn exhausted_attempts_fail_lock_unavailable() {
    let (client, store) = common::memory_client();
    let options = common::fast_lock_options(60, 3);

    let lock = DistributedLock::new(client.clone()).with_options(options);
    lock.acquire("locks/job").await.unwrap();

    let started = tokio::time::Instant::now();
    let err = lock.acquire("locks/job").await.unwrap_err();
    assert_eq!(
        err,
        LeaseholdError::LockUnavailable {
            key: "locks/job".to_string(),
            attempts: 3
        }
    );
    // Two sleeps between three attempts.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(150), "{elapsed:?}");
    assert_eq!(store.lease_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_consume_attempts() {
    let (client, store) = common::memory_client();
    let lock = client.lock().with_options(common::fast_lock_options(60, 3));

    store.fail_next_requests(2);
    let token = lock.acquire("locks/job").await.unwrap();
    assert_eq!(lock.holder("locks/job").await.unwrap(), Some(token.id()));
}

#[tokio::test(start_paused = true)]
async fn transient_failures_can_exhaust_attempts() {
    let (client, store) = common::memory_client();
    let lock = client.lock().with_options(common::fast_lock_options(60, 2));

    store.fail_next_requests(10);
    let err = lock.acquire("locks/job").await.unwrap_err();
    assert!(matches!(err, LeaseholdError::LockUnavailable { attempts: 2, .. }));
}

#[tokio::test]
async fn non_positive_ttl_aborts_immediately() {
    let (client, _) = common::memory_client();
    let lock = client.lock().with_options(common::fast_lock_options(0, 5));

    let err = lock.acquire("locks/job").await.unwrap_err();
    assert!(matches!(err, LeaseholdError::LeaseGrantFailed { ttl_seconds: 0, .. }));
}

// ============================================================================
// Contention and expiry
// ============================================================================

#[tokio::test(start_paused = true)]
async fn loser_acquires_after_release() {
    let (client, _) = common::memory_client();
    let options = common::fast_lock_options(60, 100);
    let lock = client.lock().with_options(options);

    lock.acquire("locks/job").await.unwrap();

    let contender = {
        let lock = lock.clone();
        tokio::spawn(async move { lock.acquire("locks/job").await })
    };

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!contender.is_finished());

    lock.release("locks/job").await.unwrap();
    let token = contender.await.unwrap().unwrap();
    assert_eq!(lock.holder("locks/job").await.unwrap(), Some(token.id()));
}

#[tokio::test]
async fn concurrent_acquires_have_one_winner() {
    let (client, _) = common::memory_client();
    let winners = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let lock = client.lock();
        let winners = winners.clone();
        tasks.push(tokio::spawn(async move {
            if lock.try_acquire("locks/race").await.unwrap().is_some() {
                winners.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn unrenewed_lock_expires() {
    let (client, _) = common::memory_client();
    let lock = client.lock().with_options(common::fast_lock_options(2, 1));

    let first = lock.acquire("locks/job").await.unwrap();
    assert!(lock.try_acquire("locks/job").await.unwrap().is_none());

    tokio::time::sleep(Duration::from_secs(3)).await;

    let second = lock.acquire("locks/job").await.unwrap();
    assert_ne!(first.id(), second.id());
}
