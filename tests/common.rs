//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use leasehold::config::Config;
use leasehold::{Client, LockOptions, MemoryStore};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Create a minimal valid configuration file.
pub fn create_minimal_config() -> NamedTempFile {
    let config_content = r#"
[store]
endpoints = ["http://127.0.0.1:2379"]
"#;

    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(config_content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Configuration used by in-memory clients.
pub fn test_config() -> Config {
    let mut config = Config::with_endpoints(vec!["http://127.0.0.1:2379".to_string()]);
    config.registration.loss_backoff_ms = 100;
    config
}

/// A client over a fresh in-memory store, plus a handle on that store.
pub fn memory_client() -> (Client, MemoryStore) {
    let store = MemoryStore::new();
    let client = Client::with_store(Arc::new(store.clone()), test_config());
    (client, store)
}

/// Lock options with a short retry interval.
pub fn fast_lock_options(ttl_seconds: i64, max_attempts: u32) -> LockOptions {
    LockOptions {
        ttl_seconds,
        max_attempts,
        retry_interval: Duration::from_millis(50),
    }
}
