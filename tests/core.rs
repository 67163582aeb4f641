//! Core infrastructure tests.

mod common;

use leasehold::core::config::Config;
use leasehold::core::error::LeaseholdError;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

// ============================================================================
// Config tests
// ============================================================================

#[test]
fn parse_minimal_config() {
    let file = common::create_minimal_config();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.store.endpoints, vec!["http://127.0.0.1:2379"]);
    assert_eq!(config.store.request_timeout(), Duration::from_secs(10));
    assert_eq!(config.store.dial_timeout(), Duration::from_secs(10));
    assert_eq!(config.lock.ttl_seconds, 300);
    assert_eq!(config.registration.ttl_seconds, 10);
    assert_eq!(config.telemetry.log_level, "info");
}

#[test]
fn parse_full_config() {
    let config_content = r#"
[store]
endpoints = ["http://10.0.0.1:2379", "http://10.0.0.2:2379"]
dial_timeout_ms = 2000
request_timeout_ms = 3000

[lease]
revoke_timeout_ms = 1000

[lock]
ttl_seconds = 30
retry_interval_ms = 250
max_attempts = 20

[registration]
ttl_seconds = 5
loss_backoff_ms = 500
failure_channel_capacity = 4

[telemetry]
log_level = "debug"
"#;

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(config_content.as_bytes()).unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.store.endpoints.len(), 2);
    assert_eq!(config.store.request_timeout(), Duration::from_secs(3));
    assert_eq!(config.lease.revoke_timeout(), Duration::from_secs(1));
    assert_eq!(config.lock.retry_interval(), Duration::from_millis(250));
    assert_eq!(config.lock.max_attempts, 20);
    assert_eq!(config.registration.loss_backoff(), Duration::from_millis(500));
    assert_eq!(config.registration.failure_channel_capacity, 4);
}

#[test]
fn validate_empty_endpoints() {
    let result = Config::from_toml("[store]\nendpoints = []\n");
    assert!(result.unwrap_err().to_string().contains("endpoints"));
}

#[test]
fn validate_endpoint_scheme() {
    let result = Config::from_toml("[store]\nendpoints = [\"127.0.0.1:2379\"]\n");
    assert!(result.unwrap_err().to_string().contains("http://"));
}

#[test]
fn validate_lock_settings() {
    let result = Config::from_toml(
        r#"
[store]
endpoints = ["http://127.0.0.1:2379"]

[lock]
max_attempts = 0
"#,
    );
    assert!(result.unwrap_err().to_string().contains("max_attempts"));

    let result = Config::from_toml(
        r#"
[store]
endpoints = ["http://127.0.0.1:2379"]

[lock]
ttl_seconds = -1
"#,
    );
    assert!(result.unwrap_err().to_string().contains("ttl_seconds"));
}

#[test]
fn validate_tls_pairing() {
    let result = Config::from_toml(
        r#"
[store]
endpoints = ["https://etcd:2379"]

[store.tls]
cert_path = "client.pem"
"#,
    );
    assert!(result.unwrap_err().to_string().contains("key_path"));

    let config = Config::from_toml(
        r#"
[store]
endpoints = ["https://etcd:2379"]

[store.tls]
ca_path = "ca.pem"
domain_name = "etcd.local"
"#,
    )
    .unwrap();
    let tls = config.store.tls.unwrap();
    assert_eq!(tls.domain_name.as_deref(), Some("etcd.local"));
}

#[test]
fn validate_tls_requires_https_endpoints() {
    let result = Config::from_toml(
        r#"
[store]
endpoints = ["https://etcd-1:2379", "http://etcd-2:2379"]

[store.tls]
ca_path = "ca.pem"
cert_path = "client.pem"
key_path = "client-key.pem"
"#,
    );
    let message = result.unwrap_err().to_string();
    assert!(message.contains("https://"), "{message}");
    assert!(message.contains("http://etcd-2:2379"), "{message}");
}

#[test]
fn validate_log_level() {
    let result = Config::from_toml(
        r#"
[store]
endpoints = ["http://127.0.0.1:2379"]

[telemetry]
log_level = "verbose"
"#,
    );
    assert!(result.unwrap_err().to_string().contains("log_level"));
}

#[test]
fn missing_config_file() {
    let result = Config::from_file(std::path::Path::new("/nonexistent/leasehold.toml"));
    assert!(result.unwrap_err().to_string().contains("failed to read"));
}

// ============================================================================
// Error tests
// ============================================================================

#[test]
fn error_display() {
    let err = LeaseholdError::LockUnavailable {
        key: "locks/job".to_string(),
        attempts: 600,
    };
    assert_eq!(err.to_string(), "lock locks/job unavailable after 600 attempts");

    let err = LeaseholdError::RegistrationLost {
        key: "svc/a".to_string(),
        lease_id: 42,
    };
    assert_eq!(err.to_string(), "registration svc/a lost (lease 42)");

    let err = LeaseholdError::DeadlineExceeded {
        operation: "range",
        timeout_ms: 10_000,
    };
    assert_eq!(err.to_string(), "range exceeded deadline of 10000ms");
}

#[test]
fn error_classification() {
    assert!(LeaseholdError::unavailable("put", "refused").is_retriable());
    assert!(!LeaseholdError::rejected("put", "permission denied").is_retriable());
    assert!(LeaseholdError::key_not_found("a").is_not_found());
    assert!(LeaseholdError::LockNotHeld { key: "l".into() }.is_not_found());
    assert!(!LeaseholdError::AmbiguousKey {
        key: "a".into(),
        count: 2
    }
    .is_not_found());
}

// ============================================================================
// Telemetry tests
// ============================================================================

#[cfg(feature = "telemetry")]
#[test]
fn init_tracing_is_idempotent() {
    let config = leasehold::config::TelemetryConfig::default();
    let _ = leasehold::telemetry::init_tracing(&config);
    assert!(!leasehold::telemetry::init_tracing(&config));
}
