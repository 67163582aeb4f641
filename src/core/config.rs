//! Configuration parsing and validation.
//!
//! Client configuration is loaded from TOML. Every section except `[store]` is
//! optional and falls back to the defaults below.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Store connection settings.
    pub store: StoreConfig,

    /// Lease manager settings.
    #[serde(default)]
    pub lease: LeaseConfig,

    /// Distributed lock defaults.
    #[serde(default)]
    pub lock: LockConfig,

    /// Liveness registration defaults.
    #[serde(default)]
    pub registration: RegistrationConfig,

    /// Logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Store connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store endpoints, e.g. `http://127.0.0.1:2379`.
    pub endpoints: Vec<String>,

    /// Connection establishment timeout in milliseconds.
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,

    /// Per-request deadline in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Optional transport security material.
    #[serde(default)]
    pub tls: Option<StoreTlsConfig>,
}

/// TLS material for the store connection, as file paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreTlsConfig {
    /// Client certificate chain (PEM).
    pub cert_path: Option<String>,

    /// Client private key (PEM).
    pub key_path: Option<String>,

    /// CA bundle used to verify the store (PEM).
    pub ca_path: Option<String>,

    /// Server name override for certificate verification.
    pub domain_name: Option<String>,
}

/// Lease manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// Upper bound on a best-effort revoke, in milliseconds.
    #[serde(default = "default_revoke_timeout_ms")]
    pub revoke_timeout_ms: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            revoke_timeout_ms: default_revoke_timeout_ms(),
        }
    }
}

/// Distributed lock defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Lease TTL bound to the lock key, in seconds.
    #[serde(default = "default_lock_ttl_seconds")]
    pub ttl_seconds: i64,

    /// Fixed delay between acquisition attempts, in milliseconds.
    #[serde(default = "default_lock_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Maximum acquisition attempts.
    #[serde(default = "default_lock_max_attempts")]
    pub max_attempts: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_lock_ttl_seconds(),
            retry_interval_ms: default_lock_retry_interval_ms(),
            max_attempts: default_lock_max_attempts(),
        }
    }
}

/// Liveness registration defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Lease TTL for registrations, in seconds.
    #[serde(default = "default_registration_ttl_seconds")]
    pub ttl_seconds: i64,

    /// Delay between detecting a loss and reporting it, in milliseconds.
    #[serde(default = "default_loss_backoff_ms")]
    pub loss_backoff_ms: u64,

    /// Capacity of channels built by `Registrar::failure_channel`.
    #[serde(default = "default_failure_channel_capacity")]
    pub failure_channel_capacity: usize,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_registration_ttl_seconds(),
            loss_backoff_ms: default_loss_backoff_ms(),
            failure_channel_capacity: default_failure_channel_capacity(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// Default value functions

fn default_dial_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_revoke_timeout_ms() -> u64 {
    5_000
}

fn default_lock_ttl_seconds() -> i64 {
    300
}

fn default_lock_retry_interval_ms() -> u64 {
    1_000
}

fn default_lock_max_attempts() -> u32 {
    600
}

fn default_registration_ttl_seconds() -> i64 {
    10
}

fn default_loss_backoff_ms() -> u64 {
    1_000
}

fn default_failure_channel_capacity() -> usize {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

impl StoreConfig {
    /// Create a store config for the given endpoints with default timeouts.
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints,
            dial_timeout_ms: default_dial_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            tls: None,
        }
    }

    /// Connection establishment timeout.
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    /// Per-request deadline.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Whether any endpoint uses the `https` scheme.
    pub fn uses_https(&self) -> bool {
        self.endpoints.iter().any(|e| e.starts_with("https://"))
    }
}

impl LeaseConfig {
    /// Revoke timeout as a Duration.
    pub fn revoke_timeout(&self) -> Duration {
        Duration::from_millis(self.revoke_timeout_ms)
    }
}

impl LockConfig {
    /// Retry interval as a Duration.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl RegistrationConfig {
    /// Loss backoff as a Duration.
    pub fn loss_backoff(&self) -> Duration {
        Duration::from_millis(self.loss_backoff_ms)
    }
}

impl Config {
    /// Create a configuration for the given endpoints with every other value defaulted.
    pub fn with_endpoints(endpoints: Vec<String>) -> Self {
        Self {
            store: StoreConfig::new(endpoints),
            lease: LeaseConfig::default(),
            lock: LockConfig::default(),
            registration: RegistrationConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_store()?;
        self.validate_lock()?;
        self.validate_registration()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_store(&self) -> Result<()> {
        if self.store.endpoints.is_empty() {
            anyhow::bail!("store.endpoints must not be empty");
        }

        for endpoint in &self.store.endpoints {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                anyhow::bail!(
                    "store.endpoints entries must start with http:// or https://, got: {}",
                    endpoint
                );
            }
        }

        if self.store.dial_timeout_ms == 0 {
            anyhow::bail!("store.dial_timeout_ms must be > 0");
        }
        if self.store.request_timeout_ms == 0 {
            anyhow::bail!("store.request_timeout_ms must be > 0");
        }
        if self.lease.revoke_timeout_ms == 0 {
            anyhow::bail!("lease.revoke_timeout_ms must be > 0");
        }

        match &self.store.tls {
            Some(tls) => {
                // tonic only negotiates TLS for https URIs.
                let plain = self.store.endpoints.iter().find(|e| e.starts_with("http://"));
                if let Some(endpoint) = plain {
                    anyhow::bail!("store.tls requires https:// endpoints, got: {}", endpoint);
                }
                self.validate_tls(tls)?
            }
            None if self.store.uses_https() => {
                anyhow::bail!("https endpoints require a [store.tls] section");
            }
            None => {}
        }

        Ok(())
    }

    fn validate_tls(&self, tls: &StoreTlsConfig) -> Result<()> {
        // Identity is all-or-nothing
        match (&tls.cert_path, &tls.key_path) {
            (Some(_), None) => {
                anyhow::bail!("store.tls.key_path required when cert_path is set");
            }
            (None, Some(_)) => {
                anyhow::bail!("store.tls.cert_path required when key_path is set");
            }
            _ => {}
        }

        if tls.cert_path.is_none() && tls.ca_path.is_none() {
            anyhow::bail!("store.tls requires ca_path, or cert_path and key_path");
        }

        Ok(())
    }

    fn validate_lock(&self) -> Result<()> {
        if self.lock.ttl_seconds <= 0 {
            anyhow::bail!("lock.ttl_seconds must be > 0");
        }
        if self.lock.max_attempts == 0 {
            anyhow::bail!("lock.max_attempts must be > 0");
        }
        Ok(())
    }

    fn validate_registration(&self) -> Result<()> {
        if self.registration.ttl_seconds <= 0 {
            anyhow::bail!("registration.ttl_seconds must be > 0");
        }
        if self.registration.failure_channel_capacity == 0 {
            anyhow::bail!("registration.failure_channel_capacity must be > 0");
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}
