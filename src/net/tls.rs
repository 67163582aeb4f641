//! TLS material for the store connection.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Client TLS Configuration                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │   StoreTlsConfig   - File paths from [store.tls]            │
//! │   ClientTlsMaterial - Loaded PEM bytes                      │
//! │   ClientTlsConfig  - tonic transport config (feature etcd)  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::core::config::StoreTlsConfig;
use anyhow::{Context, Result};
use std::path::Path;

/// PEM material read from disk.
#[derive(Clone)]
pub struct ClientTlsMaterial {
    /// Client certificate chain and key, when mutual TLS is configured.
    pub identity: Option<(Vec<u8>, Vec<u8>)>,
    /// CA bundle used to verify the store.
    pub ca: Option<Vec<u8>>,
    /// Server name override.
    pub domain_name: Option<String>,
}

impl std::fmt::Debug for ClientTlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientTlsMaterial")
            .field("identity", &self.identity.is_some())
            .field("ca", &self.ca.is_some())
            .field("domain_name", &self.domain_name)
            .finish()
    }
}

impl ClientTlsMaterial {
    /// Read every configured file.
    pub fn load(config: &StoreTlsConfig) -> Result<Self> {
        let identity = match (&config.cert_path, &config.key_path) {
            (Some(cert), Some(key)) => Some((
                read_pem(cert, "client certificate")?,
                read_pem(key, "client key")?,
            )),
            (None, None) => None,
            _ => anyhow::bail!("TLS cert_path and key_path must be set together"),
        };

        let ca = config
            .ca_path
            .as_deref()
            .map(|path| read_pem(path, "CA bundle"))
            .transpose()?;

        Ok(Self {
            identity,
            ca,
            domain_name: config.domain_name.clone(),
        })
    }

    /// Build the tonic transport config.
    #[cfg(feature = "etcd")]
    pub fn to_client_config(&self) -> tonic::transport::ClientTlsConfig {
        use tonic::transport::{Certificate, ClientTlsConfig, Identity};

        let mut tls = ClientTlsConfig::new();
        if let Some(ca) = &self.ca {
            tls = tls.ca_certificate(Certificate::from_pem(ca));
        }
        if let Some((cert, key)) = &self.identity {
            tls = tls.identity(Identity::from_pem(cert, key));
        }
        if let Some(domain) = &self.domain_name {
            tls = tls.domain_name(domain.clone());
        }
        tls
    }
}

fn read_pem(path: &str, what: &str) -> Result<Vec<u8>> {
    if !Path::new(path).exists() {
        anyhow::bail!("TLS {} not found: {}", what, path);
    }
    let data = std::fs::read(path).with_context(|| format!("failed to read {}: {}", what, path))?;
    if !data.starts_with(b"-----BEGIN") {
        anyhow::bail!("TLS {} is not PEM encoded: {}", what, path);
    }
    Ok(data)
}
