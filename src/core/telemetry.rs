//! Tracing subscriber setup.
//!
//! The library itself only emits `tracing` events. Binaries and tests that want
//! them printed call [`init_tracing`] once at startup.

use crate::core::config::TelemetryConfig;

/// Install a global fmt subscriber filtered by `RUST_LOG`, falling back to the
/// configured log level.
///
/// Returns false if a global subscriber was already installed.
#[cfg(feature = "telemetry")]
pub fn init_tracing(config: &TelemetryConfig) -> bool {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .is_ok()
}

#[cfg(not(feature = "telemetry"))]
pub fn init_tracing(_config: &TelemetryConfig) -> bool {
    false
}
