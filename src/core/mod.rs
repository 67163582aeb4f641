//! Core client infrastructure.
//!
//! - [`config`] - Configuration parsing and validation
//! - [`error`] - Error taxonomy
//! - [`telemetry`] - Tracing subscriber setup

pub mod config;
pub mod error;
pub mod telemetry;
