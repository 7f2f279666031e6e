//! Logging utilities for the sentinel crates.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize tracing with sensible defaults.
///
/// Uses the RUST_LOG environment variable to control log levels.
/// Default level is INFO.
pub fn init() {
    init_with_level("info");
}

/// Initialize human-readable tracing, falling back to `default_level`
/// when RUST_LOG is unset. Safe to call more than once.
pub fn init_with_level(default_level: &str) {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter(default_level))
        .try_init();
}

/// Initialize tracing with JSON formatting (useful for structured logging).
pub fn init_json() {
    init_json_with_level("info");
}

/// JSON counterpart of [`init_with_level`].
pub fn init_json_with_level(default_level: &str) {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(filter(default_level))
        .try_init();
}
