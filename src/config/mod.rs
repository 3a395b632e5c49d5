//! Anomaly Detection Configuration Module
//!
//! Provides per-deployment configuration loaded from TOML files, replacing
//! hardcoded detection thresholds with operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `ANOMALY_CONFIG` environment variable (path to TOML file)
//! 2. `anomaly_config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(AnomalyConfig::load());
//!
//! // Anywhere in the codebase:
//! let threshold = config::get().tier1.max_requests_per_ip_in_window;
//! ```

mod anomaly_config;
pub mod defaults;
pub mod validation;

pub use anomaly_config::*;

use std::sync::OnceLock;

/// Global anomaly-detection configuration, initialized once at startup.
static ANOMALY_CONFIG: OnceLock<AnomalyConfig> = OnceLock::new();

/// Initialize the global configuration.
///
/// Must be called exactly once before any calls to `get()`.
pub fn init(config: AnomalyConfig) {
    if ANOMALY_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global configuration.
///
/// Panics if `init()` has not been called. This is by design — a missing
/// config is a fatal startup error, not a recoverable condition.
pub fn get() -> &'static AnomalyConfig {
    ANOMALY_CONFIG
        .get()
        .expect("config::get() called before config::init() — this is a startup bug")
}

/// Check whether the config has been initialized.
///
/// Useful for tests and optional config paths.
pub fn is_initialized() -> bool {
    ANOMALY_CONFIG.get().is_some()
}
