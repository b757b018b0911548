//! Line Configuration Module
//!
//! Per-deployment configuration loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `RODLINE_CONFIG` environment variable (path to TOML file)
//! 2. `rodline.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! ```ignore
//! // In main():
//! config::init(LineConfig::load());
//!
//! // Anywhere in the binary:
//! let window = config::get().pipeline.window_size;
//! ```
//!
//! Library components take their settings as explicit arguments; only the
//! binary reads the global.

mod line_config;
pub mod defaults;

pub use line_config::*;

use std::sync::OnceLock;

/// Global line configuration, initialized once at startup.
static LINE_CONFIG: OnceLock<LineConfig> = OnceLock::new();

/// Initialize the global line configuration.
///
/// A second call is ignored with a warning.
pub fn init(config: LineConfig) {
    if LINE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get the global line configuration, falling back to defaults when
/// `init()` was never called.
pub fn get() -> &'static LineConfig {
    LINE_CONFIG.get_or_init(LineConfig::default)
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    LINE_CONFIG.get().is_some()
}
