//! Configuration management.
//!
//! # Load Order
//!
//! 1. Default values (compile-time)
//! 2. Global config (`<config_dir>/hwscript/config.toml`)
//! 3. Explicit config file (`--config PATH`)
//! 4. Environment variables (`HWS_*`)
//!
//! Command-line flags are applied by the binary on top of the result.

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use types::{
    BusConfig, DispatcherConfig, HwsConfig, LoggingConfig, RestartConfig, ScriptConfig,
    StateConfig, SupervisorConfig, APP_DIR,
};

use std::path::PathBuf;

/// Config file name inside the application config directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Returns the default global config path.
#[must_use]
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CONFIG_FILE)
}
