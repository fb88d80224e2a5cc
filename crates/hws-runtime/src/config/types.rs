//! Configuration types.
//!
//! All types implement [`Default`] so a missing file, or a file that only
//! sets a handful of keys, still produces a complete configuration.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Application directory name under the platform config/data dirs.
pub const APP_DIR: &str = "hwscript";

/// Main configuration structure.
///
/// # Example
///
/// ```
/// use hws_runtime::config::HwsConfig;
///
/// let config = HwsConfig::default();
/// assert_eq!(config.supervisor.freeze_threshold_ms, 2000);
/// assert_eq!(config.dispatcher.poll_interval_ms, 1000);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HwsConfig {
    /// Enable debug logging.
    pub debug: bool,

    /// Script location and module search paths.
    pub script: ScriptConfig,

    /// Script supervisor timing and restart policy.
    pub supervisor: SupervisorConfig,

    /// Primary dispatcher loop.
    pub dispatcher: DispatcherConfig,

    /// Publish/subscribe transport.
    pub bus: BusConfig,

    /// Persisted script state.
    pub state: StateConfig,

    /// Log output.
    pub logging: LoggingConfig,
}

impl HwsConfig {
    /// Serializes to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Deserializes from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if the text is not valid TOML for this schema.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Merges another config into this one.
    ///
    /// A value from `other` wins only where it differs from the default,
    /// so a sparse file layered on top of a full one keeps the full values.
    pub fn merge(&mut self, other: &Self) {
        if other.debug {
            self.debug = true;
        }
        self.script.merge(&other.script);
        self.supervisor.merge(&other.supervisor);
        self.dispatcher.merge(&other.dispatcher);
        self.bus.merge(&other.bus);
        self.state.merge(&other.state);
        self.logging.merge(&other.logging);
    }
}

/// Copies `$field` from `$other` into `$self` when it differs from `$default`.
macro_rules! merge_field {
    ($self:ident, $other:ident, $default:ident, $($field:ident).+) => {
        if $other.$($field).+ != $default.$($field).+ {
            $self.$($field).+ = $other.$($field).+.clone();
        }
    };
}

/// Script location.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScriptConfig {
    /// Script entry file. Defaults to `<config_dir>/hwscript/script.lua`.
    pub path: Option<PathBuf>,

    /// Extra `require()` roots, searched after the script's own directory.
    pub search_paths: Vec<PathBuf>,
}

impl ScriptConfig {
    fn merge(&mut self, other: &Self) {
        if other.path.is_some() {
            self.path.clone_from(&other.path);
        }
        if !other.search_paths.is_empty() {
            self.search_paths.clone_from(&other.search_paths);
        }
    }

    /// Returns the configured script path or the per-user default.
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("script.lua")
        })
    }
}

/// Supervisor timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SupervisorConfig {
    /// A busy script thread whose heartbeat is older than this is frozen.
    pub freeze_threshold_ms: u64,

    /// How long `stop()` waits for a cooperative exit before cancelling.
    pub stop_grace_ms: u64,

    /// How long a cancelled thread may take to unwind before it is abandoned.
    pub cancel_grace_ms: u64,

    /// VM instructions between cancellation checks inside a tick.
    pub hook_instruction_interval: u32,

    /// Freeze restart budget.
    pub restart: RestartConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            freeze_threshold_ms: 2000,
            stop_grace_ms: 2000,
            cancel_grace_ms: 5000,
            hook_instruction_interval: 1000,
            restart: RestartConfig::default(),
        }
    }
}

impl SupervisorConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();
        merge_field!(self, other, default, freeze_threshold_ms);
        merge_field!(self, other, default, stop_grace_ms);
        merge_field!(self, other, default, cancel_grace_ms);
        merge_field!(self, other, default, hook_instruction_interval);
        merge_field!(self, other, default, restart);
    }

    #[must_use]
    pub fn freeze_threshold(&self) -> Duration {
        Duration::from_millis(self.freeze_threshold_ms)
    }

    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    #[must_use]
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

/// Sliding-window cap on freeze-triggered restarts.
///
/// `max_restarts = 0` disables the cap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RestartConfig {
    pub max_restarts: u32,
    pub window_secs: u64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            max_restarts: 10,
            window_secs: 60,
        }
    }
}

/// Primary dispatcher loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Upper bound on how long the loop sleeps between liveness checks.
    pub poll_interval_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

impl DispatcherConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();
        merge_field!(self, other, default, poll_interval_ms);
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Publish/subscribe transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BusConfig {
    /// Start the WebSocket server.
    pub enabled: bool,

    /// Listen address.
    pub bind: SocketAddr,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: SocketAddr::from(([127, 0, 0, 1], 9081)),
        }
    }
}

impl BusConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();
        merge_field!(self, other, default, enabled);
        merge_field!(self, other, default, bind);
    }
}

/// Persisted script state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StateConfig {
    /// State file. Defaults to `<data_dir>/hwscript/state.json`.
    pub file: Option<PathBuf>,
}

impl StateConfig {
    fn merge(&mut self, other: &Self) {
        if other.file.is_some() {
            self.file.clone_from(&other.file);
        }
    }

    #[must_use]
    pub fn resolved_file(&self) -> PathBuf {
        self.file.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("state.json")
        })
    }
}

/// Log output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also append logs to `<dir>/hwscript.log`.
    pub file: bool,

    /// Log directory. Defaults to `<data_dir>/hwscript/logs`.
    pub dir: Option<PathBuf>,

    /// `EnvFilter` directive for the file layer.
    pub file_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: false,
            dir: None,
            file_level: "debug".to_string(),
        }
    }
}

impl LoggingConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();
        merge_field!(self, other, default, file);
        merge_field!(self, other, default, file_level);
        if other.dir.is_some() {
            self.dir.clone_from(&other.dir);
        }
    }

    #[must_use]
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("logs")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = HwsConfig::default();
        assert_eq!(config.supervisor.freeze_threshold(), Duration::from_secs(2));
        assert_eq!(config.dispatcher.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.bus.bind.port(), 9081);
        assert!(config.bus.enabled);
        assert_eq!(config.supervisor.restart.max_restarts, 10);
    }

    #[test]
    fn sparse_toml_fills_defaults() {
        let config = HwsConfig::from_toml(
            r#"
[supervisor]
freeze_threshold_ms = 500
"#,
        )
        .unwrap();

        assert_eq!(config.supervisor.freeze_threshold_ms, 500);
        assert_eq!(config.supervisor.stop_grace_ms, 2000);
        assert_eq!(config.bus, BusConfig::default());
    }

    #[test]
    fn toml_roundtrip() {
        let mut config = HwsConfig::default();
        config.script.path = Some(PathBuf::from("/tmp/script.lua"));
        config.bus.enabled = false;

        let text = config.to_toml().unwrap();
        assert_eq!(HwsConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn merge_keeps_base_where_overlay_is_default() {
        let mut base = HwsConfig::default();
        base.supervisor.freeze_threshold_ms = 900;
        base.bus.bind = "0.0.0.0:7000".parse().unwrap();

        let mut overlay = HwsConfig::default();
        overlay.dispatcher.poll_interval_ms = 250;

        base.merge(&overlay);
        assert_eq!(base.supervisor.freeze_threshold_ms, 900);
        assert_eq!(base.bus.bind.port(), 7000);
        assert_eq!(base.dispatcher.poll_interval_ms, 250);
    }

    #[test]
    fn resolved_paths_end_in_app_dir() {
        let config = HwsConfig::default();
        assert!(config.script.resolved_path().ends_with("hwscript/script.lua"));
        assert!(config.state.resolved_file().ends_with("hwscript/state.json"));
    }
}
