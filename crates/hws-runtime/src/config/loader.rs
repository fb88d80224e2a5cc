//! Configuration loader with hierarchical merging.
//!
//! Each layer overrides the previous one. Missing files are skipped; files
//! that exist but do not parse are errors.

use super::{default_config_path, ConfigError, HwsConfig};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Helper macro for parsing typed environment variables.
macro_rules! parse_env {
    ($field:expr, $var:literal, $parse:expr, $expected:literal) => {
        if let Ok(val) = std::env::var($var) {
            $field = $parse(val.as_str()).ok_or_else(|| ConfigError::invalid_env_var($var, $expected))?;
        }
    };
}

/// Configuration loader with builder pattern.
///
/// # Example
///
/// ```ignore
/// use hws_runtime::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_config_file("/etc/hwscript.toml")
///     .skip_env_vars()  // For testing
///     .load()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    /// Global config file path (defaults to `<config_dir>/hwscript/config.toml`).
    global_config_path: Option<PathBuf>,

    /// Explicit config file, layered after the global one.
    config_file: Option<PathBuf>,

    /// Skip environment variable loading.
    skip_env: bool,

    /// Skip global config loading.
    skip_global: bool,
}

impl ConfigLoader {
    /// Creates a new loader with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a custom global config path.
    #[must_use]
    pub fn with_global_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Sets an explicit config file.
    #[must_use]
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Skips environment variable loading.
    ///
    /// Useful for testing with deterministic config.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Skips global config loading.
    #[must_use]
    pub fn skip_global_config(mut self) -> Self {
        self.skip_global = true;
        self
    }

    /// Loads and merges configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any config file exists but cannot be read or
    /// parsed, or if an `HWS_*` variable holds an invalid value.
    pub fn load(&self) -> Result<HwsConfig, ConfigError> {
        let mut config = HwsConfig::default();

        if !self.skip_global {
            let global_path = self
                .global_config_path
                .clone()
                .unwrap_or_else(default_config_path);

            if let Some(global_config) = Self::load_file(&global_path)? {
                debug!(path = %global_path.display(), "Loaded global config");
                config.merge(&global_config);
            }
        }

        if let Some(ref path) = self.config_file {
            match Self::load_file(path)? {
                Some(file_config) => {
                    debug!(path = %path.display(), "Loaded config file");
                    config.merge(&file_config);
                }
                None => {
                    return Err(ConfigError::read_file(
                        path,
                        std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
                    ));
                }
            }
        }

        if !self.skip_env {
            Self::apply_env_vars(&mut config)?;
        }

        Ok(config)
    }

    /// Loads a config file, returning None if it doesn't exist.
    fn load_file(path: &Path) -> Result<Option<HwsConfig>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

        let config =
            HwsConfig::from_toml(&content).map_err(|e| ConfigError::parse_toml(path, e))?;

        Ok(Some(config))
    }

    /// Applies environment variable overrides.
    fn apply_env_vars(config: &mut HwsConfig) -> Result<(), ConfigError> {
        parse_env!(config.debug, "HWS_DEBUG", parse_bool, "expected bool");
        parse_env!(config.bus.enabled, "HWS_BUS_ENABLED", parse_bool, "expected bool");
        parse_env!(config.logging.file, "HWS_LOG_FILE", parse_bool, "expected bool");
        parse_env!(
            config.bus.bind,
            "HWS_BUS_BIND",
            |s: &str| s.parse::<std::net::SocketAddr>().ok(),
            "expected socket address"
        );
        parse_env!(
            config.supervisor.freeze_threshold_ms,
            "HWS_FREEZE_THRESHOLD_MS",
            |s: &str| s.parse::<u64>().ok(),
            "expected milliseconds"
        );

        if let Ok(val) = std::env::var("HWS_SCRIPT") {
            config.script.path = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("HWS_STATE_FILE") {
            config.state.file = Some(PathBuf::from(val));
        }

        Ok(())
    }
}

/// Parses a boolean from string.
///
/// Accepts: "true", "false", "1", "0", "yes", "no", "on", "off" (case-insensitive).
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn load_defaults_only() {
        let config = ConfigLoader::new()
            .skip_global_config()
            .skip_env_vars()
            .load()
            .unwrap();

        assert_eq!(config, HwsConfig::default());
    }

    #[test]
    fn load_global_config() {
        let temp = TempDir::new().unwrap();
        let path = create_config_file(
            temp.path(),
            "config.toml",
            r#"
debug = true

[bus]
bind = "127.0.0.1:9500"
"#,
        );

        let config = ConfigLoader::new()
            .with_global_config(&path)
            .skip_env_vars()
            .load()
            .unwrap();

        assert!(config.debug);
        assert_eq!(config.bus.bind.port(), 9500);
    }

    #[test]
    fn explicit_file_overrides_global() {
        let temp = TempDir::new().unwrap();
        let global = create_config_file(
            temp.path(),
            "global.toml",
            r#"
[supervisor]
freeze_threshold_ms = 3000
stop_grace_ms = 100
"#,
        );
        let explicit = create_config_file(
            temp.path(),
            "explicit.toml",
            r#"
[supervisor]
freeze_threshold_ms = 1500
"#,
        );

        let config = ConfigLoader::new()
            .with_global_config(&global)
            .with_config_file(&explicit)
            .skip_env_vars()
            .load()
            .unwrap();

        assert_eq!(config.supervisor.freeze_threshold_ms, 1500);
        assert_eq!(config.supervisor.stop_grace_ms, 100);
    }

    #[test]
    fn missing_global_is_ignored() {
        let config = ConfigLoader::new()
            .with_global_config("/nonexistent/path/config.toml")
            .skip_env_vars()
            .load()
            .unwrap();

        assert_eq!(config, HwsConfig::default());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result = ConfigLoader::new()
            .skip_global_config()
            .with_config_file("/nonexistent/explicit.toml")
            .skip_env_vars()
            .load();

        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = create_config_file(temp.path(), "bad.toml", "[bus\nbind = ");

        let result = ConfigLoader::new()
            .with_global_config(&path)
            .skip_env_vars()
            .load();

        assert!(matches!(result, Err(ConfigError::ParseToml { .. })));
    }

    #[test]
    fn parse_bool_values() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("Off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn env_var_override() {
        // This test modifies env vars, run in isolation
        std::env::set_var("HWS_BUS_BIND", "127.0.0.1:9999");
        std::env::set_var("HWS_SCRIPT", "/opt/fan.lua");

        let config = ConfigLoader::new().skip_global_config().load().unwrap();

        assert_eq!(config.bus.bind.port(), 9999);
        assert_eq!(config.script.path, Some(PathBuf::from("/opt/fan.lua")));

        std::env::remove_var("HWS_BUS_BIND");
        std::env::remove_var("HWS_SCRIPT");
    }
}
