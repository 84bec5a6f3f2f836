//! Configuration module for the file watcher.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `FW_` and use double underscores
//! to separate nested levels:
//! - `FW_DISPATCHER__KEEP_ALIVE_MS=500` sets `dispatcher.keep_alive_ms`
//! - `FW_DISPATCHER__SHUTDOWN_TIMEOUT_SECS=3` sets `dispatcher.shutdown_timeout_secs`
//! - `FW_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = ".filewatch";
const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "FW_";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    /// Worker pool settings
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DispatcherConfig {
    /// Worker threads are named `<prefix>-<n>`
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,

    /// How long an idle worker waits for work before exiting
    #[serde(default = "default_keep_alive_ms")]
    pub keep_alive_ms: u64,

    /// Drain wait used by `WatcherRegistry::stop_register`
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for every module
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `filewatch::dispatcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_thread_name_prefix() -> String {
    "watcher-register".to_string()
}
fn default_keep_alive_ms() -> u64 {
    60_000
}
fn default_shutdown_timeout_secs() -> u64 {
    10
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            thread_name_prefix: default_thread_name_prefix(),
            keep_alive_ms: default_keep_alive_ms(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honouring `FW_` overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore (__) separates nested levels,
            // single underscore (_) stays part of the field name
            .merge(
                Env::prefixed(ENV_PREFIX)
                    .map(|key| key.as_str().to_lowercase().replace("__", ".").into()),
            )
            .extract()
            .map_err(Box::new)
    }

    /// Find the settings file by looking for a `.filewatch` directory
    /// from the current directory up to the root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(CONFIG_FILE));
            }
        }

        None
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Render as TOML, for display
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Create a default settings file under `.filewatch/` in the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.dispatcher.thread_name_prefix, "watcher-register");
        assert_eq!(settings.dispatcher.keep_alive_ms, 60_000);
        assert_eq!(settings.dispatcher.shutdown_timeout_secs, 10);
        assert_eq!(settings.logging.default, "warn");
        assert!(settings.logging.modules.is_empty());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
[dispatcher]
thread_name_prefix = "fw"
keep_alive_ms = 250
shutdown_timeout_secs = 3

[logging]
default = "info"

[logging.modules]
"filewatch::dispatcher" = "trace"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.dispatcher.thread_name_prefix, "fw");
        assert_eq!(settings.dispatcher.keep_alive_ms, 250);
        assert_eq!(settings.dispatcher.shutdown_timeout_secs, 3);
        assert_eq!(settings.logging.default, "info");
        assert_eq!(settings.logging.modules["filewatch::dispatcher"], "trace");
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
[dispatcher]
keep_alive_ms = 1000
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();

        // Modified value
        assert_eq!(settings.dispatcher.keep_alive_ms, 1000);

        // Default values should still be present
        assert_eq!(settings.dispatcher.thread_name_prefix, "watcher-register");
        assert_eq!(settings.dispatcher.shutdown_timeout_secs, 10);
        assert_eq!(settings.logging.default, "warn");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load_from(temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.dispatcher.keep_alive_ms, 60_000);
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.dispatcher.keep_alive_ms = 42;
        settings.logging.default = "debug".to_string();

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.dispatcher.keep_alive_ms, 42);
        assert_eq!(loaded.logging.default, "debug");
    }

    #[test]
    fn test_to_toml_has_sections() {
        let rendered = Settings::default().to_toml().unwrap();
        assert!(rendered.contains("[dispatcher]"));
        assert!(rendered.contains("[logging]"));
    }
}
