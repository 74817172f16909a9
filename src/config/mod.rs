//! Configuration module for the scenario engine
//!
//! Engine settings live in a TOML file with two sections:
//!
//! ```toml
//! [logging]
//! filter = "info,scenario_engine=debug"
//! directory = "/var/log/scenario-engine"   # optional file log
//!
//! [runner]
//! completion_poll_ms = 10
//! stop_grace_ms = 2000
//! max_steps = 0                            # 0 = unlimited
//! ```
//!
//! # Config Location
//!
//! `EngineConfig::load_or_default()` reads `engine.toml` from the
//! platform-appropriate config directory:
//! - **Linux**: `~/.config/dev.scenario-engine/`
//! - **macOS**: `~/Library/Application Support/dev.scenario-engine/`
//! - **Windows**: `%APPDATA%\dev.scenario-engine\`

use crate::error::{Result, ScenarioError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "dev.scenario-engine";

/// Engine config filename
pub const CONFIG_FILE: &str = "engine.toml";

/// Default tracing filter when neither RUST_LOG nor the config sets one
pub const DEFAULT_LOG_FILTER: &str = "info,scenario_engine=debug";

/// Default interval between cancellation checks while a block runs
pub const DEFAULT_COMPLETION_POLL_MS: u64 = 10;

/// Default time a stopped block gets to acknowledge
pub const DEFAULT_STOP_GRACE_MS: u64 = 2000;

/// Get the engine config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the engine config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Logging ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when RUST_LOG is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Directory for a daily-rolling log file; stderr only when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            directory: None,
        }
    }
}

// ==================== Runner ====================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerSettings {
    #[serde(default = "default_completion_poll_ms")]
    pub completion_poll_ms: u64,

    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,

    /// Abort after this many block steps; 0 disables the limit
    #[serde(default)]
    pub max_steps: u64,
}

fn default_completion_poll_ms() -> u64 {
    DEFAULT_COMPLETION_POLL_MS
}

fn default_stop_grace_ms() -> u64 {
    DEFAULT_STOP_GRACE_MS
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            completion_poll_ms: DEFAULT_COMPLETION_POLL_MS,
            stop_grace_ms: DEFAULT_STOP_GRACE_MS,
            max_steps: 0,
        }
    }
}

impl RunnerSettings {
    pub fn completion_poll(&self) -> Duration {
        Duration::from_millis(self.completion_poll_ms.max(1))
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn step_limit(&self) -> Option<u64> {
        (self.max_steps > 0).then_some(self.max_steps)
    }
}

// ==================== Engine Config ====================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub runner: RunnerSettings,
}

impl EngineConfig {
    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScenarioError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            ScenarioError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    /// Load from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = config_path() else {
            tracing::warn!("Could not determine config directory, using defaults");
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load engine config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ScenarioError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| {
            ScenarioError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.logging.filter, DEFAULT_LOG_FILTER);
        assert_eq!(config.runner.completion_poll(), Duration::from_millis(10));
        assert_eq!(config.runner.stop_grace(), Duration::from_secs(2));
        assert_eq!(config.runner.step_limit(), None);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: EngineConfig = toml::from_str("[runner]\nmax_steps = 500\n").unwrap();
        assert_eq!(config.runner.step_limit(), Some(500));
        assert_eq!(config.runner.stop_grace_ms, DEFAULT_STOP_GRACE_MS);
        assert_eq!(config.logging, LoggingSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = EngineConfig::default();
        config.logging.directory = Some(dir.path().join("logs"));
        config.runner.completion_poll_ms = 5;
        config.save(&path).unwrap();

        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_bad_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[runner]\nmax_steps = \"lots\"\n").unwrap();
        assert!(matches!(
            EngineConfig::load(&path),
            Err(ScenarioError::Config(_))
        ));
    }
}
