//! Configuration loading and config file resolution
//!
//! Bootstrap configuration lives in a small TOML file. Everything in it has a
//! built-in default, so a missing file never prevents startup.
//!
//! # Config File Resolution Priority
//!
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`VI_CONFIG`)
//! 3. Per-user config file (`<config_dir>/vi/config.toml`), if it exists
//! 4. Built-in defaults (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "VI_CONFIG";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Loop playback configuration
    pub playback: PlaybackConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Loop playback configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PlaybackConfig {
    /// Command play as soon as a validated item is installed
    #[serde(default)]
    pub autoplay: bool,

    /// Cadence of PlaybackProgress notices while playing
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Broadcast capacity of the notice EventBus
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Capacity of the loop service command channel
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            autoplay: false,
            progress_interval_ms: default_progress_interval_ms(),
            event_capacity: default_event_capacity(),
            command_capacity: default_command_capacity(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_progress_interval_ms() -> u64 {
    1000
}

fn default_event_capacity() -> usize {
    100
}

fn default_command_capacity() -> usize {
    32
}

impl TomlConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    ///
    /// Unlike [`TomlConfig::load_or_default`], a missing file is an error here.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Resolve the config file and load it, degrading to defaults
    ///
    /// A missing or unreadable file logs a warning and yields defaults.
    /// A file that exists but is malformed or invalid is an error.
    pub fn load_or_default(cli_arg: Option<&Path>) -> Result<Self> {
        let Some(path) = resolve_config_path(cli_arg, CONFIG_ENV_VAR) else {
            info!("No config file found, using built-in defaults");
            return Ok(Self::default());
        };

        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let config = Self::from_toml_str(&content).map_err(|e| {
                    Error::Config(format!("{}: {}", path.display(), e))
                })?;
                info!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) => {
                warn!(
                    "Config file {} could not be read ({}), using built-in defaults",
                    path.display(),
                    e
                );
                Ok(Self::default())
            }
        }
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        let level = self.logging.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(Error::Config(format!(
                "Invalid log level '{}' (expected one of: {})",
                self.logging.level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }
        if self.playback.progress_interval_ms == 0 {
            return Err(Error::Config(
                "playback.progress_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.playback.event_capacity == 0 {
            return Err(Error::Config(
                "playback.event_capacity must be greater than 0".to_string(),
            ));
        }
        if self.playback.command_capacity == 0 {
            return Err(Error::Config(
                "playback.command_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Config file resolution following the priority order in the module docs
///
/// Returns `None` when nothing was requested and no per-user file exists.
/// Explicit requests (CLI or environment) are returned even if the file does
/// not exist, so the caller can report it.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file
    default_config_file().filter(|path| path.exists())
}

/// Per-user config file location for the platform
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vi").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
        assert!(!config.playback.autoplay);
        assert_eq!(config.playback.progress_interval_ms, 1000);
        assert_eq!(config.playback.event_capacity, 100);
        assert_eq!(config.playback.command_capacity, 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            [playback]
            autoplay = true
            "#,
        )
        .unwrap();

        assert!(config.playback.autoplay);
        assert_eq!(config.playback.progress_interval_ms, 1000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let err = TomlConfig::from_toml_str(
            r#"
            [logging]
            level = "loud"
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("loud"));
    }

    #[test]
    fn test_log_level_case_insensitive() {
        let config = TomlConfig::from_toml_str(
            r#"
            [logging]
            level = "DEBUG"
            "#,
        );
        assert!(config.is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = TomlConfig::from_toml_str(
            r#"
            [playback]
            progress_interval_ms = 0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("progress_interval_ms"));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = TomlConfig::from_toml_str("[playback\nautoplay = ").unwrap_err();
        assert!(matches!(err, Error::TomlParse(_)));
    }

    #[test]
    fn test_cli_arg_wins() {
        let path = PathBuf::from("/tmp/vi-cli.toml");
        assert_eq!(
            resolve_config_path(Some(&path), "VI_CONFIG_UNIT_TEST_UNSET"),
            Some(path)
        );
    }
}
