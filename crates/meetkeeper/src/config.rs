//! Configuration management for meetkeeper.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "meetkeeper";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "meetings.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `MEETKEEPER_`, `__` between levels)
/// 2. TOML config file at `~/.config/meetkeeper/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Auto-save configuration.
    pub autosave: AutoSaveConfig,
    /// Task extraction configuration.
    pub extraction: ExtractionConfig,
    /// Notes file watching configuration.
    pub watch: WatchConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/meetkeeper/meetings.db`
    pub database_path: Option<PathBuf>,
}

/// Auto-save coordinator configuration.
///
/// `interval_ms` is both the periodic save cadence and the debounce delay
/// applied to bursts of edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    /// Save interval in milliseconds.
    pub interval_ms: u64,
    /// Whether automatic saves run at all. Manual saves work either way.
    pub enabled: bool,
}

/// Task extraction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Run extraction after notes are saved.
    pub enabled: bool,
    /// Additional regex patterns; the first capture group (or the whole
    /// match when there is none) becomes the suggestion text.
    pub custom_patterns: Vec<String>,
    /// Candidates shorter than this many characters are dropped.
    pub min_length: usize,
    /// Candidates longer than this many characters are dropped.
    pub max_length: usize,
    /// Quiet period after a save before extraction runs, in milliseconds.
    pub delay_ms: u64,
}

/// Notes file watching configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// How often the watched notes file is re-read, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            enabled: true,
        }
    }
}

impl AutoSaveConfig {
    /// Create an enabled configuration with the given interval.
    #[must_use]
    pub fn every(interval: Duration) -> Self {
        Self {
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            enabled: true,
        }
    }

    /// The same configuration with automatic saves switched off.
    #[must_use]
    pub fn disabled(self) -> Self {
        Self {
            enabled: false,
            ..self
        }
    }

    /// Get the interval as a Duration.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            custom_patterns: Vec::new(),
            min_length: 3,
            max_length: 200,
            delay_ms: 1_000,
        }
    }
}

impl ExtractionConfig {
    /// Get the extraction delay as a Duration.
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("MEETKEEPER_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.autosave.interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "autosave.interval_ms must be greater than 0".to_string(),
            });
        }

        if self.watch.poll_interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "watch.poll_interval_ms must be greater than 0".to_string(),
            });
        }

        if self.extraction.delay_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "extraction.delay_ms must be greater than 0".to_string(),
            });
        }

        if self.extraction.min_length > self.extraction.max_length {
            return Err(Error::ConfigValidation {
                message: format!(
                    "extraction.min_length ({}) cannot be greater than extraction.max_length ({})",
                    self.extraction.min_length, self.extraction.max_length
                ),
            });
        }

        for pattern in &self.extraction.custom_patterns {
            if regex::Regex::new(pattern).is_err() {
                return Err(Error::ConfigValidation {
                    message: format!("invalid regex pattern: {pattern}"),
                });
            }
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the watch poll interval as a Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.watch.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.autosave.enabled);
        assert_eq!(config.autosave.interval_ms, 5_000);
        assert!(config.extraction.enabled);
        assert!(config.extraction.custom_patterns.is_empty());
        assert!(config.storage.database_path.is_none());
    }

    #[test]
    fn test_autosave_interval() {
        let autosave = AutoSaveConfig::default();
        assert_eq!(autosave.interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_autosave_every_and_disabled() {
        let autosave = AutoSaveConfig::every(Duration::from_millis(1_500));
        assert_eq!(autosave.interval_ms, 1_500);
        assert!(autosave.enabled);

        let off = autosave.disabled();
        assert!(!off.enabled);
        assert_eq!(off.interval_ms, 1_500);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_autosave_interval() {
        let mut config = Config::default();
        config.autosave.interval_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("autosave.interval_ms"));
    }

    #[test]
    fn test_validate_zero_poll_interval() {
        let mut config = Config::default();
        config.watch.poll_interval_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("poll_interval_ms"));
    }

    #[test]
    fn test_validate_zero_extraction_delay() {
        let mut config = Config::default();
        config.extraction.delay_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("extraction.delay_ms"));
    }

    #[test]
    fn test_extraction_delay() {
        assert_eq!(
            ExtractionConfig::default().delay(),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_validate_inverted_lengths() {
        let mut config = Config::default();
        config.extraction.min_length = 500;
        config.extraction.max_length = 10;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("min_length"));
    }

    #[test]
    fn test_validate_invalid_regex() {
        let mut config = Config::default();
        config.extraction.custom_patterns = vec!["[invalid".to_string()];

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("invalid regex"));
    }

    #[test]
    fn test_database_path_default() {
        let path = Config::default().database_path();
        assert!(path.to_string_lossy().contains("meetings.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_poll_interval() {
        assert_eq!(Config::default().poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("meetkeeper"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[autosave]\ninterval_ms = 1000\nenabled = false\n\n[extraction]\nmin_length = 5\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.autosave.interval_ms, 1_000);
        assert!(!config.autosave.enabled);
        assert_eq!(config.extraction.min_length, 5);
        assert_eq!(config.watch, WatchConfig::default());
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[autosave]\ninterval_ms = 0\n").unwrap();

        assert!(Config::load_from(Some(path)).is_err());
    }

    #[test]
    fn test_autosave_config_deserialize_partial() {
        let json = r#"{"interval_ms": 250}"#;
        let autosave: AutoSaveConfig = serde_json::from_str(json).unwrap();
        assert_eq!(autosave.interval_ms, 250);
        assert!(autosave.enabled);
    }
}
