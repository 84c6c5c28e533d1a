//! Configuration management for ghostblock.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.
//!
//! The values under `[filter]` only seed the runtime [`Settings`](crate::Settings)
//! on first run. Once a setting has been written to the key-value backend the
//! persisted value wins.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::settings::{DURATION_RANGE, RADIUS_RANGE};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "ghostblock";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "ghostblock.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `GHOSTBLOCK_`, sections separated
///    by a double underscore, e.g. `GHOSTBLOCK_FILTER__BLOCK_RADIUS_PIXELS`)
/// 2. TOML config file at `~/.config/ghostblock/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Filter defaults.
    pub filter: FilterConfig,
    /// Recording session configuration.
    pub session: SessionConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the settings database.
    /// Defaults to `~/.local/share/ghostblock/ghostblock.db`
    pub database_path: Option<PathBuf>,
}

/// First-run defaults for the persisted filter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Radius assigned to newly promoted blocked regions, in pixels.
    pub block_radius_pixels: u32,
    /// Length of a recording session in seconds.
    pub record_duration_seconds: u32,
    /// Whether filtering is active at all.
    pub enabled: bool,
}

/// Recording session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of captured coordinates listed in a session summary.
    pub summary_points: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            block_radius_pixels: 60,
            record_duration_seconds: 60,
            enabled: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { summary_points: 5 }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `GHOSTBLOCK_`)
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
            .merge(Env::prefixed("GHOSTBLOCK_").split("__"));

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
        if !RADIUS_RANGE.contains(&self.filter.block_radius_pixels) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "block_radius_pixels ({}) must be between {} and {}",
                    self.filter.block_radius_pixels,
                    RADIUS_RANGE.start(),
                    RADIUS_RANGE.end()
                ),
            });
        }

        if !DURATION_RANGE.contains(&self.filter.record_duration_seconds) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "record_duration_seconds ({}) must be between {} and {}",
                    self.filter.record_duration_seconds,
                    DURATION_RANGE.start(),
                    DURATION_RANGE.end()
                ),
            });
        }

        if self.session.summary_points == 0 {
            return Err(Error::ConfigValidation {
                message: "summary_points must be greater than 0".to_string(),
            });
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.filter.block_radius_pixels, 60);
        assert_eq!(config.filter.record_duration_seconds, 60);
        assert!(config.filter.enabled);
        assert_eq!(config.session.summary_points, 5);
        assert!(config.storage.database_path.is_none());
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_radius_too_large() {
        let mut config = Config::default();
        config.filter.block_radius_pixels = 201;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("block_radius_pixels"));
    }

    #[test]
    fn test_validate_radius_zero() {
        let mut config = Config::default();
        config.filter.block_radius_pixels = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_duration_too_short() {
        let mut config = Config::default();
        config.filter.record_duration_seconds = 59;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("record_duration_seconds"));
    }

    #[test]
    fn test_validate_duration_bounds_inclusive() {
        let mut config = Config::default();
        config.filter.record_duration_seconds = 3600;
        config.filter.block_radius_pixels = 200;
        assert!(config.validate().is_ok());

        config.filter.record_duration_seconds = 60;
        config.filter.block_radius_pixels = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_summary_points() {
        let mut config = Config::default();
        config.session.summary_points = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("summary_points"));
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        let path = config.database_path();

        assert!(path.to_string_lossy().contains("ghostblock.db"));
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
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("ghostblock"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), Config::default());
    }

    #[test]
    fn test_load_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[filter]\nblock_radius_pixels = 25\n\n[session]\nsummary_points = 3\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.filter.block_radius_pixels, 25);
        assert_eq!(config.filter.record_duration_seconds, 60);
        assert_eq!(config.session.summary_points, 3);
    }

    #[test]
    fn test_load_storage_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[storage]\ndatabase_path = \"/var/lib/ghostblock/touch.db\"\n\n[filter]\nenabled = false\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/ghostblock/touch.db")
        );
        assert!(!config.filter.enabled);
    }

    #[test]
    fn test_load_rejects_out_of_range_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[filter]\nrecord_duration_seconds = 5\n").unwrap();

        let result = Config::load_from(Some(path));
        assert!(matches!(result, Err(Error::ConfigValidation { .. })));
    }

    #[test]
    fn test_filter_config_deserialize_partial() {
        let json = r#"{"enabled": false}"#;
        let filter: FilterConfig = serde_json::from_str(json).unwrap();
        assert!(!filter.enabled);
        assert_eq!(filter.block_radius_pixels, 60);
    }
}
