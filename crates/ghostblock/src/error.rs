//! Error types for ghostblock.
//!
//! This module defines all error types used throughout the ghostblock crate.
//! Nothing in here is fatal to the host process: the worst case any caller
//! should fall back to is "nothing is blocked".

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for ghostblock operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// A write to the key-value backend did not happen.
    #[error("failed to persist '{key}': {message}")]
    Persistence {
        /// The key being written.
        key: String,
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// A runtime setting was outside its accepted range.
    #[error("{name} must be between {min} and {max}, got {value}")]
    SettingOutOfRange {
        /// Name of the setting.
        name: &'static str,
        /// The rejected value.
        value: u32,
        /// Smallest accepted value.
        min: u32,
        /// Largest accepted value.
        max: u32,
    },

    // === Region Errors ===
    /// A blocked region failed validation.
    #[error("invalid blocked region: {message}")]
    InvalidRegion {
        /// Description of the validation failure.
        message: String,
    },

    // === Session Errors ===
    /// A recording session was requested while filtering is switched off.
    #[error("filtering is disabled; enable it before recording")]
    FilterDisabled,

    /// Another process holds a live recording session on the same backend.
    #[error("process {pid} is already recording")]
    RecordingElsewhere {
        /// Process id of the recorder.
        pid: u32,
    },

    // === I/O Errors ===
    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for ghostblock operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new persistence error for the given key.
    #[must_use]
    pub fn persistence(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Persistence {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a new invalid region error.
    #[must_use]
    pub fn invalid_region(message: impl Into<String>) -> Self {
        Self::InvalidRegion {
            message: message.into(),
        }
    }

    /// Check if this error means a write may not have reached the backend.
    #[must_use]
    pub fn is_persistence_error(&self) -> bool {
        matches!(
            self,
            Self::Persistence { .. }
                | Self::DatabaseQuery(_)
                | Self::DatabaseOpen { .. }
                | Self::DirectoryCreate { .. }
                | Self::Json(_)
        )
    }

    /// Check if this error is a rejected input value.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::SettingOutOfRange { .. }
                | Self::InvalidRegion { .. }
                | Self::ConfigValidation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::persistence("regions.blocked", "disk full");
        assert_eq!(
            err.to_string(),
            "failed to persist 'regions.blocked': disk full"
        );
    }

    #[test]
    fn test_setting_out_of_range_display() {
        let err = Error::SettingOutOfRange {
            name: "block_radius_pixels",
            value: 500,
            min: 1,
            max: 200,
        };
        assert_eq!(
            err.to_string(),
            "block_radius_pixels must be between 1 and 200, got 500"
        );
    }

    #[test]
    fn test_is_persistence_error() {
        assert!(Error::persistence("k", "boom").is_persistence_error());
        assert!(!Error::invalid_region("radius").is_persistence_error());
    }

    #[test]
    fn test_is_validation_error() {
        assert!(Error::invalid_region("negative radius").is_validation_error());
        assert!(Error::ConfigValidation {
            message: "bad".to_string()
        }
        .is_validation_error());
        assert!(!Error::FilterDisabled.is_validation_error());
    }

    #[test]
    fn test_filter_disabled_display() {
        let err = Error::FilterDisabled;
        assert!(err.to_string().contains("disabled"));
        assert!(!err.is_persistence_error());
        assert!(!err.is_validation_error());
    }

    #[test]
    fn test_recording_elsewhere_display() {
        let err = Error::RecordingElsewhere { pid: 4242 };
        assert_eq!(err.to_string(), "process 4242 is already recording");
        assert!(!err.is_persistence_error());
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_database_migration_error_display() {
        let err = Error::DatabaseMigration {
            message: "version mismatch".to_string(),
        };
        assert!(err.to_string().contains("version mismatch"));
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }
}
