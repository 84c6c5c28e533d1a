//! Key-value persistence for ghostblock.
//!
//! Everything ghostblock keeps across restarts goes through the
//! [`KeyValueStore`] trait: the serialized blocked-region collection, the
//! runtime settings and the transient "recording" flag. Reads happen at
//! startup and on explicit mutations, never on the per-touch path.

mod memory;
pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::lock_unpoisoned;

pub use memory::MemoryStore;

/// Keys used in the key-value backend.
pub mod keys {
    /// Serialized blocked-region collection (JSON array).
    pub const BLOCKED_REGIONS: &str = "regions.blocked";
    /// Radius given to promoted regions.
    pub const BLOCK_RADIUS: &str = "settings.block_radius_pixels";
    /// Recording session length in seconds.
    pub const RECORD_DURATION: &str = "settings.record_duration_seconds";
    /// Whether filtering is enabled.
    pub const ENABLED: &str = "settings.enabled";
    /// Set while a recording session is active; detects unclean shutdowns.
    pub const RECORDING: &str = "session.recording";
}

/// A durable get/set/flush key-value backend.
///
/// Each `set` must be all-or-nothing: a failed write leaves the previous
/// value in place.
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write did not happen.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete `key` if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete did not happen.
    fn remove(&self, key: &str) -> Result<()>;

    /// Push buffered writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend could not be synced.
    fn flush(&self) -> Result<()>;
}

/// `SQLite`-backed key-value store.
#[derive(Debug)]
pub struct SqliteStore {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a settings database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist,
    /// and migrates the schema to the current version.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening settings database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")?;

        migrations::initialize_schema(&conn)?;

        info!("Settings database opened at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// List every stored key in lexical order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn keys(&self) -> Result<Vec<String>> {
        let conn = lock_unpoisoned(&self.conn);
        let mut stmt = conn.prepare("SELECT key FROM settings ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = lock_unpoisoned(&self.conn);
        let value = conn
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = lock_unpoisoned(&self.conn);
        conn.execute(
            r"
            INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            ",
            params![key, value, Utc::now().to_rfc3339()],
        )
        .map_err(|e| Error::persistence(key, e.to_string()))?;
        debug!(key, bytes = value.len(), "Stored setting");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = lock_unpoisoned(&self.conn);
        conn.execute("DELETE FROM settings WHERE key = ?1", [key])
            .map_err(|e| Error::persistence(key, e.to_string()))?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let conn = lock_unpoisoned(&self.conn);
        // Returns a status row; in-memory databases report it without doing anything.
        conn.query_row("PRAGMA wal_checkpoint(FULL)", [], |_| Ok(()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("failed to create test store")
    }

    #[test]
    fn test_get_missing_key() {
        let store = create_test_store();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_set_and_get() {
        let store = create_test_store();
        store.set(keys::ENABLED, "true").unwrap();
        assert_eq!(store.get(keys::ENABLED).unwrap().as_deref(), Some("true"));
    }

    #[test]
    fn test_set_replaces_value() {
        let store = create_test_store();
        store.set(keys::BLOCK_RADIUS, "60").unwrap();
        store.set(keys::BLOCK_RADIUS, "25").unwrap();

        assert_eq!(store.get(keys::BLOCK_RADIUS).unwrap().as_deref(), Some("25"));
        assert_eq!(store.keys().unwrap(), vec![keys::BLOCK_RADIUS.to_string()]);
    }

    #[test]
    fn test_remove() {
        let store = create_test_store();
        store.set(keys::RECORDING, "true").unwrap();
        store.remove(keys::RECORDING).unwrap();
        assert!(store.get(keys::RECORDING).unwrap().is_none());

        // Removing a missing key is fine.
        store.remove(keys::RECORDING).unwrap();
    }

    #[test]
    fn test_flush_in_memory() {
        let store = create_test_store();
        store.set(keys::ENABLED, "false").unwrap();
        assert!(store.flush().is_ok());
    }

    #[test]
    fn test_keys_sorted() {
        let store = create_test_store();
        store.set("b", "2").unwrap();
        store.set("a", "1").unwrap();
        assert_eq!(store.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_path_in_memory() {
        let store = create_test_store();
        assert_eq!(store.path().to_string_lossy(), ":memory:");
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("ghostblock.db");

        {
            let store = SqliteStore::open(&db_path).unwrap();
            store.set(keys::BLOCKED_REGIONS, r#"[{"x":1.0,"y":2.0,"radius":3.0}]"#).unwrap();
            store.flush().unwrap();
            assert_eq!(store.path(), db_path);
        }

        let reopened = SqliteStore::open(&db_path).unwrap();
        assert_eq!(
            reopened.get(keys::BLOCKED_REGIONS).unwrap().as_deref(),
            Some(r#"[{"x":1.0,"y":2.0,"radius":3.0}]"#)
        );
    }

    #[test]
    fn test_unicode_value() {
        let store = create_test_store();
        store.set("label", "ゴースト 👻").unwrap();
        assert_eq!(store.get("label").unwrap().as_deref(), Some("ゴースト 👻"));
    }
}
