//! `SQLite` schema definitions for the ghostblock settings database.
//!
//! The base statements describe schema version 1. Later columns are added by
//! the migrations in [`super::migrations`].

/// SQL statement to create the key-value settings table.
pub const CREATE_SETTINGS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// SQL statement to create the metadata table for internal bookkeeping.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// Version 2: track when each setting was last written.
pub const ADD_SETTINGS_UPDATED_AT: &str = r"
ALTER TABLE settings ADD COLUMN updated_at TEXT
";

/// All base schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[CREATE_SETTINGS_TABLE, CREATE_METADATA_TABLE];
