//! Runtime settings persisted in the key-value backend.
//!
//! These are the values a user edits while the filter is running (radius,
//! session length, on/off). Each one is read independently so a single bad
//! value only resets itself to its default.

use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::FilterConfig;
use crate::error::{Error, Result};
use crate::storage::{keys, KeyValueStore};

/// Accepted block radius, in pixels.
pub const RADIUS_RANGE: RangeInclusive<u32> = 1..=200;

/// Accepted recording duration, in seconds.
pub const DURATION_RANGE: RangeInclusive<u32> = 60..=3600;

/// The three user-editable filter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Radius given to regions promoted from a recording session.
    pub block_radius_pixels: u32,
    /// Length of a recording session.
    pub record_duration_seconds: u32,
    /// When false every touch is forwarded untouched.
    pub enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from(&FilterConfig::default())
    }
}

impl From<&FilterConfig> for Settings {
    fn from(filter: &FilterConfig) -> Self {
        Self {
            block_radius_pixels: filter.block_radius_pixels,
            record_duration_seconds: filter.record_duration_seconds,
            enabled: filter.enabled,
        }
    }
}

impl Settings {
    /// Read all settings, falling back to `defaults` per value.
    ///
    /// Missing keys fall back silently; unreadable, unparseable or
    /// out-of-range values fall back with a warning.
    #[must_use]
    pub fn load(kv: &dyn KeyValueStore, defaults: Settings) -> Self {
        Self {
            block_radius_pixels: read_ranged(
                kv,
                keys::BLOCK_RADIUS,
                &RADIUS_RANGE,
                defaults.block_radius_pixels,
            ),
            record_duration_seconds: read_ranged(
                kv,
                keys::RECORD_DURATION,
                &DURATION_RANGE,
                defaults.record_duration_seconds,
            ),
            enabled: read_value(kv, keys::ENABLED).unwrap_or(defaults.enabled),
        }
    }

    /// Radius of promoted regions as a float, ready for geometry.
    #[must_use]
    pub fn block_radius(&self) -> f64 {
        f64::from(self.block_radius_pixels)
    }

    /// Recording duration as a Duration.
    #[must_use]
    pub fn record_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.record_duration_seconds))
    }

    /// Validate and persist a new block radius.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SettingOutOfRange`] for values outside 1–200, or a
    /// persistence error if the write fails. A rejected value or a rejected
    /// `set` leaves the current value in effect; once `set` has landed the
    /// new value is kept even if the flush then fails.
    pub fn set_block_radius(&mut self, kv: &dyn KeyValueStore, pixels: u32) -> Result<()> {
        check_range("block_radius_pixels", pixels, &RADIUS_RANGE)?;
        kv.set(keys::BLOCK_RADIUS, &pixels.to_string())?;
        self.block_radius_pixels = pixels;
        info!(radius = pixels, "Block radius updated");
        kv.flush()
    }

    /// Validate and persist a new recording duration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SettingOutOfRange`] for values outside 60–3600, or a
    /// persistence error if the write fails.
    pub fn set_record_duration(&mut self, kv: &dyn KeyValueStore, seconds: u32) -> Result<()> {
        check_range("record_duration_seconds", seconds, &DURATION_RANGE)?;
        kv.set(keys::RECORD_DURATION, &seconds.to_string())?;
        self.record_duration_seconds = seconds;
        info!(seconds, "Recording duration updated");
        kv.flush()
    }

    /// Persist the enabled flag.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the write fails.
    pub fn set_enabled(&mut self, kv: &dyn KeyValueStore, enabled: bool) -> Result<()> {
        kv.set(keys::ENABLED, &enabled.to_string())?;
        self.enabled = enabled;
        info!(enabled, "Filtering toggled");
        kv.flush()
    }
}

/// Reject `value` unless it lies inside `range`.
///
/// # Errors
///
/// Returns [`Error::SettingOutOfRange`] naming the setting and its bounds.
pub fn check_range(name: &'static str, value: u32, range: &RangeInclusive<u32>) -> Result<()> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(Error::SettingOutOfRange {
            name,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

fn read_value<T: FromStr>(kv: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match kv.get(key) {
        Ok(raw) => raw?,
        Err(e) => {
            warn!(key, error = %e, "Could not read setting, using default");
            return None;
        }
    };
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        warn!(key, value = %raw, "Malformed setting, using default");
    }
    parsed
}

fn read_ranged(
    kv: &dyn KeyValueStore,
    key: &str,
    range: &RangeInclusive<u32>,
    default: u32,
) -> u32 {
    match read_value::<u32>(kv, key) {
        Some(value) if range.contains(&value) => value,
        Some(value) => {
            warn!(key, value, "Setting out of range, using default");
            default
        }
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_defaults_match_filter_config() {
        let settings = Settings::default();
        assert_eq!(settings.block_radius_pixels, 60);
        assert_eq!(settings.record_duration_seconds, 60);
        assert!(settings.enabled);
    }

    #[test]
    fn test_load_empty_store_uses_defaults() {
        let kv = MemoryStore::new();
        let defaults = Settings {
            block_radius_pixels: 30,
            record_duration_seconds: 120,
            enabled: false,
        };
        assert_eq!(Settings::load(&kv, defaults), defaults);
    }

    #[test]
    fn test_load_persisted_values() {
        let kv = MemoryStore::new();
        kv.set(keys::BLOCK_RADIUS, "25").unwrap();
        kv.set(keys::RECORD_DURATION, "600").unwrap();
        kv.set(keys::ENABLED, "false").unwrap();

        let settings = Settings::load(&kv, Settings::default());
        assert_eq!(settings.block_radius_pixels, 25);
        assert_eq!(settings.record_duration_seconds, 600);
        assert!(!settings.enabled);
    }

    #[test]
    fn test_load_bad_values_fall_back_individually() {
        let kv = MemoryStore::new();
        kv.set(keys::BLOCK_RADIUS, "9000").unwrap();
        kv.set(keys::RECORD_DURATION, "soon").unwrap();
        kv.set(keys::ENABLED, "false").unwrap();

        let settings = Settings::load(&kv, Settings::default());
        assert_eq!(settings.block_radius_pixels, 60);
        assert_eq!(settings.record_duration_seconds, 60);
        assert!(!settings.enabled);
    }

    #[test]
    fn test_set_block_radius_rejects_out_of_range() {
        let kv = MemoryStore::new();
        let mut settings = Settings::default();

        let err = settings.set_block_radius(&kv, 0).unwrap_err();
        assert!(matches!(err, Error::SettingOutOfRange { min: 1, max: 200, .. }));
        assert!(settings.set_block_radius(&kv, 201).is_err());

        assert_eq!(settings.block_radius_pixels, 60);
        assert!(kv.get(keys::BLOCK_RADIUS).unwrap().is_none());
    }

    #[test]
    fn test_set_block_radius_persists() {
        let kv = MemoryStore::new();
        let mut settings = Settings::default();
        settings.set_block_radius(&kv, 200).unwrap();

        assert_eq!(settings.block_radius_pixels, 200);
        assert_eq!(kv.get(keys::BLOCK_RADIUS).unwrap().as_deref(), Some("200"));
        assert_eq!(kv.flush_count(), 1);
    }

    #[test]
    fn test_set_record_duration_bounds() {
        let kv = MemoryStore::new();
        let mut settings = Settings::default();

        assert!(settings.set_record_duration(&kv, 59).is_err());
        assert!(settings.set_record_duration(&kv, 3601).is_err());
        settings.set_record_duration(&kv, 3600).unwrap();
        assert_eq!(settings.record_duration(), Duration::from_secs(3600));
    }

    #[test]
    fn test_failed_write_keeps_value() {
        let kv = MemoryStore::new();
        kv.set_fail_writes(true);
        let mut settings = Settings::default();

        assert!(settings.set_enabled(&kv, false).is_err());
        assert!(settings.enabled);
        assert!(settings.set_block_radius(&kv, 10).is_err());
        assert_eq!(settings.block_radius_pixels, 60);
    }

    #[test]
    fn test_failed_flush_keeps_memory_in_step_with_backend() {
        let kv = MemoryStore::new();
        kv.set_fail_flush(true);
        let mut settings = Settings::default();

        assert!(settings.set_enabled(&kv, false).unwrap_err().is_persistence_error());
        assert!(!settings.enabled);
        assert_eq!(kv.get(keys::ENABLED).unwrap().as_deref(), Some("false"));

        assert!(settings.set_record_duration(&kv, 120).is_err());
        assert_eq!(settings.record_duration_seconds, 120);
        assert_eq!(Settings::load(&kv, Settings::default()), settings);
    }

    #[test]
    fn test_block_radius_as_float() {
        let settings = Settings {
            block_radius_pixels: 42,
            ..Settings::default()
        };
        assert!((settings.block_radius() - 42.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_check_range() {
        assert!(check_range("x", 1, &RADIUS_RANGE).is_ok());
        assert!(check_range("x", 200, &RADIUS_RANGE).is_ok());
        let err = check_range("x", 201, &RADIUS_RANGE).unwrap_err();
        assert_eq!(err.to_string(), "x must be between 1 and 200, got 201");
    }
}
