//! The persisted set of blocked regions.
//!
//! [`BlockedRegionStore`] is the only authority on which touches get
//! suppressed. It is loaded once, queried from memory on every touch and
//! rewritten as a whole on every mutation: the full collection is encoded to a
//! single JSON string before one `set` is issued, so a failed write leaves the
//! previously persisted collection untouched.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::storage::{keys, KeyValueStore};
use crate::touch::{BlockedRegion, Point};

/// In-memory view of the blocked regions, backed by a key-value store.
#[derive(Debug)]
pub struct BlockedRegionStore {
    kv: Arc<dyn KeyValueStore>,
    regions: Vec<BlockedRegion>,
}

impl BlockedRegionStore {
    /// Load the persisted collection.
    ///
    /// Never fails: a missing key, unreadable backend or malformed collection
    /// all yield an empty set (the latter two with a warning).
    #[must_use]
    pub fn load(kv: Arc<dyn KeyValueStore>) -> Self {
        let regions = read_regions(kv.as_ref()).unwrap_or_else(|e| {
            warn!(error = %e, "Could not read blocked regions, treating as empty");
            Vec::new()
        });
        Self { kv, regions }
    }

    /// Re-read the persisted collection, replacing the in-memory view.
    ///
    /// Another process sharing the backend may have changed it since
    /// [`load`](Self::load). A malformed collection reloads as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read, in which case the
    /// in-memory view is kept.
    pub fn reload(&mut self) -> Result<()> {
        self.regions = read_regions(self.kv.as_ref())?;
        Ok(())
    }

    /// The current regions, in stable insertion order.
    #[must_use]
    pub fn regions(&self) -> &[BlockedRegion] {
        &self.regions
    }

    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// True if nothing is blocked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// True iff some region contains `point` (boundary inclusive).
    ///
    /// Pure in-memory scan; safe to call on the input hot path.
    #[must_use]
    pub fn is_blocked(&self, point: Point) -> bool {
        self.regions.iter().any(|region| region.contains(point))
    }

    /// Write the current set back to the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write fails.
    pub fn save(&self) -> Result<()> {
        persist(self.kv.as_ref(), &self.regions)
    }

    /// Atomically replace the whole set and persist it.
    ///
    /// Exact duplicates are collapsed (first occurrence kept). If the write
    /// is rejected the in-memory set is left as it was.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegion`] if any region has a non-positive
    /// radius or non-finite coordinates, or a persistence error if the write
    /// fails.
    pub fn replace(&mut self, regions: Vec<BlockedRegion>) -> Result<()> {
        let regions = normalize(regions)?;
        let encoded = encode(&regions)?;
        self.kv.set(keys::BLOCKED_REGIONS, &encoded)?;
        self.regions = regions;
        info!(count = self.regions.len(), "Blocked regions replaced");
        // The backend already holds the new value, so memory follows it even if flushing fails.
        self.kv.flush()
    }

    /// Remove every region and persist the empty set.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn clear(&mut self) -> Result<()> {
        self.replace(Vec::new())
    }

    /// Append one region to the currently persisted collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read, the region is invalid
    /// or the write fails.
    pub fn add(&mut self, region: BlockedRegion) -> Result<()> {
        self.reload()?;
        let mut regions = self.regions.clone();
        regions.push(region);
        self.replace(regions)
    }

    /// Remove the region at `index` of the currently persisted collection
    /// and return it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegion`] if `index` is out of range, or a
    /// persistence error if the write fails.
    pub fn remove(&mut self, index: usize) -> Result<BlockedRegion> {
        self.reload()?;
        if index >= self.regions.len() {
            return Err(Error::invalid_region(format!(
                "no region at index {index} (have {})",
                self.regions.len()
            )));
        }
        let mut regions = self.regions.clone();
        let removed = regions.remove(index);
        self.replace(regions)?;
        Ok(removed)
    }
}

/// Encode a collection in its persisted form.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(regions: &[BlockedRegion]) -> Result<String> {
    Ok(serde_json::to_string(regions)?)
}

/// Decode and validate a persisted collection.
///
/// # Errors
///
/// Returns an error if the text is not a JSON array of regions, or if any
/// region is invalid.
pub fn decode(raw: &str) -> Result<Vec<BlockedRegion>> {
    let regions: Vec<BlockedRegion> = serde_json::from_str(raw)?;
    normalize(regions)
}

fn normalize(regions: Vec<BlockedRegion>) -> Result<Vec<BlockedRegion>> {
    let mut unique: Vec<BlockedRegion> = Vec::with_capacity(regions.len());
    for region in regions {
        if !region.is_valid() {
            return Err(Error::invalid_region(format!(
                "region {region} needs finite coordinates and a positive radius"
            )));
        }
        if !unique.contains(&region) {
            unique.push(region);
        }
    }
    Ok(unique)
}

fn persist(kv: &dyn KeyValueStore, regions: &[BlockedRegion]) -> Result<()> {
    let encoded = encode(regions)?;
    kv.set(keys::BLOCKED_REGIONS, &encoded)?;
    kv.flush()
}

fn read_regions(kv: &dyn KeyValueStore) -> Result<Vec<BlockedRegion>> {
    let Some(raw) = kv.get(keys::BLOCKED_REGIONS)? else {
        debug!("No blocked regions stored");
        return Ok(Vec::new());
    };

    match decode(&raw) {
        Ok(regions) => {
            debug!(count = regions.len(), "Loaded blocked regions");
            Ok(regions)
        }
        Err(e) => {
            warn!(error = %e, "Stored blocked regions are malformed, treating as empty");
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn store_with(raw: Option<&str>) -> (Arc<MemoryStore>, BlockedRegionStore) {
        let kv = Arc::new(MemoryStore::new());
        if let Some(raw) = raw {
            kv.set(keys::BLOCKED_REGIONS, raw).unwrap();
        }
        let store = BlockedRegionStore::load(kv.clone());
        (kv, store)
    }

    #[test]
    fn test_load_missing_key_is_empty() {
        let (_, store) = store_with(None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_malformed_json_is_empty() {
        let (_, store) = store_with(Some("{not json"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_wrong_shape_is_empty() {
        let (_, store) = store_with(Some(r#"{"x": 1, "y": 2, "radius": 3}"#));
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_invalid_radius_is_empty() {
        let (_, store) = store_with(Some(
            r#"[{"x":1,"y":2,"radius":3},{"x":4,"y":5,"radius":0}]"#,
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_valid() {
        let (_, store) = store_with(Some(r#"[{"x":100,"y":100,"radius":10}]"#));
        assert_eq!(store.regions(), &[BlockedRegion::new(100.0, 100.0, 10.0)]);
    }

    #[test]
    fn test_is_blocked_examples() {
        let (_, store) = store_with(Some(r#"[{"x":100,"y":100,"radius":10}]"#));
        assert!(store.is_blocked(Point::new(108.0, 100.0)));
        assert!(store.is_blocked(Point::new(110.0, 100.0)));
        assert!(!store.is_blocked(Point::new(111.0, 100.0)));
    }

    #[test]
    fn test_is_blocked_any_region() {
        let (_, mut store) = store_with(None);
        store
            .replace(vec![
                BlockedRegion::new(0.0, 0.0, 5.0),
                BlockedRegion::new(500.0, 500.0, 50.0),
            ])
            .unwrap();

        assert!(store.is_blocked(Point::new(3.0, 4.0)));
        assert!(store.is_blocked(Point::new(540.0, 470.0)));
        assert!(!store.is_blocked(Point::new(100.0, 100.0)));
    }

    #[test]
    fn test_empty_blocks_nothing() {
        let (_, store) = store_with(None);
        assert!(!store.is_blocked(Point::new(0.0, 0.0)));
    }

    #[test]
    fn test_save_load_round_trip_is_stable() {
        let raw = r#"[{"x":12.5,"y":0.1,"radius":60.0},{"x":3.0,"y":4.0,"radius":1.0}]"#;
        let (kv, store) = store_with(Some(raw));

        store.save().unwrap();
        assert_eq!(kv.get(keys::BLOCKED_REGIONS).unwrap().as_deref(), Some(raw));

        let reloaded = BlockedRegionStore::load(kv.clone());
        assert_eq!(reloaded.regions(), store.regions());
    }

    #[test]
    fn test_replace_persists_and_flushes() {
        let (kv, mut store) = store_with(None);
        store
            .replace(vec![BlockedRegion::new(1.0, 2.0, 3.0)])
            .unwrap();

        assert_eq!(kv.flush_count(), 1);
        let reloaded = BlockedRegionStore::load(kv.clone());
        assert_eq!(reloaded.regions(), &[BlockedRegion::new(1.0, 2.0, 3.0)]);
    }

    #[test]
    fn test_replace_collapses_duplicates() {
        let (_, mut store) = store_with(None);
        store
            .replace(vec![
                BlockedRegion::new(1.0, 1.0, 5.0),
                BlockedRegion::new(2.0, 2.0, 5.0),
                BlockedRegion::new(1.0, 1.0, 5.0),
            ])
            .unwrap();

        assert_eq!(
            store.regions(),
            &[
                BlockedRegion::new(1.0, 1.0, 5.0),
                BlockedRegion::new(2.0, 2.0, 5.0)
            ]
        );
    }

    #[test]
    fn test_replace_rejects_invalid_region() {
        let (kv, mut store) = store_with(Some(r#"[{"x":1,"y":1,"radius":1}]"#));
        let err = store
            .replace(vec![BlockedRegion::new(5.0, 5.0, -1.0)])
            .unwrap_err();

        assert!(err.is_validation_error());
        assert_eq!(store.len(), 1);
        assert_eq!(
            kv.get(keys::BLOCKED_REGIONS).unwrap().as_deref(),
            Some(r#"[{"x":1,"y":1,"radius":1}]"#)
        );
    }

    #[test]
    fn test_failed_write_keeps_previous_state() {
        let raw = r#"[{"x":1.0,"y":1.0,"radius":1.0}]"#;
        let (kv, mut store) = store_with(Some(raw));
        kv.set_fail_writes(true);

        let err = store.clear().unwrap_err();
        assert!(err.is_persistence_error());
        assert_eq!(store.len(), 1);
        assert_eq!(kv.get(keys::BLOCKED_REGIONS).unwrap().as_deref(), Some(raw));
    }

    #[test]
    fn test_clear() {
        let (kv, mut store) = store_with(Some(r#"[{"x":1,"y":1,"radius":1}]"#));
        store.clear().unwrap();

        assert!(store.is_empty());
        assert_eq!(kv.get(keys::BLOCKED_REGIONS).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_add_and_remove() {
        let (_, mut store) = store_with(None);
        store.add(BlockedRegion::new(1.0, 1.0, 5.0)).unwrap();
        store.add(BlockedRegion::new(9.0, 9.0, 5.0)).unwrap();

        let removed = store.remove(0).unwrap();
        assert_eq!(removed, BlockedRegion::new(1.0, 1.0, 5.0));
        assert_eq!(store.regions(), &[BlockedRegion::new(9.0, 9.0, 5.0)]);
    }

    #[test]
    fn test_remove_out_of_range() {
        let (_, mut store) = store_with(None);
        let err = store.remove(3).unwrap_err();
        assert!(err.to_string().contains("index 3"));
    }

    #[test]
    fn test_reload_picks_up_external_change() {
        let (kv, mut store) = store_with(None);
        kv.set(keys::BLOCKED_REGIONS, r#"[{"x":7,"y":7,"radius":7}]"#)
            .unwrap();

        store.reload().unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_add_keeps_regions_written_elsewhere() {
        let (kv, mut first) = store_with(None);
        let mut second = BlockedRegionStore::load(kv.clone());

        first.add(BlockedRegion::new(10.0, 10.0, 5.0)).unwrap();
        second.add(BlockedRegion::new(500.0, 500.0, 5.0)).unwrap();

        let fresh = BlockedRegionStore::load(kv.clone());
        assert_eq!(
            fresh.regions(),
            &[
                BlockedRegion::new(10.0, 10.0, 5.0),
                BlockedRegion::new(500.0, 500.0, 5.0),
            ]
        );
    }

    #[test]
    fn test_remove_indexes_current_collection() {
        let (kv, mut stale) = store_with(None);
        let mut other = BlockedRegionStore::load(kv.clone());
        other
            .replace(vec![
                BlockedRegion::new(1.0, 1.0, 5.0),
                BlockedRegion::new(2.0, 2.0, 5.0),
            ])
            .unwrap();

        let removed = stale.remove(1).unwrap();
        assert_eq!(removed, BlockedRegion::new(2.0, 2.0, 5.0));
        assert_eq!(stale.regions(), &[BlockedRegion::new(1.0, 1.0, 5.0)]);
    }

    #[test]
    fn test_decode_round_trips_exact_floats() {
        let regions = vec![BlockedRegion::new(0.1 + 0.2, 1.0 / 3.0, 59.999_999)];
        let decoded = decode(&encode(&regions).unwrap()).unwrap();
        assert_eq!(decoded, regions);
    }
}
