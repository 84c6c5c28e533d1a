//! Map-backed key-value store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::KeyValueStore;
use crate::error::{Error, Result};
use crate::lock_unpoisoned;

/// In-memory [`KeyValueStore`].
///
/// Useful for hosts that manage persistence themselves and for tests.
/// Writes can be made to fail on demand with [`MemoryStore::set_fail_writes`];
/// a failed write never touches the stored value. [`MemoryStore::set_fail_flush`]
/// fails only the flush, leaving `set` and `remove` working.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
    fail_writes: AtomicBool,
    fail_flush: AtomicBool,
    flushes: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set`/`remove`/`flush` fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `flush` fail while writes still land.
    pub fn set_fail_flush(&self, fail: bool) {
        self.fail_flush.store(fail, Ordering::SeqCst);
    }

    /// Number of successful flushes so far.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Snapshot of everything stored.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        lock_unpoisoned(&self.values).clone()
    }

    fn check_writable(&self, key: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::persistence(key, "store is read-only"));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock_unpoisoned(&self.values).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable(key)?;
        lock_unpoisoned(&self.values).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check_writable(key)?;
        lock_unpoisoned(&self.values).remove(key);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.check_writable("<flush>")?;
        if self.fail_flush.load(Ordering::SeqCst) {
            return Err(Error::persistence("<flush>", "sync to disk failed"));
        }
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
