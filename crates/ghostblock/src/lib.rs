//! `ghostblock` - Ghost-touch suppression for touchscreen input pipelines
//!
//! A damaged touchscreen can report phantom touches at fixed spots. This
//! library lets the user record those spots during a short session, turns
//! them into blocked circular regions, and from then on drops every touch that
//! lands inside one while forwarding everything else.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod logging;
pub mod regions;
pub mod session;
pub mod settings;
pub mod storage;
pub mod touch;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use config::Config;
pub use engine::{EngineStatus, GhostBlock, GuardEvent};
pub use error::{Error, Result};
pub use filter::Decision;
pub use logging::init_logging;
pub use regions::BlockedRegionStore;
pub use session::{ManualScheduler, Scheduler, SessionSummary, StopReason, TokioScheduler};
pub use settings::Settings;
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};
pub use touch::{BlockedRegion, Point, TouchEvent, TouchSource};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
