//! Per-touch classification.
//!
//! Every incoming touch gets exactly one [`Decision`]. The rules are applied
//! in order, first match wins:
//!
//! 1. Filtering disabled: forward.
//! 2. A recording session is active: capture (the touch is also consumed).
//! 3. The touch lies in a blocked region: suppress.
//! 4. Otherwise: forward.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use ghostblock::filter::{Decision, TouchFilter};
//! use ghostblock::regions::BlockedRegionStore;
//! use ghostblock::session::RecordingSession;
//! use ghostblock::storage::MemoryStore;
//! use ghostblock::touch::{BlockedRegion, TouchEvent};
//!
//! let mut regions = BlockedRegionStore::load(Arc::new(MemoryStore::new()));
//! regions.add(BlockedRegion::new(100.0, 100.0, 10.0)).unwrap();
//! let mut session = RecordingSession::new();
//!
//! let mut filter = TouchFilter::new(true, &mut session, &regions);
//! assert_eq!(filter.decide(&TouchEvent::new(105.0, 100.0)), Decision::Suppress);
//! assert_eq!(filter.decide(&TouchEvent::new(300.0, 300.0)), Decision::Forward);
//! ```

use std::fmt;

use serde::Serialize;
use tracing::trace;

use crate::regions::BlockedRegionStore;
use crate::session::RecordingSession;
use crate::touch::TouchEvent;

/// What to do with one touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Recorded into the active session and not delivered.
    Capture,
    /// Delivered to the UI unchanged.
    Forward,
    /// Dropped as a ghost touch.
    Suppress,
}

impl Decision {
    /// True if the touch should reach the rest of the input pipeline.
    #[must_use]
    pub fn propagates(self) -> bool {
        self == Self::Forward
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capture => write!(f, "capture"),
            Self::Forward => write!(f, "forward"),
            Self::Suppress => write!(f, "suppress"),
        }
    }
}

/// Borrowed view over the state a decision depends on.
#[derive(Debug)]
pub struct TouchFilter<'a> {
    enabled: bool,
    session: &'a mut RecordingSession,
    regions: &'a BlockedRegionStore,
}

impl<'a> TouchFilter<'a> {
    /// Create a filter over the given state.
    pub fn new(
        enabled: bool,
        session: &'a mut RecordingSession,
        regions: &'a BlockedRegionStore,
    ) -> Self {
        Self {
            enabled,
            session,
            regions,
        }
    }

    /// Classify one touch. Captured points are appended to the session.
    pub fn decide(&mut self, event: &TouchEvent) -> Decision {
        let point = event.point;

        let decision = if !self.enabled {
            Decision::Forward
        } else if self.session.capture(point) {
            Decision::Capture
        } else if self.regions.is_blocked(point) {
            Decision::Suppress
        } else {
            Decision::Forward
        };

        trace!(%point, %decision, "Touch classified");
        decision
    }
}
