//! The persisted marker of a session in progress.
//!
//! Several processes may share one backend (a long-running filter next to
//! short CLI invocations), so the marker names its owner and carries an
//! expiry. A marker past its expiry, or one that cannot be parsed, belongs
//! to a process that went away mid-session.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Slack added past the session deadline before a marker counts as stale.
pub const EXPIRY_GRACE: Duration = Duration::from_secs(5);

/// Who is recording, and until when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingLease {
    /// Process id of the recorder.
    pub pid: u32,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// After this instant the marker is stale.
    pub expires_at: DateTime<Utc>,
}

impl RecordingLease {
    /// A lease for the current process covering a session of `duration`.
    #[must_use]
    pub fn for_current_process(duration: Duration) -> Self {
        Self::new(std::process::id(), Utc::now(), duration)
    }

    /// A lease for `pid` starting at `started_at`.
    #[must_use]
    pub fn new(pid: u32, started_at: DateTime<Utc>, duration: Duration) -> Self {
        let span =
            TimeDelta::from_std(duration.saturating_add(EXPIRY_GRACE)).unwrap_or(TimeDelta::MAX);
        let expires_at = started_at
            .checked_add_signed(span)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            pid,
            started_at,
            expires_at,
        }
    }

    /// Persisted form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a persisted marker. Anything unparseable yields `None`.
    #[must_use]
    pub fn decode(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    /// True once `now` has reached the expiry.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// A parsed, unexpired marker from `raw`, or `None` if it is stale.
    #[must_use]
    pub fn live(raw: &str, now: DateTime<Utc>) -> Option<Self> {
        Self::decode(raw).filter(|lease| !lease.is_expired_at(now))
    }
}
