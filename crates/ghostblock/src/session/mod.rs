//! Time-boxed recording sessions.
//!
//! While a session is active every touch is captured instead of being
//! forwarded. A session ends in one of three ways, see [`StopReason`]. Each
//! session carries a generation number so a timer belonging to an earlier
//! session can never end a later one.

mod lease;
mod summary;
pub mod timer;

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use lease::{RecordingLease, EXPIRY_GRACE};
pub use summary::SessionSummary;
pub use timer::{ManualScheduler, Scheduler, TimerCallback, TimerHandle, TokioScheduler};

use crate::touch::Point;

/// Whether a session is currently recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Touches flow through the filter normally.
    #[default]
    Idle,
    /// Touches are captured.
    Active,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The user ended it.
    Manual,
    /// Filtering was disabled, a new session replaced it, or the host shut down.
    Forced,
    /// The configured duration elapsed.
    TimedOut,
}

impl StopReason {
    /// True if ending this way should report a summary of what was captured.
    #[must_use]
    pub fn produces_summary(self) -> bool {
        !matches!(self, Self::Forced)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Forced => write!(f, "forced"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Everything a session captured, handed back when it ends.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedSession {
    /// Generation of the session that ended.
    pub generation: u64,
    /// How it ended.
    pub reason: StopReason,
    /// Captured points in arrival order.
    pub points: Vec<Point>,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Wall-clock end.
    pub finished_at: DateTime<Utc>,
}

/// The recording state machine: `Idle` or `Active` with one armed timer.
#[derive(Debug, Default)]
pub struct RecordingSession {
    status: SessionStatus,
    generation: u64,
    deadline: Option<Instant>,
    started_at: Option<DateTime<Utc>>,
    points: Vec<Point>,
    timer: Option<TimerHandle>,
}

impl RecordingSession {
    /// A fresh, idle session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin recording for `duration`.
    ///
    /// Any session already running is force-stopped first and returned so
    /// the caller can dispose of it. `on_timeout` is handed the new session's
    /// generation and should route back to [`stop_generation`] with
    /// [`StopReason::TimedOut`].
    ///
    /// [`stop_generation`]: RecordingSession::stop_generation
    pub fn start<F>(
        &mut self,
        duration: Duration,
        scheduler: &dyn Scheduler,
        on_timeout: F,
    ) -> Option<FinishedSession>
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let replaced = self.stop(StopReason::Forced, scheduler);

        self.generation += 1;
        let generation = self.generation;
        self.status = SessionStatus::Active;
        self.deadline = Some(scheduler.now() + duration);
        self.started_at = Some(Utc::now());
        self.points.clear();
        self.timer = Some(scheduler.schedule_in(
            duration,
            Box::new(move || on_timeout(generation)),
        ));

        debug!(generation, ?duration, "Recording session started");
        replaced
    }

    /// Record a point if active. Returns whether it was kept.
    pub fn capture(&mut self, point: Point) -> bool {
        if self.is_active() {
            self.points.push(point);
            true
        } else {
            false
        }
    }

    /// End the current session.
    ///
    /// Idempotent: returns `None` if nothing is active. The pending timer is
    /// cancelled before the state flips to `Idle`.
    pub fn stop(&mut self, reason: StopReason, scheduler: &dyn Scheduler) -> Option<FinishedSession> {
        if !self.is_active() {
            return None;
        }

        if let Some(timer) = self.timer.take() {
            scheduler.cancel(&timer);
        }
        self.status = SessionStatus::Idle;
        self.deadline = None;

        let finished = FinishedSession {
            generation: self.generation,
            reason,
            points: std::mem::take(&mut self.points),
            started_at: self.started_at.take().unwrap_or_else(Utc::now),
            finished_at: Utc::now(),
        };
        debug!(
            generation = finished.generation,
            %reason,
            points = finished.points.len(),
            "Recording session stopped"
        );
        Some(finished)
    }

    /// End the session only if it is still the one numbered `generation`.
    ///
    /// Used by timer callbacks, which may outlive the session that armed them.
    pub fn stop_generation(
        &mut self,
        generation: u64,
        reason: StopReason,
        scheduler: &dyn Scheduler,
    ) -> Option<FinishedSession> {
        if generation != self.generation {
            debug!(
                stale = generation,
                current = self.generation,
                "Ignoring stop for stale session"
            );
            return None;
        }
        self.stop(reason, scheduler)
    }

    /// True while recording.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Current state.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Generation of the most recently started session (0 before any).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Points captured so far in the active session.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// When the active session is due to time out.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the active session times out.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}
