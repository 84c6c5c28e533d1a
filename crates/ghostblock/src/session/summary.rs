//! What a finished session reports back to the user.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{FinishedSession, StopReason};
use crate::touch::Point;

/// Report produced when a session ends manually or by timing out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    /// How the session ended.
    pub reason: StopReason,
    /// Total number of captured points.
    pub point_count: usize,
    /// The first few captured points, for display.
    pub first_points: Vec<Point>,
    /// Regions added to the blocked set as a result of this session.
    pub promoted: usize,
    /// Set when promotion was attempted but could not be persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_error: Option<String>,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Wall-clock end.
    pub finished_at: DateTime<Utc>,
}

impl SessionSummary {
    /// Summarize a finished session, keeping at most `preview` points.
    #[must_use]
    pub fn new(finished: &FinishedSession, preview: usize) -> Self {
        Self {
            reason: finished.reason,
            point_count: finished.points.len(),
            first_points: finished.points.iter().take(preview).copied().collect(),
            promoted: 0,
            promotion_error: None,
            started_at: finished.started_at,
            finished_at: finished.finished_at,
        }
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Recording {}: {} point(s) captured",
            self.reason, self.point_count
        )?;
        if !self.first_points.is_empty() {
            let preview: Vec<String> = self.first_points.iter().map(Point::to_string).collect();
            write!(f, ", first: {}", preview.join(" "))?;
            if self.point_count > self.first_points.len() {
                write!(f, " ...")?;
            }
        }
        write!(f, "; {} region(s) added", self.promoted)?;
        if let Some(error) = &self.promotion_error {
            write!(f, " (not saved: {error})")?;
        }
        Ok(())
    }
}
