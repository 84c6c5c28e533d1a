//! Core touch types for ghostblock.
//!
//! This module defines the geometry the filter works with (points and
//! blocked circles) and the seam through which touch events arrive.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::{trace, warn};

/// A touch location in device-screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance_to(&self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Finite and non-negative on both axes.
    #[must_use]
    pub fn is_on_screen(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.x >= 0.0 && self.y >= 0.0
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A circle in which touches are suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockedRegion {
    /// Center x coordinate.
    pub x: f64,
    /// Center y coordinate.
    pub y: f64,
    /// Radius in pixels, always > 0 for a valid region.
    pub radius: f64,
}

impl BlockedRegion {
    /// Create a new region.
    #[must_use]
    pub fn new(x: f64, y: f64, radius: f64) -> Self {
        Self { x, y, radius }
    }

    /// Create a region centered on a point.
    #[must_use]
    pub fn around(center: Point, radius: f64) -> Self {
        Self::new(center.x, center.y, radius)
    }

    /// The region's center.
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// True if `point` lies inside the circle, boundary included.
    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        point.distance_to(self.center()) <= self.radius
    }

    /// Finite center and a strictly positive, finite radius.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.radius.is_finite() && self.radius > 0.0
    }
}

impl fmt::Display for BlockedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}) r={}", self.x, self.y, self.radius)
    }
}

/// A raw touch delivered by the input pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchEvent {
    /// Where the touch landed.
    pub point: Point,
    /// When the touch was received.
    pub timestamp: DateTime<Utc>,
}

impl TouchEvent {
    /// Create a touch event stamped with the current time.
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self::at(Point::new(x, y))
    }

    /// Create a touch event for a point, stamped with the current time.
    #[must_use]
    pub fn at(point: Point) -> Self {
        Self {
            point,
            timestamp: Utc::now(),
        }
    }

    /// Parse one line of touch input.
    ///
    /// Accepts `x y`, `x,y` or a JSON object `{"x": .., "y": ..}`. Returns
    /// `None` for anything else, including negative or non-finite coordinates.
    #[must_use]
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        let point = if line.starts_with('{') {
            serde_json::from_str::<Point>(line).ok()?
        } else {
            let mut parts = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|part| !part.is_empty());
            let x = parts.next()?.parse().ok()?;
            let y = parts.next()?.parse().ok()?;
            if parts.next().is_some() {
                return None;
            }
            Point::new(x, y)
        };

        point.is_on_screen().then(|| Self::at(point))
    }
}

/// A source of touch events.
///
/// Implementors wrap whatever delivers raw touches on the host (a device
/// node, a socket, a test fixture) and yield them one at a time.
#[async_trait]
pub trait TouchSource: Send {
    /// The name of this source (for logging).
    fn name(&self) -> &'static str;

    /// Wait for the next touch, or `None` once the source is exhausted.
    async fn next_event(&mut self) -> Option<TouchEvent>;
}

/// Reads one touch per line from any async reader (stdin, a pipe, a file).
///
/// Blank lines are skipped silently; unparseable lines are skipped with a
/// warning.
pub struct LineTouchSource<R> {
    lines: Lines<R>,
    line_number: usize,
}

impl<R: AsyncBufRead + Unpin + Send> LineTouchSource<R> {
    /// Wrap a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
        }
    }
}

impl<R> fmt::Debug for LineTouchSource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineTouchSource")
            .field("line_number", &self.line_number)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> TouchSource for LineTouchSource<R> {
    fn name(&self) -> &'static str {
        "lines"
    }

    async fn next_event(&mut self) -> Option<TouchEvent> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    self.line_number += 1;
                    if line.trim().is_empty() {
                        continue;
                    }
                    if let Some(event) = TouchEvent::parse_line(&line) {
                        trace!(line = self.line_number, point = %event.point, "Read touch");
                        return Some(event);
                    }
                    warn!(line = self.line_number, input = %line, "Skipping unparseable touch");
                }
                Ok(None) => return None,
                Err(e) => {
                    warn!(error = %e, "Touch input failed, treating as end of input");
                    return None;
                }
            }
        }
    }
}
