//! Day windows over the extraction range.
//!
//! The run interval `[start, end)` is cut into consecutive 24-hour slices of
//! absolute elapsed time (no calendar or DST awareness). The final slice is
//! clipped to `end`, so the windows cover the interval with no gaps and no
//! overlaps.

use chrono::{DateTime, Duration, Utc};

/// A half-open `[start, end)` interval, `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ExtractionWindow {
    /// Returns `None` unless `start < end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Inclusive on both ends: refunds stamped exactly at the window end
    /// still belong to it.
    pub fn covers(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// Date label for logging, e.g. `2025-05-22`.
    pub fn label(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }
}

/// Lazy iterator of day windows. Cloning restarts from the current position.
#[derive(Debug, Clone)]
pub struct DayWindows {
    next: DateTime<Utc>,
    end: DateTime<Utc>,
    step: Duration,
}

/// Day windows covering `[start, end)`. Empty when `start >= end`.
pub fn day_windows(start: DateTime<Utc>, end: DateTime<Utc>) -> DayWindows {
    DayWindows {
        next: start,
        end,
        step: Duration::days(1),
    }
}

impl Iterator for DayWindows {
    type Item = ExtractionWindow;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next;
        let end = (start + self.step).min(self.end);
        let window = ExtractionWindow::new(start, end)?;
        self.next = end;
        Some(window)
    }
}
