//! Analysis windows
//!
//! Absolute intervals anchored at an explicit instant. The anchor comes from
//! a [`Clock`] so window computation stays deterministic under test.
//!
//! A comparison splits time at the anchor into a recent window `[T-h, T]`
//! and a previous window `[T-2h, T-h)`, so every instant up to and
//! including `T` belongs to at most one of them.

use crate::error::InsightError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Smallest accepted analysis range in hours
pub const MIN_RANGE_HOURS: u32 = 1;

/// Largest accepted analysis range in hours (one week)
pub const MAX_RANGE_HOURS: u32 = 168;

/// Default analysis range in hours
pub const DEFAULT_RANGE_HOURS: u32 = 24;

/// Source of "now"
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a single instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Time interval used to scope a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    pub fn duration(&self) -> Duration {
        self.to - self.from
    }

    /// Window of equal length ending where this one starts
    pub fn preceding(&self) -> Result<TimeWindow, InsightError> {
        let from = self
            .from
            .checked_sub_signed(self.duration())
            .ok_or_else(|| out_of_range(self.duration().num_hours()))?;
        Ok(TimeWindow { from, to: self.from })
    }

    /// Half-open membership test: `from <= t < to`
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.from && t < self.to
    }

    /// Closed membership test: `from <= t <= to`
    pub fn contains_closed(&self, t: DateTime<Utc>) -> bool {
        t >= self.from && t <= self.to
    }
}

/// Build the window of `hours` ending at `anchor`.
///
/// The range is not clamped to [`MAX_RANGE_HOURS`]; a window reaching past
/// the representable calendar is an `InvalidQuery`.
pub fn make_window(hours: u32, anchor: DateTime<Utc>) -> Result<TimeWindow, InsightError> {
    let from = Duration::try_hours(i64::from(hours))
        .and_then(|span| anchor.checked_sub_signed(span))
        .ok_or_else(|| out_of_range(i64::from(hours)))?;
    Ok(TimeWindow { from, to: anchor })
}

/// Recent window ending at `anchor` and the contiguous window before it
pub fn comparison_windows(
    hours: u32,
    anchor: DateTime<Utc>,
) -> Result<(TimeWindow, TimeWindow), InsightError> {
    let recent = make_window(hours, anchor)?;
    let previous = recent.preceding()?;
    Ok((recent, previous))
}

fn out_of_range(hours: i64) -> InsightError {
    InsightError::InvalidQuery(format!("window of {} hours is out of range", hours))
}

/// Check an analysis range against `[MIN_RANGE_HOURS, MAX_RANGE_HOURS]`
pub fn validate_range_hours(hours: u32) -> Result<u32, InsightError> {
    if (MIN_RANGE_HOURS..=MAX_RANGE_HOURS).contains(&hours) {
        Ok(hours)
    } else {
        Err(InsightError::InvalidQuery(format!(
            "range_hours must be between {} and {}, got {}",
            MIN_RANGE_HOURS, MAX_RANGE_HOURS, hours
        )))
    }
}
