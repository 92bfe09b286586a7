//! Period-over-period comparison
//!
//! This module reduces two windows of raw samples into period snapshots and
//! derives change metrics between them:
//! - HRV: mean/min/max and a percentage change of the mean
//! - Sleep: mean duration and efficiency, absolute change in hours
//! - Workout: calorie total and session count, absolute change in kcal

use crate::error::InsightError;
use crate::stats::Summary;
use crate::trend::percent_change;
use crate::types::{
    HrvStats, InsightReport, MetricChanges, PeriodSamples, PeriodSnapshot, Sample, SleepSession,
    SleepStats, WorkoutSession, WorkoutStats,
};
use crate::window::{comparison_windows, TimeWindow};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Comparator for two contiguous periods
pub struct PeriodComparator;

impl PeriodComparator {
    /// Compare recent samples against the preceding period.
    ///
    /// The narrative is left empty for the recommendation collaborator.
    pub fn compare(
        recent: &PeriodSamples,
        previous: &PeriodSamples,
        period_hours: u32,
    ) -> InsightReport {
        compare(recent, previous, period_hours)
    }
}

/// Compare recent samples against the preceding period
pub fn compare(recent: &PeriodSamples, previous: &PeriodSamples, period_hours: u32) -> InsightReport {
    let current = snapshot(recent);
    let previous = snapshot(previous);
    let changes = changes_between(&current, &previous);

    InsightReport {
        period_hours,
        current,
        previous,
        changes,
        narrative: String::new(),
    }
}

/// Partition a full sample set into the recent window `[T-h, T]` ending at
/// `anchor` and the window `[T-2h, T-h)` before it, then compare them.
pub fn compare_at(
    samples: &PeriodSamples,
    period_hours: u32,
    anchor: DateTime<Utc>,
) -> Result<InsightReport, InsightError> {
    let (recent_window, previous_window) = comparison_windows(period_hours, anchor)?;
    let recent = select(samples, |t| recent_window.contains_closed(t));
    let previous = within(samples, &previous_window);
    Ok(compare(&recent, &previous, period_hours))
}

/// Samples of every family that fall inside the half-open `window`
pub fn within(samples: &PeriodSamples, window: &TimeWindow) -> PeriodSamples {
    select(samples, |t| window.contains(t))
}

fn select(samples: &PeriodSamples, keep: impl Fn(DateTime<Utc>) -> bool) -> PeriodSamples {
    PeriodSamples {
        hrv: samples
            .hrv
            .iter()
            .filter(|s| keep(s.timestamp))
            .copied()
            .collect(),
        sleep: samples
            .sleep
            .iter()
            .filter(|s| keep(s.start_time))
            .cloned()
            .collect(),
        workouts: samples
            .workouts
            .iter()
            .filter(|w| keep(w.start_time))
            .cloned()
            .collect(),
    }
}

/// Reduce one period's samples into a snapshot
pub fn snapshot(samples: &PeriodSamples) -> PeriodSnapshot {
    PeriodSnapshot {
        hrv: hrv_stats(&samples.hrv),
        sleep: sleep_stats(&samples.sleep),
        workout: workout_stats(&samples.workouts),
    }
}

fn changes_between(current: &PeriodSnapshot, previous: &PeriodSnapshot) -> MetricChanges {
    MetricChanges {
        hrv_change_percent: percent_change(previous.hrv.avg, current.hrv.avg),
        sleep_duration_change: current.sleep.avg_duration_hours
            - previous.sleep.avg_duration_hours,
        workout_calorie_change: current.workout.total_calories - previous.workout.total_calories,
    }
}

fn hrv_stats(samples: &[Sample]) -> HrvStats {
    let summary = Summary::of(samples.iter().map(|s| s.value));
    HrvStats {
        avg: summary.average,
        min: Some(summary.min),
        max: Some(summary.max),
    }
}

fn sleep_stats(sessions: &[SleepSession]) -> SleepStats {
    let duration = Summary::of(sessions.iter().map(|s| s.duration_hours));

    // zero is a meaningful efficiency, so absence stays None
    let efficiency = Summary::of(sessions.iter().filter_map(|s| s.efficiency));
    let avg_efficiency = (efficiency.count > 0).then_some(efficiency.average);

    SleepStats {
        avg_duration_hours: duration.average,
        avg_efficiency,
    }
}

fn workout_stats(sessions: &[WorkoutSession]) -> WorkoutStats {
    let mut seen = HashSet::new();
    let mut total_calories = 0.0;
    let mut session_count = 0u32;

    for session in sessions {
        let key = match &session.id {
            Some(id) => SessionKey::Id(id.as_str()),
            None => SessionKey::Start(session.start_time),
        };
        if !seen.insert(key) {
            continue;
        }
        session_count += 1;
        if session.calories.is_finite() {
            total_calories += session.calories;
        }
    }

    WorkoutStats {
        total_calories,
        session_count,
    }
}

#[derive(Hash, PartialEq, Eq)]
enum SessionKey<'a> {
    Id(&'a str),
    Start(DateTime<Utc>),
}
