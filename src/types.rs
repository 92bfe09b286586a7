//! Core types for the Synheart Insight engine
//!
//! This module defines the data structures that flow through the engine:
//! raw samples and series, reduced statistics, period snapshots and the
//! insight report, plus the transient query descriptors sent to a source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default number of samples requested per series query
pub const DEFAULT_SERIES_LIMIT: u32 = 1000;

/// Largest series limit a source accepts
pub const MAX_SERIES_LIMIT: u32 = 5000;

/// Metric family identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    #[serde(rename = "heart_rate_variability", alias = "hrv")]
    Hrv,
    #[serde(rename = "sleep")]
    Sleep,
    #[serde(rename = "workout")]
    Workout,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [MetricKind::Hrv, MetricKind::Sleep, MetricKind::Workout];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Hrv => "heart_rate_variability",
            MetricKind::Sleep => "sleep",
            MetricKind::Workout => "workout",
        }
    }

    /// Unit of the values in a series of this kind
    pub fn unit(&self) -> &'static str {
        match self {
            MetricKind::Hrv => "ms",
            MetricKind::Sleep => "h",
            MetricKind::Workout => "kcal",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hrv" | "heart_rate_variability" => Ok(MetricKind::Hrv),
            "sleep" => Ok(MetricKind::Sleep),
            "workout" | "workouts" => Ok(MetricKind::Workout),
            other => Err(format!("Unsupported metric type: {}", other)),
        }
    }
}

/// A single time-stamped measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Samples for one metric kind as returned by a source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// Samples, ascending by timestamp when the source honours ordering
    pub data: Vec<Sample>,
    /// Number of records matching the query before the limit was applied
    pub total_count: u64,
}

/// One recorded sleep session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepSession {
    pub start_time: DateTime<Utc>,
    /// Total sleep duration (hours)
    pub duration_hours: f64,
    /// Sleep efficiency (percentage, 0-100), when the device reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub efficiency: Option<f64>,
}

/// One recorded workout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSession {
    /// Vendor session identifier, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub start_time: DateTime<Utc>,
    /// Active energy burned (kcal)
    pub calories: f64,
}

/// Raw samples for every tracked metric family
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodSamples {
    #[serde(default)]
    pub hrv: Vec<Sample>,
    #[serde(default)]
    pub sleep: Vec<SleepSession>,
    #[serde(default)]
    pub workouts: Vec<WorkoutSession>,
}

impl PeriodSamples {
    pub fn is_empty(&self) -> bool {
        self.hrv.is_empty() && self.sleep.is_empty() && self.workouts.is_empty()
    }

    /// Project one metric family onto plain samples.
    ///
    /// Sleep maps to session duration in hours, workouts to calories.
    pub fn samples_for(&self, kind: MetricKind) -> Vec<Sample> {
        match kind {
            MetricKind::Hrv => self.hrv.clone(),
            MetricKind::Sleep => self
                .sleep
                .iter()
                .map(|s| Sample::new(s.start_time, s.duration_hours))
                .collect(),
            MetricKind::Workout => self
                .workouts
                .iter()
                .map(|w| Sample::new(w.start_time, w.calories))
                .collect(),
        }
    }
}

/// Qualitative direction of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

/// Direction plus display label. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    pub label: String,
}

/// Compact summary of one series.
///
/// Every numeric field is `0.0` when the series was empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub current: f64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub trend: Trend,
}

/// HRV statistics for one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HrvStats {
    pub avg: f64,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

/// Sleep statistics for one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepStats {
    pub avg_duration_hours: f64,
    /// `None` when no session in the period reported efficiency
    #[serde(default)]
    pub avg_efficiency: Option<f64>,
}

/// Workout statistics for one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutStats {
    pub total_calories: f64,
    pub session_count: u32,
}

/// Reduced statistics for all tracked families over one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSnapshot {
    pub hrv: HrvStats,
    pub sleep: SleepStats,
    pub workout: WorkoutStats,
}

/// Changes between the recent and previous period.
///
/// Units differ per family: HRV is a percentage, sleep is hours and
/// workout is kcal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricChanges {
    pub hrv_change_percent: f64,
    pub sleep_duration_change: f64,
    pub workout_calorie_change: f64,
}

/// Period-over-period comparison with its recommendation text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightReport {
    pub period_hours: u32,
    pub current: PeriodSnapshot,
    pub previous: PeriodSnapshot,
    pub changes: MetricChanges,
    #[serde(default, alias = "insight")]
    pub narrative: String,
}

/// Series subscription parameters.
///
/// `window_hours` is resolved against the clock at fetch time so that a
/// refresh always looks at the latest window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesQuery {
    pub metric: MetricKind,
    pub window_hours: Option<u32>,
    pub limit: u32,
}

impl SeriesQuery {
    pub fn new(metric: MetricKind) -> Self {
        Self {
            metric,
            window_hours: None,
            limit: DEFAULT_SERIES_LIMIT,
        }
    }
}

/// Concrete series request sent to a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesRequest {
    pub metric: MetricKind,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: u32,
}

/// Insight subscription parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightQuery {
    pub range_hours: u32,
}
