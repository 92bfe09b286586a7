//! Trend classification
//!
//! Maps a percentage change onto a three-way label using fixed, symmetric
//! thresholds. Changes exactly on a threshold are Stable.

use crate::types::{Trend, TrendDirection};

/// Change (percent) above which a metric is Improving
pub const IMPROVING_THRESHOLD_PCT: f64 = 5.0;

/// Change (percent) below which a metric is Declining
pub const DECLINING_THRESHOLD_PCT: f64 = -5.0;

impl TrendDirection {
    pub fn label(&self) -> &'static str {
        match self {
            TrendDirection::Improving => "Improving",
            TrendDirection::Declining => "Declining",
            TrendDirection::Stable => "Stable",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            TrendDirection::Improving => "↑",
            TrendDirection::Declining => "↓",
            TrendDirection::Stable => "→",
        }
    }
}

/// Classify a percentage change. NaN falls through to Stable.
pub fn classify(change_percent: f64) -> Trend {
    let direction = if change_percent > IMPROVING_THRESHOLD_PCT {
        TrendDirection::Improving
    } else if change_percent < DECLINING_THRESHOLD_PCT {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    };

    Trend {
        direction,
        label: direction.label().to_string(),
    }
}

/// Percentage change from `previous` to `current`.
///
/// Returns `0.0` when `previous` is exactly zero or the result is not
/// finite, so infinities and NaN never reach the label layer.
pub fn percent_change(previous: f64, current: f64) -> f64 {
    if previous == 0.0 {
        return 0.0;
    }
    let change = (current - previous) / previous * 100.0;
    if change.is_finite() {
        change
    } else {
        0.0
    }
}
