//! Series reduction
//!
//! Reduces a series of samples into `{current, average, min, max}` and a
//! trend derived from the change between the first and second half of the
//! series. Input order is not trusted: samples are put in chronological
//! order before anything positional is computed.

use crate::trend::{classify, percent_change};
use crate::types::{MetricStats, Sample};

/// Plain extrema and mean of a set of values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    const ZERO: Summary = Summary {
        count: 0,
        average: 0.0,
        min: 0.0,
        max: 0.0,
    };

    /// Summarize values, skipping non-finite ones. All zero when nothing is left.
    pub fn of(values: impl IntoIterator<Item = f64>) -> Summary {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for value in values.into_iter().filter(|v| v.is_finite()) {
            count += 1;
            sum += value;
            min = min.min(value);
            max = max.max(value);
        }

        if count == 0 {
            return Summary::ZERO;
        }

        // rounding can push the mean just past the extrema
        let average = (sum / count as f64).clamp(min, max);

        Summary {
            count,
            average,
            min,
            max,
        }
    }
}

/// Stateless reducer for metric series
pub struct StatsReducer;

impl StatsReducer {
    /// Reduce a series into its summary statistics and trend
    pub fn reduce(samples: &[Sample]) -> MetricStats {
        reduce(samples)
    }
}

/// Reduce a series into its summary statistics and trend.
///
/// An empty series yields all-zero fields and a Stable trend.
pub fn reduce(samples: &[Sample]) -> MetricStats {
    let ordered = chronological(samples);
    let summary = Summary::of(ordered.iter().map(|s| s.value));
    let current = ordered.last().map(|s| s.value).unwrap_or(0.0);

    MetricStats {
        current,
        average: summary.average,
        min: summary.min,
        max: summary.max,
        trend: classify(half_split_change(&ordered)),
    }
}

/// Percentage change between the mean of the first `floor(n/2)` samples and
/// the mean of the remainder. Expects chronological order.
pub fn half_split_change(ordered: &[Sample]) -> f64 {
    let mid = ordered.len() / 2;
    let (first, second) = ordered.split_at(mid);

    let first_mean = Summary::of(first.iter().map(|s| s.value)).average;
    let second_mean = Summary::of(second.iter().map(|s| s.value)).average;

    percent_change(first_mean, second_mean)
}

/// Finite samples in timestamp order. The sort is stable, so samples sharing
/// a timestamp keep their input order and the later one counts as current.
fn chronological(samples: &[Sample]) -> Vec<Sample> {
    let mut ordered: Vec<Sample> = samples
        .iter()
        .copied()
        .filter(|s| s.value.is_finite())
        .collect();
    ordered.sort_by_key(|s| s.timestamp);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrendDirection;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn t(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    fn series(values: &[f64]) -> Vec<Sample> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Sample::new(t(i as i64), *v))
            .collect()
    }

    #[test]
    fn test_empty_series_is_zero() {
        let stats = reduce(&[]);
        assert_eq!(stats.current, 0.0);
        assert_eq!(stats.average, 0.0);
        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.max, 0.0);
        assert_eq!(stats.trend.direction, TrendDirection::Stable);
    }

    #[test]
    fn test_end_to_end_scenario() {
        let stats = reduce(&series(&[40.0, 50.0, 45.0, 70.0]));

        assert_eq!(stats.current, 70.0);
        assert!((stats.average - 51.25).abs() < 1e-9);
        assert_eq!(stats.min, 40.0);
        assert_eq!(stats.max, 70.0);

        // first half mean 45, second half mean 57.5
        let change = half_split_change(&series(&[40.0, 50.0, 45.0, 70.0]));
        assert!((change - 27.777_777).abs() < 1e-3);
        assert_eq!(stats.trend.direction, TrendDirection::Improving);
        assert_eq!(stats.trend.label, "Improving");
    }

    #[test]
    fn test_current_is_temporally_last() {
        let samples = vec![
            Sample::new(t(3), 70.0),
            Sample::new(t(0), 40.0),
            Sample::new(t(2), 45.0),
            Sample::new(t(1), 50.0),
        ];
        let stats = reduce(&samples);

        assert_eq!(stats.current, 70.0);
        // sorted before splitting, so the trend matches the ordered scenario
        assert_eq!(stats.trend.direction, TrendDirection::Improving);
    }

    #[test]
    fn test_timestamp_tie_prefers_later_position() {
        let samples = vec![Sample::new(t(5), 10.0), Sample::new(t(5), 20.0)];
        assert_eq!(reduce(&samples).current, 20.0);
    }

    #[test]
    fn test_odd_length_gives_first_half_smaller_share() {
        // first half [100], second half [90, 90]
        let change = half_split_change(&series(&[100.0, 90.0, 90.0]));
        assert!((change + 10.0).abs() < 1e-9);
        assert_eq!(reduce(&series(&[100.0, 90.0, 90.0])).trend.direction, TrendDirection::Declining);
    }

    #[test]
    fn test_single_sample_is_stable() {
        let stats = reduce(&series(&[62.0]));
        assert_eq!(stats.current, 62.0);
        assert_eq!(stats.min, 62.0);
        assert_eq!(stats.max, 62.0);
        assert_eq!(stats.trend.direction, TrendDirection::Stable);
    }

    #[test]
    fn test_zero_first_half_is_stable() {
        let stats = reduce(&series(&[0.0, 0.0, 30.0, 80.0]));
        assert_eq!(stats.trend.direction, TrendDirection::Stable);
        assert!(stats.average.is_finite());
    }

    #[test]
    fn test_non_finite_values_are_ignored() {
        let stats = reduce(&series(&[f64::NAN, 40.0, f64::INFINITY, 60.0]));
        assert_eq!(stats.min, 40.0);
        assert_eq!(stats.max, 60.0);
        assert_eq!(stats.average, 50.0);
    }

    #[test]
    fn test_summary_of_repeated_values_stays_within_extrema() {
        let summary = Summary::of(vec![0.1, 0.1, 0.1]);
        assert!(summary.average <= summary.max);
        assert!(summary.average >= summary.min);
    }

    proptest! {
        #[test]
        fn prop_min_le_average_le_max(values in prop::collection::vec(-1.0e6f64..1.0e6, 1..200)) {
            let stats = reduce(&series(&values));
            prop_assert!(stats.min <= stats.average);
            prop_assert!(stats.average <= stats.max);
            prop_assert!(stats.trend.label == "Improving"
                || stats.trend.label == "Declining"
                || stats.trend.label == "Stable");
        }
    }
}
