//! Data sources
//!
//! [`MetricSource`] is the seam to whatever transport delivers series and
//! insight reports. Two local implementations are provided: an in-memory
//! dataset and a JSON file that is re-read on every fetch.

use crate::comparator::compare_at;
use crate::error::InsightError;
use crate::narrative::{attach_narrative, NarrativeGenerator};
use crate::types::{
    InsightReport, PeriodSamples, Sample, Series, SeriesRequest, MAX_SERIES_LIMIT,
};
use crate::window::{validate_range_hours, Clock};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Asynchronous provider of series and insight reports
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Samples for one metric kind, ascending by timestamp
    async fn fetch_series(&self, request: &SeriesRequest) -> Result<Series, InsightError>;

    /// Comparison of the last `range_hours` against the period before, with
    /// the narrative already attached
    async fn fetch_insights(&self, range_hours: u32) -> Result<InsightReport, InsightError>;
}

impl SeriesRequest {
    /// Check the limit range and window ordering
    pub fn validate(&self) -> Result<(), InsightError> {
        if self.limit == 0 || self.limit > MAX_SERIES_LIMIT {
            return Err(InsightError::InvalidQuery(format!(
                "limit must be between 1 and {}, got {}",
                MAX_SERIES_LIMIT, self.limit
            )));
        }
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from >= to {
                return Err(InsightError::InvalidQuery(
                    "'from' must be before 'to'".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Answer a series request from a dataset.
///
/// Bounds are inclusive on both ends. `total_count` counts every match
/// before the limit is applied.
pub fn query_series(samples: &PeriodSamples, request: &SeriesRequest) -> Result<Series, InsightError> {
    request.validate()?;

    let mut matched: Vec<Sample> = samples
        .samples_for(request.metric)
        .into_iter()
        .filter(|s| request.from.map_or(true, |from| s.timestamp >= from))
        .filter(|s| request.to.map_or(true, |to| s.timestamp <= to))
        .collect();
    matched.sort_by_key(|s| s.timestamp);

    let total_count = matched.len() as u64;
    matched.truncate(request.limit as usize);

    debug!(
        metric = %request.metric,
        returned = matched.len(),
        total_count,
        "served series query"
    );

    Ok(Series {
        data: matched,
        total_count,
    })
}

async fn insights_from(
    samples: &PeriodSamples,
    range_hours: u32,
    clock: &dyn Clock,
    narrator: Option<&dyn NarrativeGenerator>,
) -> Result<InsightReport, InsightError> {
    let range_hours = validate_range_hours(range_hours)?;
    let report = compare_at(samples, range_hours, clock.now())?;
    Ok(attach_narrative(report, narrator).await)
}

/// Source backed by a dataset held in memory
pub struct InMemorySource {
    samples: RwLock<PeriodSamples>,
    clock: Arc<dyn Clock>,
    narrator: Option<Arc<dyn NarrativeGenerator>>,
}

impl InMemorySource {
    pub fn new(samples: PeriodSamples, clock: Arc<dyn Clock>) -> Self {
        Self {
            samples: RwLock::new(samples),
            clock,
            narrator: None,
        }
    }

    /// Attach the recommendation service used by `fetch_insights`
    pub fn with_narrator(mut self, narrator: Arc<dyn NarrativeGenerator>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    /// Swap the dataset; later fetches see the new samples
    pub fn replace(&self, samples: PeriodSamples) {
        *self.samples.write() = samples;
    }
}

#[async_trait]
impl MetricSource for InMemorySource {
    async fn fetch_series(&self, request: &SeriesRequest) -> Result<Series, InsightError> {
        query_series(&self.samples.read(), request)
    }

    async fn fetch_insights(&self, range_hours: u32) -> Result<InsightReport, InsightError> {
        let samples = self.samples.read().clone();
        insights_from(&samples, range_hours, self.clock.as_ref(), self.narrator.as_deref()).await
    }
}

/// Source backed by a JSON dataset file, re-read on every fetch
pub struct JsonFileSource {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    narrator: Option<Arc<dyn NarrativeGenerator>>,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
            narrator: None,
        }
    }

    pub fn with_narrator(mut self, narrator: Arc<dyn NarrativeGenerator>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the dataset file
    pub async fn load(&self) -> Result<PeriodSamples, InsightError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[async_trait]
impl MetricSource for JsonFileSource {
    async fn fetch_series(&self, request: &SeriesRequest) -> Result<Series, InsightError> {
        let samples = self.load().await?;
        query_series(&samples, request)
    }

    async fn fetch_insights(&self, range_hours: u32) -> Result<InsightReport, InsightError> {
        let samples = self.load().await?;
        insights_from(&samples, range_hours, self.clock.as_ref(), self.narrator.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::UNCONFIGURED_NARRATIVE;
    use crate::types::{MetricKind, SleepSession};
    use crate::window::FixedClock;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::io::Write;

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 16, 12, 0, 0).unwrap()
    }

    fn dataset() -> PeriodSamples {
        PeriodSamples {
            hrv: vec![
                Sample::new(anchor() - Duration::hours(1), 70.0),
                Sample::new(anchor() - Duration::hours(30), 50.0),
                Sample::new(anchor() - Duration::hours(3), 60.0),
            ],
            sleep: vec![SleepSession {
                start_time: anchor() - Duration::hours(14),
                duration_hours: 7.5,
                efficiency: Some(88.0),
            }],
            workouts: vec![],
        }
    }

    fn request(metric: MetricKind) -> SeriesRequest {
        SeriesRequest {
            metric,
            from: None,
            to: None,
            limit: 1000,
        }
    }

    #[test]
    fn test_query_sorts_and_counts_before_limit() {
        let mut req = request(MetricKind::Hrv);
        req.limit = 2;

        let series = query_series(&dataset(), &req).unwrap();
        assert_eq!(series.total_count, 3);
        assert_eq!(series.data.len(), 2);
        assert_eq!(series.data[0].value, 50.0);
        assert_eq!(series.data[1].value, 60.0);
    }

    #[test]
    fn test_query_bounds_are_inclusive() {
        let mut req = request(MetricKind::Hrv);
        req.from = Some(anchor() - Duration::hours(3));
        req.to = Some(anchor() - Duration::hours(1));

        let series = query_series(&dataset(), &req).unwrap();
        assert_eq!(series.total_count, 2);
    }

    #[test]
    fn test_query_sleep_values_are_hours() {
        let series = query_series(&dataset(), &request(MetricKind::Sleep)).unwrap();
        assert_eq!(series.data[0].value, 7.5);
    }

    #[test]
    fn test_request_validation() {
        let mut req = request(MetricKind::Workout);
        req.limit = 0;
        assert!(matches!(req.validate(), Err(InsightError::InvalidQuery(_))));

        req.limit = MAX_SERIES_LIMIT + 1;
        assert!(req.validate().is_err());

        req.limit = MAX_SERIES_LIMIT;
        req.from = Some(anchor());
        req.to = Some(anchor());
        assert!(req.validate().is_err());
    }

    #[tokio::test]
    async fn test_in_memory_insights() {
        let source = InMemorySource::new(dataset(), Arc::new(FixedClock(anchor())));
        let report = source.fetch_insights(24).await.unwrap();

        assert_eq!(report.current.hrv.avg, 65.0);
        assert_eq!(report.previous.hrv.avg, 50.0);
        assert!((report.changes.hrv_change_percent - 30.0).abs() < 1e-9);
        assert_eq!(report.narrative, UNCONFIGURED_NARRATIVE);

        assert!(source.fetch_insights(0).await.is_err());
        assert!(source.fetch_insights(169).await.is_err());
    }

    #[tokio::test]
    async fn test_in_memory_replace() {
        let source = InMemorySource::new(dataset(), Arc::new(FixedClock(anchor())));
        source.replace(PeriodSamples::default());

        let series = source.fetch_series(&request(MetricKind::Hrv)).await.unwrap();
        assert_eq!(series.total_count, 0);
    }

    #[tokio::test]
    async fn test_json_file_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&dataset()).unwrap()).unwrap();

        let source = JsonFileSource::new(file.path(), Arc::new(FixedClock(anchor())));
        let series = source.fetch_series(&request(MetricKind::Hrv)).await.unwrap();
        assert_eq!(series.total_count, 3);

        let missing = JsonFileSource::new("/nonexistent/dataset.json", Arc::new(FixedClock(anchor())));
        assert!(matches!(
            missing.fetch_series(&request(MetricKind::Hrv)).await,
            Err(InsightError::Io(_))
        ));
    }
}
