//! Reactive views
//!
//! This module provides the public surface consumed by presentation code.
//! Each view owns an independent [`RefreshController`]:
//!
//! - [`get_metric_summary`]: one metric series reduced to summary statistics,
//!   re-fetched whenever its window or limit changes
//! - [`get_insights`]: the period-over-period insight report, optionally
//!   re-fetched on a fixed interval

use crate::error::InsightError;
use crate::refresh::{FetchHandle, Fetcher, RefreshController, RefreshState};
use crate::source::MetricSource;
use crate::stats::reduce;
use crate::types::{
    InsightQuery, InsightReport, MetricKind, MetricStats, Series, SeriesQuery, SeriesRequest,
};
use crate::window::{make_window, Clock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Raw series together with its reduction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReducedSeries {
    pub stats: MetricStats,
    pub raw: Series,
}

impl ReducedSeries {
    pub fn new(raw: Series) -> Self {
        Self {
            stats: reduce(&raw.data),
            raw,
        }
    }
}

/// Turn subscription parameters into a concrete request anchored at `now`
pub fn resolve_request(
    query: &SeriesQuery,
    now: DateTime<Utc>,
) -> Result<SeriesRequest, InsightError> {
    let window = query
        .window_hours
        .map(|hours| make_window(hours, now))
        .transpose()?;
    Ok(SeriesRequest {
        metric: query.metric,
        from: window.map(|w| w.from),
        to: window.map(|w| w.to),
        limit: query.limit,
    })
}

/// Fetches a series and reduces it once per fetch
pub struct SeriesFetcher {
    source: Arc<dyn MetricSource>,
    clock: Arc<dyn Clock>,
}

impl SeriesFetcher {
    pub fn new(source: Arc<dyn MetricSource>, clock: Arc<dyn Clock>) -> Self {
        Self { source, clock }
    }
}

#[async_trait]
impl Fetcher<SeriesQuery> for SeriesFetcher {
    type Output = ReducedSeries;

    async fn fetch(&self, query: &SeriesQuery) -> Result<ReducedSeries, InsightError> {
        let request = resolve_request(query, self.clock.now())?;
        let raw = self.source.fetch_series(&request).await?;
        Ok(ReducedSeries::new(raw))
    }
}

/// Fetches the insight report for a range
pub struct InsightFetcher {
    source: Arc<dyn MetricSource>,
}

impl InsightFetcher {
    pub fn new(source: Arc<dyn MetricSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Fetcher<InsightQuery> for InsightFetcher {
    type Output = InsightReport;

    async fn fetch(&self, query: &InsightQuery) -> Result<InsightReport, InsightError> {
        self.source.fetch_insights(query.range_hours).await
    }
}

/// What a metric card renders
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub stats: MetricStats,
    pub raw: Series,
    pub loading: bool,
    pub error: Option<String>,
}

impl From<RefreshState<SeriesQuery, ReducedSeries>> for MetricSummary {
    fn from(state: RefreshState<SeriesQuery, ReducedSeries>) -> Self {
        let reduced = state
            .data
            .unwrap_or_else(|| ReducedSeries::new(Series::default()));
        Self {
            stats: reduced.stats,
            raw: reduced.raw,
            loading: state.loading,
            error: state.error,
        }
    }
}

/// Live metric summary subscription
pub struct MetricSummaryHandle {
    controller: RefreshController<SeriesQuery, SeriesFetcher>,
}

impl MetricSummaryHandle {
    pub fn view(&self) -> MetricSummary {
        self.controller.snapshot().into()
    }

    /// Wait for the outstanding fetch, if any, and return the view
    pub async fn settled(&self) -> MetricSummary {
        self.controller.settled().await.into()
    }

    pub fn query(&self) -> SeriesQuery {
        self.controller.snapshot().params
    }

    /// Change the window; re-fetches only when it differs
    pub fn set_window(&self, window_hours: Option<u32>) -> Option<FetchHandle> {
        if self.query().window_hours == window_hours {
            return None;
        }
        self.controller
            .update_params(|query| query.window_hours = window_hours)
    }

    /// Change the limit; re-fetches only when it differs
    pub fn set_limit(&self, limit: u32) -> Option<FetchHandle> {
        if self.query().limit == limit {
            return None;
        }
        self.controller.update_params(|query| query.limit = limit)
    }

    pub fn refresh(&self) -> Option<FetchHandle> {
        self.controller.refresh()
    }

    pub fn set_auto_refresh(&self, interval: Option<Duration>) {
        self.controller.set_auto_refresh(interval);
    }

    pub fn subscribe(&self) -> watch::Receiver<RefreshState<SeriesQuery, ReducedSeries>> {
        self.controller.subscribe()
    }

    /// Resume a deactivated view with its last parameters and interval
    pub fn activate(&self) -> Option<FetchHandle> {
        self.controller.activate()
    }

    pub fn deactivate(&self) {
        self.controller.deactivate();
    }
}

/// Subscribe to one metric series.
///
/// The first fetch starts immediately, so this must be called from within a
/// Tokio runtime.
pub fn get_metric_summary(
    source: Arc<dyn MetricSource>,
    clock: Arc<dyn Clock>,
    metric: MetricKind,
    window_hours: Option<u32>,
    limit: u32,
) -> MetricSummaryHandle {
    let query = SeriesQuery {
        metric,
        window_hours,
        limit,
    };
    let controller = RefreshController::new(SeriesFetcher::new(source, clock), query);
    controller.activate();
    MetricSummaryHandle { controller }
}

/// What the insight panel renders
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightView {
    pub report: Option<InsightReport>,
    pub loading: bool,
    pub error: Option<String>,
}

impl From<RefreshState<InsightQuery, InsightReport>> for InsightView {
    fn from(state: RefreshState<InsightQuery, InsightReport>) -> Self {
        Self {
            report: state.data,
            loading: state.loading,
            error: state.error,
        }
    }
}

/// Live insight subscription
pub struct InsightsHandle {
    controller: RefreshController<InsightQuery, InsightFetcher>,
}

impl InsightsHandle {
    pub fn view(&self) -> InsightView {
        self.controller.snapshot().into()
    }

    pub async fn settled(&self) -> InsightView {
        self.controller.settled().await.into()
    }

    pub fn range_hours(&self) -> u32 {
        self.controller.snapshot().params.range_hours
    }

    /// Change the analysis range; re-fetches only when it differs
    pub fn set_range_hours(&self, range_hours: u32) -> Option<FetchHandle> {
        if self.range_hours() == range_hours {
            return None;
        }
        self.controller.set_params(InsightQuery { range_hours })
    }

    /// Enable or disable periodic refresh
    pub fn set_auto_refresh(&self, enabled: bool, interval: Duration) {
        self.controller
            .set_auto_refresh(enabled.then_some(interval));
    }

    pub fn refresh(&self) -> Option<FetchHandle> {
        self.controller.refresh()
    }

    pub fn subscribe(&self) -> watch::Receiver<RefreshState<InsightQuery, InsightReport>> {
        self.controller.subscribe()
    }

    pub fn activate(&self) -> Option<FetchHandle> {
        self.controller.activate()
    }

    pub fn deactivate(&self) {
        self.controller.deactivate();
    }
}

/// Subscribe to the insight report for the last `range_hours`.
///
/// Must be called from within a Tokio runtime.
pub fn get_insights(
    source: Arc<dyn MetricSource>,
    range_hours: u32,
    auto_refresh: bool,
    refresh_interval: Duration,
) -> InsightsHandle {
    let controller = RefreshController::new(InsightFetcher::new(source), InsightQuery { range_hours });
    controller.set_auto_refresh(auto_refresh.then_some(refresh_interval));
    controller.activate();
    InsightsHandle { controller }
}
