//! Synheart Insight - Metric aggregation and insight engine for wearable signals
//!
//! Insight turns time-stamped HRV, sleep and workout measurements into two
//! products: a compact per-metric summary (current, average, min/max and a
//! trend label) and a period-over-period comparison that drives a short
//! recommendation.
//!
//! ## Modules
//!
//! - **Reduction**: [`stats`], [`trend`] and [`comparator`] are pure functions
//!   over ordered samples
//! - **Windows**: [`window`] builds analysis intervals from an injectable clock
//! - **Refresh**: [`refresh`] keeps a derived view consistent with an async
//!   source under overlapping fetches and periodic polling
//! - **Views**: [`pipeline`] exposes the metric summary and insight subscriptions

pub mod comparator;
pub mod config;
pub mod error;
pub mod narrative;
pub mod pipeline;
pub mod refresh;
pub mod source;
pub mod stats;
pub mod trend;
pub mod types;
pub mod window;

pub use comparator::{compare, compare_at, PeriodComparator};
pub use config::InsightConfig;
pub use error::InsightError;
pub use pipeline::{get_insights, get_metric_summary, InsightView, MetricSummary};
pub use refresh::{Fetcher, RefreshController, RefreshState};
pub use source::{InMemorySource, JsonFileSource, MetricSource};
pub use stats::{reduce, StatsReducer};
pub use trend::classify;
pub use window::{make_window, Clock, FixedClock, SystemClock, TimeWindow};

/// Insight version
pub const INSIGHT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name recorded in CLI output
pub const PRODUCER_NAME: &str = "synheart-insight";
