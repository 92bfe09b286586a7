//! Insight CLI - Command-line interface for Synheart Insight
//!
//! Commands:
//! - summary: Reduce one metric series from a dataset file
//! - compare: Compare the last period against the one before it
//! - watch: Poll a dataset file and stream metric summaries (NDJSON)
//! - config: Print the effective configuration

use clap::{Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use synheart_insight::comparator::compare_at;
use synheart_insight::narrative::{attach_narrative, build_prompt};
use synheart_insight::pipeline::{get_metric_summary, resolve_request, MetricSummary};
use synheart_insight::source::{query_series, JsonFileSource, MetricSource};
use synheart_insight::stats::reduce;
use synheart_insight::types::{MetricKind, SeriesQuery};
use synheart_insight::window::{make_window, validate_range_hours, Clock, FixedClock, SystemClock};
use synheart_insight::{InsightConfig, InsightError, INSIGHT_VERSION, PRODUCER_NAME};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Insight - Metric aggregation and insight engine for wearable signals
#[derive(Parser)]
#[command(name = "insight")]
#[command(author = "Synheart AI Inc")]
#[command(version = INSIGHT_VERSION)]
#[command(about = "Summarize wearable metrics and compare periods", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reduce one metric series from a dataset file
    Summary {
        /// Dataset file (JSON with hrv, sleep and workouts arrays)
        #[arg(short, long)]
        input: PathBuf,

        /// Metric to summarize (hrv, sleep, workout); all metrics when omitted
        #[arg(short, long)]
        metric: Option<MetricKind>,

        /// Only include the last N hours
        #[arg(long)]
        hours: Option<u32>,

        /// Maximum samples to include
        #[arg(long)]
        limit: Option<u32>,

        /// Anchor instant (RFC 3339); defaults to now
        #[arg(long)]
        now: Option<String>,
    },

    /// Compare the last period against the one before it
    Compare {
        /// Dataset file (JSON with hrv, sleep and workouts arrays)
        #[arg(short, long)]
        input: PathBuf,

        /// Period length in hours (1-168)
        #[arg(long)]
        range_hours: Option<u32>,

        /// Anchor instant (RFC 3339); defaults to now
        #[arg(long)]
        now: Option<String>,

        /// Print the recommendation prompt instead of the report
        #[arg(long)]
        prompt: bool,
    },

    /// Poll a dataset file and stream metric summaries as NDJSON
    Watch {
        /// Dataset file, re-read on every refresh
        #[arg(short, long)]
        input: PathBuf,

        /// Metric to summarize (hrv, sleep, workout)
        #[arg(short, long)]
        metric: MetricKind,

        /// Only include the last N hours
        #[arg(long)]
        hours: Option<u32>,

        /// Refresh interval in milliseconds; without it the file is polled
        /// only when auto_refresh is enabled in the configuration
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Stop after this many summaries
        #[arg(long, default_value = "10")]
        count: usize,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), InsightCliError> {
    let config = match &cli.config {
        Some(path) => InsightConfig::load(path)?,
        None => InsightConfig::default(),
    };
    init_logging(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Summary {
            input,
            metric,
            hours,
            limit,
            now,
        } => runtime.block_on(cmd_summary(
            &input,
            metric,
            hours,
            limit.unwrap_or(config.default_limit),
            now.as_deref(),
        )),

        Commands::Compare {
            input,
            range_hours,
            now,
            prompt,
        } => runtime.block_on(cmd_compare(
            &input,
            range_hours.unwrap_or(config.default_range_hours),
            now.as_deref(),
            prompt,
        )),

        Commands::Watch {
            input,
            metric,
            hours,
            interval_ms,
            count,
        } => {
            let interval = config.polling_interval(interval_ms.map(Duration::from_millis));
            runtime.block_on(cmd_watch(
                &input,
                metric,
                hours,
                config.default_limit,
                interval,
                count,
            ))
        }

        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

async fn cmd_summary(
    input: &Path,
    metric: Option<MetricKind>,
    hours: Option<u32>,
    limit: u32,
    now: Option<&str>,
) -> Result<(), InsightCliError> {
    let clock = clock_at(now)?;
    let source = JsonFileSource::new(input, clock.clone());
    let samples = source.load().await?;
    if samples.is_empty() {
        warn!(path = %input.display(), "dataset has no samples");
    }

    let metrics = match metric {
        Some(metric) => vec![metric],
        None => MetricKind::ALL.to_vec(),
    };

    let mut summaries = Vec::with_capacity(metrics.len());
    for metric in metrics {
        let query = SeriesQuery {
            metric,
            window_hours: hours,
            limit,
        };
        let request = resolve_request(&query, clock.now())?;
        let series = query_series(&samples, &request)?;
        let stats = reduce(&series.data);

        summaries.push(serde_json::json!({
            "metric": metric,
            "unit": metric.unit(),
            "from": request.from,
            "to": request.to,
            "returned": series.data.len(),
            "total_count": series.total_count,
            "stats": stats,
        }));
    }

    let output = serde_json::json!({
        "producer": PRODUCER_NAME,
        "summaries": summaries,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn cmd_compare(
    input: &Path,
    range_hours: u32,
    now: Option<&str>,
    prompt: bool,
) -> Result<(), InsightCliError> {
    let range_hours = validate_range_hours(range_hours)?;
    let clock = clock_at(now)?;
    let source = JsonFileSource::new(input, clock.clone());

    if prompt {
        let samples = source.load().await?;
        if samples.is_empty() {
            warn!(path = %input.display(), "dataset has no samples");
        }
        let report = compare_at(&samples, range_hours, clock.now())?;
        println!("{}", serde_json::to_string_pretty(&build_prompt(&report))?);
        return Ok(());
    }

    // No recommendation service is wired into the CLI
    let report = source.fetch_insights(range_hours).await?;
    let report = attach_narrative(report, None).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_watch(
    input: &Path,
    metric: MetricKind,
    hours: Option<u32>,
    limit: u32,
    interval: Option<Duration>,
    count: usize,
) -> Result<(), InsightCliError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    if let Some(hours) = hours {
        make_window(hours, clock.now())?;
    }
    let source: Arc<dyn MetricSource> = Arc::new(JsonFileSource::new(input, clock.clone()));

    let handle = get_metric_summary(source, clock, metric, hours, limit);
    handle.set_auto_refresh(interval);

    let first = handle.settled().await;
    print_ndjson(&first)?;
    let mut emitted = 1;

    if interval.is_none() {
        info!("auto-refresh disabled; pass --interval-ms or set auto_refresh");
        handle.deactivate();
        return Ok(());
    }

    let mut rx = handle.subscribe();
    let mut last_generation = rx.borrow_and_update().generation;

    while emitted < count {
        if rx.changed().await.is_err() {
            break;
        }
        let state = rx.borrow_and_update().clone();
        if state.loading || state.generation == last_generation {
            continue;
        }
        last_generation = state.generation;
        print_ndjson(&MetricSummary::from(state))?;
        emitted += 1;
    }

    handle.deactivate();
    Ok(())
}

// Helper functions

fn print_ndjson(view: &MetricSummary) -> Result<(), InsightCliError> {
    println!(
        "{}",
        serde_json::to_string(&serde_json::json!({
            "stats": view.stats,
            "total_count": view.raw.total_count,
            "loading": view.loading,
            "error": view.error,
        }))?
    );
    Ok(())
}

fn clock_at(now: Option<&str>) -> Result<Arc<dyn Clock>, InsightCliError> {
    match now {
        None => Ok(Arc::new(SystemClock)),
        Some(raw) => {
            let anchor = DateTime::parse_from_rfc3339(raw)
                .map_err(|e| InsightCliError::InvalidTimestamp(format!("{}: {}", raw, e)))?
                .with_timezone(&Utc);
            Ok(Arc::new(FixedClock(anchor)))
        }
    }
}

fn init_logging(config: &InsightConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "synheart_insight={level},insight={level}",
            level = config.log_level
        ))
    });

    let layer = if config.log_format == "json" {
        fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .with_line_number(true)
            .boxed()
    };

    // a second init (e.g. under a test harness) is not an error for the CLI
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}

// Error types

#[derive(Debug)]
enum InsightCliError {
    Io(io::Error),
    Insight(InsightError),
    Json(serde_json::Error),
    InvalidTimestamp(String),
}

impl From<io::Error> for InsightCliError {
    fn from(e: io::Error) -> Self {
        InsightCliError::Io(e)
    }
}

impl From<InsightError> for InsightCliError {
    fn from(e: InsightError) -> Self {
        InsightCliError::Insight(e)
    }
}

impl From<serde_json::Error> for InsightCliError {
    fn from(e: serde_json::Error) -> Self {
        InsightCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<InsightCliError> for CliError {
    fn from(e: InsightCliError) -> Self {
        match e {
            InsightCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            InsightCliError::Insight(InsightError::InvalidQuery(msg)) => CliError {
                code: "INVALID_QUERY".to_string(),
                message: msg,
                hint: Some("Use 1-168 hours and a limit of 1-5000".to_string()),
            },
            InsightCliError::Insight(InsightError::Config(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'insight config' to see valid keys".to_string()),
            },
            InsightCliError::Insight(e) => CliError {
                code: "INSIGHT_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Ensure the dataset has hrv, sleep and workouts arrays".to_string()),
            },
            InsightCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            InsightCliError::InvalidTimestamp(msg) => CliError {
                code: "INVALID_TIMESTAMP".to_string(),
                message: msg,
                hint: Some("Use RFC 3339, e.g. 2024-01-16T12:00:00Z".to_string()),
            },
        }
    }
}
