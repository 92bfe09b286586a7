//! Error types for Synheart Insight

use thiserror::Error;

/// Errors that can occur while querying sources or loading configuration.
///
/// Degenerate input (empty series, zero baselines) is never an error; the
/// reducers resolve it to defined zero values.
#[derive(Debug, Error)]
pub enum InsightError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Data source error: {0}")]
    Source(String),

    #[error("Narrative generation failed: {0}")]
    Narrative(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
