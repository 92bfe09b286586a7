//! Engine configuration
//!
//! Defaults for queries and refresh behaviour, loadable from a TOML file.
//! Keys missing from the file keep their defaults.

use crate::error::InsightError;
use crate::types::{DEFAULT_SERIES_LIMIT, MAX_SERIES_LIMIT};
use crate::window::{validate_range_hours, DEFAULT_RANGE_HOURS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default auto-refresh interval (5 minutes)
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 300_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    /// Samples requested per series query
    pub default_limit: u32,
    /// Analysis range for insight queries
    pub default_range_hours: u32,
    /// Whether insight views re-poll on their own
    pub auto_refresh: bool,
    pub refresh_interval_ms: u64,
    /// error, warn, info, debug or trace
    pub log_level: String,
    /// pretty or json
    pub log_format: String,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_SERIES_LIMIT,
            default_range_hours: DEFAULT_RANGE_HOURS,
            auto_refresh: false,
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl InsightConfig {
    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self, InsightError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self, InsightError> {
        let config: InsightConfig =
            toml::from_str(raw).map_err(|e| InsightError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, InsightError> {
        toml::to_string_pretty(self).map_err(|e| InsightError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), InsightError> {
        if self.default_limit == 0 || self.default_limit > MAX_SERIES_LIMIT {
            return Err(InsightError::Config(format!(
                "default_limit must be between 1 and {}, got {}",
                MAX_SERIES_LIMIT, self.default_limit
            )));
        }
        validate_range_hours(self.default_range_hours)
            .map_err(|e| InsightError::Config(e.to_string()))?;
        if self.refresh_interval_ms == 0 {
            return Err(InsightError::Config(
                "refresh_interval_ms must be greater than zero".to_string(),
            ));
        }
        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            return Err(InsightError::Config(format!(
                "log_format must be pretty or json, got {}",
                self.log_format
            )));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Polling interval for a live view. An explicit interval wins; otherwise
    /// the configured one applies only when `auto_refresh` is set.
    pub fn polling_interval(&self, explicit: Option<Duration>) -> Option<Duration> {
        explicit
            .filter(|period| !period.is_zero())
            .or_else(|| self.auto_refresh.then(|| self.refresh_interval()))
    }
}
