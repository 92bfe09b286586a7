//! Recommendation narrative
//!
//! The recommendation text is produced by an external text-generation
//! service. This module only builds the prompt that service receives and
//! decides what the report carries when the service is missing or fails.

use crate::error::InsightError;
use crate::types::{InsightReport, PeriodSnapshot};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// System prompt sent with every recommendation request
pub const SYSTEM_PROMPT: &str = "You are a holistic health coach. Provide concise, actionable \
health recommendations based on biometric trends.";

/// Narrative used when no generator is configured
pub const UNCONFIGURED_NARRATIVE: &str =
    "AI insights temporarily unavailable. Please configure a recommendation service.";

/// Narrative used when the generator fails
pub const FAILED_NARRATIVE: &str = "AI insights temporarily unavailable. Analysis shows your \
metrics are being tracked successfully.";

/// Prompt handed to the recommendation service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativePrompt {
    pub system: String,
    pub user: String,
}

/// External text-generation collaborator.
///
/// Implementations receive the finished statistics and return the
/// recommendation text. The engine treats them as opaque.
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn generate(&self, prompt: &NarrativePrompt) -> Result<String, InsightError>;
}

/// Build the prompt describing both periods of a report
pub fn build_prompt(report: &InsightReport) -> NarrativePrompt {
    let hours = report.period_hours;
    let user = format!(
        "Last {hours}h: {current_line} \
         (HRV {change:+.1}% change).\n\n\
         Previous {hours}h: {previous_line}.\n\n\
         Provide a single holistic health recommendation based on these trends.",
        current_line = describe_period(&report.current),
        change = report.changes.hrv_change_percent,
        previous_line = describe_period(&report.previous),
    );

    NarrativePrompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

fn describe_period(snapshot: &PeriodSnapshot) -> String {
    let efficiency = snapshot
        .sleep
        .avg_efficiency
        .map(|e| format!("{:.0}%", e))
        .unwrap_or_else(|| "n/a".to_string());

    format!(
        "HRV avg {:.1}ms, Sleep avg {:.1}h (efficiency {}), Workout burned {:.0}kcal in {} sessions",
        snapshot.hrv.avg,
        snapshot.sleep.avg_duration_hours,
        efficiency,
        snapshot.workout.total_calories,
        snapshot.workout.session_count,
    )
}

/// Fill the report's narrative from `generator`, falling back to a fixed
/// message when there is no generator or it fails.
pub async fn attach_narrative(
    mut report: InsightReport,
    generator: Option<&dyn NarrativeGenerator>,
) -> InsightReport {
    report.narrative = match generator {
        None => UNCONFIGURED_NARRATIVE.to_string(),
        Some(generator) => match generator.generate(&build_prompt(&report)).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "narrative generation failed, using fallback");
                FAILED_NARRATIVE.to_string()
            }
        },
    };
    report
}
