use crate::config::ScheduleConfig;
use crate::rotation::RotationOrchestrator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Default stagger for top-of-hour cron expressions (5 minutes).
pub const DEFAULT_TOP_OF_HOUR_STAGGER_MS: u64 = 300_000;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression '{expr}': {message}")]
    InvalidExpression { expr: String, message: String },
    #[error("cron expression '{0}' has no upcoming fire time")]
    Exhausted(String),
}

/// A cron schedule (seconds resolution) with optional stagger delay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationSchedule {
    pub expr: String,
    pub stagger_ms: Option<u64>,
    #[serde(skip)]
    parsed: Option<cron::Schedule>,
}

impl RotationSchedule {
    pub fn parse(expr: &str, stagger_ms: Option<u64>) -> Result<Self, ScheduleError> {
        Ok(Self {
            expr: expr.to_string(),
            stagger_ms,
            parsed: Some(parse_expr(expr)?),
        })
    }

    pub fn from_config(config: &ScheduleConfig) -> Result<Self, ScheduleError> {
        Self::parse(&config.expr, config.stagger_ms)
    }

    /// Next fire time strictly after `after`, before stagger.
    pub fn next_fire(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        let parsed = match &self.parsed {
            Some(parsed) => parsed.clone(),
            None => parse_expr(&self.expr)?,
        };

        parsed
            .after(&after)
            .next()
            .ok_or_else(|| ScheduleError::Exhausted(self.expr.clone()))
    }

    /// How long to sleep from `now` until the next run should start.
    pub fn delay_from(&self, now: DateTime<Utc>) -> Result<Duration, ScheduleError> {
        let next = self.next_fire(now)?;
        let until = (next - now).to_std().unwrap_or(Duration::ZERO);
        Ok(until + apply_stagger(self))
    }
}

fn parse_expr(expr: &str) -> Result<cron::Schedule, ScheduleError> {
    cron::Schedule::from_str(expr).map_err(|e| ScheduleError::InvalidExpression {
        expr: expr.to_string(),
        message: e.to_string(),
    })
}

/// Apply stagger delay before job execution.
/// Returns the duration to sleep before running the task.
pub fn apply_stagger(schedule: &RotationSchedule) -> Duration {
    if let Some(ms) = schedule.stagger_ms {
        return Duration::from_millis(ms);
    }

    // Auto-apply default stagger for top-of-hour cron expressions
    if is_top_of_hour(&schedule.expr) {
        return Duration::from_millis(DEFAULT_TOP_OF_HOUR_STAGGER_MS);
    }

    Duration::ZERO
}

/// Check if a cron expression fires at the top of the hour (second = 0, minute = 0).
fn is_top_of_hour(expr: &str) -> bool {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    if parts.len() >= 6 {
        return parts[0] == "0" && parts[1] == "0";
    }
    false
}

/// Run rotations on `schedule` until Ctrl-C. Runs never overlap: the next
/// fire time is computed only after the previous run has finished.
pub async fn run_schedule(
    orchestrator: &RotationOrchestrator,
    schedule: &RotationSchedule,
) -> Result<(), ScheduleError> {
    info!(
        principal = orchestrator.principal(),
        expr = %schedule.expr,
        "Starting rotation schedule"
    );

    loop {
        let now = Utc::now();
        let delay = schedule.delay_from(now)?;
        info!(
            next_run = %(now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero())),
            "Waiting for next rotation"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                let report = orchestrator.run().await;
                if report.is_aborted() {
                    warn!(principal = %report.principal, "Scheduled rotation aborted; retrying at next fire time");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, stopping schedule");
                return Ok(());
            }
        }
    }
}
