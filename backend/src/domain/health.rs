//! Health report over the sync-state store.
//!
//! Consumed by the `health` command and the HTTP health endpoint. The report
//! only reads state; `alert_on` turns a bad report into critical alerts.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use serde::Serialize;
use serde_json::json;
use tracing::error;

use super::alerting::AlertService;
use super::daily_stats::{DailyStats, StatsCalendar};
use super::error_journal::ErrorRecord;
use super::sync_meta::SyncMeta;
use crate::domain::ports::{DailyStatsRepository, ErrorLogRepository, StoreError};

/// Limits that turn observations into warnings or errors.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthThresholds {
    pub heartbeat_max_age: TimeDelta,
    pub reconcile_max_age: TimeDelta,
    pub fail_streak: u32,
    /// Failed orders above this share of processed ones warn.
    pub failure_ratio: f64,
    pub rate_limit_hits: u64,
    pub recent_errors: u32,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            heartbeat_max_age: TimeDelta::minutes(5),
            reconcile_max_age: TimeDelta::minutes(20),
            fail_streak: 3,
            failure_ratio: 0.1,
            rate_limit_hits: 10,
            recent_errors: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Warning,
    Error,
}

impl HealthStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgedTimestamp {
    pub timestamp: DateTime<Utc>,
    pub age_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodaySummary {
    pub orders_processed: u64,
    pub orders_failed: u64,
    pub deals_created: u64,
    pub api_errors: u64,
    pub rate_limit_hits: u64,
}

impl From<&DailyStats> for TodaySummary {
    fn from(stats: &DailyStats) -> Self {
        Self {
            orders_processed: stats.orders_processed,
            orders_failed: stats.orders_failed,
            deals_created: stats.deals_created,
            api_errors: stats.api_errors_upstream + stats.api_errors_crm,
            rate_limit_hits: stats.rate_limit_hits,
        }
    }
}

/// An error-log entry with the order code masked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentError {
    pub error_type: String,
    pub message: String,
    pub order_code: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl From<ErrorRecord> for RecentError {
    fn from(record: ErrorRecord) -> Self {
        Self {
            error_type: record.error_type,
            message: record.message,
            order_code: record.order_code.as_deref().map(mask_order_code),
            occurred_at: record.occurred_at,
        }
    }
}

/// `***` followed by the last four characters.
pub fn mask_order_code(code: &str) -> String {
    let tail: String = code
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("***{tail}")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthChecks {
    pub database: bool,
    pub heartbeat: bool,
    pub last_poll: Option<AgedTimestamp>,
    pub last_reconcile: Option<AgedTimestamp>,
    pub consecutive_failures: u32,
    pub today_stats: Option<TodaySummary>,
    pub recent_errors: Vec<RecentError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub checks: HealthChecks,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl HealthReport {
    fn finish(mut self) -> Self {
        self.status = if !self.errors.is_empty() {
            HealthStatus::Error
        } else if !self.warnings.is_empty() {
            HealthStatus::Warning
        } else {
            HealthStatus::Ok
        };
        self
    }
}

/// Builds [`HealthReport`]s.
pub struct HealthReporter {
    meta: SyncMeta,
    daily_stats: Arc<dyn DailyStatsRepository>,
    errors: Arc<dyn ErrorLogRepository>,
    calendar: StatsCalendar,
    clock: Arc<dyn Clock>,
    thresholds: HealthThresholds,
}

impl HealthReporter {
    pub fn new(
        meta: SyncMeta,
        daily_stats: Arc<dyn DailyStatsRepository>,
        errors: Arc<dyn ErrorLogRepository>,
        calendar: StatsCalendar,
        clock: Arc<dyn Clock>,
        thresholds: HealthThresholds,
    ) -> Self {
        Self {
            meta,
            daily_stats,
            errors,
            calendar,
            clock,
            thresholds,
        }
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Assemble the report. Store failures become an `error` status rather
    /// than an `Err`.
    pub async fn report(&self) -> HealthReport {
        let now = self.clock.utc();
        let report = HealthReport {
            status: HealthStatus::Ok,
            timestamp: now,
            checks: HealthChecks::default(),
            warnings: Vec::new(),
            errors: Vec::new(),
        };
        match self.collect(report.clone(), now).await {
            Ok(report) => report.finish(),
            Err(err) => {
                error!(error = %err, "health check could not read the store");
                let mut report = report;
                report.errors.push(format!("database check failed: {err}"));
                report.finish()
            }
        }
    }

    async fn collect(
        &self,
        mut report: HealthReport,
        now: DateTime<Utc>,
    ) -> Result<HealthReport, StoreError> {
        let heartbeat = self.meta.last_heartbeat().await?;
        report.checks.database = true;

        if let Some(at) = heartbeat {
            let aged = aged(at, now);
            if now.signed_duration_since(at) > self.thresholds.heartbeat_max_age {
                report.warnings.push(format!(
                    "last poll was {} minutes ago (threshold: {})",
                    aged.age_minutes,
                    self.thresholds.heartbeat_max_age.num_minutes()
                ));
            } else {
                report.checks.heartbeat = true;
            }
            report.checks.last_poll = Some(aged);
        }

        if let Some(at) = self.meta.stored_reconcile_watermark().await? {
            let aged = aged(at, now);
            if now.signed_duration_since(at) > self.thresholds.reconcile_max_age {
                report.warnings.push(format!(
                    "reconcile watermark is {} minutes old",
                    aged.age_minutes
                ));
            }
            report.checks.last_reconcile = Some(aged);
        }

        let failures = self.meta.consecutive_failures().await?;
        report.checks.consecutive_failures = failures;
        if failures >= self.thresholds.fail_streak {
            report
                .errors
                .push(format!("too many consecutive failures: {failures}"));
        }

        if let Some(stats) = self.daily_stats.find(self.calendar.date_of(now)).await? {
            #[expect(
                clippy::cast_precision_loss,
                reason = "daily order counts are far below f64 precision limits"
            )]
            let failure_limit = stats.orders_processed as f64 * self.thresholds.failure_ratio;
            #[expect(
                clippy::cast_precision_loss,
                reason = "daily order counts are far below f64 precision limits"
            )]
            let failed = stats.orders_failed as f64;
            if failed > failure_limit {
                report.warnings.push(format!(
                    "high failure rate: {}/{}",
                    stats.orders_failed, stats.orders_processed
                ));
            }
            if stats.rate_limit_hits > self.thresholds.rate_limit_hits {
                report
                    .warnings
                    .push(format!("high rate limit hits: {}", stats.rate_limit_hits));
            }
            report.checks.today_stats = Some(TodaySummary::from(&stats));
        }

        report.checks.recent_errors = self
            .errors
            .recent(self.thresholds.recent_errors)
            .await?
            .into_iter()
            .map(RecentError::from)
            .collect();
        Ok(report)
    }

    /// Raise critical alerts for a stale heartbeat or a crossed failure
    /// streak. Returns how many alerts were raised.
    pub async fn alert_on(&self, report: &HealthReport, alerts: &AlertService) -> u32 {
        let mut raised = 0;
        if let Some(poll) = &report.checks.last_poll {
            if !report.checks.heartbeat {
                let sent = alerts
                    .critical(
                        "Heartbeat expired",
                        &format!("last activity was {} minutes ago", poll.age_minutes),
                        json!({
                            "lastHeartbeat": poll.timestamp.to_rfc3339(),
                            "thresholdMinutes": self.thresholds.heartbeat_max_age.num_minutes(),
                        }),
                    )
                    .await;
                raised += u32::from(sent);
            }
        }
        let failures = report.checks.consecutive_failures;
        if failures >= self.thresholds.fail_streak {
            let sent = alerts
                .critical(
                    "Repeated failures",
                    &format!("{failures} consecutive failed runs"),
                    json!({
                        "consecutiveFailures": failures,
                        "threshold": self.thresholds.fail_streak,
                    }),
                )
                .await;
            raised += u32::from(sent);
        }
        raised
    }
}

fn aged(at: DateTime<Utc>, now: DateTime<Utc>) -> AgedTimestamp {
    AgedTimestamp {
        timestamp: at,
        age_minutes: now.signed_duration_since(at).num_minutes(),
    }
}
