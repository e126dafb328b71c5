//! Poll-and-create pipeline.
//!
//! Fetches orders in the configured states, creates a CRM deal for every
//! order without a successful record, and records each outcome so the next
//! run skips finished orders and retries failed ones.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::daily_stats::DailyStatsDelta;
use super::deal_draft::DealOrigin;
use super::error::SyncError;
use super::error_journal::ErrorKind;
use super::lock_manager::LockName;
use super::order::{OrderState, UpstreamOrder};
use super::order_sync::OrderSyncError;
use super::pipeline::{RunOutcome, SyncContext};
use super::processed_order::ProcessedOrder;
use crate::domain::ports::{OrderPageRequest, OrderSort};

/// Poll pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPipelineConfig {
    /// Upstream states worth syncing; empty means all.
    pub allowed_states: Vec<OrderState>,
    pub page_size: u32,
    /// Upper bound on pages fetched per run.
    pub max_pages: u32,
    pub lock_ttl: Duration,
    /// Backlog size that raises one warning alert per run.
    pub backlog_threshold: u32,
    /// Consecutive failed runs that raise a critical alert.
    pub fail_streak: u32,
    pub dry_run: bool,
}

impl Default for PollPipelineConfig {
    fn default() -> Self {
        Self {
            allowed_states: Vec::new(),
            page_size: 100,
            max_pages: 100,
            lock_ttl: Duration::from_secs(5 * 60),
            backlog_threshold: 25,
            fail_streak: 3,
            dry_run: false,
        }
    }
}

/// Counters for one completed poll run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollReport {
    pub fetched: u32,
    pub skipped: u32,
    pub stats: DailyStatsDelta,
}

impl PollReport {
    pub fn processed(&self) -> u32 {
        self.stats.orders_processed
    }

    pub fn failed(&self) -> u32 {
        self.stats.orders_failed
    }

    /// Orders fetched but neither processed nor skipped.
    pub fn backlog(&self) -> u32 {
        self.fetched
            .saturating_sub(self.processed())
            .saturating_sub(self.skipped)
    }
}

/// Lock-serialised poll-and-create run.
pub struct PollPipeline {
    context: SyncContext,
    config: PollPipelineConfig,
}

impl PollPipeline {
    pub fn new(context: SyncContext, config: PollPipelineConfig) -> Self {
        Self { context, config }
    }

    /// Run one poll batch.
    ///
    /// A busy lock is a clean [`RunOutcome::LockBusy`]. Batch-level failures
    /// bump the failure streak, are journalled, and are returned after the
    /// lock has been released.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the lock, listing, or bookkeeping fails.
    pub async fn run(&self) -> Result<RunOutcome<PollReport>, SyncError> {
        let acquired = match self
            .context
            .locks
            .acquire(LockName::Poll, self.config.lock_ttl)
            .await
        {
            Ok(acquired) => acquired,
            Err(err) => {
                let err = SyncError::from(err);
                self.record_batch_failure(&err).await;
                return Err(err);
            }
        };
        if !acquired {
            info!(lock = %LockName::Poll, "another poll run holds the lock; skipping");
            return Ok(RunOutcome::LockBusy);
        }

        info!(
            dry_run = self.config.dry_run,
            states = ?self.config.allowed_states,
            "poll run started"
        );
        let result = self.run_locked().await;
        if let Err(err) = &result {
            self.record_batch_failure(err).await;
        }
        self.context.release_quietly(LockName::Poll).await;
        result.map(RunOutcome::Completed)
    }

    async fn run_locked(&self) -> Result<PollReport, SyncError> {
        let orders = self.fetch_orders().await?;
        let mut report = PollReport {
            fetched: u32::try_from(orders.len()).unwrap_or(u32::MAX),
            ..PollReport::default()
        };

        for order in &orders {
            self.process_order(order, &mut report).await;
        }

        if !self.config.dry_run {
            self.context.stats.record(&report.stats).await?;
            self.context
                .meta
                .add_totals(report.processed(), report.failed())
                .await?;
        }

        let backlog = report.backlog();
        if !self.config.dry_run && backlog > 0 && backlog >= self.config.backlog_threshold {
            self.context
                .alerts
                .warning(
                    "Order backlog",
                    &format!("{backlog} orders were left unprocessed in this poll run"),
                    json!({ "backlog": backlog, "threshold": self.config.backlog_threshold }),
                )
                .await;
        }

        if !self.config.dry_run {
            self.context.meta.reset_failures().await?;
            self.context.meta.touch_heartbeat().await?;
        }

        info!(
            fetched = report.fetched,
            processed = report.processed(),
            failed = report.failed(),
            skipped = report.skipped,
            total_amount = report.stats.total_amount,
            "poll run finished"
        );
        Ok(report)
    }

    async fn fetch_orders(&self) -> Result<Vec<UpstreamOrder>, SyncError> {
        let mut orders = Vec::new();
        let mut request = OrderPageRequest {
            states: self.config.allowed_states.clone(),
            page: 1,
            page_size: self.config.page_size,
            sort: OrderSort::CreatedAtDesc,
        };
        loop {
            let page = self.context.order_source.list_orders(&request).await?;
            let has_next = page.has_next(&request);
            orders.extend(page.orders);
            if !has_next {
                break;
            }
            if request.page >= self.config.max_pages {
                warn!(max_pages = self.config.max_pages, "page ceiling reached while polling");
                break;
            }
            request.page += 1;
        }
        debug!(count = orders.len(), "fetched candidate orders");
        Ok(orders)
    }

    async fn process_order(&self, order: &UpstreamOrder, report: &mut PollReport) {
        let ledger = &self.context.ledger;
        let started_at = ledger.now();

        let previous = match ledger.find(order).await {
            Ok(previous) => previous,
            Err(err) => {
                // No failure row here: without the stored row the upsert would
                // clear an existing deal id.
                self.report_failure(order, None, &err.into(), report).await;
                return;
            }
        };
        if previous
            .as_ref()
            .is_some_and(ProcessedOrder::processed_successfully)
        {
            debug!(order_code = %order.code, "order already synced; skipping");
            report.skipped += 1;
            return;
        }
        if let Some(record) = &previous {
            info!(
                order_code = %order.code,
                retry_count = record.retry_count,
                last_error = record.last_error.as_deref().unwrap_or(""),
                "retrying order"
            );
        }

        if self.config.dry_run {
            match self.context.creator.preview(order) {
                Ok(preview) => {
                    info!(
                        order_code = %order.code,
                        contact = %preview.contact_name,
                        phone = %preview.masked_phone,
                        price = preview.price,
                        items = order.items.len(),
                        "dry run: would create deal"
                    );
                    report.stats.orders_processed += 1;
                    report.stats.total_amount += order.total_price;
                }
                Err(err) => {
                    warn!(order_code = %order.code, error = %err, "dry run: order would fail");
                    report.stats.orders_failed += 1;
                }
            }
            return;
        }

        let created = match self.context.creator.create(order, DealOrigin::Poll).await {
            Ok(created) => created,
            Err(err) => {
                self.fail_order(order, previous.as_ref(), started_at, err, report)
                    .await;
                return;
            }
        };

        match ledger
            .record_success(order, created.deal_id, started_at)
            .await
        {
            Ok(elapsed_ms) => {
                info!(
                    order_code = %order.code,
                    deal_id = %created.deal_id,
                    processing_time_ms = elapsed_ms,
                    "order synced"
                );
                report.stats.orders_processed += 1;
                report.stats.deals_created += 1;
                report.stats.contacts_created += u32::from(created.contact_created);
                report.stats.total_amount += order.total_price;
                report.stats.processing_time_ms += elapsed_ms;
            }
            Err(err) => {
                // No failure record: the deal exists and must not be created again.
                error!(
                    order_code = %order.code,
                    deal_id = %created.deal_id,
                    error = %err,
                    "deal created but outcome could not be stored"
                );
                report.stats.orders_failed += 1;
                let entry = self
                    .context
                    .journal
                    .entry(ErrorKind::OrderError, &err.to_string())
                    .with_order(order.code.clone())
                    .with_details(json!({ "crmDealId": created.deal_id.get() }));
                self.context.journal.record(entry).await;
            }
        }
    }

    async fn fail_order(
        &self,
        order: &UpstreamOrder,
        previous: Option<&ProcessedOrder>,
        started_at: DateTime<Utc>,
        err: OrderSyncError,
        report: &mut PollReport,
    ) {
        if let Err(store_err) = self
            .context
            .ledger
            .record_failure(previous, order, started_at, &err)
            .await
        {
            error!(
                order_code = %order.code,
                error = %store_err,
                "failed to store order failure"
            );
        }
        self.report_failure(order, previous, &err, report).await;
    }

    async fn report_failure(
        &self,
        order: &UpstreamOrder,
        previous: Option<&ProcessedOrder>,
        err: &OrderSyncError,
        report: &mut PollReport,
    ) {
        error!(order_code = %order.code, error = %err, "order sync failed");
        report.stats.orders_failed += 1;
        err.count_into(&mut report.stats);

        let entry = self
            .context
            .journal
            .entry(ErrorKind::OrderError, &err.to_string())
            .with_order(order.code.clone())
            .with_details(json!({
                "retryCount": previous.map_or(1, |record| record.retry_count.saturating_add(1)),
            }));
        self.context.journal.record(entry).await;
    }

    async fn record_batch_failure(&self, err: &SyncError) {
        error!(error = %err, "poll run failed");
        if self.config.dry_run {
            return;
        }

        let failures = match self.context.meta.increment_failures().await {
            Ok(failures) => failures,
            Err(store_err) => {
                error!(error = %store_err, "failed to bump failure streak");
                0
            }
        };

        let entry = self
            .context
            .journal
            .entry(ErrorKind::PollError, &err.to_string())
            .with_details(json!({ "consecutiveFailures": failures }));
        self.context.journal.record(entry).await;

        if let SyncError::OrderSource(_) = err {
            let delta = DailyStatsDelta {
                api_errors_upstream: 1,
                rate_limit_hits: u32::from(err.is_rate_limited()),
                ..DailyStatsDelta::default()
            };
            if let Err(store_err) = self.context.stats.record(&delta).await {
                error!(error = %store_err, "failed to count upstream error");
            }
        }

        if self.config.fail_streak > 0 && failures >= self.config.fail_streak {
            self.context
                .alerts
                .critical(
                    "Poll failing repeatedly",
                    &err.to_string(),
                    json!({ "consecutiveFailures": failures, "threshold": self.config.fail_streak }),
                )
                .await;
        }
    }
}

#[cfg(test)]
mod tests;
