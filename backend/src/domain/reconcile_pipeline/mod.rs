//! Incremental reconciliation.
//!
//! Re-reads every order modified since the watermark (minus a safety
//! buffer), creates deals the poll run never managed to create, and repairs
//! deals whose upstream content changed. Per-order failures are journalled
//! and never abort the batch.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::daily_stats::DailyStatsDelta;
use super::deal_draft::{DealOrigin, repair_note};
use super::error::SyncError;
use super::error_journal::ErrorKind;
use super::fingerprint::OrderFingerprint;
use super::lock_manager::LockName;
use super::order::{OrderState, UpstreamOrder};
use super::order_sync::OrderSyncError;
use super::pipeline::{RunOutcome, SyncContext};
use super::processed_order::{CrmDealId, ProcessedOrder};
use crate::domain::ports::{DealUpdate, LinkedLineItem, OrderPageRequest, OrderSort, UnlinkTarget};

/// Reconciliation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePipelineConfig {
    /// Upstream states worth reconciling; empty means all.
    pub allowed_states: Vec<OrderState>,
    pub page_size: u32,
    /// Hard ceiling on pages per run.
    pub max_pages: u32,
    pub lock_ttl: Duration,
    /// Subtracted from the stored watermark before listing.
    pub watermark_buffer: TimeDelta,
    /// Catalog used to unlink items the CRM reports without a catalog id.
    pub free_position_catalog_id: Option<u64>,
    pub dry_run: bool,
}

impl Default for ReconcilePipelineConfig {
    fn default() -> Self {
        Self {
            allowed_states: Vec::new(),
            page_size: 100,
            max_pages: 100,
            lock_ttl: Duration::from_secs(15 * 60),
            watermark_buffer: TimeDelta::hours(2),
            free_position_catalog_id: None,
            dry_run: false,
        }
    }
}

/// Counters for one completed reconciliation run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileReport {
    pub checked: u32,
    pub created: u32,
    pub updated: u32,
    pub unchanged: u32,
    pub failed: u32,
    pub pages: u32,
    pub previous_watermark: DateTime<Utc>,
    pub watermark: DateTime<Utc>,
    pub stats: DailyStatsDelta,
}

impl ReconcileReport {
    fn starting_at(watermark: DateTime<Utc>) -> Self {
        Self {
            checked: 0,
            created: 0,
            updated: 0,
            unchanged: 0,
            failed: 0,
            pages: 0,
            previous_watermark: watermark,
            watermark,
            stats: DailyStatsDelta::default(),
        }
    }
}

enum OrderAction {
    Created,
    Updated,
    Unchanged,
}

/// Lock-serialised reconciliation run.
pub struct ReconcilePipeline {
    context: SyncContext,
    config: ReconcilePipelineConfig,
}

impl ReconcilePipeline {
    pub fn new(context: SyncContext, config: ReconcilePipelineConfig) -> Self {
        Self { context, config }
    }

    /// Run one reconciliation batch.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the lock, watermark, or listing fails.
    /// Failing orders are counted in the report instead.
    pub async fn run(&self) -> Result<RunOutcome<ReconcileReport>, SyncError> {
        let acquired = match self
            .context
            .locks
            .acquire(LockName::Reconcile, self.config.lock_ttl)
            .await
        {
            Ok(acquired) => acquired,
            Err(err) => {
                let err = SyncError::from(err);
                self.record_batch_failure(&err, None).await;
                return Err(err);
            }
        };
        if !acquired {
            info!(lock = %LockName::Reconcile, "another reconcile run holds the lock; skipping");
            return Ok(RunOutcome::LockBusy);
        }

        let mut report = None;
        let result = self.run_locked(&mut report).await;
        if let Err(err) = &result {
            self.record_batch_failure(err, report.as_ref()).await;
        }
        self.context.release_quietly(LockName::Reconcile).await;

        let report = result?;
        if !self.config.dry_run && (report.created > 0 || report.updated > 0) {
            self.context
                .alerts
                .info(
                    "Reconciliation results",
                    &format!("created: {}, updated: {}", report.created, report.updated),
                    json!({
                        "checked": report.checked,
                        "created": report.created,
                        "updated": report.updated,
                        "failed": report.failed,
                    }),
                )
                .await;
        }
        Ok(RunOutcome::Completed(report))
    }

    async fn run_locked(
        &self,
        progress: &mut Option<ReconcileReport>,
    ) -> Result<ReconcileReport, SyncError> {
        let stored = self.context.meta.reconcile_watermark().await?;
        let since = stored - self.config.watermark_buffer;
        info!(watermark = %stored, %since, dry_run = self.config.dry_run, "reconcile run started");

        let report = progress.insert(ReconcileReport::starting_at(stored));
        let mut request = OrderPageRequest {
            states: self.config.allowed_states.clone(),
            page: 1,
            page_size: self.config.page_size,
            sort: OrderSort::UpdatedAtAsc,
        };
        let mut latest_seen: Option<DateTime<Utc>> = None;
        loop {
            let page = self
                .context
                .order_source
                .list_orders_updated_after(since, &request)
                .await?;
            report.pages += 1;
            let has_next = page.has_next(&request);
            for order in &page.orders {
                report.checked += 1;
                let modified = order.last_modified_at();
                latest_seen = Some(latest_seen.map_or(modified, |seen| seen.max(modified)));
                self.reconcile_order(order, report).await;
            }
            if !has_next {
                break;
            }
            if request.page >= self.config.max_pages {
                warn!(max_pages = self.config.max_pages, "page ceiling reached while reconciling");
                break;
            }
            request.page += 1;
        }

        // An empty batch still means time moved forward.
        let candidate = latest_seen.unwrap_or_else(|| self.context.clock.utc());
        report.watermark = stored.max(candidate);

        if !self.config.dry_run {
            self.context
                .meta
                .set_reconcile_watermark(report.watermark)
                .await?;
            self.context.stats.record(&report.stats).await?;
        }
        let finished = report.clone();
        // Already persisted; a later failure must not count it twice.
        report.stats = DailyStatsDelta::default();
        if !self.config.dry_run {
            self.context
                .meta
                .add_totals(finished.created + finished.updated, finished.failed)
                .await?;
        }

        info!(
            checked = finished.checked,
            created = finished.created,
            updated = finished.updated,
            unchanged = finished.unchanged,
            failed = finished.failed,
            pages = finished.pages,
            watermark = %finished.watermark,
            "reconcile run finished"
        );
        Ok(finished)
    }

    async fn reconcile_order(&self, order: &UpstreamOrder, report: &mut ReconcileReport) {
        let previous = match self.context.ledger.find(order).await {
            Ok(previous) => previous,
            Err(err) => {
                self.fail_order(order, None, err.into(), report).await;
                return;
            }
        };

        match self.apply(order, previous.as_ref(), report).await {
            Ok(OrderAction::Created) => report.created += 1,
            Ok(OrderAction::Updated) => report.updated += 1,
            Ok(OrderAction::Unchanged) => report.unchanged += 1,
            Err(err) => self.fail_order(order, previous.as_ref(), err, report).await,
        }
    }

    async fn apply(
        &self,
        order: &UpstreamOrder,
        previous: Option<&ProcessedOrder>,
        report: &mut ReconcileReport,
    ) -> Result<OrderAction, OrderSyncError> {
        let Some(deal_id) = previous.and_then(|record| record.crm_deal_id) else {
            return self.create_missing(order, report).await;
        };

        let fingerprint = OrderFingerprint::of(order);
        if previous.is_some_and(|record| record.fingerprint == fingerprint) {
            debug!(order_code = %order.code, "order unchanged");
            return Ok(OrderAction::Unchanged);
        }

        info!(order_code = %order.code, deal_id = %deal_id, "order changed upstream");
        if self.config.dry_run {
            info!(
                order_code = %order.code,
                deal_id = %deal_id,
                price = order.rounded_price(),
                "dry run: would repair deal"
            );
            return Ok(OrderAction::Updated);
        }

        let started_at = self.context.ledger.now();
        self.repair(order, deal_id).await?;
        self.context
            .ledger
            .record_success(order, deal_id, started_at)
            .await?;
        report.stats.reconcile_updates += 1;
        info!(order_code = %order.code, deal_id = %deal_id, "deal repaired");
        Ok(OrderAction::Updated)
    }

    async fn create_missing(
        &self,
        order: &UpstreamOrder,
        report: &mut ReconcileReport,
    ) -> Result<OrderAction, OrderSyncError> {
        info!(order_code = %order.code, "order has no deal; creating");
        if self.config.dry_run {
            let preview = self.context.creator.preview(order)?;
            info!(
                order_code = %order.code,
                contact = %preview.contact_name,
                phone = %preview.masked_phone,
                price = preview.price,
                "dry run: would create missing deal"
            );
            return Ok(OrderAction::Created);
        }

        let started_at = self.context.ledger.now();
        let created = self
            .context
            .creator
            .create(order, DealOrigin::Reconcile)
            .await?;
        let elapsed_ms = self
            .context
            .ledger
            .record_success(order, created.deal_id, started_at)
            .await?;

        report.stats.orders_processed += 1;
        report.stats.deals_created += 1;
        report.stats.contacts_created += u32::from(created.contact_created);
        report.stats.total_amount += order.total_price;
        report.stats.processing_time_ms += elapsed_ms;
        report.stats.reconcile_updates += 1;
        info!(order_code = %order.code, deal_id = %created.deal_id, "missing deal created");
        Ok(OrderAction::Created)
    }

    /// Update the price and, when the order has items, replace the linked
    /// items wholesale and append an audit note.
    async fn repair(&self, order: &UpstreamOrder, deal_id: CrmDealId) -> Result<(), OrderSyncError> {
        let crm = self.context.creator.crm();
        crm.update_deal(
            deal_id,
            &DealUpdate {
                price: order.rounded_price(),
            },
        )
        .await?;

        if order.items.is_empty() {
            return Ok(());
        }

        let snapshot = crm.get_deal(deal_id).await?;
        let targets = self.unlink_targets(deal_id, &snapshot.linked_items);
        if !targets.is_empty() {
            crm.unlink_line_items(deal_id, &targets).await?;
        }
        crm.link_line_items(deal_id, &order.items).await?;
        crm.add_note(deal_id, &repair_note(order)).await?;
        Ok(())
    }

    fn unlink_targets(&self, deal_id: CrmDealId, linked: &[LinkedLineItem]) -> Vec<UnlinkTarget> {
        linked
            .iter()
            .filter_map(|item| {
                let catalog_id = item.catalog_id.or(self.config.free_position_catalog_id);
                if catalog_id.is_none() {
                    warn!(
                        deal_id = %deal_id,
                        element_id = item.element_id,
                        "linked item has no catalog id; leaving it linked"
                    );
                }
                catalog_id.map(|catalog_id| UnlinkTarget {
                    element_id: item.element_id,
                    catalog_id,
                })
            })
            .collect()
    }

    /// Journal a failed order. The stored record is left as it was so a
    /// half-finished repair is retried from scratch on the next pass.
    async fn fail_order(
        &self,
        order: &UpstreamOrder,
        previous: Option<&ProcessedOrder>,
        err: OrderSyncError,
        report: &mut ReconcileReport,
    ) {
        error!(order_code = %order.code, error = %err, "reconcile failed for order");
        report.failed += 1;
        if self.config.dry_run {
            return;
        }
        report.stats.orders_failed += 1;
        err.count_into(&mut report.stats);

        let entry = self
            .context
            .journal
            .entry(ErrorKind::ReconcileError, &err.to_string())
            .with_order(order.code.clone())
            .with_details(json!({
                "orderCode": order.code.as_str(),
                "processedOrder": previous.map(processed_order_details),
            }));
        self.context.journal.record(entry).await;
    }

    async fn record_batch_failure(&self, err: &SyncError, report: Option<&ReconcileReport>) {
        error!(error = %err, "reconcile run failed");
        let details = json!({
            "checked": report.map_or(0, |report| report.checked),
            "created": report.map_or(0, |report| report.created),
            "updated": report.map_or(0, |report| report.updated),
            "failed": report.map_or(0, |report| report.failed),
        });

        if !self.config.dry_run {
            let entry = self
                .context
                .journal
                .entry(ErrorKind::ReconcileCritical, &err.to_string())
                .with_details(details.clone());
            self.context.journal.record(entry).await;

            let mut delta = report.map(|report| report.stats.clone()).unwrap_or_default();
            if let SyncError::OrderSource(_) = err {
                delta.api_errors_upstream += 1;
                delta.rate_limit_hits += u32::from(err.is_rate_limited());
            }
            if let Err(store_err) = self.context.stats.record(&delta).await {
                error!(error = %store_err, "failed to record reconcile stats");
            }

            self.context
                .alerts
                .critical("Reconciliation failed", &err.to_string(), details)
                .await;
        }
    }
}

fn processed_order_details(record: &ProcessedOrder) -> serde_json::Value {
    json!({
        "crmDealId": record.crm_deal_id.map(CrmDealId::get),
        "upstreamState": record.upstream_state.as_str(),
        "fingerprint": record.fingerprint.as_str(),
        "retryCount": record.retry_count,
        "lastError": record.last_error,
    })
}
