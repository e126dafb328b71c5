//! PostgreSQL-backed `DailyStatsRepository`.
//!
//! Increments are additive upserts, so concurrent poll and reconcile runs
//! never overwrite each other's counters. The average is recomputed from the
//! stored totals afterwards.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;

use super::diesel_basic_error_mapping::{map_diesel_error, map_pool_error};
use super::models::{DailyStatsRow, NewDailyStatsRow, storable_i64, stored_u64};
use super::pool::DbPool;
use super::schema::daily_stats;
use crate::domain::ports::{DailyStatsRepository, StoreError};
use crate::domain::{DailyStats, DailyStatsDelta};

#[derive(Clone)]
pub struct DieselDailyStatsRepository {
    pool: DbPool,
}

impl DieselDailyStatsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_stats(row: DailyStatsRow) -> DailyStats {
    DailyStats {
        date: row.stats_date,
        orders_processed: stored_u64(row.orders_processed),
        orders_failed: stored_u64(row.orders_failed),
        contacts_created: stored_u64(row.contacts_created),
        deals_created: stored_u64(row.deals_created),
        total_amount: row.total_amount,
        total_processing_time_ms: stored_u64(row.total_processing_time_ms),
        avg_processing_time_ms: stored_u64(row.avg_processing_time_ms),
        api_errors_upstream: stored_u64(row.api_errors_upstream),
        api_errors_crm: stored_u64(row.api_errors_crm),
        rate_limit_hits: stored_u64(row.rate_limit_hits),
        reconcile_updates: stored_u64(row.reconcile_updates),
    }
}

fn seed_row(date: NaiveDate, delta: &DailyStatsDelta) -> NewDailyStatsRow {
    let mut seeded = DailyStats::empty(date);
    seeded.apply(delta);
    NewDailyStatsRow {
        stats_date: date,
        orders_processed: storable_i64(seeded.orders_processed),
        orders_failed: storable_i64(seeded.orders_failed),
        contacts_created: storable_i64(seeded.contacts_created),
        deals_created: storable_i64(seeded.deals_created),
        total_amount: seeded.total_amount,
        total_processing_time_ms: storable_i64(seeded.total_processing_time_ms),
        avg_processing_time_ms: storable_i64(seeded.avg_processing_time_ms),
        api_errors_upstream: storable_i64(seeded.api_errors_upstream),
        api_errors_crm: storable_i64(seeded.api_errors_crm),
        rate_limit_hits: storable_i64(seeded.rate_limit_hits),
        reconcile_updates: storable_i64(seeded.reconcile_updates),
        updated_at: Utc::now(),
    }
}

#[async_trait]
impl DailyStatsRepository for DieselDailyStatsRepository {
    async fn find(&self, date: NaiveDate) -> Result<Option<DailyStats>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<DailyStatsRow> = daily_stats::table
            .filter(daily_stats::stats_date.eq(date))
            .select(DailyStatsRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        Ok(row.map(row_to_stats))
    }

    async fn increment(&self, date: NaiveDate, delta: &DailyStatsDelta) -> Result<(), StoreError> {
        use daily_stats::dsl as d;

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        diesel::insert_into(d::daily_stats)
            .values(&seed_row(date, delta))
            .on_conflict(d::stats_date)
            .do_update()
            .set((
                d::orders_processed.eq(d::orders_processed + excluded(d::orders_processed)),
                d::orders_failed.eq(d::orders_failed + excluded(d::orders_failed)),
                d::contacts_created.eq(d::contacts_created + excluded(d::contacts_created)),
                d::deals_created.eq(d::deals_created + excluded(d::deals_created)),
                d::total_amount.eq(d::total_amount + excluded(d::total_amount)),
                d::total_processing_time_ms
                    .eq(d::total_processing_time_ms + excluded(d::total_processing_time_ms)),
                d::api_errors_upstream
                    .eq(d::api_errors_upstream + excluded(d::api_errors_upstream)),
                d::api_errors_crm.eq(d::api_errors_crm + excluded(d::api_errors_crm)),
                d::rate_limit_hits.eq(d::rate_limit_hits + excluded(d::rate_limit_hits)),
                d::reconcile_updates.eq(d::reconcile_updates + excluded(d::reconcile_updates)),
                d::updated_at.eq(excluded(d::updated_at)),
            ))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        diesel::update(
            d::daily_stats
                .filter(d::stats_date.eq(date))
                .filter(d::orders_processed.gt(0)),
        )
        .set(d::avg_processing_time_ms.eq(d::total_processing_time_ms / d::orders_processed))
        .execute(&mut conn)
        .await
        .map(|_| ())
        .map_err(map_diesel_error)
    }
}
