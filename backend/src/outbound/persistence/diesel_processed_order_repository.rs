//! PostgreSQL-backed `ProcessedOrderRepository`.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::diesel_basic_error_mapping::{map_diesel_error, map_pool_error};
use super::models::{ProcessedOrderRow, ProcessedOrderWrite, storable_i64, stored_u64};
use super::pool::DbPool;
use super::schema::processed_orders;
use crate::domain::ports::{ProcessedOrderRepository, StoreError};
use crate::domain::{
    CrmDealId, OrderCode, OrderFingerprint, OrderState, ProcessedOrder, ProcessedOrderUpsert,
};

#[derive(Clone)]
pub struct DieselProcessedOrderRepository {
    pool: DbPool,
}

impl DieselProcessedOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: ProcessedOrderRow) -> Result<ProcessedOrder, StoreError> {
    let order_code = OrderCode::new(&row.order_code)
        .map_err(|error| StoreError::corrupt(format!("processed order code: {error}")))?;
    let upstream_state = OrderState::new(&row.upstream_state).map_err(|error| {
        StoreError::corrupt(format!("processed order {order_code} state: {error}"))
    })?;
    Ok(ProcessedOrder {
        order_code,
        crm_deal_id: row
            .crm_deal_id
            .and_then(|id| u64::try_from(id).ok())
            .map(CrmDealId::new),
        upstream_state,
        fingerprint: OrderFingerprint::from_stored(row.fingerprint),
        processing_time_ms: stored_u64(row.processing_time_ms),
        retry_count: u32::try_from(row.retry_count).unwrap_or(0),
        last_error: row.last_error,
        last_synced_at: row.last_synced_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

#[async_trait]
impl ProcessedOrderRepository for DieselProcessedOrderRepository {
    async fn find_by_code(&self, code: &OrderCode) -> Result<Option<ProcessedOrder>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<ProcessedOrderRow> = processed_orders::table
            .filter(processed_orders::order_code.eq(code.as_str()))
            .select(ProcessedOrderRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        row.map(row_to_record).transpose()
    }

    async fn upsert(&self, record: &ProcessedOrderUpsert) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let write = ProcessedOrderWrite {
            order_code: record.order_code.as_str(),
            crm_deal_id: record.crm_deal_id.map(|id| storable_i64(id.get())),
            upstream_state: record.upstream_state.as_str(),
            fingerprint: record.fingerprint.as_str(),
            processing_time_ms: storable_i64(record.processing_time_ms),
            retry_count: i32::try_from(record.retry_count).unwrap_or(i32::MAX),
            last_error: record.last_error.as_deref(),
            last_synced_at: record.synced_at,
            updated_at: record.synced_at,
        };

        diesel::insert_into(processed_orders::table)
            .values(&write)
            .on_conflict(processed_orders::order_code)
            .do_update()
            .set(&write)
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }
}
