//! PostgreSQL-backed `ErrorLogRepository`.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::diesel_basic_error_mapping::{map_diesel_error, map_pool_error};
use super::models::{ErrorLogRow, NewErrorLogRow};
use super::pool::DbPool;
use super::schema::error_log;
use crate::domain::ports::{ErrorLogRepository, StoreError};
use crate::domain::{ErrorRecord, NewErrorRecord};

#[derive(Clone)]
pub struct DieselErrorLogRepository {
    pool: DbPool,
}

impl DieselErrorLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: ErrorLogRow) -> ErrorRecord {
    ErrorRecord {
        id: row.id,
        error_type: row.error_type,
        message: row.message,
        details: row.details,
        order_code: row.order_code,
        occurred_at: row.occurred_at,
    }
}

#[async_trait]
impl ErrorLogRepository for DieselErrorLogRepository {
    async fn append(&self, entry: &NewErrorRecord) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row = NewErrorLogRow {
            error_type: entry.kind.as_str(),
            message: &entry.message,
            details: entry.details.as_ref(),
            order_code: entry.order_code.as_ref().map(|code| code.as_str()),
            occurred_at: entry.occurred_at,
        };
        diesel::insert_into(error_log::table)
            .values(&row)
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn recent(&self, limit: u32) -> Result<Vec<ErrorRecord>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let rows: Vec<ErrorLogRow> = error_log::table
            .order((error_log::occurred_at.desc(), error_log::id.desc()))
            .limit(i64::from(limit))
            .select(ErrorLogRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(rows.into_iter().map(row_to_record).collect())
    }
}
