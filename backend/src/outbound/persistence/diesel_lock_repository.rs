//! PostgreSQL-backed `LockRepository`.
//!
//! Acquisition is one `INSERT ... ON CONFLICT DO UPDATE ... WHERE` statement:
//! the row is created when missing and overwritten only when it expired, so
//! concurrent callers cannot both win.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;

use super::diesel_basic_error_mapping::{map_diesel_error, map_pool_error};
use super::models::{LockRow, LockWrite};
use super::pool::DbPool;
use super::schema::sync_locks;
use crate::domain::LockName;
use crate::domain::ports::{LockRecord, LockRepository, StoreError};

#[derive(Clone)]
pub struct DieselLockRepository {
    pool: DbPool,
}

impl DieselLockRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: LockRow) -> LockRecord {
    LockRecord {
        name: row.name,
        holder: row.holder,
        locked_until: row.locked_until,
        updated_at: row.updated_at,
    }
}

#[async_trait]
impl LockRepository for DieselLockRepository {
    async fn try_acquire(
        &self,
        name: LockName,
        holder: &str,
        now: DateTime<Utc>,
        locked_until: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let write = LockWrite {
            name: name.as_str(),
            holder,
            locked_until,
            updated_at: now,
        };
        let upsert = diesel::insert_into(sync_locks::table)
            .values(&write)
            .on_conflict(sync_locks::name)
            .do_update()
            .set((
                sync_locks::holder.eq(excluded(sync_locks::holder)),
                sync_locks::locked_until.eq(excluded(sync_locks::locked_until)),
                sync_locks::updated_at.eq(excluded(sync_locks::updated_at)),
            ));
        // Only an expired row may be taken over.
        let affected =
            diesel::query_dsl::methods::FilterDsl::filter(upsert, sync_locks::locked_until.lt(now))
                .execute(&mut conn)
                .await
                .map_err(map_diesel_error)?;

        Ok(affected == 1)
    }

    async fn find(&self, name: LockName) -> Result<Option<LockRecord>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<LockRow> = sync_locks::table
            .filter(sync_locks::name.eq(name.as_str()))
            .select(LockRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        Ok(row.map(row_to_record))
    }

    async fn release(
        &self,
        name: LockName,
        holder: &str,
        now: DateTime<Utc>,
        expired_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        diesel::update(
            sync_locks::table
                .filter(sync_locks::name.eq(name.as_str()))
                .filter(sync_locks::holder.eq(holder)),
        )
        .set((
            sync_locks::locked_until.eq(expired_at),
            sync_locks::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .await
        .map(|_| ())
        .map_err(map_diesel_error)
    }
}
