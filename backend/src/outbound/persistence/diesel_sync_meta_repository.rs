//! PostgreSQL-backed `SyncMetaRepository`.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::diesel_basic_error_mapping::{map_diesel_error, map_pool_error};
use super::models::MetaWrite;
use super::pool::DbPool;
use super::schema::sync_meta;
use crate::domain::ports::{StoreError, SyncMetaRepository};

#[derive(Clone)]
pub struct DieselSyncMetaRepository {
    pool: DbPool,
}

impl DieselSyncMetaRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncMetaRepository for DieselSyncMetaRepository {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        sync_meta::table
            .filter(sync_meta::key.eq(key))
            .select(sync_meta::value)
            .first::<String>(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let write = MetaWrite {
            key,
            value,
            updated_at: Utc::now(),
        };
        diesel::insert_into(sync_meta::table)
            .values(&write)
            .on_conflict(sync_meta::key)
            .do_update()
            .set(&write)
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }
}
