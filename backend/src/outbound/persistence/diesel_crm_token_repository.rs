//! PostgreSQL-backed `CrmTokenRepository` over a singleton row.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::diesel_basic_error_mapping::{map_diesel_error, map_pool_error};
use super::models::{CrmTokensRow, CrmTokensWrite};
use super::pool::DbPool;
use super::schema::crm_tokens;
use crate::domain::ports::{CrmTokenRepository, CrmTokens, StoreError};

const TOKEN_ROW_ID: i16 = 1;

#[derive(Clone)]
pub struct DieselCrmTokenRepository {
    pool: DbPool,
}

impl DieselCrmTokenRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CrmTokenRepository for DieselCrmTokenRepository {
    async fn load(&self) -> Result<Option<CrmTokens>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<CrmTokensRow> = crm_tokens::table
            .filter(crm_tokens::id.eq(TOKEN_ROW_ID))
            .select(CrmTokensRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        Ok(row.map(|row| CrmTokens {
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            expires_at: row.expires_at,
        }))
    }

    async fn store(&self, tokens: &CrmTokens) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let write = CrmTokensWrite {
            id: TOKEN_ROW_ID,
            access_token: &tokens.access_token,
            refresh_token: &tokens.refresh_token,
            expires_at: tokens.expires_at,
            updated_at: Utc::now(),
        };
        diesel::insert_into(crm_tokens::table)
            .values(&write)
            .on_conflict(crm_tokens::id)
            .do_update()
            .set(&write)
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }
}
