//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! Concrete implementations of the sync-state store ports backed by
//! PostgreSQL via `diesel-async` and `bb8` pooling. Row structs (`models.rs`)
//! and table definitions (`schema.rs`) never leave this module; every
//! database failure maps onto the domain `StoreError`.
//!
//! ```ignore
//! use kaspi_amo_sync::outbound::persistence::{DbPool, PoolConfig, DieselSyncMetaRepository};
//!
//! let pool = DbPool::connect(PoolConfig::new("postgres://localhost/sync")).await?;
//! let meta = DieselSyncMetaRepository::new(pool);
//! ```

mod diesel_basic_error_mapping;
mod diesel_crm_token_repository;
mod diesel_daily_stats_repository;
mod diesel_error_log_repository;
mod diesel_lock_repository;
mod diesel_processed_order_repository;
mod diesel_sync_meta_repository;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_crm_token_repository::DieselCrmTokenRepository;
pub use diesel_daily_stats_repository::DieselDailyStatsRepository;
pub use diesel_error_log_repository::DieselErrorLogRepository;
pub use diesel_lock_repository::DieselLockRepository;
pub use diesel_processed_order_repository::DieselProcessedOrderRepository;
pub use diesel_sync_meta_repository::DieselSyncMetaRepository;
pub use migrations::run_migrations;
pub use pool::{DbPool, PoolConfig, PoolError};
