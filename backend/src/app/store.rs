//! Store ports as one bundle.

use std::sync::Arc;

use crate::domain::ports::{
    CrmTokenRepository, DailyStatsRepository, ErrorLogRepository, LockRepository,
    ProcessedOrderRepository, SyncMetaRepository,
};
use crate::outbound::persistence::{
    DbPool, DieselCrmTokenRepository, DieselDailyStatsRepository, DieselErrorLogRepository,
    DieselLockRepository, DieselProcessedOrderRepository, DieselSyncMetaRepository,
};

/// Every sync-state port, backed by one store.
#[derive(Clone)]
pub struct StoreAdapters {
    pub processed: Arc<dyn ProcessedOrderRepository>,
    pub locks: Arc<dyn LockRepository>,
    pub meta: Arc<dyn SyncMetaRepository>,
    pub daily_stats: Arc<dyn DailyStatsRepository>,
    pub errors: Arc<dyn ErrorLogRepository>,
    pub tokens: Arc<dyn CrmTokenRepository>,
}

impl StoreAdapters {
    /// PostgreSQL repositories sharing `pool`.
    pub fn diesel(pool: &DbPool) -> Self {
        Self {
            processed: Arc::new(DieselProcessedOrderRepository::new(pool.clone())),
            locks: Arc::new(DieselLockRepository::new(pool.clone())),
            meta: Arc::new(DieselSyncMetaRepository::new(pool.clone())),
            daily_stats: Arc::new(DieselDailyStatsRepository::new(pool.clone())),
            errors: Arc::new(DieselErrorLogRepository::new(pool.clone())),
            tokens: Arc::new(DieselCrmTokenRepository::new(pool.clone())),
        }
    }

    /// Every port served by one in-memory store.
    #[cfg(any(test, feature = "test-support"))]
    pub fn in_memory(store: Arc<crate::test_support::store::InMemorySyncStore>) -> Self {
        Self {
            processed: store.clone(),
            locks: store.clone(),
            meta: store.clone(),
            daily_stats: store.clone(),
            errors: store.clone(),
            tokens: store,
        }
    }
}
