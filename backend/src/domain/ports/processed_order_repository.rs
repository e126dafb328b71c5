//! Port for the durable processed-order records.

use async_trait::async_trait;

use super::StoreError;
use crate::domain::{OrderCode, ProcessedOrder, ProcessedOrderUpsert};

/// Store of one record per upstream order code.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessedOrderRepository: Send + Sync {
    /// Look up the record for an order code.
    async fn find_by_code(&self, code: &OrderCode) -> Result<Option<ProcessedOrder>, StoreError>;

    /// Insert or overwrite the record keyed by `record.order_code`.
    ///
    /// Implementations set `created_at` on first insert only and refresh
    /// `updated_at` on every write.
    async fn upsert(&self, record: &ProcessedOrderUpsert) -> Result<(), StoreError>;
}
