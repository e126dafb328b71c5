//! Port for the append-only error log.

use async_trait::async_trait;

use super::StoreError;
use crate::domain::{ErrorRecord, NewErrorRecord};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ErrorLogRepository: Send + Sync {
    /// Append one entry.
    async fn append(&self, entry: &NewErrorRecord) -> Result<(), StoreError>;

    /// Most recent entries, newest first.
    async fn recent(&self, limit: u32) -> Result<Vec<ErrorRecord>, StoreError>;
}
