//! Port for the string key/value metadata table.

use async_trait::async_trait;

use super::StoreError;

/// Raw metadata access; typed helpers live in [`crate::domain::SyncMeta`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyncMetaRepository: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}
