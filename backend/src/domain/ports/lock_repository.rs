//! Port for named advisory locks with expiry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::StoreError;
use crate::domain::LockName;

/// Persisted state of one named lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub name: String,
    pub holder: String,
    pub locked_until: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lock table access used by [`crate::domain::LockManager`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LockRepository: Send + Sync {
    /// Take the lock if it is free.
    ///
    /// Must be a single atomic conditional write: set `locked_until` and
    /// `holder` where the lock has expired before `now`, or create the row if
    /// none exists. Returns whether this call took the lock.
    async fn try_acquire(
        &self,
        name: LockName,
        holder: &str,
        now: DateTime<Utc>,
        locked_until: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Read the current lock row.
    async fn find(&self, name: LockName) -> Result<Option<LockRecord>, StoreError>;

    /// Move the expiry of a lock held by `holder` to `expired_at`, stamping
    /// the row as updated at `now`.
    ///
    /// Releasing a lock that is not held, or held by someone else, is a no-op.
    async fn release(
        &self,
        name: LockName,
        holder: &str,
        now: DateTime<Utc>,
        expired_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}
