//! Run-level error type shared by the sync pipelines.
//!
//! Per-order failures never surface here; they are recorded and counted
//! inside the batch (see [`crate::domain::OrderSyncError`]).

use crate::domain::ports::{OrderSourceError, StoreError};

/// A failure that aborts a whole pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The sync-state store could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Listing orders from the marketplace failed.
    #[error(transparent)]
    OrderSource(#[from] OrderSourceError),
}

impl SyncError {
    /// Whether the marketplace throttled the failing call.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::OrderSource(err) if err.is_rate_limited())
    }
}
