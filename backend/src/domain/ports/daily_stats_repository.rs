//! Port for the per-day statistics aggregate.

use async_trait::async_trait;
use chrono::NaiveDate;

use super::StoreError;
use crate::domain::{DailyStats, DailyStatsDelta};

/// Daily counters keyed by processing-local calendar date.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DailyStatsRepository: Send + Sync {
    /// Read the aggregate for one date.
    async fn find(&self, date: NaiveDate) -> Result<Option<DailyStats>, StoreError>;

    /// Add `delta` to the counters for `date`, creating the row on first
    /// write, and recompute the average processing time.
    async fn increment(&self, date: NaiveDate, delta: &DailyStatsDelta) -> Result<(), StoreError>;
}
