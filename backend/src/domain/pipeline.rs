//! Collaborators shared by the poll and reconcile pipelines.

use std::sync::Arc;

use mockable::Clock;
use tracing::error;

use super::alerting::AlertService;
use super::daily_stats::{DailyStatsDelta, StatsCalendar};
use super::error_journal::ErrorJournal;
use super::lock_manager::{LockManager, LockName};
use super::order_sync::{DealCreator, OrderLedger};
use super::sync_meta::SyncMeta;
use crate::domain::ports::{DailyStatsRepository, OrderSource, StoreError};

/// How a pipeline invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome<R> {
    /// The run held the lock and finished its batch.
    Completed(R),
    /// Another run holds the lock; nothing was done.
    LockBusy,
}

impl<R> RunOutcome<R> {
    pub fn report(&self) -> Option<&R> {
        match self {
            Self::Completed(report) => Some(report),
            Self::LockBusy => None,
        }
    }
}

/// Writes batch deltas into today's statistics row.
#[derive(Clone)]
pub struct StatsRecorder {
    repository: Arc<dyn DailyStatsRepository>,
    calendar: StatsCalendar,
    clock: Arc<dyn Clock>,
}

impl StatsRecorder {
    pub fn new(
        repository: Arc<dyn DailyStatsRepository>,
        calendar: StatsCalendar,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            calendar,
            clock,
        }
    }

    pub async fn record(&self, delta: &DailyStatsDelta) -> Result<(), StoreError> {
        if delta.is_empty() {
            return Ok(());
        }
        let date = self.calendar.date_of(self.clock.utc());
        self.repository.increment(date, delta).await
    }
}

/// Everything a pipeline needs besides its own configuration.
#[derive(Clone)]
pub struct SyncContext {
    pub order_source: Arc<dyn OrderSource>,
    pub creator: Arc<DealCreator>,
    pub ledger: OrderLedger,
    pub locks: Arc<LockManager>,
    pub meta: SyncMeta,
    pub journal: ErrorJournal,
    pub alerts: Arc<AlertService>,
    pub stats: StatsRecorder,
    pub clock: Arc<dyn Clock>,
}

impl SyncContext {
    /// Release `name`, logging rather than propagating failures.
    pub(crate) async fn release_quietly(&self, name: LockName) {
        if let Err(err) = self.locks.release(name).await {
            error!(lock = %name, error = %err, "failed to release lock");
        }
    }
}
