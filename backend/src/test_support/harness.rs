//! Fully wired pipeline context over in-memory doubles.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use mockable::Clock;

use super::alerts::RecordingAlertChannel;
use super::clock::MutableClock;
use super::crm::RecordingCrm;
use super::order_source::ScriptedOrderSource;
use super::store::InMemorySyncStore;
use crate::domain::{
    AlertService, DealCreator, ErrorJournal, LockManager, NoteTemplate, OrderLedger,
    StatsCalendar, StatsRecorder, SyncContext, SyncMeta,
};

/// Wall-clock start for harness runs; later than [`super::orders::base_time`].
pub fn harness_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Doubles plus the context wired from them.
pub struct SyncHarness {
    pub store: Arc<InMemorySyncStore>,
    pub crm: Arc<RecordingCrm>,
    pub source: Arc<ScriptedOrderSource>,
    pub clock: Arc<MutableClock>,
    pub channel: Arc<RecordingAlertChannel>,
    pub calendar: StatsCalendar,
}

impl Default for SyncHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncHarness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemorySyncStore::default()),
            crm: Arc::new(RecordingCrm::default()),
            source: Arc::new(ScriptedOrderSource::default()),
            clock: Arc::new(MutableClock::new(harness_start())),
            channel: Arc::new(RecordingAlertChannel::default()),
            calendar: StatsCalendar::from_offset_hours(5),
        }
    }

    pub fn dyn_clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn meta(&self) -> SyncMeta {
        SyncMeta::new(self.store.clone(), self.dyn_clock())
    }

    pub fn journal(&self) -> ErrorJournal {
        ErrorJournal::new(self.store.clone(), self.meta(), self.dyn_clock())
    }

    /// A context whose locks are held as `holder`.
    pub fn context_for(&self, holder: &str) -> SyncContext {
        let clock = self.dyn_clock();
        SyncContext {
            order_source: self.source.clone(),
            creator: Arc::new(DealCreator::new(self.crm.clone(), NoteTemplate::default())),
            ledger: OrderLedger::new(self.store.clone(), clock.clone()),
            locks: Arc::new(LockManager::with_holder(
                self.store.clone(),
                clock.clone(),
                holder,
            )),
            meta: self.meta(),
            journal: self.journal(),
            alerts: Arc::new(AlertService::new(
                self.journal(),
                vec![self.channel.clone()],
                clock.clone(),
            )),
            stats: StatsRecorder::new(self.store.clone(), self.calendar, clock.clone()),
            clock,
        }
    }

    pub fn context(&self) -> SyncContext {
        self.context_for("test-run")
    }

    /// Today's date in the stats zone.
    pub fn today(&self) -> chrono::NaiveDate {
        self.calendar.date_of(self.clock.utc())
    }
}
