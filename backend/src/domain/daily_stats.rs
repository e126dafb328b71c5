//! Per-day aggregate counters.
//!
//! Rows are keyed by the calendar date in the processing-local zone and only
//! ever grow. The average processing time is derived from the running total
//! on every increment.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

/// Stored aggregate for one date.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub orders_processed: u64,
    pub orders_failed: u64,
    pub contacts_created: u64,
    pub deals_created: u64,
    pub total_amount: f64,
    pub total_processing_time_ms: u64,
    pub avg_processing_time_ms: u64,
    pub api_errors_upstream: u64,
    pub api_errors_crm: u64,
    pub rate_limit_hits: u64,
    pub reconcile_updates: u64,
}

impl DailyStats {
    /// Empty aggregate for `date`.
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            orders_processed: 0,
            orders_failed: 0,
            contacts_created: 0,
            deals_created: 0,
            total_amount: 0.0,
            total_processing_time_ms: 0,
            avg_processing_time_ms: 0,
            api_errors_upstream: 0,
            api_errors_crm: 0,
            rate_limit_hits: 0,
            reconcile_updates: 0,
        }
    }

    /// Apply a delta and recompute the average.
    pub fn apply(&mut self, delta: &DailyStatsDelta) {
        self.orders_processed += u64::from(delta.orders_processed);
        self.orders_failed += u64::from(delta.orders_failed);
        self.contacts_created += u64::from(delta.contacts_created);
        self.deals_created += u64::from(delta.deals_created);
        self.total_amount += delta.total_amount;
        self.total_processing_time_ms += delta.processing_time_ms;
        self.api_errors_upstream += u64::from(delta.api_errors_upstream);
        self.api_errors_crm += u64::from(delta.api_errors_crm);
        self.rate_limit_hits += u64::from(delta.rate_limit_hits);
        self.reconcile_updates += u64::from(delta.reconcile_updates);
        self.avg_processing_time_ms = self
            .total_processing_time_ms
            .checked_div(self.orders_processed)
            .unwrap_or(0);
    }
}

/// Increment applied to one day's aggregate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyStatsDelta {
    pub orders_processed: u32,
    pub orders_failed: u32,
    pub contacts_created: u32,
    pub deals_created: u32,
    pub total_amount: f64,
    pub processing_time_ms: u64,
    pub api_errors_upstream: u32,
    pub api_errors_crm: u32,
    pub rate_limit_hits: u32,
    pub reconcile_updates: u32,
}

impl DailyStatsDelta {
    /// Whether applying this delta would change nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fold another delta into this one.
    pub fn merge(&mut self, other: &Self) {
        self.orders_processed += other.orders_processed;
        self.orders_failed += other.orders_failed;
        self.contacts_created += other.contacts_created;
        self.deals_created += other.deals_created;
        self.total_amount += other.total_amount;
        self.processing_time_ms += other.processing_time_ms;
        self.api_errors_upstream += other.api_errors_upstream;
        self.api_errors_crm += other.api_errors_crm;
        self.rate_limit_hits += other.rate_limit_hits;
        self.reconcile_updates += other.reconcile_updates;
    }
}

/// Maps instants onto processing-local calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsCalendar {
    offset: FixedOffset,
}

impl StatsCalendar {
    pub const fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Calendar for a whole-hour UTC offset; out-of-range offsets fall back
    /// to UTC.
    pub fn from_offset_hours(hours: i32) -> Self {
        let offset = hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(utc_offset);
        Self { offset }
    }

    pub fn date_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }
}

impl Default for StatsCalendar {
    fn default() -> Self {
        Self { offset: utc_offset() }
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}
