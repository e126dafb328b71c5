//! Internal Diesel row structs for database operations.
//!
//! These types are implementation details of the persistence layer and must
//! never be exposed to the domain.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;

use super::schema::{crm_tokens, daily_stats, error_log, processed_orders, sync_locks, sync_meta};

/// Widen a stored non-negative counter; negative values read as zero.
pub(super) fn stored_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Narrow a counter for storage, saturating at `i64::MAX`.
pub(super) fn storable_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// Processed orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = processed_orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ProcessedOrderRow {
    pub order_code: String,
    pub crm_deal_id: Option<i64>,
    pub upstream_state: String,
    pub fingerprint: String,
    pub processing_time_ms: i64,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub last_synced_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert half of the processed-order upsert; the conflict branch reuses the
/// same values except `created_at`.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = processed_orders)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct ProcessedOrderWrite<'a> {
    pub order_code: &'a str,
    pub crm_deal_id: Option<i64>,
    pub upstream_state: &'a str,
    pub fingerprint: &'a str,
    pub processing_time_ms: i64,
    pub retry_count: i32,
    pub last_error: Option<&'a str>,
    pub last_synced_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Locks and metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = sync_locks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct LockRow {
    pub name: String,
    pub holder: String,
    pub locked_until: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = sync_locks)]
pub(crate) struct LockWrite<'a> {
    pub name: &'a str,
    pub holder: &'a str,
    pub locked_until: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = sync_meta)]
pub(crate) struct MetaWrite<'a> {
    pub key: &'a str,
    pub value: &'a str,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Daily stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = daily_stats)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct DailyStatsRow {
    pub stats_date: NaiveDate,
    pub orders_processed: i64,
    pub orders_failed: i64,
    pub contacts_created: i64,
    pub deals_created: i64,
    pub total_amount: f64,
    pub total_processing_time_ms: i64,
    pub avg_processing_time_ms: i64,
    pub api_errors_upstream: i64,
    pub api_errors_crm: i64,
    pub rate_limit_hits: i64,
    pub reconcile_updates: i64,
}

/// Seed row for a date's first increment; later increments add onto it.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = daily_stats)]
pub(crate) struct NewDailyStatsRow {
    pub stats_date: NaiveDate,
    pub orders_processed: i64,
    pub orders_failed: i64,
    pub contacts_created: i64,
    pub deals_created: i64,
    pub total_amount: f64,
    pub total_processing_time_ms: i64,
    pub avg_processing_time_ms: i64,
    pub api_errors_upstream: i64,
    pub api_errors_crm: i64,
    pub rate_limit_hits: i64,
    pub reconcile_updates: i64,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Error log and tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = error_log)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ErrorLogRow {
    pub id: i64,
    pub error_type: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub order_code: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = error_log)]
pub(crate) struct NewErrorLogRow<'a> {
    pub error_type: &'a str,
    pub message: &'a str,
    pub details: Option<&'a serde_json::Value>,
    pub order_code: Option<&'a str>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crm_tokens)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct CrmTokensRow {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = crm_tokens)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct CrmTokensWrite<'a> {
    pub id: i16,
    pub access_token: &'a str,
    pub refresh_token: &'a str,
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(-5, 0)]
    #[case(0, 0)]
    #[case(42, 42)]
    fn stored_counters_never_go_negative(#[case] stored: i64, #[case] expected: u64) {
        assert_eq!(stored_u64(stored), expected);
    }

    #[test]
    fn oversized_counters_saturate() {
        assert_eq!(storable_i64(u64::MAX), i64::MAX);
        assert_eq!(storable_i64(7), 7);
    }
}
