//! Diesel table definitions for the sync-state schema.
//!
//! These definitions must match `backend/migrations` exactly.

diesel::table! {
    /// One row per marketplace order that reached the CRM pipeline.
    processed_orders (order_code) {
        order_code -> Varchar,
        crm_deal_id -> Nullable<Int8>,
        upstream_state -> Varchar,
        fingerprint -> Varchar,
        processing_time_ms -> Int8,
        retry_count -> Int4,
        last_error -> Nullable<Text>,
        last_synced_at -> Timestamptz,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Named advisory locks with expiry.
    sync_locks (name) {
        name -> Varchar,
        holder -> Varchar,
        locked_until -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    sync_meta (key) {
        key -> Varchar,
        value -> Text,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Per-day counters keyed by the processing-local date.
    daily_stats (stats_date) {
        stats_date -> Date,
        orders_processed -> Int8,
        orders_failed -> Int8,
        contacts_created -> Int8,
        deals_created -> Int8,
        total_amount -> Float8,
        total_processing_time_ms -> Int8,
        avg_processing_time_ms -> Int8,
        api_errors_upstream -> Int8,
        api_errors_crm -> Int8,
        rate_limit_hits -> Int8,
        reconcile_updates -> Int8,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Append-only audit trail of failures and alerts.
    error_log (id) {
        id -> Int8,
        error_type -> Varchar,
        message -> Text,
        details -> Nullable<Jsonb>,
        order_code -> Nullable<Varchar>,
        occurred_at -> Timestamptz,
    }
}

diesel::table! {
    /// Singleton row (`id = 1`) holding the CRM OAuth pair.
    crm_tokens (id) {
        id -> Int2,
        access_token -> Text,
        refresh_token -> Text,
        expires_at -> Nullable<Timestamptz>,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    processed_orders,
    sync_locks,
    sync_meta,
    daily_stats,
    error_log,
    crm_tokens,
);
