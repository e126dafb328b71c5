//! Domain primitives, services, and pipelines.
//!
//! Purpose: Model marketplace orders and the CRM records derived from them,
//! and drive the poll and reconcile pipelines against the driven ports in
//! [`ports`]. Nothing here knows about HTTP clients, SQL, or configuration
//! files; adapters live in `crate::outbound`.
//!
//! Public surface:
//! - [`UpstreamOrder`] and its parts: the validated order as fetched.
//! - [`PhoneNumber`], [`OrderFingerprint`]: identity and change detection.
//! - [`PollPipeline`], [`ReconcilePipeline`]: the two batch runs.
//! - [`HealthReporter`]: read-only view of the sync-state store.
//! - [`AlertService`]: severity routing with cooldown and masking.

pub mod ports;

mod alerting;
mod daily_stats;
mod deal_draft;
mod error;
mod error_journal;
mod fingerprint;
mod health;
mod lock_manager;
mod order;
mod order_sync;
mod phone;
mod pipeline;
mod poll_pipeline;
mod processed_order;
mod reconcile_pipeline;
mod resilient;
mod retry;
mod sync_meta;

pub use self::alerting::{Alert, AlertService, AlertSeverity, mask_details};
pub use self::daily_stats::{DailyStats, DailyStatsDelta, StatsCalendar};
pub use self::deal_draft::{
    DEFAULT_NOTE_TEMPLATE, DealOrigin, NoteTemplate, contact_name, deal_name, deal_tags,
    describe_items, new_deal, repair_note,
};
pub use self::error::SyncError;
pub use self::error_journal::{
    ERROR_MESSAGE_LIMIT, ErrorJournal, ErrorKind, ErrorRecord, NewErrorRecord,
};
pub use self::fingerprint::OrderFingerprint;
pub use self::health::{
    AgedTimestamp, HealthChecks, HealthReport, HealthReporter, HealthStatus, HealthThresholds,
    RecentError, TodaySummary, mask_order_code,
};
pub use self::lock_manager::{LockManager, LockName};
pub use self::order::{
    Buyer, Delivery, LineItem, OrderCode, OrderState, OrderValidationError, Pickup,
    UpstreamOrder, format_amount, round_amount,
};
pub use self::order_sync::{CreatedDeal, DealCreator, DealPreview, OrderLedger, OrderSyncError};
pub use self::phone::{PhoneError, PhoneNumber, mask_phone};
pub use self::pipeline::{RunOutcome, StatsRecorder, SyncContext};
pub use self::poll_pipeline::{PollPipeline, PollPipelineConfig, PollReport};
pub use self::processed_order::{CrmContactId, CrmDealId, ProcessedOrder, ProcessedOrderUpsert};
pub use self::reconcile_pipeline::{ReconcilePipeline, ReconcilePipelineConfig, ReconcileReport};
pub use self::resilient::{CrmRetryPolicies, RetryingCrmGateway, RetryingOrderSource};
pub use self::retry::{
    BackoffJitter, RandomJitter, Retrier, RetryPolicy, RetrySleeper, TokioSleeper,
};
pub use self::sync_meta::{MetaKey, SyncMeta, truncate_chars};
