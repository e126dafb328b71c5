//! Typed error-log entries and the journal that records them.
//!
//! Every failure the pipelines see is written here before any alert is
//! attempted, so the audit trail survives a broken alert channel.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mockable::Clock;
use serde_json::Value;
use tracing::error;

use super::order::OrderCode;
use super::sync_meta::{SyncMeta, truncate_chars};
use crate::domain::ports::ErrorLogRepository;

/// Maximum stored message length in characters.
pub const ERROR_MESSAGE_LIMIT: usize = 500;

/// Type tag stored with each entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A poll batch failed as a whole.
    PollError,
    /// One order failed during polling.
    OrderError,
    /// One order failed during reconciliation.
    ReconcileError,
    /// A reconciliation run failed as a whole.
    ReconcileCritical,
    CriticalAlert,
    WarningAlert,
    InfoAlert,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PollError => "POLL_ERROR",
            Self::OrderError => "ORDER_ERROR",
            Self::ReconcileError => "RECONCILE_ERROR",
            Self::ReconcileCritical => "RECONCILE_CRITICAL",
            Self::CriticalAlert => "CRITICAL_ALERT",
            Self::WarningAlert => "WARNING_ALERT",
            Self::InfoAlert => "INFO_ALERT",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry to append to the error log.
#[derive(Debug, Clone, PartialEq)]
pub struct NewErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<Value>,
    pub order_code: Option<OrderCode>,
    pub occurred_at: DateTime<Utc>,
}

impl NewErrorRecord {
    /// Build an entry, truncating the message to [`ERROR_MESSAGE_LIMIT`].
    pub fn new(kind: ErrorKind, message: &str, occurred_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            message: truncate_chars(message, ERROR_MESSAGE_LIMIT),
            details: None,
            order_code: None,
            occurred_at,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_order(mut self, order_code: OrderCode) -> Self {
        self.order_code = Some(order_code);
        self
    }
}

/// Stored error-log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub id: i64,
    pub error_type: String,
    pub message: String,
    pub details: Option<Value>,
    pub order_code: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Appends entries to the error log and mirrors the latest one into metadata.
///
/// Recording never fails the caller; store failures are logged instead.
#[derive(Clone)]
pub struct ErrorJournal {
    repository: Arc<dyn ErrorLogRepository>,
    meta: SyncMeta,
    clock: Arc<dyn Clock>,
}

impl ErrorJournal {
    pub fn new(repository: Arc<dyn ErrorLogRepository>, meta: SyncMeta, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            meta,
            clock,
        }
    }

    /// Start an entry stamped with the current time.
    pub fn entry(&self, kind: ErrorKind, message: &str) -> NewErrorRecord {
        NewErrorRecord::new(kind, message, self.clock.utc())
    }

    pub async fn record(&self, entry: NewErrorRecord) {
        if let Err(err) = self.repository.append(&entry).await {
            error!(
                error_type = %entry.kind,
                message = %entry.message,
                store_error = %err,
                "failed to append error log entry"
            );
        }
        if let Err(err) = self.meta.record_last_error(&entry.message).await {
            error!(store_error = %err, "failed to record last error metadata");
        }
    }
}
