//! Durable per-order sync record.

use std::fmt;

use chrono::{DateTime, Utc};

use super::fingerprint::OrderFingerprint;
use super::order::{OrderCode, OrderState};

/// Identifier of a deal in the CRM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CrmDealId(u64);

impl CrmDealId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CrmDealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a contact in the CRM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CrmContactId(u64);

impl CrmContactId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CrmContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted outcome of the latest processing attempt for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedOrder {
    pub order_code: OrderCode,
    pub crm_deal_id: Option<CrmDealId>,
    pub upstream_state: OrderState,
    pub fingerprint: OrderFingerprint,
    pub processing_time_ms: u64,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub last_synced_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessedOrder {
    /// A deal exists and the latest attempt left no error behind.
    pub fn processed_successfully(&self) -> bool {
        self.crm_deal_id.is_some() && self.last_error.is_none()
    }
}

/// Write model for [`ProcessedOrder`]; the store owns `created_at`/`updated_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedOrderUpsert {
    pub order_code: OrderCode,
    pub crm_deal_id: Option<CrmDealId>,
    pub upstream_state: OrderState,
    pub fingerprint: OrderFingerprint,
    pub processing_time_ms: u64,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub synced_at: DateTime<Utc>,
}

impl ProcessedOrderUpsert {
    /// Record a successful create or repair: retries reset, error cleared.
    pub fn succeeded(
        order_code: OrderCode,
        crm_deal_id: CrmDealId,
        upstream_state: OrderState,
        fingerprint: OrderFingerprint,
        processing_time_ms: u64,
        synced_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_code,
            crm_deal_id: Some(crm_deal_id),
            upstream_state,
            fingerprint,
            processing_time_ms,
            retry_count: 0,
            last_error: None,
            synced_at,
        }
    }

    /// Record a failed attempt on top of the previous record, if any.
    ///
    /// The previous deal id survives so a retry never forgets a deal that was
    /// already created, and the retry counter keeps climbing.
    pub fn failed(
        previous: Option<&ProcessedOrder>,
        order_code: OrderCode,
        upstream_state: OrderState,
        fingerprint: OrderFingerprint,
        processing_time_ms: u64,
        error: impl Into<String>,
        synced_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_code,
            crm_deal_id: previous.and_then(|record| record.crm_deal_id),
            upstream_state,
            fingerprint,
            processing_time_ms,
            retry_count: previous.map_or(1, |record| record.retry_count.saturating_add(1)),
            last_error: Some(error.into()),
            synced_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn record(deal: Option<u64>, error: Option<&str>, retries: u32) -> ProcessedOrder {
        let at = Utc
            .with_ymd_and_hms(2026, 3, 1, 0, 0, 0)
            .single()
            .expect("timestamp");
        ProcessedOrder {
            order_code: OrderCode::new("ORDER-7").expect("code"),
            crm_deal_id: deal.map(CrmDealId::new),
            upstream_state: OrderState::new("NEW").expect("state"),
            fingerprint: OrderFingerprint::from_stored("abc"),
            processing_time_ms: 12,
            retry_count: retries,
            last_error: error.map(str::to_owned),
            last_synced_at: at,
            created_at: at,
            updated_at: at,
        }
    }

    #[rstest]
    #[case(Some(5), None, true)]
    #[case(Some(5), Some("boom"), false)]
    #[case(None, None, false)]
    #[case(None, Some("boom"), false)]
    fn success_requires_deal_and_no_error(
        #[case] deal: Option<u64>,
        #[case] error: Option<&str>,
        #[case] expected: bool,
    ) {
        assert_eq!(record(deal, error, 0).processed_successfully(), expected);
    }

    #[test]
    fn failure_increments_previous_retry_count_and_keeps_deal() {
        let previous = record(Some(42), Some("first"), 2);
        let upsert = ProcessedOrderUpsert::failed(
            Some(&previous),
            previous.order_code.clone(),
            previous.upstream_state.clone(),
            previous.fingerprint.clone(),
            5,
            "second",
            previous.last_synced_at,
        );
        assert_eq!(upsert.retry_count, 3);
        assert_eq!(upsert.crm_deal_id, Some(CrmDealId::new(42)));
        assert_eq!(upsert.last_error.as_deref(), Some("second"));
    }

    #[test]
    fn first_failure_starts_at_one() {
        let template = record(None, None, 0);
        let upsert = ProcessedOrderUpsert::failed(
            None,
            template.order_code,
            template.upstream_state,
            template.fingerprint,
            1,
            "boom",
            template.last_synced_at,
        );
        assert_eq!(upsert.retry_count, 1);
        assert_eq!(upsert.crm_deal_id, None);
    }
}
