//! Typed access to the metadata key/value table.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;

use crate::domain::ports::{StoreError, SyncMetaRepository};

const DEFAULT_WATERMARK_LOOKBACK: TimeDelta = TimeDelta::hours(24);
const LAST_ERROR_MESSAGE_LIMIT: usize = 200;

/// Well-known metadata keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKey {
    Heartbeat,
    ConsecutiveFailures,
    ReconcileWatermark,
    TotalOrdersProcessed,
    TotalOrdersFailed,
    LastErrorAt,
    LastErrorMessage,
}

impl MetaKey {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat_utc",
            Self::ConsecutiveFailures => "consecutive_failures",
            Self::ReconcileWatermark => "reconcile_watermark_utc",
            Self::TotalOrdersProcessed => "total_orders_processed",
            Self::TotalOrdersFailed => "total_orders_failed",
            Self::LastErrorAt => "last_error_utc",
            Self::LastErrorMessage => "last_error_message",
        }
    }
}

/// Heartbeat, failure streak, watermark, and running totals.
#[derive(Clone)]
pub struct SyncMeta {
    repository: Arc<dyn SyncMetaRepository>,
    clock: Arc<dyn Clock>,
}

impl SyncMeta {
    pub fn new(repository: Arc<dyn SyncMetaRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Raw read of any key.
    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.repository.get(key).await
    }

    /// Raw write of any key.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.repository.set(key, value).await
    }

    pub async fn touch_heartbeat(&self) -> Result<(), StoreError> {
        self.set_timestamp(MetaKey::Heartbeat, self.clock.utc()).await
    }

    pub async fn last_heartbeat(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.timestamp(MetaKey::Heartbeat).await
    }

    pub async fn consecutive_failures(&self) -> Result<u32, StoreError> {
        self.counter(MetaKey::ConsecutiveFailures).await
    }

    /// Bump the failure streak and return its new length.
    pub async fn increment_failures(&self) -> Result<u32, StoreError> {
        let next = self.consecutive_failures().await?.saturating_add(1);
        self.set(MetaKey::ConsecutiveFailures.as_str(), &next.to_string())
            .await?;
        Ok(next)
    }

    pub async fn reset_failures(&self) -> Result<(), StoreError> {
        self.set(MetaKey::ConsecutiveFailures.as_str(), "0").await
    }

    /// Reconciliation watermark, defaulting to 24 hours ago when unset.
    pub async fn reconcile_watermark(&self) -> Result<DateTime<Utc>, StoreError> {
        Ok(self
            .stored_reconcile_watermark()
            .await?
            .unwrap_or_else(|| self.clock.utc() - DEFAULT_WATERMARK_LOOKBACK))
    }

    pub async fn stored_reconcile_watermark(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.timestamp(MetaKey::ReconcileWatermark).await
    }

    pub async fn set_reconcile_watermark(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.set_timestamp(MetaKey::ReconcileWatermark, at).await
    }

    /// Add to the lifetime processed/failed counters.
    pub async fn add_totals(&self, processed: u32, failed: u32) -> Result<(), StoreError> {
        for (key, delta) in [
            (MetaKey::TotalOrdersProcessed, processed),
            (MetaKey::TotalOrdersFailed, failed),
        ] {
            if delta == 0 {
                continue;
            }
            let total = self.wide_counter(key).await?.saturating_add(u64::from(delta));
            self.set(key.as_str(), &total.to_string()).await?;
        }
        Ok(())
    }

    /// Remember the latest error for the health report.
    pub async fn record_last_error(&self, message: &str) -> Result<(), StoreError> {
        self.set_timestamp(MetaKey::LastErrorAt, self.clock.utc())
            .await?;
        let truncated = truncate_chars(message, LAST_ERROR_MESSAGE_LIMIT);
        self.set(MetaKey::LastErrorMessage.as_str(), &truncated)
            .await
    }

    async fn timestamp(&self, key: MetaKey) -> Result<Option<DateTime<Utc>>, StoreError> {
        let Some(raw) = self.get(key.as_str()).await? else {
            return Ok(None);
        };
        DateTime::parse_from_rfc3339(&raw)
            .map(|parsed| Some(parsed.with_timezone(&Utc)))
            .map_err(|err| StoreError::corrupt(format!("{}: {err}", key.as_str())))
    }

    async fn set_timestamp(&self, key: MetaKey, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.set(key.as_str(), &at.to_rfc3339()).await
    }

    async fn counter(&self, key: MetaKey) -> Result<u32, StoreError> {
        let Some(raw) = self.get(key.as_str()).await? else {
            return Ok(0);
        };
        raw.trim()
            .parse()
            .map_err(|err| StoreError::corrupt(format!("{}: {err}", key.as_str())))
    }

    async fn wide_counter(&self, key: MetaKey) -> Result<u64, StoreError> {
        let Some(raw) = self.get(key.as_str()).await? else {
            return Ok(0);
        };
        raw.trim()
            .parse()
            .map_err(|err| StoreError::corrupt(format!("{}: {err}", key.as_str())))
    }
}

/// Truncate to at most `limit` characters without splitting a code point.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::clock::MutableClock;
    use crate::test_support::store::InMemorySyncStore;
    use chrono::TimeZone;
    use rstest::{fixture, rstest};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .expect("timestamp")
    }

    #[fixture]
    fn store() -> Arc<InMemorySyncStore> {
        Arc::new(InMemorySyncStore::default())
    }

    fn meta(store: &Arc<InMemorySyncStore>) -> SyncMeta {
        SyncMeta::new(store.clone(), Arc::new(MutableClock::new(now())))
    }

    #[rstest]
    #[tokio::test]
    async fn watermark_defaults_to_a_day_ago(store: Arc<InMemorySyncStore>) {
        let meta = meta(&store);
        assert_eq!(
            meta.reconcile_watermark().await.expect("watermark"),
            now() - TimeDelta::hours(24)
        );
        assert_eq!(meta.stored_reconcile_watermark().await.expect("raw"), None);
    }

    #[rstest]
    #[tokio::test]
    async fn watermark_round_trips_through_rfc3339(store: Arc<InMemorySyncStore>) {
        let meta = meta(&store);
        let at = now() - TimeDelta::minutes(7);
        meta.set_reconcile_watermark(at).await.expect("set");
        assert_eq!(meta.reconcile_watermark().await.expect("get"), at);
    }

    #[rstest]
    #[tokio::test]
    async fn failure_streak_increments_and_resets(store: Arc<InMemorySyncStore>) {
        let meta = meta(&store);
        assert_eq!(meta.increment_failures().await.expect("inc"), 1);
        assert_eq!(meta.increment_failures().await.expect("inc"), 2);
        meta.reset_failures().await.expect("reset");
        assert_eq!(meta.consecutive_failures().await.expect("read"), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn totals_accumulate(store: Arc<InMemorySyncStore>) {
        let meta = meta(&store);
        meta.add_totals(3, 1).await.expect("first");
        meta.add_totals(2, 0).await.expect("second");
        assert_eq!(
            meta.get("total_orders_processed").await.expect("get").as_deref(),
            Some("5")
        );
        assert_eq!(
            meta.get("total_orders_failed").await.expect("get").as_deref(),
            Some("1")
        );
    }

    #[rstest]
    #[tokio::test]
    async fn corrupt_counter_is_reported(store: Arc<InMemorySyncStore>) {
        let meta = meta(&store);
        meta.set("consecutive_failures", "many").await.expect("set");
        assert!(matches!(
            meta.consecutive_failures().await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn last_error_message_is_truncated(store: Arc<InMemorySyncStore>) {
        let meta = meta(&store);
        meta.record_last_error(&"ж".repeat(300)).await.expect("record");
        let stored = meta
            .get("last_error_message")
            .await
            .expect("get")
            .expect("present");
        assert_eq!(stored.chars().count(), 200);
    }
}
