//! In-memory sync-state store implementing every persistence port.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::ports::{
    CrmTokenRepository, CrmTokens, DailyStatsRepository, ErrorLogRepository, LockRecord,
    LockRepository, ProcessedOrderRepository, StoreError, SyncMetaRepository,
};
use crate::domain::{
    DailyStats, DailyStatsDelta, ErrorRecord, LockName, NewErrorRecord, OrderCode,
    ProcessedOrder, ProcessedOrderUpsert,
};

#[derive(Default)]
struct State {
    processed: HashMap<String, ProcessedOrder>,
    upserts: Vec<ProcessedOrderUpsert>,
    locks: HashMap<String, LockRecord>,
    meta: HashMap<String, String>,
    stats: HashMap<NaiveDate, DailyStats>,
    errors: Vec<ErrorRecord>,
    tokens: Option<CrmTokens>,
}

/// Store double with inspection helpers and an outage switch.
#[derive(Default)]
pub struct InMemorySyncStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
    fail_next_lookup: AtomicBool,
}

impl InMemorySyncStore {
    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("store mutex"),
        }
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::connection("store offline"))
        } else {
            Ok(())
        }
    }

    /// Make every subsequent call fail with a connection error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail only the next processed-order lookup.
    pub fn fail_next_lookup(&self) {
        self.fail_next_lookup.store(true, Ordering::SeqCst);
    }

    pub fn processed(&self, code: &str) -> Option<ProcessedOrder> {
        self.state().processed.get(code).cloned()
    }

    pub fn seed_processed(&self, record: ProcessedOrder) {
        self.state()
            .processed
            .insert(record.order_code.as_str().to_owned(), record);
    }

    /// Every upsert in call order.
    pub fn upsert_history(&self) -> Vec<ProcessedOrderUpsert> {
        self.state().upserts.clone()
    }

    pub fn lock(&self, name: LockName) -> Option<LockRecord> {
        self.state().locks.get(name.as_str()).cloned()
    }

    pub fn meta_value(&self, key: &str) -> Option<String> {
        self.state().meta.get(key).cloned()
    }

    pub fn seed_meta(&self, key: &str, value: &str) {
        self.state().meta.insert(key.to_owned(), value.to_owned());
    }

    pub fn stats_for(&self, date: NaiveDate) -> Option<DailyStats> {
        self.state().stats.get(&date).cloned()
    }

    /// Error log entries, oldest first.
    pub fn error_entries(&self) -> Vec<ErrorRecord> {
        self.state().errors.clone()
    }

    pub fn errors_of_type(&self, error_type: &str) -> Vec<ErrorRecord> {
        self.error_entries()
            .into_iter()
            .filter(|entry| entry.error_type == error_type)
            .collect()
    }

    pub fn tokens(&self) -> Option<CrmTokens> {
        self.state().tokens.clone()
    }
}

#[async_trait]
impl ProcessedOrderRepository for InMemorySyncStore {
    async fn find_by_code(&self, code: &OrderCode) -> Result<Option<ProcessedOrder>, StoreError> {
        self.check()?;
        if self.fail_next_lookup.swap(false, Ordering::SeqCst) {
            return Err(StoreError::query("lookup timed out"));
        }
        Ok(self.processed(code.as_str()))
    }

    async fn upsert(&self, record: &ProcessedOrderUpsert) -> Result<(), StoreError> {
        self.check()?;
        let mut state = self.state();
        state.upserts.push(record.clone());
        let created_at = state
            .processed
            .get(record.order_code.as_str())
            .map_or(record.synced_at, |existing| existing.created_at);
        state.processed.insert(
            record.order_code.as_str().to_owned(),
            ProcessedOrder {
                order_code: record.order_code.clone(),
                crm_deal_id: record.crm_deal_id,
                upstream_state: record.upstream_state.clone(),
                fingerprint: record.fingerprint.clone(),
                processing_time_ms: record.processing_time_ms,
                retry_count: record.retry_count,
                last_error: record.last_error.clone(),
                last_synced_at: record.synced_at,
                created_at,
                updated_at: record.synced_at,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl LockRepository for InMemorySyncStore {
    async fn try_acquire(
        &self,
        name: LockName,
        holder: &str,
        now: DateTime<Utc>,
        locked_until: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.check()?;
        let mut state = self.state();
        let available = state
            .locks
            .get(name.as_str())
            .is_none_or(|record| record.locked_until < now);
        if available {
            state.locks.insert(
                name.as_str().to_owned(),
                LockRecord {
                    name: name.as_str().to_owned(),
                    holder: holder.to_owned(),
                    locked_until,
                    updated_at: now,
                },
            );
        }
        Ok(available)
    }

    async fn find(&self, name: LockName) -> Result<Option<LockRecord>, StoreError> {
        self.check()?;
        Ok(self.lock(name))
    }

    async fn release(
        &self,
        name: LockName,
        holder: &str,
        now: DateTime<Utc>,
        expired_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check()?;
        if let Some(record) = self.state().locks.get_mut(name.as_str()) {
            if record.holder == holder {
                record.locked_until = expired_at;
                record.updated_at = now;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SyncMetaRepository for InMemorySyncStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        Ok(self.meta_value(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check()?;
        self.seed_meta(key, value);
        Ok(())
    }
}

#[async_trait]
impl DailyStatsRepository for InMemorySyncStore {
    async fn find(&self, date: NaiveDate) -> Result<Option<DailyStats>, StoreError> {
        self.check()?;
        Ok(self.stats_for(date))
    }

    async fn increment(&self, date: NaiveDate, delta: &DailyStatsDelta) -> Result<(), StoreError> {
        self.check()?;
        self.state()
            .stats
            .entry(date)
            .or_insert_with(|| DailyStats::empty(date))
            .apply(delta);
        Ok(())
    }
}

#[async_trait]
impl ErrorLogRepository for InMemorySyncStore {
    async fn append(&self, entry: &NewErrorRecord) -> Result<(), StoreError> {
        self.check()?;
        let mut state = self.state();
        let id = i64::try_from(state.errors.len()).unwrap_or(i64::MAX) + 1;
        state.errors.push(ErrorRecord {
            id,
            error_type: entry.kind.as_str().to_owned(),
            message: entry.message.clone(),
            details: entry.details.clone(),
            order_code: entry.order_code.as_ref().map(|code| code.as_str().to_owned()),
            occurred_at: entry.occurred_at,
        });
        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<ErrorRecord>, StoreError> {
        self.check()?;
        Ok(self
            .state()
            .errors
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CrmTokenRepository for InMemorySyncStore {
    async fn load(&self) -> Result<Option<CrmTokens>, StoreError> {
        self.check()?;
        Ok(self.tokens())
    }

    async fn store(&self, tokens: &CrmTokens) -> Result<(), StoreError> {
        self.check()?;
        self.state().tokens = Some(tokens.clone());
        Ok(())
    }
}
