//! Builders for the sync services.

use std::sync::Arc;

use mockable::Clock;
use reqwest::Client;
use tracing::{info, warn};

use super::error::AppError;
use super::store::StoreAdapters;
use crate::domain::ports::{AlertChannel, CrmGateway, OrderSource};
use crate::domain::{
    AlertService, CrmRetryPolicies, DealCreator, ErrorJournal, HealthReporter, LockManager,
    LockName, OrderLedger, PollPipeline, ReconcilePipeline, Retrier, RetryPolicy,
    RetryingCrmGateway, RetryingOrderSource, StatsRecorder, SyncContext, SyncMeta,
};
use crate::outbound::alerts::{LogAlertChannel, TelegramAlertChannel};
use crate::outbound::amocrm::{AmoHttpGateway, HttpTokenRefresher, TokenManager};
use crate::outbound::kaspi::KaspiHttpSource;
use crate::outbound::rate_gate::RateGate;
use crate::settings::Settings;

const LIST_ORDERS_ATTEMPTS: u32 = 3;

/// The log channel always, Telegram when configured.
///
/// # Errors
///
/// Fails when the alert settings are invalid or the Telegram client cannot
/// be built.
pub fn build_alert_service(
    settings: &Settings,
    store: &StoreAdapters,
    clock: Arc<dyn Clock>,
) -> Result<Arc<AlertService>, AppError> {
    let meta = SyncMeta::new(store.meta.clone(), clock.clone());
    let journal = ErrorJournal::new(store.errors.clone(), meta, clock.clone());
    let mut channels: Vec<Arc<dyn AlertChannel>> = vec![Arc::new(LogAlertChannel)];
    match settings.telegram_config()? {
        Some(config) => channels.push(Arc::new(TelegramAlertChannel::new(config)?)),
        None => warn!("no telegram channel configured; alerts go to the log only"),
    }
    Ok(Arc::new(AlertService::new(journal, channels, clock)))
}

/// # Errors
///
/// Fails when the threshold or offset settings are invalid.
pub fn build_health_reporter(
    settings: &Settings,
    store: &StoreAdapters,
    clock: Arc<dyn Clock>,
) -> Result<HealthReporter, AppError> {
    Ok(HealthReporter::new(
        SyncMeta::new(store.meta.clone(), clock.clone()),
        store.daily_stats.clone(),
        store.errors.clone(),
        settings.stats_calendar()?,
        clock,
        settings.health_thresholds()?,
    ))
}

/// Both pipelines over one shared context.
pub struct SyncApp {
    pub poll: PollPipeline,
    pub reconcile: ReconcilePipeline,
    locks: Arc<LockManager>,
}

impl SyncApp {
    /// Wire the Kaspi and amoCRM HTTP adapters, each behind its retry
    /// decorator, into both pipelines.
    ///
    /// # Errors
    ///
    /// Fails on missing or invalid settings and when an HTTP client cannot
    /// be built.
    pub fn build(
        settings: &Settings,
        store: &StoreAdapters,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let kaspi = KaspiHttpSource::new(settings.kaspi_http_config()?)?;
        let order_source = RetryingOrderSource::new(
            Arc::new(kaspi),
            Retrier::default(),
            RetryPolicy::with_attempts(LIST_ORDERS_ATTEMPTS),
        );

        let client = Client::builder().timeout(settings.amo_timeout()?).build()?;
        let refresher = HttpTokenRefresher::new(client.clone(), settings.oauth_config()?);
        let tokens = TokenManager::new(
            store.tokens.clone(),
            Arc::new(refresher),
            settings.seed_tokens()?,
            clock.clone(),
        );
        let gate = Arc::new(RateGate::new(settings.amo_rps()));
        let amo = AmoHttpGateway::new(
            client,
            settings.amo_api_url()?,
            tokens,
            gate,
            settings.deal_placement()?,
        );
        let crm = RetryingCrmGateway::new(
            Arc::new(amo),
            Retrier::default(),
            CrmRetryPolicies::default(),
        );

        info!(
            rps = settings.amo_rps(),
            dry_run = settings.dry_run(),
            "sync adapters wired"
        );
        Self::from_parts(settings, store, clock, Arc::new(order_source), Arc::new(crm))
    }

    /// Wire the pipelines around caller-supplied order source and CRM.
    ///
    /// # Errors
    ///
    /// Fails on invalid pipeline, alert, or calendar settings.
    pub fn from_parts(
        settings: &Settings,
        store: &StoreAdapters,
        clock: Arc<dyn Clock>,
        order_source: Arc<dyn OrderSource>,
        crm: Arc<dyn CrmGateway>,
    ) -> Result<Self, AppError> {
        let meta = SyncMeta::new(store.meta.clone(), clock.clone());
        let locks = Arc::new(LockManager::new(store.locks.clone(), clock.clone()));
        let context = SyncContext {
            order_source,
            creator: Arc::new(DealCreator::new(crm, settings.note_template())),
            ledger: OrderLedger::new(store.processed.clone(), clock.clone()),
            locks: locks.clone(),
            meta: meta.clone(),
            journal: ErrorJournal::new(store.errors.clone(), meta, clock.clone()),
            alerts: build_alert_service(settings, store, clock.clone())?,
            stats: StatsRecorder::new(
                store.daily_stats.clone(),
                settings.stats_calendar()?,
                clock.clone(),
            ),
            clock,
        };
        Ok(Self {
            poll: PollPipeline::new(context.clone(), settings.poll_config()?),
            reconcile: ReconcilePipeline::new(context, settings.reconcile_config()?),
            locks,
        })
    }

    /// Holder name this process uses for its locks.
    pub fn lock_holder(&self) -> &str {
        self.locks.holder()
    }

    /// Best-effort release of `name` after an interrupted run.
    pub async fn release_lock(&self, name: LockName) {
        if let Err(err) = self.locks.release(name).await {
            warn!(lock = %name, error = %err, "failed to release lock on shutdown");
        }
    }
}
