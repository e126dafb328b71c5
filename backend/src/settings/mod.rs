//! Deployment configuration.
//!
//! Four OrthoConfig groups (`KASPI_*`, `AMO_*`, `SYNC_*`, `ALERT_*`) are
//! loaded once and validated on demand into the typed configs the app
//! wires together. Commands only validate the groups they use, so
//! `migrate` does not need CRM secrets.

mod groups;

use std::ffi::OsString;
use std::time::Duration;

use chrono::{FixedOffset, TimeDelta};
use ortho_config::OrthoConfig;
use url::Url;

use crate::domain::ports::CrmTokens;
use crate::domain::{
    DEFAULT_NOTE_TEMPLATE, HealthThresholds, NoteTemplate, OrderState, PollPipelineConfig,
    ReconcilePipelineConfig, StatsCalendar,
};
use crate::inbound::http::HealthCredentials;
use crate::outbound::alerts::TelegramConfig;
use crate::outbound::amocrm::{DealPlacement, OAuthClientConfig};
use crate::outbound::http_support::join_path;
use crate::outbound::kaspi::KaspiHttpConfig;
use crate::outbound::rate_gate::MAX_RPS;

pub use groups::{AlertSettings, AmoSettings, KaspiSettings, SyncSettings};

pub const DEFAULT_KASPI_BASE_URL: &str = "https://kaspi.kz/shop/api/v2";
pub const DEFAULT_ALLOWED_STATES: &str = "NEW,SIGN_REQUIRED,PICKUP,DELIVERY,KASPI_DELIVERY,ARCHIVE";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Configuration problems detected at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to load {group} settings: {message}")]
    Load { group: &'static str, message: String },
    #[error("missing required setting {name}")]
    Missing { name: &'static str },
    #[error("invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

fn required<'a>(value: Option<&'a String>, name: &'static str) -> Result<&'a str, SettingsError> {
    value
        .map(|raw| raw.trim())
        .filter(|raw| !raw.is_empty())
        .ok_or(SettingsError::Missing { name })
}

fn load_error<E: std::fmt::Display>(group: &'static str) -> impl Fn(E) -> SettingsError {
    move |err| SettingsError::Load {
        group,
        message: err.to_string(),
    }
}

fn parse_url(raw: &str, name: &'static str) -> Result<Url, SettingsError> {
    Url::parse(raw).map_err(|err| SettingsError::Invalid {
        name,
        message: err.to_string(),
    })
}

fn positive<T: Default + PartialEq + Copy>(value: T, name: &'static str) -> Result<T, SettingsError> {
    if value == T::default() {
        Err(SettingsError::Invalid {
            name,
            message: "must be positive".to_owned(),
        })
    } else {
        Ok(value)
    }
}

/// Parse configured states; surrounding whitespace and blanks are dropped.
pub fn parse_states<'a>(
    states: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<OrderState>, SettingsError> {
    states
        .into_iter()
        .map(str::trim)
        .filter(|state| !state.is_empty())
        .map(|state| {
            OrderState::new(state).map_err(|err| SettingsError::Invalid {
                name: "KASPI_ALLOWED_STATES",
                message: err.to_string(),
            })
        })
        .collect()
}

/// All settings groups, as loaded.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub kaspi: KaspiSettings,
    pub amo: AmoSettings,
    pub sync: SyncSettings,
    pub alert: AlertSettings,
}

impl Settings {
    /// Load every group from the environment and configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Load`] when a group cannot be parsed, e.g. a
    /// non-numeric `AMO_PIPELINE_ID`.
    pub fn load() -> Result<Self, SettingsError> {
        let args = || [OsString::from("kaspi-amo-sync")];
        Ok(Self {
            kaspi: KaspiSettings::load_from_iter(args()).map_err(load_error("KASPI"))?,
            amo: AmoSettings::load_from_iter(args()).map_err(load_error("AMO"))?,
            sync: SyncSettings::load_from_iter(args()).map_err(load_error("SYNC"))?,
            alert: AlertSettings::load_from_iter(args()).map_err(load_error("ALERT"))?,
        })
    }

    pub fn database_url(&self) -> Result<&str, SettingsError> {
        required(self.sync.database_url.as_ref(), "SYNC_DATABASE_URL")
    }

    pub fn dry_run(&self) -> bool {
        self.sync.dry_run
    }

    pub fn log_level(&self) -> &str {
        self.sync
            .log_level
            .as_deref()
            .map(str::trim)
            .filter(|level| !level.is_empty())
            .unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn note_template(&self) -> NoteTemplate {
        NoteTemplate::new(
            self.sync
                .note_template
                .clone()
                .filter(|template| !template.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_NOTE_TEMPLATE.to_owned()),
        )
    }

    /// Processing-local offset used for statistics dates and alert stamps.
    pub fn utc_offset(&self) -> Result<FixedOffset, SettingsError> {
        let hours = self.sync.utc_offset_hours;
        if !(-12..=14).contains(&hours) {
            return Err(SettingsError::Invalid {
                name: "SYNC_UTC_OFFSET_HOURS",
                message: format!("{hours} is outside -12..=14"),
            });
        }
        FixedOffset::east_opt(hours * 3600).ok_or(SettingsError::Invalid {
            name: "SYNC_UTC_OFFSET_HOURS",
            message: format!("{hours} is not a valid offset"),
        })
    }

    pub fn stats_calendar(&self) -> Result<StatsCalendar, SettingsError> {
        self.utc_offset().map(StatsCalendar::new)
    }

    pub fn allowed_states(&self) -> Result<Vec<OrderState>, SettingsError> {
        match &self.kaspi.allowed_states {
            Some(states) => parse_states(states.iter().map(String::as_str)),
            None => parse_states(DEFAULT_ALLOWED_STATES.split(',')),
        }
    }

    fn page_size(&self) -> Result<u32, SettingsError> {
        positive(self.kaspi.page_size, "KASPI_PAGE_SIZE")
    }

    pub fn poll_config(&self) -> Result<PollPipelineConfig, SettingsError> {
        Ok(PollPipelineConfig {
            allowed_states: self.allowed_states()?,
            page_size: self.page_size()?,
            backlog_threshold: positive(self.alert.backlog_threshold, "ALERT_BACKLOG_THRESHOLD")?,
            fail_streak: self.fail_streak()?,
            dry_run: self.dry_run(),
            ..PollPipelineConfig::default()
        })
    }

    pub fn reconcile_config(&self) -> Result<ReconcilePipelineConfig, SettingsError> {
        Ok(ReconcilePipelineConfig {
            allowed_states: self.allowed_states()?,
            page_size: self.page_size()?,
            max_pages: positive(self.sync.max_reconcile_pages, "SYNC_MAX_RECONCILE_PAGES")?,
            free_position_catalog_id: self.amo.free_position_catalog_id,
            dry_run: self.dry_run(),
            ..ReconcilePipelineConfig::default()
        })
    }

    fn fail_streak(&self) -> Result<u32, SettingsError> {
        positive(self.alert.fail_streak, "ALERT_FAIL_STREAK")
    }

    pub fn health_thresholds(&self) -> Result<HealthThresholds, SettingsError> {
        let heartbeat = positive(self.alert.heartbeat_minutes, "ALERT_HEARTBEAT_MINUTES")?;
        let reconcile = positive(
            self.alert.reconcile_stale_minutes,
            "ALERT_RECONCILE_STALE_MINUTES",
        )?;
        Ok(HealthThresholds {
            heartbeat_max_age: TimeDelta::minutes(i64::from(heartbeat)),
            reconcile_max_age: TimeDelta::minutes(i64::from(reconcile)),
            fail_streak: self.fail_streak()?,
            ..HealthThresholds::default()
        })
    }

    pub fn kaspi_http_config(&self) -> Result<KaspiHttpConfig, SettingsError> {
        let base_url = self
            .kaspi
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_KASPI_BASE_URL);
        Ok(KaspiHttpConfig {
            base_url: parse_url(base_url, "KASPI_BASE_URL")?,
            api_token: required(self.kaspi.api_token.as_ref(), "KASPI_API_TOKEN")?.to_owned(),
            timeout: Duration::from_secs(positive(
                self.kaspi.timeout_seconds,
                "KASPI_TIMEOUT_SECONDS",
            )?),
        })
    }

    fn amo_base_url(&self) -> Result<Url, SettingsError> {
        parse_url(
            required(self.amo.base_url.as_ref(), "AMO_BASE_URL")?,
            "AMO_BASE_URL",
        )
    }

    /// Versioned CRM API root.
    pub fn amo_api_url(&self) -> Result<Url, SettingsError> {
        join_path(&self.amo_base_url()?, "api/v4").map_err(|err| SettingsError::Invalid {
            name: "AMO_BASE_URL",
            message: err.to_string(),
        })
    }

    pub fn oauth_config(&self) -> Result<OAuthClientConfig, SettingsError> {
        let token_url = join_path(&self.amo_base_url()?, "oauth2/access_token").map_err(|err| {
            SettingsError::Invalid {
                name: "AMO_BASE_URL",
                message: err.to_string(),
            }
        })?;
        Ok(OAuthClientConfig {
            token_url,
            client_id: required(self.amo.client_id.as_ref(), "AMO_CLIENT_ID")?.to_owned(),
            client_secret: required(self.amo.client_secret.as_ref(), "AMO_CLIENT_SECRET")?
                .to_owned(),
            redirect_uri: required(self.amo.redirect_uri.as_ref(), "AMO_REDIRECT_URI")?
                .to_owned(),
        })
    }

    /// Tokens used when the store holds none yet.
    pub fn seed_tokens(&self) -> Result<CrmTokens, SettingsError> {
        Ok(CrmTokens {
            access_token: required(self.amo.access_token.as_ref(), "AMO_ACCESS_TOKEN")?
                .to_owned(),
            refresh_token: required(self.amo.refresh_token.as_ref(), "AMO_REFRESH_TOKEN")?
                .to_owned(),
            expires_at: None,
        })
    }

    pub fn deal_placement(&self) -> Result<DealPlacement, SettingsError> {
        Ok(DealPlacement {
            pipeline_id: self.amo.pipeline_id.ok_or(SettingsError::Missing {
                name: "AMO_PIPELINE_ID",
            })?,
            status_id: self.amo.status_id.ok_or(SettingsError::Missing {
                name: "AMO_STATUS_ID",
            })?,
            use_free_positions: self.amo.use_free_positions,
            free_position_catalog_id: self.amo.free_position_catalog_id,
        })
    }

    /// CRM requests per second, clamped to what the API tolerates.
    pub fn amo_rps(&self) -> u32 {
        self.amo.rps.clamp(1, MAX_RPS)
    }

    pub fn amo_timeout(&self) -> Result<Duration, SettingsError> {
        positive(self.amo.timeout_seconds, "AMO_TIMEOUT_SECONDS").map(Duration::from_secs)
    }

    /// Telegram delivery, when both the bot token and chat id are set.
    pub fn telegram_config(&self) -> Result<Option<TelegramConfig>, SettingsError> {
        let token = self
            .alert
            .telegram_bot_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty());
        match (token, self.alert.telegram_chat_id) {
            (Some(bot_token), Some(chat_id)) => Ok(Some(TelegramConfig {
                bot_token: bot_token.to_owned(),
                chat_id,
                utc_offset: self.utc_offset()?,
            })),
            _ => Ok(None),
        }
    }

    /// Basic-auth pair for the health endpoint; `None` leaves it open.
    pub fn health_credentials(&self) -> Result<Option<HealthCredentials>, SettingsError> {
        match (&self.alert.health_username, &self.alert.health_password) {
            (None, None) => Ok(None),
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Ok(Some(HealthCredentials::new(user.as_str(), pass.as_str())))
            }
            _ => Err(SettingsError::Invalid {
                name: "ALERT_HEALTH_USERNAME",
                message: "username and password must be set together".to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests;
