//! Raw settings groups loaded via OrthoConfig.
//!
//! Values with a fixed fallback carry it as an OrthoConfig default, so every
//! group loads even when none of its variables is set. Secrets and ids stay
//! optional; required-value checks live in [`super::Settings`] so that a
//! missing secret is reported by name.

use ortho_config::OrthoConfig;
use serde::{Deserialize, Deserializer};

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_AMO_RPS: u32 = 6;
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 5;
pub const DEFAULT_MAX_RECONCILE_PAGES: u32 = 100;
pub const DEFAULT_FAIL_STREAK: u32 = 3;
pub const DEFAULT_BACKLOG_THRESHOLD: u32 = 25;
pub const DEFAULT_HEARTBEAT_MINUTES: u32 = 5;
pub const DEFAULT_RECONCILE_STALE_MINUTES: u32 = 20;

#[derive(Deserialize)]
#[serde(untagged)]
enum StateList {
    Joined(String),
    Items(Vec<String>),
}

/// Accept `NEW,PICKUP` as one string or as a list split by the env layer.
fn state_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<StateList>::deserialize(deserializer)?;
    Ok(raw.map(|list| match list {
        StateList::Joined(joined) => joined.split(',').map(str::to_owned).collect(),
        StateList::Items(items) => items,
    }))
}

/// `KASPI_*`: marketplace API access.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "KASPI")]
pub struct KaspiSettings {
    pub api_token: Option<String>,
    pub base_url: Option<String>,
    /// Order states to sync.
    #[serde(default, deserialize_with = "state_list")]
    pub allowed_states: Option<Vec<String>>,
    #[ortho_config(default = DEFAULT_PAGE_SIZE)]
    pub page_size: u32,
    #[ortho_config(default = DEFAULT_TIMEOUT_SECONDS)]
    pub timeout_seconds: u64,
}

impl Default for KaspiSettings {
    fn default() -> Self {
        Self {
            api_token: None,
            base_url: None,
            allowed_states: None,
            page_size: DEFAULT_PAGE_SIZE,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

/// `AMO_*`: CRM account, OAuth client, and deal placement.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "AMO")]
pub struct AmoSettings {
    /// Account root, e.g. `https://acme.amocrm.ru`.
    pub base_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    /// Seeds the token store on first use.
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub pipeline_id: Option<u64>,
    pub status_id: Option<u64>,
    #[ortho_config(default = DEFAULT_AMO_RPS)]
    pub rps: u32,
    #[ortho_config(default = true)]
    pub use_free_positions: bool,
    pub free_position_catalog_id: Option<u64>,
    #[ortho_config(default = DEFAULT_TIMEOUT_SECONDS)]
    pub timeout_seconds: u64,
}

impl Default for AmoSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            access_token: None,
            refresh_token: None,
            pipeline_id: None,
            status_id: None,
            rps: DEFAULT_AMO_RPS,
            use_free_positions: true,
            free_position_catalog_id: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

/// `SYNC_*`: store, run mode, and presentation.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "SYNC")]
pub struct SyncSettings {
    pub database_url: Option<String>,
    #[ortho_config(default = false)]
    pub dry_run: bool,
    pub note_template: Option<String>,
    #[ortho_config(default = DEFAULT_UTC_OFFSET_HOURS)]
    pub utc_offset_hours: i32,
    #[ortho_config(default = DEFAULT_MAX_RECONCILE_PAGES)]
    pub max_reconcile_pages: u32,
    pub log_level: Option<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            database_url: None,
            dry_run: false,
            note_template: None,
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
            max_reconcile_pages: DEFAULT_MAX_RECONCILE_PAGES,
            log_level: None,
        }
    }
}

/// `ALERT_*`: thresholds, Telegram delivery, and health endpoint access.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "ALERT")]
pub struct AlertSettings {
    #[ortho_config(default = DEFAULT_FAIL_STREAK)]
    pub fail_streak: u32,
    #[ortho_config(default = DEFAULT_BACKLOG_THRESHOLD)]
    pub backlog_threshold: u32,
    #[ortho_config(default = DEFAULT_HEARTBEAT_MINUTES)]
    pub heartbeat_minutes: u32,
    #[ortho_config(default = DEFAULT_RECONCILE_STALE_MINUTES)]
    pub reconcile_stale_minutes: u32,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<i64>,
    pub health_username: Option<String>,
    pub health_password: Option<String>,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            fail_streak: DEFAULT_FAIL_STREAK,
            backlog_threshold: DEFAULT_BACKLOG_THRESHOLD,
            heartbeat_minutes: DEFAULT_HEARTBEAT_MINUTES,
            reconcile_stale_minutes: DEFAULT_RECONCILE_STALE_MINUTES,
            telegram_bot_token: None,
            telegram_chat_id: None,
            health_username: None,
            health_password: None,
        }
    }
}
