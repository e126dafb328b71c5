//! Settings loading and validation.

use super::*;
use env_lock::lock_env;
use rstest::rstest;

const KEYS: [&str; 31] = [
    "KASPI_API_TOKEN",
    "KASPI_BASE_URL",
    "KASPI_ALLOWED_STATES",
    "KASPI_PAGE_SIZE",
    "KASPI_TIMEOUT_SECONDS",
    "AMO_BASE_URL",
    "AMO_CLIENT_ID",
    "AMO_CLIENT_SECRET",
    "AMO_REDIRECT_URI",
    "AMO_ACCESS_TOKEN",
    "AMO_REFRESH_TOKEN",
    "AMO_PIPELINE_ID",
    "AMO_STATUS_ID",
    "AMO_RPS",
    "AMO_USE_FREE_POSITIONS",
    "AMO_FREE_POSITION_CATALOG_ID",
    "AMO_TIMEOUT_SECONDS",
    "SYNC_DATABASE_URL",
    "SYNC_DRY_RUN",
    "SYNC_NOTE_TEMPLATE",
    "SYNC_UTC_OFFSET_HOURS",
    "SYNC_MAX_RECONCILE_PAGES",
    "SYNC_LOG_LEVEL",
    "ALERT_FAIL_STREAK",
    "ALERT_BACKLOG_THRESHOLD",
    "ALERT_HEARTBEAT_MINUTES",
    "ALERT_RECONCILE_STALE_MINUTES",
    "ALERT_TELEGRAM_BOT_TOKEN",
    "ALERT_TELEGRAM_CHAT_ID",
    "ALERT_HEALTH_USERNAME",
    "ALERT_HEALTH_PASSWORD",
];

/// Every settings key, cleared unless listed in `set`.
fn env_with(set: &[(&str, &str)]) -> Vec<(&'static str, Option<String>)> {
    KEYS.iter()
        .map(|key| {
            let value = set
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| (*value).to_owned());
            (*key, value)
        })
        .collect()
}

fn complete_env() -> Vec<(&'static str, &'static str)> {
    vec![
        ("KASPI_API_TOKEN", "kaspi-token"),
        ("AMO_BASE_URL", "https://acme.amocrm.ru"),
        ("AMO_CLIENT_ID", "client"),
        ("AMO_CLIENT_SECRET", "secret"),
        ("AMO_REDIRECT_URI", "https://example.com/oauth"),
        ("AMO_ACCESS_TOKEN", "access"),
        ("AMO_REFRESH_TOKEN", "refresh"),
        ("AMO_PIPELINE_ID", "7001"),
        ("AMO_STATUS_ID", "142"),
        ("SYNC_DATABASE_URL", "postgres://localhost/sync"),
    ]
}

#[rstest]
fn defaults_apply_when_optional_values_are_missing() {
    let vars = complete_env();
    let _guard = lock_env(env_with(&vars));

    let settings = Settings::load().expect("settings load");

    assert!(!settings.dry_run());
    assert_eq!(settings.log_level(), "info");
    assert_eq!(settings.amo_rps(), 6);
    assert_eq!(settings.note_template().as_str(), DEFAULT_NOTE_TEMPLATE);

    let poll = settings.poll_config().expect("poll config");
    assert_eq!(poll.page_size, 100);
    assert_eq!(poll.backlog_threshold, 25);
    assert_eq!(poll.fail_streak, 3);
    assert_eq!(poll.allowed_states.len(), 6);

    let kaspi = settings.kaspi_http_config().expect("kaspi config");
    assert_eq!(kaspi.base_url.as_str(), DEFAULT_KASPI_BASE_URL);
    assert_eq!(kaspi.timeout, Duration::from_secs(30));

    let thresholds = settings.health_thresholds().expect("thresholds");
    assert_eq!(thresholds.heartbeat_max_age, TimeDelta::minutes(5));
    assert_eq!(thresholds.reconcile_max_age, TimeDelta::minutes(20));

    assert!(settings.telegram_config().expect("telegram").is_none());
    assert!(settings.health_credentials().expect("credentials").is_none());
}

#[rstest]
fn environment_overrides_are_respected() {
    let mut vars = complete_env();
    vars.extend([
        ("KASPI_ALLOWED_STATES", " NEW , PICKUP ,,"),
        ("KASPI_PAGE_SIZE", "50"),
        ("AMO_RPS", "3"),
        ("AMO_USE_FREE_POSITIONS", "false"),
        ("AMO_FREE_POSITION_CATALOG_ID", "9011"),
        ("SYNC_DRY_RUN", "true"),
        ("SYNC_UTC_OFFSET_HOURS", "6"),
        ("SYNC_MAX_RECONCILE_PAGES", "12"),
        ("ALERT_TELEGRAM_BOT_TOKEN", "123:abc"),
        ("ALERT_TELEGRAM_CHAT_ID", "-1001"),
        ("ALERT_HEALTH_USERNAME", "ops"),
        ("ALERT_HEALTH_PASSWORD", "pw"),
    ]);
    let _guard = lock_env(env_with(&vars));

    let settings = Settings::load().expect("settings load");

    let reconcile = settings.reconcile_config().expect("reconcile config");
    assert_eq!(
        reconcile.allowed_states,
        vec![
            OrderState::new("NEW").expect("state"),
            OrderState::new("PICKUP").expect("state"),
        ]
    );
    assert_eq!(reconcile.page_size, 50);
    assert_eq!(reconcile.max_pages, 12);
    assert_eq!(reconcile.free_position_catalog_id, Some(9011));
    assert!(reconcile.dry_run);

    let placement = settings.deal_placement().expect("placement");
    assert_eq!(placement.pipeline_id, 7001);
    assert!(!placement.use_free_positions);
    assert_eq!(settings.amo_rps(), 3);

    let telegram = settings
        .telegram_config()
        .expect("telegram")
        .expect("telegram configured");
    assert_eq!(telegram.chat_id, -1001);
    assert_eq!(telegram.utc_offset.local_minus_utc(), 6 * 3600);
    assert_eq!(
        settings.health_credentials().expect("credentials"),
        Some(HealthCredentials::new("ops", "pw"))
    );
}

#[rstest]
fn crm_urls_are_derived_from_the_account_root() {
    let mut vars = complete_env();
    vars.retain(|(key, _)| *key != "AMO_BASE_URL");
    vars.push(("AMO_BASE_URL", "https://acme.amocrm.ru/"));
    let _guard = lock_env(env_with(&vars));

    let settings = Settings::load().expect("settings load");

    assert_eq!(
        settings.amo_api_url().expect("api url").as_str(),
        "https://acme.amocrm.ru/api/v4"
    );
    assert_eq!(
        settings.oauth_config().expect("oauth").token_url.as_str(),
        "https://acme.amocrm.ru/oauth2/access_token"
    );
}

#[rstest]
#[case("KASPI_API_TOKEN")]
#[case("AMO_PIPELINE_ID")]
#[case("AMO_REFRESH_TOKEN")]
fn missing_secrets_are_reported_by_name(#[case] dropped: &'static str) {
    let mut vars = complete_env();
    vars.retain(|(key, _)| *key != dropped);
    let _guard = lock_env(env_with(&vars));

    let settings = Settings::load().expect("settings load");
    let error = match dropped {
        "KASPI_API_TOKEN" => settings.kaspi_http_config().map(|_| ()),
        "AMO_PIPELINE_ID" => settings.deal_placement().map(|_| ()),
        _ => settings.seed_tokens().map(|_| ()),
    }
    .expect_err("missing setting");

    assert_eq!(error, SettingsError::Missing { name: dropped });
}

#[rstest]
fn migrate_only_needs_the_database_url() {
    let _guard = lock_env(env_with(&[("SYNC_DATABASE_URL", "postgres://localhost/sync")]));

    let settings = Settings::load().expect("settings load");

    assert_eq!(
        settings.database_url().expect("database url"),
        "postgres://localhost/sync"
    );
    assert!(settings.kaspi_http_config().is_err());
}

#[rstest]
#[case(&[("AMO_RPS", "40")], 7)]
#[case(&[("AMO_RPS", "0")], 1)]
fn rps_is_clamped(#[case] vars: &[(&str, &str)], #[case] expected: u32) {
    let _guard = lock_env(env_with(vars));
    let settings = Settings::load().expect("settings load");
    assert_eq!(settings.amo_rps(), expected);
}

#[rstest]
fn zero_page_size_is_rejected() {
    let _guard = lock_env(env_with(&[("KASPI_PAGE_SIZE", "0")]));
    let settings = Settings::load().expect("settings load");
    assert!(matches!(
        settings.poll_config(),
        Err(SettingsError::Invalid {
            name: "KASPI_PAGE_SIZE",
            ..
        })
    ));
}

#[rstest]
fn half_configured_health_auth_is_rejected() {
    let _guard = lock_env(env_with(&[("ALERT_HEALTH_USERNAME", "ops")]));
    let settings = Settings::load().expect("settings load");
    assert!(settings.health_credentials().is_err());
}

#[rstest]
fn out_of_range_offset_is_rejected() {
    let _guard = lock_env(env_with(&[("SYNC_UTC_OFFSET_HOURS", "20")]));
    let settings = Settings::load().expect("settings load");
    assert!(settings.stats_calendar().is_err());
}

#[rstest]
fn every_group_loads_from_an_empty_environment() {
    let _guard = lock_env(env_with(&[]));

    let settings = Settings::load().expect("settings load");

    assert_eq!(settings.kaspi.page_size, 100);
    assert_eq!(settings.amo.rps, 6);
    assert!(settings.amo.use_free_positions);
    assert_eq!(settings.sync.utc_offset_hours, 5);
    assert_eq!(settings.alert.fail_streak, 3);
    assert_eq!(settings.allowed_states().expect("states").len(), 6);
    assert!(matches!(
        settings.database_url(),
        Err(SettingsError::Missing {
            name: "SYNC_DATABASE_URL"
        })
    ));
}

#[rstest]
#[case("PICKUP", &["PICKUP"])]
#[case("NEW,PICKUP", &["NEW", "PICKUP"])]
#[case("ARCHIVE, DELIVERY", &["ARCHIVE", "DELIVERY"])]
fn allowed_states_load_from_one_variable(#[case] raw: &str, #[case] expected: &[&str]) {
    let _guard = lock_env(env_with(&[("KASPI_ALLOWED_STATES", raw)]));

    let settings = Settings::load().expect("settings load");
    let states = settings.allowed_states().expect("states");

    let names: Vec<&str> = states.iter().map(OrderState::as_str).collect();
    assert_eq!(names, expected);
}

#[test]
fn default_settings_use_the_loaded_fallbacks() {
    let settings = Settings::default();
    assert_eq!(settings.poll_config().expect("poll").page_size, 100);
    assert_eq!(settings.amo_timeout().expect("timeout"), Duration::from_secs(30));
    assert!(settings.deal_placement().is_err());
}

#[test]
fn state_lists_skip_blanks() {
    let states = parse_states("NEW,, ARCHIVE ".split(',')).expect("states");
    assert_eq!(states.len(), 2);
    assert_eq!(states[1].as_str(), "ARCHIVE");
}
