#![expect(
    clippy::expect_used,
    reason = "test code uses expect for clear failure messages"
)]

use rstest::rstest;

use super::*;

fn lint_one(file: &str, contents: &str) -> Result<(), LintError> {
    lint_sources(&[LintSource::new(file, contents)])
}

fn messages(file: &str, contents: &str) -> Vec<String> {
    match lint_one(file, contents) {
        Ok(()) => Vec::new(),
        Err(LintError::Violations(violations)) => {
            violations.into_iter().map(|v| v.message).collect()
        }
        Err(other) => panic!("unexpected lint failure: {other}"),
    }
}

#[rstest]
#[case::handler_uses_domain(
    "inbound/http/health.rs",
    "use crate::domain::HealthReporter; fn handler() { let _ = HealthReporter::new; }",
    true
)]
#[case::handler_reaches_persistence(
    "inbound/http/health.rs",
    "use crate::outbound::persistence::DieselSyncMetaRepository;",
    false
)]
#[case::handler_via_crate_name(
    "inbound/http/health.rs",
    "use kaspi_amo_sync::outbound::kaspi::KaspiHttpSource;",
    false
)]
#[case::handler_uses_diesel("inbound/http/health.rs", "use diesel::prelude::*;", false)]
#[case::handler_reads_settings(
    "inbound/http/health.rs",
    "fn f() { let _ = crate::settings::Settings::default(); }",
    false
)]
#[case::pipeline_reaches_inbound("domain/poll_pipeline/mod.rs", "use crate::inbound::http;", false)]
#[case::pipeline_builds_http_client(
    "domain/order_sync.rs",
    "fn fetch() { let _ = reqwest::Client::new(); }",
    false
)]
#[case::local_binding_named_like_crate(
    "domain/order_sync.rs",
    "fn f(url: &str) -> &str { url }",
    true
)]
#[case::retry_uses_tokio(
    "domain/retry/mod.rs",
    "use tokio::time::sleep; use tracing::warn;",
    true
)]
#[case::domain_reads_env("domain/sync_meta.rs", "fn f() { let _ = std::env::var(\"X\"); }", false)]
#[case::domain_uses_collections("domain/sync_meta.rs", "use std::collections::HashMap;", true)]
#[case::domain_reaches_app("domain/health.rs", "use super::super::app::SyncApp;", false)]
#[case::repository_reaches_inbound(
    "outbound/persistence/diesel_lock_repository.rs",
    "use crate::inbound::http;",
    false
)]
#[case::gateway_uses_actix("outbound/amocrm/http_gateway.rs", "use actix_web::web;", false)]
#[case::source_implements_port(
    "outbound/kaspi/http_source.rs",
    "use crate::domain::ports::OrderSource; use reqwest::Client; use super::dto::OrderDto;",
    true
)]
#[case::adapter_shares_helpers(
    "outbound/alerts/telegram.rs",
    "use crate::outbound::http_support::status_message;",
    true
)]
fn boundary_rules(#[case] file: &str, #[case] contents: &str, #[case] ok: bool) {
    let result = lint_one(file, contents);
    assert_eq!(result.is_ok(), ok, "result: {result:?}");
}

#[rstest]
fn grouped_use_trees_are_flattened() {
    let found = messages(
        "domain/alerting.rs",
        "use crate::{domain::ports::AlertChannel, outbound::alerts::{LogAlertChannel, TelegramAlertChannel}};",
    );
    assert_eq!(found, vec!["domain must not depend on crate::outbound".to_owned()]);
}

#[rstest]
fn repeated_crossings_in_one_file_are_reported_once() {
    let found = messages(
        "domain/lock_manager.rs",
        "use diesel::prelude::*; fn f() { let _ = diesel::update; }",
    );
    assert_eq!(found, vec!["domain must not depend on the `diesel` crate".to_owned()]);
}

#[rstest]
fn files_outside_the_layers_are_rejected() {
    assert!(matches!(
        lint_one("settings/mod.rs", "fn thing() {}"),
        Err(LintError::OutsideLayers(_))
    ));
}

#[rstest]
fn unparsable_sources_are_reported() {
    assert!(matches!(
        lint_one("domain/phone.rs", "fn broken( {"),
        Err(LintError::Parse { .. })
    ));
}

#[rstest]
fn report_lists_every_violation() {
    let err = lint_sources(&[
        LintSource::new("domain/health.rs", "use diesel::prelude::*;"),
        LintSource::new("outbound/kaspi/mod.rs", "use clap::Parser;"),
    ])
    .expect_err("two violations");
    assert_eq!(
        err.to_string(),
        "2 layer boundary violation(s):\n\
         - domain/health.rs: domain must not depend on the `diesel` crate\n\
         - outbound/kaspi/mod.rs: outbound must not depend on the `clap` crate"
    );
}
