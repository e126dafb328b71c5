//! Command-line entry point: `poll`, `reconcile`, `health`, `serve-health`,
//! and `migrate`.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]
#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use mockable::{Clock, DefaultClock};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use kaspi_amo_sync::app::{
    StoreAdapters, SyncApp, build_alert_service, build_health_reporter, run_until_shutdown,
    shutdown_signal,
};
use kaspi_amo_sync::domain::{HealthStatus, LockName, RunOutcome};
use kaspi_amo_sync::inbound::http::{HealthEndpoint, health_routes};
use kaspi_amo_sync::outbound::persistence::{DbPool, PoolConfig, run_migrations};
use kaspi_amo_sync::settings::Settings;

/// Exit status after a termination signal (128 + SIGINT).
const INTERRUPTED: u8 = 130;

#[derive(Debug, Parser)]
#[command(name = "kaspi-amo-sync", version, about = "Sync Kaspi orders into amoCRM deals")]
struct Cli {
    /// Human-readable logs instead of JSON lines.
    #[arg(long, global = true)]
    pretty: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch orders and create a deal for every order not yet synced.
    Poll,
    /// Re-check recently updated orders and repair drifted deals.
    Reconcile,
    /// Print the health report as JSON.
    Health {
        /// Also raise critical alerts for a stale heartbeat or failure streak.
        #[arg(long)]
        alert: bool,
    },
    /// Serve `GET /health` over HTTP.
    ServeHealth {
        #[arg(long, default_value = "0.0.0.0:3000")]
        bind: SocketAddr,
    },
    /// Apply pending database migrations.
    Migrate,
}

fn init_tracing(default_level: &str, pretty: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let result = if pretty {
        fmt().with_env_filter(filter).try_init()
    } else {
        fmt().with_env_filter(filter).json().try_init()
    };
    if let Err(err) = result {
        warn!(error = %err, "tracing init failed");
    }
}

async fn connect(settings: &Settings) -> Result<StoreAdapters> {
    let pool = DbPool::connect(PoolConfig::new(settings.database_url()?))
        .await
        .wrap_err("connecting to the sync database")?;
    Ok(StoreAdapters::diesel(&pool))
}

fn clock() -> Arc<dyn Clock> {
    Arc::new(DefaultClock)
}

async fn poll(settings: &Settings) -> Result<ExitCode> {
    let store = connect(settings).await?;
    let app = SyncApp::build(settings, &store, clock())?;
    match run_until_shutdown(app.poll.run(), shutdown_signal()).await {
        Ok(outcome) => {
            if let RunOutcome::Completed(report) = outcome.wrap_err("poll run failed")? {
                info!(
                    fetched = report.fetched,
                    processed = report.processed(),
                    skipped = report.skipped,
                    failed = report.failed(),
                    backlog = report.backlog(),
                    "poll finished"
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(_) => {
            app.release_lock(LockName::Poll).await;
            Ok(ExitCode::from(INTERRUPTED))
        }
    }
}

async fn reconcile(settings: &Settings) -> Result<ExitCode> {
    let store = connect(settings).await?;
    let app = SyncApp::build(settings, &store, clock())?;
    match run_until_shutdown(app.reconcile.run(), shutdown_signal()).await {
        Ok(outcome) => {
            if let RunOutcome::Completed(report) = outcome.wrap_err("reconcile run failed")? {
                info!(
                    checked = report.checked,
                    created = report.created,
                    updated = report.updated,
                    unchanged = report.unchanged,
                    failed = report.failed,
                    watermark = %report.watermark,
                    "reconcile finished"
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(_) => {
            app.release_lock(LockName::Reconcile).await;
            Ok(ExitCode::from(INTERRUPTED))
        }
    }
}

#[expect(
    clippy::print_stdout,
    reason = "the health report is this command's output"
)]
async fn health(settings: &Settings, alert: bool) -> Result<ExitCode> {
    let store = connect(settings).await?;
    let reporter = build_health_reporter(settings, &store, clock())?;
    let report = reporter.report().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if alert {
        let alerts = build_alert_service(settings, &store, clock())?;
        let raised = reporter.alert_on(&report, &alerts).await;
        info!(raised, "health alerts evaluated");
    }
    Ok(if report.status == HealthStatus::Error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn serve_health(settings: &Settings, bind: SocketAddr) -> Result<ExitCode> {
    let store = connect(settings).await?;
    let reporter = Arc::new(build_health_reporter(settings, &store, clock())?);
    let endpoint = web::Data::new(HealthEndpoint::new(
        reporter,
        settings.health_credentials()?,
    ));
    if settings.health_credentials()?.is_none() {
        warn!("health endpoint has no basic auth configured");
    }

    info!(%bind, "health server starting");
    HttpServer::new(move || App::new().app_data(endpoint.clone()).configure(health_routes))
        .bind(bind)
        .wrap_err_with(|| format!("binding {bind}"))?
        .run()
        .await?;
    info!("health server stopped");
    Ok(ExitCode::SUCCESS)
}

async fn migrate(settings: &Settings) -> Result<ExitCode> {
    let applied = run_migrations(settings.database_url()?).await?;
    for version in &applied {
        info!(%version, "migration applied");
    }
    Ok(ExitCode::SUCCESS)
}

#[actix_web::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let settings = Settings::load()?;
    init_tracing(settings.log_level(), cli.pretty);

    match cli.command {
        Command::Poll => poll(&settings).await,
        Command::Reconcile => reconcile(&settings).await,
        Command::Health { alert } => health(&settings, alert).await,
        Command::ServeHealth { bind } => serve_health(&settings, bind).await,
        Command::Migrate => migrate(&settings).await,
    }
}
