//! Full sync cycle through the composition root over in-memory adapters:
//! poll, reconcile, and the health report that reads their bookkeeping.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use kaspi_amo_sync::app::{StoreAdapters, SyncApp, build_health_reporter};
use kaspi_amo_sync::domain::ports::OrderSourceError;
use kaspi_amo_sync::domain::{
    HealthStatus, LockManager, LockName, OrderFingerprint, PollReport, ReconcileReport,
    RunOutcome,
};
use kaspi_amo_sync::settings::Settings;
use kaspi_amo_sync::test_support::clock::MutableClock;
use kaspi_amo_sync::test_support::crm::{CrmOp, RecordingCrm};
use kaspi_amo_sync::test_support::harness::harness_start;
use kaspi_amo_sync::test_support::order_source::ScriptedOrderSource;
use kaspi_amo_sync::test_support::orders::{item, order_with_items};
use kaspi_amo_sync::test_support::store::InMemorySyncStore;
use mockable::Clock;
use rstest::{fixture, rstest};

struct World {
    store: Arc<InMemorySyncStore>,
    crm: Arc<RecordingCrm>,
    source: Arc<ScriptedOrderSource>,
    clock: Arc<MutableClock>,
    settings: Settings,
}

impl World {
    fn adapters(&self) -> StoreAdapters {
        StoreAdapters::in_memory(self.store.clone())
    }

    fn app(&self) -> SyncApp {
        SyncApp::from_parts(
            &self.settings,
            &self.adapters(),
            self.clock.clone(),
            self.source.clone(),
            self.crm.clone(),
        )
        .expect("app wiring")
    }

    fn minutes_ago(&self, minutes: i64) -> DateTime<Utc> {
        self.clock.utc() - TimeDelta::minutes(minutes)
    }
}

#[fixture]
fn world() -> World {
    World {
        store: Arc::new(InMemorySyncStore::default()),
        crm: Arc::new(RecordingCrm::default()),
        source: Arc::new(ScriptedOrderSource::default()),
        clock: Arc::new(MutableClock::new(harness_start())),
        settings: Settings::default(),
    }
}

fn poll_report(outcome: RunOutcome<PollReport>) -> PollReport {
    match outcome {
        RunOutcome::Completed(report) => report,
        RunOutcome::LockBusy => panic!("expected a completed poll"),
    }
}

fn reconcile_report(outcome: RunOutcome<ReconcileReport>) -> ReconcileReport {
    match outcome {
        RunOutcome::Completed(report) => report,
        RunOutcome::LockBusy => panic!("expected a completed reconcile"),
    }
}

#[rstest]
#[tokio::test]
async fn poll_creates_each_deal_exactly_once(world: World) {
    let order = order_with_items("ORDER-1", vec![item("A", 1, 1000.0)], world.minutes_ago(5));
    world.source.set_orders(vec![order]);
    let app = world.app();

    let first = poll_report(app.poll.run().await.expect("first poll"));
    world.crm.clear_calls();
    let second = poll_report(app.poll.run().await.expect("second poll"));

    assert_eq!(first.processed(), 1);
    assert_eq!(second.skipped, 1);
    assert!(world.crm.calls().is_empty());

    let record = world.store.processed("ORDER-1").expect("record");
    assert!(record.crm_deal_id.is_some());
    assert_eq!(record.retry_count, 0);
    assert_eq!(record.last_error, None);

    let lock = world.store.lock(LockName::Poll).expect("lock row");
    assert!(lock.locked_until <= world.clock.utc());
    assert_eq!(lock.holder, app.lock_holder());
}

#[rstest]
#[tokio::test]
async fn reconcile_repairs_an_order_changed_after_poll(world: World) {
    let placed = order_with_items("ORDER-7", vec![item("A", 1, 500.0)], world.minutes_ago(60));
    world.source.set_orders(vec![placed]);
    let app = world.app();
    poll_report(app.poll.run().await.expect("poll"));

    world.clock.advance_seconds(10 * 60);
    let changed = order_with_items(
        "ORDER-7",
        vec![item("A", 2, 500.0), item("B", 1, 300.0)],
        world.minutes_ago(1),
    );
    world.source.set_orders(vec![changed.clone()]);
    world.crm.clear_calls();

    let report = reconcile_report(app.reconcile.run().await.expect("reconcile"));

    assert_eq!(report.updated, 1);
    assert_eq!(world.crm.count(CrmOp::CreateDeal), 0);
    assert_eq!(world.crm.count(CrmOp::UpdateDeal), 1);
    assert_eq!(world.crm.count(CrmOp::Link), 1);
    assert_eq!(world.crm.count(CrmOp::AddNote), 1);
    assert!(report.watermark >= report.previous_watermark);
    assert_eq!(
        world.store.processed("ORDER-7").expect("record").fingerprint,
        OrderFingerprint::of(&changed)
    );

    world.crm.clear_calls();
    let again = reconcile_report(app.reconcile.run().await.expect("second reconcile"));
    assert_eq!(again.updated, 0);
    assert_eq!(world.crm.count(CrmOp::Unlink), 0);
    assert_eq!(world.crm.count(CrmOp::Link), 0);
}

#[rstest]
#[tokio::test]
async fn busy_lock_skips_the_run_without_side_effects(world: World) {
    world.source.set_orders(vec![order_with_items(
        "ORDER-2",
        vec![item("A", 1, 100.0)],
        world.minutes_ago(5),
    )]);
    let other = LockManager::with_holder(world.store.clone(), world.clock.clone(), "other-host");
    assert!(
        other
            .acquire(LockName::Poll, Duration::from_secs(300))
            .await
            .expect("acquire")
    );

    let outcome = world.app().poll.run().await.expect("poll");

    assert_eq!(outcome, RunOutcome::LockBusy);
    assert!(world.crm.calls().is_empty());
    assert!(world.store.processed("ORDER-2").is_none());
}

#[rstest]
#[tokio::test]
async fn dry_run_touches_neither_crm_nor_records(mut world: World) {
    world.settings.sync.dry_run = true;
    world.source.set_orders(vec![order_with_items(
        "ORDER-3",
        vec![item("A", 1, 100.0)],
        world.minutes_ago(5),
    )]);

    poll_report(world.app().poll.run().await.expect("poll"));

    assert_eq!(world.crm.count(CrmOp::CreateDeal), 0);
    assert!(world.store.processed("ORDER-3").is_none());
    assert!(world.store.stats_for(world_today(&world)).is_none());
}

fn world_today(world: &World) -> chrono::NaiveDate {
    world
        .settings
        .stats_calendar()
        .expect("calendar")
        .date_of(world.clock.utc())
}

#[rstest]
#[tokio::test]
async fn upstream_outage_is_journaled_and_reported(world: World) {
    world
        .source
        .fail_next(OrderSourceError::transport("connection reset"));
    let app = world.app();

    let result = app.poll.run().await;

    assert!(result.is_err());
    assert_eq!(
        world.store.meta_value("consecutive_failures").as_deref(),
        Some("1")
    );
    assert_eq!(world.store.errors_of_type("POLL_ERROR").len(), 1);

    let reporter = build_health_reporter(&world.settings, &world.adapters(), world.clock.clone())
        .expect("reporter");
    let report = reporter.report().await;
    assert_eq!(report.checks.consecutive_failures, 1);
    assert_eq!(report.checks.recent_errors.len(), 1);
}

#[rstest]
#[tokio::test]
async fn healthy_cycle_reports_ok_with_todays_counters(world: World) {
    world.source.set_orders(vec![order_with_items(
        "ORDER-9",
        vec![item("A", 1, 2500.0)],
        world.minutes_ago(5),
    )]);
    let app = world.app();
    poll_report(app.poll.run().await.expect("poll"));
    reconcile_report(app.reconcile.run().await.expect("reconcile"));

    let reporter = build_health_reporter(&world.settings, &world.adapters(), world.clock.clone())
        .expect("reporter");
    let report = reporter.report().await;

    assert_eq!(report.status, HealthStatus::Ok, "report: {report:?}");
    let today = report.checks.today_stats.expect("today's stats");
    assert_eq!(today.orders_processed, 1);
    assert_eq!(today.deals_created, 1);
}
