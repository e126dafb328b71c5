//! Unit tests for the poll pipeline.

use mockable::Clock;
use rstest::{fixture, rstest};

use super::*;
use crate::domain::OrderCode;
use crate::domain::ports::{CrmGatewayError, OrderSourceError};
use crate::test_support::crm::{CrmCall, CrmOp};
use crate::test_support::harness::SyncHarness;
use crate::test_support::orders::{item, order};

#[fixture]
fn harness() -> SyncHarness {
    SyncHarness::new()
}

fn pipeline(harness: &SyncHarness, config: PollPipelineConfig) -> PollPipeline {
    PollPipeline::new(harness.context(), config)
}

fn completed(outcome: RunOutcome<PollReport>) -> PollReport {
    match outcome {
        RunOutcome::Completed(report) => report,
        RunOutcome::LockBusy => panic!("expected a completed run"),
    }
}

#[rstest]
#[tokio::test]
async fn creates_deal_and_records_success(harness: SyncHarness) {
    harness.source.set_orders(vec![order("ORDER-1")]);

    let report = completed(
        pipeline(&harness, PollPipelineConfig::default())
            .run()
            .await
            .expect("run"),
    );

    assert_eq!(report.processed(), 1);
    assert_eq!(report.stats.deals_created, 1);
    assert_eq!(report.stats.contacts_created, 1);
    let record = harness.store.processed("ORDER-1").expect("record");
    assert!(record.processed_successfully());
    assert_eq!(record.retry_count, 0);
    assert_eq!(record.last_error, None);
}

#[rstest]
#[tokio::test]
async fn second_run_skips_synced_order_without_crm_calls(harness: SyncHarness) {
    harness.source.set_orders(vec![order("ORDER-1")]);
    let poll = pipeline(&harness, PollPipelineConfig::default());
    poll.run().await.expect("first run");
    harness.crm.clear_calls();

    let report = completed(poll.run().await.expect("second run"));

    assert_eq!(report.skipped, 1);
    assert_eq!(report.processed(), 0);
    assert!(harness.crm.calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn failed_order_is_recorded_and_retried(harness: SyncHarness) {
    harness.source.set_orders(vec![order("ORDER-1")]);
    harness
        .crm
        .fail_next(CrmOp::CreateDeal, CrmGatewayError::rejected("pipeline missing"));
    let poll = pipeline(&harness, PollPipelineConfig::default());

    let first = completed(poll.run().await.expect("first run"));
    let failed = harness.store.processed("ORDER-1").expect("failure record");

    assert_eq!(first.failed(), 1);
    assert_eq!(failed.retry_count, 1);
    assert_eq!(failed.crm_deal_id, None);
    assert!(failed.last_error.is_some());

    let second = completed(poll.run().await.expect("second run"));
    let recovered = harness.store.processed("ORDER-1").expect("success record");

    assert_eq!(second.processed(), 1);
    assert_eq!(recovered.retry_count, 0);
    assert!(recovered.processed_successfully());
    assert_eq!(harness.crm.count(CrmOp::CreateDeal), 2);
}

#[rstest]
#[tokio::test]
async fn unparseable_phone_fails_only_that_order(harness: SyncHarness) {
    let mut bad = order("ORDER-BAD");
    bad.buyer.phone = Some("12-34".to_owned());
    harness.source.set_orders(vec![bad, order("ORDER-OK")]);

    let report = completed(
        pipeline(&harness, PollPipelineConfig::default())
            .run()
            .await
            .expect("run"),
    );

    assert_eq!(report.failed(), 1);
    assert_eq!(report.processed(), 1);
    let record = harness.store.processed("ORDER-BAD").expect("record");
    assert!(record.last_error.is_some());
    let entries = harness.store.errors_of_type("ORDER_ERROR");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].order_code.as_deref(), Some("ORDER-BAD"));
}

#[rstest]
#[tokio::test]
async fn backlog_raises_one_warning_per_run(harness: SyncHarness) {
    let orders: Vec<_> = (0..4)
        .map(|index| {
            let mut order = order(&format!("ORDER-{index}"));
            order.buyer.phone = None;
            order
        })
        .collect();
    harness.source.set_orders(orders);
    let config = PollPipelineConfig {
        backlog_threshold: 3,
        ..PollPipelineConfig::default()
    };

    let report = completed(pipeline(&harness, config).run().await.expect("run"));

    assert_eq!(report.backlog(), 4);
    assert_eq!(harness.channel.delivered().len(), 1);
    assert_eq!(harness.store.errors_of_type("WARNING_ALERT").len(), 1);
}

#[rstest]
#[tokio::test]
async fn busy_lock_is_a_clean_no_op(harness: SyncHarness) {
    harness.source.set_orders(vec![order("ORDER-1")]);
    let other = harness.context_for("other-process");
    assert!(
        other
            .locks
            .acquire(LockName::Poll, std::time::Duration::from_secs(300))
            .await
            .expect("acquire")
    );

    let outcome = pipeline(&harness, PollPipelineConfig::default())
        .run()
        .await
        .expect("run");

    assert_eq!(outcome, RunOutcome::LockBusy);
    assert!(harness.source.requests().is_empty());
}

#[rstest]
#[tokio::test]
async fn lock_is_released_after_run(harness: SyncHarness) {
    let poll = pipeline(&harness, PollPipelineConfig::default());
    poll.run().await.expect("run");

    let lock = harness.store.lock(LockName::Poll).expect("lock row");
    assert!(lock.locked_until < harness.clock.utc());
}

#[rstest]
#[tokio::test]
async fn listing_failure_bumps_streak_and_alerts_at_threshold(harness: SyncHarness) {
    let config = PollPipelineConfig {
        fail_streak: 2,
        ..PollPipelineConfig::default()
    };
    let poll = pipeline(&harness, config);

    harness.source.fail_next(OrderSourceError::timeout("slow"));
    assert!(poll.run().await.is_err());
    assert!(harness.channel.delivered().is_empty());

    harness.source.fail_next(OrderSourceError::rate_limited("429"));
    assert!(poll.run().await.is_err());

    assert_eq!(
        harness.store.meta_value("consecutive_failures").as_deref(),
        Some("2")
    );
    assert_eq!(harness.store.errors_of_type("POLL_ERROR").len(), 2);
    assert_eq!(harness.channel.delivered().len(), 1);
    let stats = harness.store.stats_for(harness.today()).expect("stats");
    assert_eq!(stats.api_errors_upstream, 2);
    assert_eq!(stats.rate_limit_hits, 1);
    let lock = harness.store.lock(LockName::Poll).expect("lock row");
    assert!(lock.locked_until < harness.clock.utc());
}

#[rstest]
#[tokio::test]
async fn success_resets_streak_and_touches_heartbeat(harness: SyncHarness) {
    harness.store.seed_meta("consecutive_failures", "4");

    pipeline(&harness, PollPipelineConfig::default())
        .run()
        .await
        .expect("run");

    assert_eq!(
        harness.store.meta_value("consecutive_failures").as_deref(),
        Some("0")
    );
    assert!(harness.store.meta_value("heartbeat_utc").is_some());
}

#[rstest]
#[tokio::test]
async fn dry_run_makes_no_crm_calls_or_writes(harness: SyncHarness) {
    harness.source.set_orders(vec![order("ORDER-1")]);
    let config = PollPipelineConfig {
        dry_run: true,
        ..PollPipelineConfig::default()
    };

    let report = completed(pipeline(&harness, config).run().await.expect("run"));

    assert_eq!(report.processed(), 1);
    assert!(harness.crm.calls().is_empty());
    assert!(harness.store.processed("ORDER-1").is_none());
    assert!(harness.store.stats_for(harness.today()).is_none());
    assert!(harness.store.meta_value("heartbeat_utc").is_none());
}

#[rstest]
#[tokio::test]
async fn pages_through_every_page_in_creation_order(harness: SyncHarness) {
    harness.source.set_orders(
        (0..5)
            .map(|index| order(&format!("ORDER-{index}")))
            .collect(),
    );
    let config = PollPipelineConfig {
        page_size: 2,
        ..PollPipelineConfig::default()
    };

    let report = completed(pipeline(&harness, config).run().await.expect("run"));

    assert_eq!(report.fetched, 5);
    assert_eq!(harness.source.requests().len(), 3);
    let created: Vec<String> = harness
        .crm
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            CrmCall::CreateDeal(deal) => Some(deal.name),
            _ => None,
        })
        .collect();
    assert!(created[0].starts_with("Kaspi #ORDER-0"));
    assert!(created[4].starts_with("Kaspi #ORDER-4"));
}

#[rstest]
#[tokio::test]
async fn daily_stats_accumulate_amount_and_counts(harness: SyncHarness) {
    let mut first = order("ORDER-1");
    first.items = vec![item("SKU-1", 1, 1000.0)];
    let mut second = order("ORDER-2");
    second.total_price = 250.0;
    harness.source.set_orders(vec![first, second]);

    pipeline(&harness, PollPipelineConfig::default())
        .run()
        .await
        .expect("run");

    let stats = harness.store.stats_for(harness.today()).expect("stats");
    assert_eq!(stats.orders_processed, 2);
    assert_eq!(stats.deals_created, 2);
    assert_eq!(stats.contacts_created, 1);
    assert!((stats.total_amount - 1250.0).abs() < f64::EPSILON);
    assert_eq!(
        harness.store.meta_value("total_orders_processed").as_deref(),
        Some("2")
    );
}

#[rstest]
#[tokio::test]
async fn keeps_previous_deal_id_when_retry_fails(harness: SyncHarness) {
    use crate::domain::{CrmDealId, OrderFingerprint, ProcessedOrder};

    let order = order("ORDER-1");
    let now = harness.clock.utc();
    harness.store.seed_processed(ProcessedOrder {
        order_code: OrderCode::new("ORDER-1").expect("code"),
        crm_deal_id: Some(CrmDealId::new(77)),
        upstream_state: order.state.clone(),
        fingerprint: OrderFingerprint::of(&order),
        processing_time_ms: 5,
        retry_count: 2,
        last_error: Some("note failed".to_owned()),
        last_synced_at: now,
        created_at: now,
        updated_at: now,
    });
    harness.source.set_orders(vec![order]);
    harness
        .crm
        .fail_next(CrmOp::FindContact, CrmGatewayError::unauthorized("401"));

    pipeline(&harness, PollPipelineConfig::default())
        .run()
        .await
        .expect("run");

    let record = harness.store.processed("ORDER-1").expect("record");
    assert_eq!(record.crm_deal_id, Some(CrmDealId::new(77)));
    assert_eq!(record.retry_count, 3);
    let stats = harness.store.stats_for(harness.today()).expect("stats");
    assert_eq!(stats.api_errors_crm, 1);
}

#[rstest]
#[tokio::test]
async fn lookup_failure_leaves_synced_record_untouched(harness: SyncHarness) {
    harness.source.set_orders(vec![order("ORDER-1")]);
    let poll = pipeline(&harness, PollPipelineConfig::default());
    poll.run().await.expect("first run");
    let synced = harness.store.processed("ORDER-1").expect("record");
    let deal_id = synced.crm_deal_id.expect("deal id");
    harness.crm.clear_calls();

    harness.store.fail_next_lookup();
    let failed = completed(poll.run().await.expect("run with failed lookup"));

    assert_eq!(failed.failed(), 1);
    assert!(harness.crm.calls().is_empty());
    assert_eq!(harness.store.errors_of_type("ORDER_ERROR").len(), 1);
    let kept = harness.store.processed("ORDER-1").expect("record");
    assert_eq!(kept.crm_deal_id, Some(deal_id));
    assert!(kept.processed_successfully());

    let after = completed(poll.run().await.expect("clean run"));

    assert_eq!(after.skipped, 1);
    assert_eq!(harness.crm.count(CrmOp::CreateDeal), 0);
}

#[test]
fn backlog_never_underflows() {
    let report = PollReport {
        fetched: 1,
        skipped: 3,
        stats: DailyStatsDelta::default(),
    };
    assert_eq!(report.backlog(), 0);
}
