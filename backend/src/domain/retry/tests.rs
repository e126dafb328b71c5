//! Unit tests for the retry combinator.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use rstest::rstest;

use super::*;
use crate::test_support::clock::{NoJitter, RecordingSleeper};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
enum Flaky {
    #[error("transient")]
    Transient,
    #[error("fatal")]
    Fatal,
}

fn is_transient(error: &Flaky) -> bool {
    matches!(error, Flaky::Transient)
}

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(
        max_attempts,
        Duration::from_millis(100),
        Duration::from_millis(250),
    )
}

fn retrier(sleeper: Arc<RecordingSleeper>) -> Retrier {
    Retrier::new(sleeper, Arc::new(NoJitter))
}

#[rstest]
#[case(1, Duration::from_millis(100))]
#[case(2, Duration::from_millis(200))]
#[case(3, Duration::from_millis(250))]
#[case(30, Duration::from_millis(250))]
fn base_delay_doubles_up_to_cap(#[case] attempt: u32, #[case] expected: Duration) {
    assert_eq!(policy(5).base_delay(attempt), expected);
}

#[test]
fn random_jitter_stays_within_thirty_percent() {
    let base = Duration::from_millis(1000);
    for attempt in 1..50 {
        let delay = RandomJitter.jittered_delay(base, attempt);
        assert!(delay >= base && delay <= Duration::from_millis(1300), "{delay:?}");
    }
}

#[tokio::test]
async fn retries_transient_failures_until_success() {
    let sleeper = Arc::new(RecordingSleeper::default());
    let calls = AtomicU32::new(0);
    let result = retrier(sleeper.clone())
        .run(&policy(3), "test", is_transient, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Flaky::Transient)
            } else {
                Ok("done")
            }
        })
        .await;

    assert_eq!(result, Ok("done"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        sleeper.recorded(),
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );
}

#[tokio::test]
async fn stops_at_attempt_ceiling_with_last_error() {
    let sleeper = Arc::new(RecordingSleeper::default());
    let calls = AtomicU32::new(0);
    let result: Result<(), Flaky> = retrier(sleeper.clone())
        .run(&policy(2), "test", is_transient, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Flaky::Transient)
        })
        .await;

    assert_eq!(result, Err(Flaky::Transient));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(sleeper.recorded().len(), 1);
}

#[tokio::test]
async fn non_retryable_errors_fail_immediately() {
    let sleeper = Arc::new(RecordingSleeper::default());
    let seen = Mutex::new(Vec::new());
    let result: Result<(), Flaky> = retrier(sleeper.clone())
        .run(&policy(5), "test", is_transient, || async {
            seen.lock().expect("seen").push(());
            Err(Flaky::Fatal)
        })
        .await;

    assert_eq!(result, Err(Flaky::Fatal));
    assert_eq!(seen.lock().expect("seen").len(), 1);
    assert!(sleeper.recorded().is_empty());
}

#[tokio::test]
async fn zero_attempt_policy_still_calls_once() {
    let calls = AtomicU32::new(0);
    let result: Result<(), Flaky> = retrier(Arc::new(RecordingSleeper::default()))
        .run(&policy(0), "test", is_transient, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Flaky::Transient)
        })
        .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
