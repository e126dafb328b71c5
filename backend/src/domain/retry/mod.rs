//! Bounded retry with jittered exponential backoff.
//!
//! [`Retrier::run`] is parameterised by a [`RetryPolicy`] (attempt ceiling and
//! backoff bounds) and a retryable-error predicate, so each call site decides
//! which failures are worth another attempt.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

/// Attempt ceiling and backoff bounds for one kind of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Cap applied to the exponential delay.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
        }
    }

    /// Policy with the default 1s..30s backoff bounds.
    pub const fn with_attempts(max_attempts: u32) -> Self {
        Self::new(
            max_attempts,
            Duration::from_secs(1),
            Duration::from_secs(30),
        )
    }

    /// Un-jittered delay after failed attempt `attempt` (1-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = 2_u32.saturating_pow(attempt.saturating_sub(1));
        let base_ms = u64::try_from(self.initial_backoff.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_backoff.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(u64::from(exponent)).min(max_ms))
    }
}

/// Async sleeping abstraction so tests can skip real delays.
#[async_trait]
pub trait RetrySleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Retry backoff jitter abstraction.
pub trait BackoffJitter: Send + Sync {
    /// Return a jittered delay derived from the exponential base delay.
    fn jittered_delay(&self, base: Duration, attempt: u32) -> Duration;
}

/// Tokio-based sleeper implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl RetrySleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Adds up to 30% random extra delay.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl BackoffJitter for RandomJitter {
    fn jittered_delay(&self, base: Duration, _attempt: u32) -> Duration {
        let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        let max_extra = base_ms.saturating_mul(3) / 10;
        let extra = rand::thread_rng().gen_range(0..=max_extra);
        Duration::from_millis(base_ms.saturating_add(extra))
    }
}

/// Runs operations under a [`RetryPolicy`].
#[derive(Clone)]
pub struct Retrier {
    sleeper: Arc<dyn RetrySleeper>,
    jitter: Arc<dyn BackoffJitter>,
}

impl Default for Retrier {
    fn default() -> Self {
        Self::new(Arc::new(TokioSleeper), Arc::new(RandomJitter))
    }
}

impl Retrier {
    pub fn new(sleeper: Arc<dyn RetrySleeper>, jitter: Arc<dyn BackoffJitter>) -> Self {
        Self { sleeper, jitter }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or exhausts `policy.max_attempts`.
    ///
    /// The last error is returned unchanged.
    ///
    /// ```rust,ignore
    /// let contact = retrier
    ///     .run(&RetryPolicy::with_attempts(3), "create_contact",
    ///          CrmGatewayError::is_retryable, || crm.create_contact(&new_contact))
    ///     .await?;
    /// ```
    pub async fn run<T, E, F, Fut, P>(
        &self,
        policy: &RetryPolicy,
        operation: &'static str,
        is_retryable: P,
        mut attempt_fn: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        P: Fn(&E) -> bool + Send + Sync,
        E: Display + Send,
        T: Send,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < max_attempts && is_retryable(&error) => {
                    let delay = self
                        .jitter
                        .jittered_delay(policy.base_delay(attempt), attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        %error,
                        "retrying after transient failure"
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests;
