//! Minimum-interval pacing for outbound CRM calls.
//!
//! Callers queue on a fair mutex, so they pass the gate in arrival order and
//! consecutive passes are at least `1 / rps` apart.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::trace;

/// Highest request rate the CRM tolerates per integration.
pub const MAX_RPS: u32 = 7;

pub struct RateGate {
    interval: Duration,
    last_pass: Mutex<Option<Instant>>,
}

impl RateGate {
    /// Gate allowing `rps` passes per second, clamped to `1..=MAX_RPS`.
    pub fn new(rps: u32) -> Self {
        let rps = rps.clamp(1, MAX_RPS);
        Self {
            interval: Duration::from_secs(1) / rps,
            last_pass: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for this caller's turn.
    pub async fn wait(&self) {
        let mut last_pass = self.last_pass.lock().await;
        if let Some(previous) = *last_pass {
            let ready_at = previous + self.interval;
            if ready_at > Instant::now() {
                trace!(wait_ms = (ready_at - Instant::now()).as_millis(), "rate gate wait");
                sleep_until(ready_at).await;
            }
        }
        *last_pass = Some(Instant::now());
    }
}
