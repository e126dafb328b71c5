//! Termination signals.
//!
//! A signal abandons the in-flight run; the caller releases its locks and
//! exits. Whatever the external APIs already accepted stays, and the next
//! run's idempotency checks repair the rest.

use std::future::Future;

use tracing::{error, warn};

/// The run was cut short by a termination signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted {
    pub signal: &'static str,
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM, and names the signal.
pub async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install ctrl+c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install sigterm handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => "SIGINT",
        () = terminate => "SIGTERM",
    }
}

/// Drive `work` to completion unless `signal` resolves first.
pub async fn run_until_shutdown<F, S>(work: F, signal: S) -> Result<F::Output, Interrupted>
where
    F: Future,
    S: Future<Output = &'static str>,
{
    tokio::select! {
        output = work => Ok(output),
        signal = signal => {
            warn!(signal, "termination signal received; abandoning run");
            Err(Interrupted { signal })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn finished_work_wins() {
        let outcome = run_until_shutdown(async { 7 }, std::future::pending()).await;
        assert_eq!(outcome, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn signal_interrupts_slow_work() {
        let work = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            7
        };
        let signal = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            "SIGTERM"
        };

        let outcome = run_until_shutdown(work, signal).await;

        assert_eq!(outcome, Err(Interrupted { signal: "SIGTERM" }));
    }
}
