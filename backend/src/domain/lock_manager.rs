//! Named mutual-exclusion locks with expiry.
//!
//! A lock is held until its `locked_until` timestamp passes, so a crashed
//! holder blocks others for at most one TTL. A busy lock is an ordinary
//! outcome, reported as `Ok(false)`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use tracing::{debug, info, warn};

use crate::domain::ports::{LockRepository, StoreError};

const RELEASE_BACKDATE: TimeDelta = TimeDelta::minutes(1);

/// Locks used by the sync pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockName {
    Poll,
    Reconcile,
}

impl LockName {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Reconcile => "reconcile",
        }
    }
}

impl fmt::Display for LockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acquires and releases named locks on behalf of one process.
pub struct LockManager {
    repository: Arc<dyn LockRepository>,
    clock: Arc<dyn Clock>,
    holder: String,
}

impl LockManager {
    /// Build a manager identified as `<pid>@<start time>`.
    pub fn new(repository: Arc<dyn LockRepository>, clock: Arc<dyn Clock>) -> Self {
        let holder = format!("{}@{}", std::process::id(), clock.utc().to_rfc3339());
        Self::with_holder(repository, clock, holder)
    }

    pub fn with_holder(
        repository: Arc<dyn LockRepository>,
        clock: Arc<dyn Clock>,
        holder: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            clock,
            holder: holder.into(),
        }
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Try to take `name` for `ttl`.
    ///
    /// One conditional write decides the outcome. When it loses, the row is
    /// re-read once: an already-expired lock means the previous holder went
    /// away between our write and the read, so the write is attempted one
    /// more time.
    ///
    /// # Errors
    ///
    /// Returns the store error when the lock table cannot be read or written.
    pub async fn acquire(&self, name: LockName, ttl: Duration) -> Result<bool, StoreError> {
        let now = self.clock.utc();
        let locked_until = expiry(now, ttl);
        if self
            .repository
            .try_acquire(name, &self.holder, now, locked_until)
            .await?
        {
            info!(lock = %name, holder = %self.holder, %locked_until, "lock acquired");
            return Ok(true);
        }

        let current = self.repository.find(name).await?;
        match current {
            Some(record) if record.locked_until < now => {
                debug!(lock = %name, stale_holder = %record.holder, "re-checking expired lock");
                let acquired = self
                    .repository
                    .try_acquire(name, &self.holder, now, locked_until)
                    .await?;
                if acquired {
                    info!(lock = %name, holder = %self.holder, %locked_until, "expired lock taken over");
                }
                Ok(acquired)
            }
            Some(record) => {
                info!(
                    lock = %name,
                    holder = %record.holder,
                    locked_until = %record.locked_until,
                    "lock busy"
                );
                Ok(false)
            }
            None => {
                warn!(lock = %name, "lock row missing after failed acquisition");
                Ok(false)
            }
        }
    }

    /// Release `name` if this manager holds it.
    ///
    /// # Errors
    ///
    /// Returns the store error when the lock row cannot be updated.
    pub async fn release(&self, name: LockName) -> Result<(), StoreError> {
        let now = self.clock.utc();
        self.repository
            .release(name, &self.holder, now, now - RELEASE_BACKDATE)
            .await?;
        info!(lock = %name, holder = %self.holder, "lock released");
        Ok(())
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
