//! Alert fan-out with per-key cooldown and sensitive-data masking.
//!
//! Every alert is written to the error journal before any channel sees it.
//! Channel failures are logged and swallowed; alerting never fails a run.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use serde_json::{Map, Value};
use tracing::{debug, error};

use super::error_journal::{ErrorJournal, ErrorKind};
use super::phone::mask_phone;
use crate::domain::ports::AlertChannel;

const DEFAULT_COOLDOWN: TimeDelta = TimeDelta::minutes(5);

/// Alert severity, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    const fn journal_kind(self) -> ErrorKind {
        match self {
            Self::Info => ErrorKind::InfoAlert,
            Self::Warning => ErrorKind::WarningAlert,
            Self::Critical => ErrorKind::CriticalAlert,
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One alert as handed to channels. `details` is always a JSON object
/// whose sensitive values have already been masked.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub details: Value,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    /// `details` flattened to `(key, display value)` pairs in key order.
    pub fn detail_pairs(&self) -> Vec<(String, String)> {
        match &self.details {
            Value::Object(map) => map
                .iter()
                .map(|(key, value)| (key.clone(), display_value(value)))
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Mask values whose keys look sensitive: tokens and secrets keep a short
/// prefix, phones keep their prefix and last two digits, e-mails keep two
/// characters of the local part. Nested objects are masked recursively.
pub fn mask_details(details: &Value) -> Value {
    match details {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), mask_entry(key, value)))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

fn mask_entry(key: &str, value: &Value) -> Value {
    let Value::String(text) = value else {
        return mask_details(value);
    };
    let lower = key.to_lowercase();
    let masked = if lower.contains("token") || lower.contains("secret") || lower.contains("password") {
        format!("{}***", text.chars().take(6).collect::<String>())
    } else if lower.contains("phone") {
        mask_phone(text)
    } else if lower.contains("email") {
        mask_email(text)
    } else {
        text.clone()
    };
    Value::String(masked)
}

fn mask_email(raw: &str) -> String {
    match raw.split_once('@') {
        Some((local, domain)) if !domain.is_empty() => {
            format!("{}***@{domain}", local.chars().take(2).collect::<String>())
        }
        _ => raw.to_owned(),
    }
}

/// Raises alerts: journal first, then cooldown, then channel fan-out.
pub struct AlertService {
    journal: ErrorJournal,
    channels: Vec<Arc<dyn AlertChannel>>,
    clock: Arc<dyn Clock>,
    cooldown: TimeDelta,
    last_sent: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl AlertService {
    pub fn new(
        journal: ErrorJournal,
        channels: Vec<Arc<dyn AlertChannel>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            journal,
            channels,
            clock,
            cooldown: DEFAULT_COOLDOWN,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_cooldown(mut self, cooldown: TimeDelta) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub async fn critical(&self, title: &str, message: &str, details: Value) -> bool {
        self.raise(AlertSeverity::Critical, title, message, details).await
    }

    pub async fn warning(&self, title: &str, message: &str, details: Value) -> bool {
        self.raise(AlertSeverity::Warning, title, message, details).await
    }

    pub async fn info(&self, title: &str, message: &str, details: Value) -> bool {
        self.raise(AlertSeverity::Info, title, message, details).await
    }

    /// Raise an alert. Returns `false` when the cooldown suppressed it.
    ///
    /// Info alerts are never suppressed; warnings and criticals share a
    /// cooldown per `(severity, title)`.
    pub async fn raise(
        &self,
        severity: AlertSeverity,
        title: &str,
        message: &str,
        details: Value,
    ) -> bool {
        let now = self.clock.utc();
        if severity > AlertSeverity::Info && !self.claim_slot(severity, title, now) {
            debug!(%severity, title, "alert suppressed by cooldown");
            return false;
        }

        let alert = Alert {
            severity,
            title: title.to_owned(),
            message: message.to_owned(),
            details: mask_details(&details),
            raised_at: now,
        };

        debug!(%severity, title, channels = self.channels.len(), "alert raised");

        let mut entry = self
            .journal
            .entry(severity.journal_kind(), &format!("{title}: {message}"));
        if alert.details.as_object().is_some_and(|map| !map.is_empty()) {
            entry = entry.with_details(alert.details.clone());
        }
        self.journal.record(entry).await;

        for channel in &self.channels {
            if severity < channel.min_severity() {
                continue;
            }
            if let Err(err) = channel.deliver(&alert).await {
                error!(channel = channel.name(), error = %err, "alert delivery failed");
            }
        }
        true
    }

    fn claim_slot(&self, severity: AlertSeverity, title: &str, now: DateTime<Utc>) -> bool {
        let key = format!("{severity}:{title}");
        let mut last_sent = match self.last_sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let cooling = last_sent
            .get(&key)
            .is_some_and(|previous| now.signed_duration_since(*previous) < self.cooldown);
        if cooling {
            return false;
        }
        last_sent.insert(key, now);
        true
    }
}
