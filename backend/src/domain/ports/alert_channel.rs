//! Driven port for alert delivery channels.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::{Alert, AlertSeverity};

define_port_error! {
    /// Errors surfaced by an alert channel.
    pub enum AlertChannelError {
        /// The channel could not deliver the alert.
        Delivery => "alert delivery failed",
    }
}

/// One outbound notification channel (chat, log sink, ...).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Short channel name used in logs.
    fn name(&self) -> &'static str;

    /// Lowest severity this channel is interested in.
    fn min_severity(&self) -> AlertSeverity {
        AlertSeverity::Warning
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), AlertChannelError>;
}
