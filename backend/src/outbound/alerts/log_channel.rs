//! Alert channel writing to the tracing pipeline.

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::domain::ports::{AlertChannel, AlertChannelError};
use crate::domain::{Alert, AlertSeverity};

/// Always-on channel; the only one that receives info alerts.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertChannel;

#[async_trait]
impl AlertChannel for LogAlertChannel {
    fn name(&self) -> &'static str {
        "log"
    }

    fn min_severity(&self) -> AlertSeverity {
        AlertSeverity::Info
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), AlertChannelError> {
        let details = alert.details.to_string();
        match alert.severity {
            AlertSeverity::Critical => error!(
                target: "alerts",
                title = %alert.title,
                details = %details,
                "{}",
                alert.message
            ),
            AlertSeverity::Warning => warn!(
                target: "alerts",
                title = %alert.title,
                details = %details,
                "{}",
                alert.message
            ),
            AlertSeverity::Info => info!(
                target: "alerts",
                title = %alert.title,
                details = %details,
                "{}",
                alert.message
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn accepts_every_severity() {
        let channel = LogAlertChannel;
        assert_eq!(channel.min_severity(), AlertSeverity::Info);
        for severity in [AlertSeverity::Info, AlertSeverity::Warning, AlertSeverity::Critical] {
            let alert = Alert {
                severity,
                title: "Title".to_owned(),
                message: "message".to_owned(),
                details: json!({"count": 1}),
                raised_at: Utc::now(),
            };
            assert_eq!(channel.deliver(&alert).await, Ok(()));
        }
    }
}
