//! Alert channel double.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::ports::{AlertChannel, AlertChannelError};
use crate::domain::{Alert, AlertSeverity};

/// Collects delivered alerts. Accepts warnings and above, like a chat
/// channel.
#[derive(Default)]
pub struct RecordingAlertChannel {
    delivered: Mutex<Vec<Alert>>,
}

impl RecordingAlertChannel {
    pub fn delivered(&self) -> Vec<Alert> {
        match self.delivered.lock() {
            Ok(alerts) => alerts.clone(),
            Err(_) => panic!("alerts mutex"),
        }
    }

    pub fn delivered_with(&self, severity: AlertSeverity) -> Vec<Alert> {
        self.delivered()
            .into_iter()
            .filter(|alert| alert.severity == severity)
            .collect()
    }
}

#[async_trait]
impl AlertChannel for RecordingAlertChannel {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), AlertChannelError> {
        match self.delivered.lock() {
            Ok(mut alerts) => alerts.push(alert.clone()),
            Err(_) => panic!("alerts mutex"),
        }
        Ok(())
    }
}
