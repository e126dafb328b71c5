//! Telegram bot alert channel.

use std::time::Duration;

use async_trait::async_trait;
use chrono::FixedOffset;
use reqwest::{Client, Url};
use serde::Serialize;
use tracing::debug;

use crate::domain::ports::{AlertChannel, AlertChannelError};
use crate::domain::{Alert, AlertSeverity};
use crate::outbound::http_support::status_message;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Bot credentials and the chat receiving alerts.
#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: i64,
    /// Zone used for the timestamp line.
    pub utc_offset: FixedOffset,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

pub struct TelegramAlertChannel {
    client: Client,
    send_url: Url,
    config: TelegramConfig,
}

impl TelegramAlertChannel {
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed or the
    /// bot token does not form a valid URL.
    pub fn new(config: TelegramConfig) -> Result<Self, AlertChannelError> {
        let client = Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|error| AlertChannelError::delivery(error.to_string()))?;
        let send_url = Url::parse(&format!(
            "{DEFAULT_API_BASE}/bot{}/sendMessage",
            config.bot_token
        ))
        .map_err(|error| AlertChannelError::delivery(format!("telegram url: {error}")))?;
        Ok(Self {
            client,
            send_url,
            config,
        })
    }
}

#[async_trait]
impl AlertChannel for TelegramAlertChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), AlertChannelError> {
        let text = render_message(alert, self.config.utc_offset);
        let response = self
            .client
            .post(self.send_url.clone())
            .json(&SendMessage {
                chat_id: self.config.chat_id,
                text: &text,
                parse_mode: "HTML",
                disable_web_page_preview: true,
            })
            .send()
            .await
            // The error text embeds the URL, and with it the bot token.
            .map_err(|error| AlertChannelError::delivery(error.without_url().to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(AlertChannelError::delivery(status_message(status, body.as_ref())));
        }
        debug!(title = %alert.title, "telegram alert sent");
        Ok(())
    }
}

fn severity_label(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Critical => "🚨 CRITICAL",
        AlertSeverity::Warning => "⚠️ Warning",
        AlertSeverity::Info => "ℹ️ Info",
    }
}

fn render_message(alert: &Alert, offset: FixedOffset) -> String {
    let mut text = format!(
        "<b>{}</b>\n\n<b>{}</b>\n{}\n",
        escape_html(severity_label(alert.severity)),
        escape_html(&alert.title),
        escape_html(&alert.message)
    );
    let details = alert.detail_pairs();
    if !details.is_empty() {
        text.push_str("\n<b>Details:</b>\n");
        for (key, value) in details {
            text.push_str(&format!(
                "• {}: <code>{}</code>\n",
                escape_html(&key),
                escape_html(&value)
            ));
        }
    }
    text.push_str(&format!(
        "\n⏰ {}",
        alert
            .raised_at
            .with_timezone(&offset)
            .format("%d.%m.%Y %H:%M:%S")
    ));
    text
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn alert(details: serde_json::Value) -> Alert {
        Alert {
            severity: AlertSeverity::Critical,
            title: "Poll <failing>".to_owned(),
            message: "3 runs & counting".to_owned(),
            details,
            raised_at: Utc
                .with_ymd_and_hms(2026, 3, 1, 7, 30, 0)
                .single()
                .expect("time"),
        }
    }

    #[test]
    fn renders_escaped_html_with_details() {
        let offset = FixedOffset::east_opt(5 * 3600).expect("offset");
        let text = render_message(&alert(json!({"count": 3, "lastError": "a<b"})), offset);

        assert_eq!(
            text,
            "<b>🚨 CRITICAL</b>\n\n<b>Poll &lt;failing&gt;</b>\n3 runs &amp; counting\n\
             \n<b>Details:</b>\n• count: <code>3</code>\n• lastError: <code>a&lt;b</code>\n\
             \n⏰ 01.03.2026 12:30:00"
        );
    }

    #[test]
    fn omits_empty_details() {
        let offset = FixedOffset::east_opt(0).expect("offset");
        let text = render_message(&alert(json!({})), offset);
        assert!(!text.contains("Details"));
    }

    #[test]
    fn escapes_quotes() {
        assert_eq!(escape_html(r#"'x' "y""#), "&#39;x&#39; &quot;y&quot;");
    }

    #[test]
    fn only_warnings_and_above() {
        let channel = TelegramAlertChannel::new(TelegramConfig {
            bot_token: "123:abc".to_owned(),
            chat_id: -100,
            utc_offset: FixedOffset::east_opt(0).expect("offset"),
        })
        .expect("channel");
        assert_eq!(channel.min_severity(), AlertSeverity::Warning);
        assert_eq!(channel.name(), "telegram");
    }
}
