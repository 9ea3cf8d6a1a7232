//! Operator alerts: short notices to an admin chat when something needs a human.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{error, warn};

use crate::config::AlertConfig;
use crate::error::ChannelError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Destination for operator alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn alert(&self, text: &str) -> Result<(), ChannelError>;
}

/// Posts alerts through a separate admin bot.
pub struct TelegramAlerter {
    bot_token: SecretString,
    chat_id: String,
    client: reqwest::Client,
}

impl TelegramAlerter {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            bot_token: config.bot_token,
            chat_id: config.chat_id,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AlertSink for TelegramAlerter {
    async fn alert(&self, text: &str) -> Result<(), ChannelError> {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.bot_token.expose_secret()
        );
        let resp = self
            .client
            .post(url)
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            .await
            .map_err(|e| ChannelError::Http(format!("alert: {e}")))?;

        if !resp.status().is_success() {
            return Err(ChannelError::SendFailed {
                name: "admin_alerts".into(),
                reason: format!("HTTP {}", resp.status()),
            });
        }
        Ok(())
    }
}

/// Fallback when no admin chat is configured: alerts go to the log only.
pub struct LogAlerter;

#[async_trait]
impl AlertSink for LogAlerter {
    async fn alert(&self, text: &str) -> Result<(), ChannelError> {
        warn!(alert = %text, "Operator alert (no admin chat configured)");
        Ok(())
    }
}

/// Send an alert, logging rather than propagating a delivery failure.
pub async fn raise(sink: &dyn AlertSink, text: &str) {
    if let Err(e) = sink.alert(text).await {
        error!(error = %e, "Failed to deliver operator alert");
    }
}
