//! User records and registration data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::RegistrationStage;

/// A registered (or pre-provisioned) user.
///
/// Rows are provisioned by email ahead of time; the chat identity is bound
/// the first time the user proves ownership of that email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// Chat identity (Telegram user id). `None` until the email is confirmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Normalized channel link, e.g. `https://t.me/mychannel`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_url: Option<String>,
    /// Bare channel name, e.g. `mychannel`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_username: Option<String>,
    /// Last observed admin check result. Informational only, never used for gating.
    pub is_bot_admin: bool,
    pub registration_stage: RegistrationStage,
    pub post_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// A fresh, unverified user for `email`.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into().trim().to_lowercase(),
            chat_id: None,
            username: None,
            first_name: None,
            last_name: None,
            channel_url: None,
            channel_username: None,
            is_bot_admin: false,
            registration_stage: RegistrationStage::Unverified,
            post_count: 0,
            last_activity: None,
            created_at: Utc::now(),
        }
    }

    /// The channel address the gateway posts to (`@name`).
    pub fn channel_handle(&self) -> Option<String> {
        self.channel_username.as_ref().map(|name| format!("@{name}"))
    }

    /// One-line summary for operator alerts.
    pub fn summary(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        let name = if name.is_empty() { "Unknown".to_string() } else { name };
        let handle = self
            .username
            .as_ref()
            .map(|u| format!(" (@{u})"))
            .unwrap_or_default();
        let chat = self
            .chat_id
            .map(|id| format!(" [ID: {id}]"))
            .unwrap_or_default();
        format!("{name}{handle}{chat}, {}", self.email)
    }
}

/// The chat-side identity of whoever sent an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatIdentity {
    pub chat_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}
