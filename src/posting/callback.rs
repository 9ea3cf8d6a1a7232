//! Inbound generation results from the n8n workflow.

use serde::Deserialize;
use serde_json::Value;

/// Body posted to `/webhook/n8n`.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackPayload {
    /// The author's chat id, as a number or a numeric string.
    #[serde(default, alias = "telegram_id")]
    pub user_identity: Option<Value>,
    #[serde(default)]
    pub generated_post: Option<String>,
}

/// A payload that passed shape validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedPost {
    pub chat_id: i64,
    pub text: String,
}

/// Why a payload was refused before touching any session.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid user identity: {0}")]
    InvalidIdentity(String),
}

impl CallbackPayload {
    pub fn validate(self) -> Result<GeneratedPost, PayloadError> {
        let identity = self
            .user_identity
            .filter(|v| !v.is_null())
            .ok_or(PayloadError::MissingField("user_identity"))?;
        let chat_id = match &identity {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| PayloadError::InvalidIdentity(identity.to_string()))?;

        let text = self
            .generated_post
            .filter(|p| !p.trim().is_empty())
            .ok_or(PayloadError::MissingField("generated_post"))?;

        Ok(GeneratedPost { chat_id, text })
    }
}
