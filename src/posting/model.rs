//! Post-session data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::SessionStatus;

/// A supporting link the user attached to the post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    pub description: String,
    pub url: String,
}

/// Kind of call-to-action button attached to the published post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonType {
    /// Opens a direct-message chat with the author.
    DirectMessage,
    /// Opens an external URL.
    Link,
}

impl std::fmt::Display for ButtonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DirectMessage => write!(f, "dm"),
            Self::Link => write!(f, "link"),
        }
    }
}

impl std::str::FromStr for ButtonType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dm" => Ok(Self::DirectMessage),
            "link" => Ok(Self::Link),
            other => Err(format!("Unknown button type: {other}")),
        }
    }
}

/// One user's in-progress attempt to produce and publish a single post.
#[derive(Debug, Clone)]
pub struct PostSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub chat_id: i64,
    pub status: SessionStatus,
    /// Interview answers; slot `k` lives at index `k - 1`.
    pub answers: Vec<String>,
    pub materials: Vec<Material>,
    pub generated_post: Option<String>,
    pub button_type: Option<ButtonType>,
    pub button_url: Option<String>,
    pub button_text: Option<String>,
    /// Set when the session enters `generating`; drives the timeout sweep.
    pub generation_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostSession {
    pub fn new(user_id: Uuid, chat_id: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            chat_id,
            status: SessionStatus::FIRST,
            answers: Vec::new(),
            materials: Vec::new(),
            generated_post: None,
            button_type: None,
            button_url: None,
            button_text: None,
            generation_started_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Store the answer for question `k` (1-based), overwriting any previous one.
    pub fn set_answer(&mut self, k: usize, text: &str) {
        let idx = k.saturating_sub(1);
        if self.answers.len() <= idx {
            self.answers.resize(idx + 1, String::new());
        }
        self.answers[idx] = text.trim().to_string();
    }

    /// Answers in slot order, skipping empty slots.
    pub fn ordered_answers(&self) -> Vec<String> {
        self.answers
            .iter()
            .filter(|a| !a.trim().is_empty())
            .cloned()
            .collect()
    }

    /// Materials with both a description and a URL.
    pub fn filled_materials(&self) -> Vec<Material> {
        self.materials
            .iter()
            .filter(|m| !m.description.trim().is_empty() && !m.url.trim().is_empty())
            .cloned()
            .collect()
    }

    /// Clear everything gathered so far and return to the first question.
    pub fn reset(&mut self) {
        self.status = SessionStatus::FIRST;
        self.answers.clear();
        self.materials.clear();
        self.generated_post = None;
        self.clear_button();
        self.generation_started_at = None;
    }

    pub fn clear_button(&mut self) {
        self.button_type = None;
        self.button_url = None;
        self.button_text = None;
    }
}
