//! Generation backend: hands interview answers to an n8n workflow.
//!
//! The workflow accepts the request synchronously and posts the finished
//! text back to `/webhook/n8n` later.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::GenerationError;
use crate::onboarding::model::User;
use crate::posting::model::{Material, PostSession};

/// Bound on the synchronous accept/reject round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// What the backend is being asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    GeneratePost,
    /// The bot gave up waiting on a generation.
    TimeoutNotification,
}

/// The author as the workflow sees them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Author {
    pub telegram_id: Option<i64>,
    pub email: String,
    pub channel_url: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl From<&User> for Author {
    fn from(user: &User) -> Self {
        Self {
            telegram_id: user.chat_id,
            email: user.email.clone(),
            channel_url: user.channel_url.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            username: user.username.clone(),
        }
    }
}

/// Outbound webhook body.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub request_type: RequestType,
    pub session_id: Uuid,
    pub user: Author,
    pub answers: Vec<String>,
    pub materials: Vec<Material>,
    pub timestamp: DateTime<Utc>,
}

impl GenerationRequest {
    pub fn new(request_type: RequestType, user: &User, session: &PostSession) -> Self {
        Self {
            request_type,
            session_id: session.id,
            user: Author::from(user),
            answers: session.ordered_answers(),
            materials: session.filled_materials(),
            timestamp: Utc::now(),
        }
    }
}

/// Something that can produce a post asynchronously.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Submit a request. `Ok` means the backend accepted it; the result
    /// arrives later through the callback endpoint.
    async fn submit(&self, request: &GenerationRequest) -> Result<(), GenerationError>;
}

/// n8n webhook client.
pub struct N8nClient {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl N8nClient {
    /// A client for `webhook_url`; `None` makes every submission fail with
    /// [`GenerationError::NotConfigured`].
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl GenerationBackend for N8nClient {
    async fn submit(&self, request: &GenerationRequest) -> Result<(), GenerationError> {
        let url = self
            .webhook_url
            .as_deref()
            .ok_or(GenerationError::NotConfigured)?;

        debug!(
            session_id = %request.session_id,
            request_type = ?request.request_type,
            answers = request.answers.len(),
            materials = request.materials.len(),
            "Submitting generation request"
        );

        let resp = self
            .client
            .post(url)
            .timeout(REQUEST_TIMEOUT)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(REQUEST_TIMEOUT)
                } else {
                    GenerationError::RequestFailed(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GenerationError::Rejected {
                status: status.as_u16(),
            });
        }

        info!(session_id = %request.session_id, "Generation request accepted");
        Ok(())
    }
}
