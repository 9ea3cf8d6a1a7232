//! PostFlow: drives one user's post session from the first question to
//! publication.
//!
//! Every handler looks the session up by chat, matches on its status and
//! persists the next state with a check-then-set on the status it read. A
//! lost race surfaces as [`SessionError::StateMismatch`] and leaves the
//! stored session untouched.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::actions::CallbackAction;
use crate::alerts::{self, AlertSink};
use crate::channels::{ChatGateway, OutgoingMessage};
use crate::config::{FlowConfig, MAX_MATERIALS};
use crate::error::{Error, SessionError};
use crate::generation::{GenerationBackend, GenerationRequest, RequestType};
use crate::onboarding::prompts as registration;
use crate::onboarding::{AdminCheck, AdminVerifier, ChatIdentity, RegistrationStage, User};
use crate::store::Database;
use crate::transcribe::Transcriber;

use super::callback::GeneratedPost;
use super::model::{ButtonType, PostSession};
use super::prompts;
use super::sanitize::sanitize;
use super::state::SessionStatus;
use super::supervisor::TimeoutSupervisor;
use super::validate::{self, InputError};

/// Collaborators the flow needs.
pub struct FlowDeps {
    pub db: Arc<dyn Database>,
    pub gateway: Arc<dyn ChatGateway>,
    pub backend: Arc<dyn GenerationBackend>,
    pub alerts: Arc<dyn AlertSink>,
    pub verifier: Arc<AdminVerifier>,
    /// `None` disables voice answers.
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub config: FlowConfig,
}

pub struct PostFlow {
    db: Arc<dyn Database>,
    gateway: Arc<dyn ChatGateway>,
    backend: Arc<dyn GenerationBackend>,
    alerts: Arc<dyn AlertSink>,
    verifier: Arc<AdminVerifier>,
    transcriber: Option<Arc<dyn Transcriber>>,
    config: FlowConfig,
    supervisor: Arc<TimeoutSupervisor>,
}

impl PostFlow {
    pub fn new(deps: FlowDeps) -> Self {
        let supervisor = Arc::new(TimeoutSupervisor::new(
            Arc::clone(&deps.db),
            Arc::clone(&deps.gateway),
            Arc::clone(&deps.backend),
            Arc::clone(&deps.alerts),
            deps.config.generation_timeout,
        ));
        Self {
            db: deps.db,
            gateway: deps.gateway,
            backend: deps.backend,
            alerts: deps.alerts,
            verifier: deps.verifier,
            transcriber: deps.transcriber,
            config: deps.config,
            supervisor,
        }
    }

    /// The timeout supervisor, for wiring the periodic sweep.
    pub fn supervisor(&self) -> Arc<TimeoutSupervisor> {
        Arc::clone(&self.supervisor)
    }

    async fn reply(&self, chat_id: i64, message: OutgoingMessage) -> Result<(), Error> {
        self.gateway.send(&chat_id.to_string(), &message).await?;
        Ok(())
    }

    /// Persist `session`, which was read with status `expected`.
    async fn commit(&self, session: &PostSession, expected: SessionStatus) -> Result<(), Error> {
        if session.status != expected && !expected.can_transition_to(session.status) {
            return Err(SessionError::StateMismatch {
                id: session.id,
                expected: format!("a status that can move to {}", session.status),
                actual: expected.to_string(),
            }
            .into());
        }
        if !self.db.save_session(session, expected).await? {
            return Err(SessionError::StateMismatch {
                id: session.id,
                expected: expected.to_string(),
                actual: "changed by another writer".into(),
            }
            .into());
        }
        Ok(())
    }

    /// Reply with the gate's remediation unless the bot may post. Returns
    /// whether the caller may proceed.
    async fn admin_gate(&self, user: &User, chat_id: i64) -> Result<bool, Error> {
        let message = match self.verifier.verify(user).await? {
            AdminCheck::Confirmed => return Ok(true),
            AdminCheck::NotAdmin => registration::not_admin(),
            AdminCheck::ChannelNotFound => registration::channel_not_found(),
        };
        self.reply(chat_id, message).await?;
        Ok(false)
    }

    // ── Session start ───────────────────────────────────────────────

    /// "Write a post": verify admin rights, then replace any live session
    /// with a fresh one at the first question.
    pub async fn start(&self, from: &ChatIdentity) -> Result<(), Error> {
        let chat_id = from.chat_id;
        let user = self
            .db
            .get_user_by_chat(chat_id)
            .await?
            .filter(|u| u.registration_stage == RegistrationStage::Completed);
        let Some(user) = user else {
            return self.reply(chat_id, registration::not_registered()).await;
        };
        if !self.admin_gate(&user, chat_id).await? {
            return Ok(());
        }

        let session = self.db.create_session(user.id, chat_id).await?;
        info!(session_id = %session.id, chat_id, "Post session started");

        let n = self.config.question_count;
        self.reply(chat_id, prompts::session_started(n)).await?;
        self.reply(chat_id, prompts::question(1, n)).await
    }

    // ── Text input ──────────────────────────────────────────────────

    /// Free text (typed or transcribed) from a registered user.
    pub async fn handle_text(&self, user: &User, chat_id: i64, text: &str) -> Result<(), Error> {
        let Some(mut session) = self.db.find_active_session(chat_id).await? else {
            return self.reply(chat_id, prompts::idle()).await;
        };
        let text = text.trim();
        let expected = session.status;
        let n = self.config.question_count;

        match expected {
            SessionStatus::Question(k) => {
                let k = usize::from(k);
                if text.is_empty() {
                    return self.reply(chat_id, prompts::question(k, n)).await;
                }
                session.set_answer(k, text);
                debug!(session_id = %session.id, question = k, "Answer recorded");

                if k < n {
                    session.status = SessionStatus::Question((k + 1) as u8);
                    self.commit(&session, expected).await?;
                    self.reply(chat_id, prompts::question(k + 1, n)).await
                } else if self.config.collect_links {
                    session.status = SessionStatus::CollectingLinks;
                    self.commit(&session, expected).await?;
                    self.reply(chat_id, prompts::links_prompt()).await
                } else {
                    self.begin_generation(user, session, expected).await
                }
            }
            SessionStatus::CollectingLinks => match validate::extract_material(text) {
                Err(InputError::MissingDescription) => {
                    self.reply(chat_id, prompts::link_missing_description()).await
                }
                Err(_) => self.reply(chat_id, prompts::link_missing_url()).await,
                Ok(material) => {
                    session.materials.push(material);
                    let count = session.filled_materials().len();
                    if count >= MAX_MATERIALS {
                        return self.begin_generation(user, session, expected).await;
                    }
                    self.commit(&session, expected).await?;
                    self.reply(chat_id, prompts::link_saved(count)).await
                }
            },
            SessionStatus::Generating => self.reply(chat_id, prompts::still_generating()).await,
            SessionStatus::Reviewing => {
                let post = session.generated_post.as_deref().unwrap_or_default();
                self.reply(chat_id, prompts::review(post)).await
            }
            SessionStatus::ButtonTypeSelection => {
                self.reply(chat_id, prompts::button_type_choice()).await
            }
            SessionStatus::ButtonConfig => {
                let (target, button_type) = match session.button_type {
                    Some(t @ ButtonType::DirectMessage) => (validate::dm_target_url(text), t),
                    Some(t @ ButtonType::Link) => (validate::link_target_url(text), t),
                    None => return self.reply(chat_id, prompts::use_buttons()).await,
                };
                match target {
                    Err(InputError::InvalidHandle) => {
                        self.reply(chat_id, prompts::invalid_handle()).await
                    }
                    Err(_) => self.reply(chat_id, prompts::invalid_url()).await,
                    Ok(url) => {
                        session.button_url = Some(url);
                        session.status = SessionStatus::ButtonTextSelection;
                        self.commit(&session, expected).await?;
                        self.reply(chat_id, prompts::button_text_choice(button_type))
                            .await
                    }
                }
            }
            // Free text here is a custom label.
            SessionStatus::ButtonTextSelection => match validate::button_text(text) {
                Ok(label) => self.choose_text(chat_id, session, label).await,
                Err(_) => self.reply(chat_id, prompts::invalid_button_text()).await,
            },
            SessionStatus::FinalReview => {
                self.reply(chat_id, prompts::final_review(&session)).await
            }
            SessionStatus::Completed | SessionStatus::Cancelled => {
                self.reply(chat_id, prompts::idle()).await
            }
        }
    }

    /// A voice note: accepted only while answering questions.
    pub async fn handle_voice(&self, user: &User, chat_id: i64, file_id: &str) -> Result<(), Error> {
        let status = self
            .db
            .find_active_session(chat_id)
            .await?
            .map(|s| s.status);
        if !matches!(status, Some(SessionStatus::Question(_))) {
            return self.reply(chat_id, prompts::voice_not_expected()).await;
        }
        let Some(transcriber) = &self.transcriber else {
            return self.reply(chat_id, prompts::voice_unavailable()).await;
        };

        let audio = match self.gateway.download_file(file_id).await {
            Ok(audio) => audio,
            Err(e) => {
                warn!(chat_id, error = %e, "Voice download failed");
                return self.reply(chat_id, prompts::voice_failed()).await;
            }
        };
        let text = match transcriber.transcribe(audio).await {
            Ok(text) => text,
            Err(e) => {
                warn!(chat_id, error = %e, "Transcription failed");
                return self.reply(chat_id, prompts::voice_failed()).await;
            }
        };

        self.reply(chat_id, prompts::transcribed(&text)).await?;
        self.handle_text(user, chat_id, &text).await
    }

    // ── Buttons ─────────────────────────────────────────────────────

    /// A session-scoped button press. Buttons that do not fit the current
    /// status are stale and change nothing.
    pub async fn handle_action(
        &self,
        user: &User,
        chat_id: i64,
        action: CallbackAction,
    ) -> Result<(), Error> {
        let Some(mut session) = self.db.find_active_session(chat_id).await? else {
            return self.reply(chat_id, prompts::session_expired()).await;
        };
        let expected = session.status;

        match (expected, action) {
            (SessionStatus::CollectingLinks, CallbackAction::SkipLinks) => {
                self.begin_generation(user, session, expected).await
            }
            (SessionStatus::Reviewing, CallbackAction::ReviewApproved) => {
                if !self.config.button_flow {
                    return self.publish(user, chat_id, session).await;
                }
                session.status = SessionStatus::ButtonTypeSelection;
                self.commit(&session, expected).await?;
                self.reply(chat_id, prompts::button_type_choice()).await
            }
            (SessionStatus::Reviewing, CallbackAction::ReviewRejected)
            | (SessionStatus::FinalReview, CallbackAction::FinalRejected) => {
                self.restart(chat_id, session).await
            }
            (SessionStatus::ButtonTypeSelection, CallbackAction::ChooseButtonType(kind)) => {
                session.button_type = Some(kind);
                let derived = match kind {
                    ButtonType::DirectMessage => user
                        .username
                        .as_deref()
                        .and_then(|handle| validate::dm_target_url(handle).ok()),
                    ButtonType::Link => None,
                };
                match derived {
                    Some(url) => {
                        session.button_url = Some(url);
                        session.status = SessionStatus::ButtonTextSelection;
                        self.commit(&session, expected).await?;
                        self.reply(chat_id, prompts::button_text_choice(kind)).await
                    }
                    None => {
                        session.status = SessionStatus::ButtonConfig;
                        self.commit(&session, expected).await?;
                        let ask = match kind {
                            ButtonType::DirectMessage => prompts::ask_dm_target(),
                            ButtonType::Link => prompts::ask_link_target(),
                        };
                        self.reply(chat_id, ask).await
                    }
                }
            }
            (SessionStatus::ButtonTextSelection, CallbackAction::CannedText(i)) => {
                let label = session
                    .button_type
                    .and_then(|t| prompts::canned_labels(t).get(i))
                    .map(|label| label.to_string());
                match label {
                    Some(label) => self.choose_text(chat_id, session, label).await,
                    None => self.reply(chat_id, prompts::use_buttons()).await,
                }
            }
            (SessionStatus::ButtonTextSelection, CallbackAction::CustomText) => {
                self.reply(chat_id, prompts::ask_custom_text()).await
            }
            (SessionStatus::FinalReview, CallbackAction::FinalApproved) => {
                self.publish(user, chat_id, session).await
            }
            (status, action) => {
                debug!(session_id = %session.id, %status, %action, "Stale button ignored");
                self.reply(chat_id, prompts::button_inactive()).await
            }
        }
    }

    async fn choose_text(
        &self,
        chat_id: i64,
        mut session: PostSession,
        label: String,
    ) -> Result<(), Error> {
        let expected = session.status;
        session.button_text = Some(label);
        session.status = SessionStatus::FinalReview;
        self.commit(&session, expected).await?;
        self.reply(chat_id, prompts::final_review(&session)).await
    }

    /// Clear everything and loop back to the first question.
    async fn restart(&self, chat_id: i64, mut session: PostSession) -> Result<(), Error> {
        let expected = session.status;
        session.reset();
        self.commit(&session, expected).await?;
        info!(session_id = %session.id, from = %expected, "Session restarted");

        self.reply(chat_id, prompts::restarting()).await?;
        self.reply(chat_id, prompts::question(1, self.config.question_count))
            .await
    }

    // ── Generation ──────────────────────────────────────────────────

    /// Enter `generating`, dispatch once, and arm the timeout.
    async fn begin_generation(
        &self,
        user: &User,
        mut session: PostSession,
        expected: SessionStatus,
    ) -> Result<(), Error> {
        let chat_id = session.chat_id;
        session.status = SessionStatus::Generating;
        session.generation_started_at = Some(Utc::now());
        self.commit(&session, expected).await?;

        if let Err(e) = self.reply(chat_id, prompts::generating()).await {
            warn!(session_id = %session.id, error = %e, "Failed to send generating notice");
        }

        let request = GenerationRequest::new(RequestType::GeneratePost, user, &session);
        match self.backend.submit(&request).await {
            Ok(()) => {
                info!(
                    session_id = %session.id,
                    answers = request.answers.len(),
                    materials = request.materials.len(),
                    "Generation dispatched"
                );
                self.supervisor.watch(session.id);
                Ok(())
            }
            Err(e) => {
                error!(session_id = %session.id, error = %e, "Generation dispatch failed");
                session.reset();
                if !self
                    .db
                    .save_session(&session, SessionStatus::Generating)
                    .await?
                {
                    // A result arrived anyway; let it stand.
                    return Ok(());
                }
                alerts::raise(
                    self.alerts.as_ref(),
                    &format!(
                        "❌ Generation request failed\nUser: {}\nSession: {}\nError: {e}",
                        user.summary(),
                        session.id
                    ),
                )
                .await;
                self.reply(chat_id, prompts::generation_failed()).await
            }
        }
    }

    /// Accept a generated post for the chat's `generating` session and
    /// present it for review.
    pub async fn ingest_callback(&self, post: GeneratedPost) -> Result<Uuid, Error> {
        let chat_id = post.chat_id;
        if self.db.get_user_by_chat(chat_id).await?.is_none() {
            return Err(SessionError::UserNotFound { chat_id }.into());
        }
        let Some(mut session) = self.db.find_active_session(chat_id).await? else {
            return Err(SessionError::NotFound { chat_id }.into());
        };
        if session.status != SessionStatus::Generating {
            return Err(SessionError::StateMismatch {
                id: session.id,
                expected: SessionStatus::Generating.to_string(),
                actual: session.status.to_string(),
            }
            .into());
        }

        let text = sanitize(&post.text);
        session.generated_post = Some(text.clone());
        session.status = SessionStatus::Reviewing;
        self.commit(&session, SessionStatus::Generating).await?;
        info!(session_id = %session.id, chat_id, chars = text.chars().count(), "Generated post received");

        if let Err(e) = self.reply(chat_id, prompts::review(&text)).await {
            error!(session_id = %session.id, error = %e, "Failed to deliver post for review");
        }
        Ok(session.id)
    }

    // ── Publication ─────────────────────────────────────────────────

    /// Publish to the user's channel, then mark the session completed. A
    /// failed send leaves the session where it was so the user can retry; once
    /// the send succeeds, store trouble is only logged.
    async fn publish(&self, user: &User, chat_id: i64, mut session: PostSession) -> Result<(), Error> {
        let expected = session.status;
        if !self.admin_gate(user, chat_id).await? {
            return Ok(());
        }
        let Some(channel) = user.channel_handle() else {
            return self.reply(chat_id, registration::channel_not_found()).await;
        };

        if let Err(e) = self
            .gateway
            .send(&channel, &prompts::publication(&session))
            .await
        {
            error!(session_id = %session.id, channel = %channel, error = %e, "Publication failed");
            return self.reply(chat_id, prompts::publish_failed()).await;
        }

        info!(session_id = %session.id, channel = %channel, "Post published");

        // The post is live; nothing below may turn this into a retry.
        session.status = SessionStatus::Completed;
        match self.db.save_session(&session, expected).await {
            Ok(true) => {
                if let Err(e) = self.db.increment_post_count(user.id).await {
                    error!(user_id = %user.id, error = %e, "Failed to bump post count");
                }
            }
            Ok(false) => warn!(session_id = %session.id, "Session changed while publishing"),
            Err(e) => {
                error!(session_id = %session.id, error = %e, "Failed to record publication")
            }
        }

        let shown = user.channel_url.clone().unwrap_or(channel);
        self.reply(chat_id, prompts::published(&shown)).await
    }
}
