//! Recording fakes and a wired-up harness shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use post_assist::actions::CallbackAction;
use post_assist::alerts::AlertSink;
use post_assist::channels::{ChatGateway, EventKind, IncomingEvent, MemberStatus, OutgoingMessage};
use post_assist::config::FlowConfig;
use post_assist::dispatch::Bot;
use post_assist::error::{ChannelError, DatabaseError, GenerationError, TranscriptionError};
use post_assist::generation::{GenerationBackend, GenerationRequest};
use post_assist::onboarding::{AdminVerifier, ChatIdentity, RegistrationManager, RegistrationStage, User};
use post_assist::posting::{FlowDeps, PostFlow, PostSession, SessionStatus};
use post_assist::store::{Database, LibSqlBackend};
use post_assist::transcribe::Transcriber;

/// Maximum time any test is allowed to run before we consider it hung.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub const CHAT: i64 = 1001;
pub const CHANNEL: &str = "@ann_channel";

// ── Fakes ───────────────────────────────────────────────────────────

pub struct RecordingGateway {
    sent: Mutex<Vec<(String, OutgoingMessage)>>,
    pub membership: Mutex<MemberStatus>,
    pub fail_channel_sends: AtomicBool,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            membership: Mutex::new(MemberStatus::Administrator {
                can_post_messages: true,
            }),
            fail_channel_sends: AtomicBool::new(false),
        }
    }

    pub fn sent_to(&self, chat: &str) -> Vec<OutgoingMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == chat)
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    pub fn user_messages(&self) -> Vec<OutgoingMessage> {
        self.sent_to(&CHAT.to_string())
    }

    pub fn last_user_text(&self) -> String {
        self.user_messages()
            .last()
            .map(|m| m.text.clone())
            .unwrap_or_default()
    }

    pub fn set_membership(&self, status: MemberStatus) {
        *self.membership.lock().unwrap() = status;
    }
}

#[async_trait]
impl ChatGateway for RecordingGateway {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, chat: &str, message: &OutgoingMessage) -> Result<(), ChannelError> {
        if chat.starts_with('@') && self.fail_channel_sends.load(Ordering::SeqCst) {
            return Err(ChannelError::SendFailed {
                name: "recording".into(),
                reason: "channel unavailable".into(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((chat.to_string(), message.clone()));
        Ok(())
    }

    async fn acknowledge(&self, _callback_id: &str) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn bot_membership(&self, _channel: &str) -> Result<MemberStatus, ChannelError> {
        Ok(*self.membership.lock().unwrap())
    }

    async fn bot_username(&self) -> Result<String, ChannelError> {
        Ok("post_bot".into())
    }

    async fn download_file(&self, _file_id: &str) -> Result<Vec<u8>, ChannelError> {
        Ok(b"OggS".to_vec())
    }
}

#[derive(Default)]
pub struct RecordingBackend {
    requests: Mutex<Vec<GenerationRequest>>,
    pub fail: AtomicBool,
}

impl RecordingBackend {
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for RecordingBackend {
    async fn submit(&self, request: &GenerationRequest) -> Result<(), GenerationError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(GenerationError::Rejected { status: 503 });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingAlerts {
    alerts: Mutex<Vec<String>>,
}

impl RecordingAlerts {
    pub fn alerts(&self) -> Vec<String> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingAlerts {
    async fn alert(&self, text: &str) -> Result<(), ChannelError> {
        self.alerts.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// How [`FaultyStore::save_session`] misbehaves, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFault {
    /// The write errors out.
    Error,
    /// Another writer got there first.
    Lost,
}

/// The real store with switchable session-save faults.
pub struct FaultyStore {
    inner: Arc<LibSqlBackend>,
    fault: Mutex<Option<SaveFault>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<LibSqlBackend>) -> Self {
        Self {
            inner,
            fault: Mutex::new(None),
        }
    }

    pub fn set_fault(&self, fault: Option<SaveFault>) {
        *self.fault.lock().unwrap() = fault;
    }
}

#[async_trait]
impl Database for FaultyStore {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        self.inner.init_schema().await
    }

    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError> {
        self.inner.insert_user(user).await
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        self.inner.get_user(id).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        self.inner.get_user_by_email(email).await
    }

    async fn get_user_by_chat(&self, chat_id: i64) -> Result<Option<User>, DatabaseError> {
        self.inner.get_user_by_chat(chat_id).await
    }

    async fn bind_chat_identity(
        &self,
        user_id: Uuid,
        identity: &ChatIdentity,
    ) -> Result<bool, DatabaseError> {
        self.inner.bind_chat_identity(user_id, identity).await
    }

    async fn update_channel(
        &self,
        user_id: Uuid,
        channel_url: &str,
        channel_username: &str,
    ) -> Result<(), DatabaseError> {
        self.inner
            .update_channel(user_id, channel_url, channel_username)
            .await
    }

    async fn set_admin_verified(&self, user_id: Uuid, is_admin: bool) -> Result<(), DatabaseError> {
        self.inner.set_admin_verified(user_id, is_admin).await
    }

    async fn increment_post_count(&self, user_id: Uuid) -> Result<(), DatabaseError> {
        self.inner.increment_post_count(user_id).await
    }

    async fn touch_user(&self, identity: &ChatIdentity) -> Result<(), DatabaseError> {
        self.inner.touch_user(identity).await
    }

    async fn create_session(&self, user_id: Uuid, chat_id: i64) -> Result<PostSession, DatabaseError> {
        self.inner.create_session(user_id, chat_id).await
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<PostSession>, DatabaseError> {
        self.inner.get_session(id).await
    }

    async fn find_active_session(&self, chat_id: i64) -> Result<Option<PostSession>, DatabaseError> {
        self.inner.find_active_session(chat_id).await
    }

    async fn save_session(
        &self,
        session: &PostSession,
        expected: SessionStatus,
    ) -> Result<bool, DatabaseError> {
        let fault = *self.fault.lock().unwrap();
        match fault {
            Some(SaveFault::Error) => Err(DatabaseError::Query("save_session: disk full".into())),
            Some(SaveFault::Lost) => Ok(false),
            None => self.inner.save_session(session, expected).await,
        }
    }

    async fn list_overdue_generating(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PostSession>, DatabaseError> {
        self.inner.list_overdue_generating(cutoff).await
    }

    async fn count_active_sessions(&self, user_id: Uuid) -> Result<usize, DatabaseError> {
        self.inner.count_active_sessions(user_id).await
    }
}

pub struct FixedTranscriber(pub &'static str);

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, _audio: Vec<u8>) -> Result<String, TranscriptionError> {
        Ok(self.0.to_string())
    }
}

// ── Harness ─────────────────────────────────────────────────────────

pub struct Harness {
    pub db: Arc<LibSqlBackend>,
    pub store: Arc<FaultyStore>,
    pub gateway: Arc<RecordingGateway>,
    pub backend: Arc<RecordingBackend>,
    pub alerts: Arc<RecordingAlerts>,
    pub flow: Arc<PostFlow>,
    pub bot: Arc<Bot>,
}

pub async fn harness(config: FlowConfig) -> Harness {
    let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let gateway = Arc::new(RecordingGateway::new());
    let backend = Arc::new(RecordingBackend::default());
    let alerts = Arc::new(RecordingAlerts::default());

    let faulty = Arc::new(FaultyStore::new(Arc::clone(&db)));
    let store: Arc<dyn Database> = faulty.clone();
    let chat: Arc<dyn ChatGateway> = gateway.clone();
    let verifier = Arc::new(AdminVerifier::new(Arc::clone(&store), Arc::clone(&chat)));
    let registration = Arc::new(RegistrationManager::new(
        Arc::clone(&store),
        Arc::clone(&chat),
        Arc::clone(&verifier),
    ));
    let flow = Arc::new(PostFlow::new(FlowDeps {
        db: Arc::clone(&store),
        gateway: Arc::clone(&chat),
        backend: backend.clone(),
        alerts: alerts.clone(),
        verifier,
        transcriber: Some(Arc::new(FixedTranscriber("spoken answer"))),
        config,
    }));
    let bot = Arc::new(Bot::new(store, chat, registration, Arc::clone(&flow)));

    Harness {
        db,
        store: faulty,
        gateway,
        backend,
        alerts,
        flow,
        bot,
    }
}

/// Five questions, links and buttons on, a generous timeout.
pub fn default_config() -> FlowConfig {
    FlowConfig::default()
}

pub fn identity() -> ChatIdentity {
    ChatIdentity {
        chat_id: CHAT,
        username: Some("author_handle".into()),
        first_name: Some("Ann".into()),
        last_name: None,
    }
}

/// A fully registered author bound to [`CHAT`].
pub async fn registered_user(db: &LibSqlBackend) -> User {
    registered_user_with_handle(db, Some("author_handle")).await
}

pub async fn registered_user_with_handle(db: &LibSqlBackend, username: Option<&str>) -> User {
    let mut user = User::new("ann@example.com");
    user.chat_id = Some(CHAT);
    user.username = username.map(str::to_string);
    user.first_name = Some("Ann".into());
    user.channel_url = Some("https://t.me/ann_channel".into());
    user.channel_username = Some("ann_channel".into());
    user.is_bot_admin = true;
    user.registration_stage = RegistrationStage::Completed;
    db.insert_user(&user).await.unwrap();
    user
}

/// [`CHAT`] as seen from a Telegram account with no public username.
pub fn identity_without_handle() -> ChatIdentity {
    ChatIdentity {
        username: None,
        ..identity()
    }
}

pub fn text(body: &str) -> IncomingEvent {
    IncomingEvent::new(identity(), EventKind::Text(body.to_string()))
}

pub fn press(action: CallbackAction) -> IncomingEvent {
    IncomingEvent::new(
        identity(),
        EventKind::Button {
            callback_id: "cb".into(),
            data: action.to_string(),
        },
    )
}

pub fn text_from(from: ChatIdentity, body: &str) -> IncomingEvent {
    IncomingEvent::new(from, EventKind::Text(body.to_string()))
}

pub fn press_from(from: ChatIdentity, action: CallbackAction) -> IncomingEvent {
    IncomingEvent::new(
        from,
        EventKind::Button {
            callback_id: "cb".into(),
            data: action.to_string(),
        },
    )
}
