//! Chat gateway abstraction: message/button I/O with the messaging platform.

pub mod telegram;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;
use crate::onboarding::model::ChatIdentity;

pub use telegram::TelegramGateway;

/// What a user did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A `/command` with optional trailing arguments.
    Command { name: String, args: String },
    Text(String),
    /// An inline keyboard press.
    Button { callback_id: String, data: String },
    /// A voice note, downloadable through [`ChatGateway::download_file`].
    Voice { file_id: String, duration_secs: u32 },
}

/// An incoming event tagged with the sender's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingEvent {
    pub from: ChatIdentity,
    pub kind: EventKind,
}

impl IncomingEvent {
    pub fn new(from: ChatIdentity, kind: EventKind) -> Self {
        Self { from, kind }
    }

    pub fn chat_id(&self) -> i64 {
        self.from.chat_id
    }

    /// Short label for logs.
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            EventKind::Command { .. } => "command",
            EventKind::Text(_) => "text",
            EventKind::Button { .. } => "button",
            EventKind::Voice { .. } => "voice",
        }
    }
}

/// An inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Button {
    /// Sends `data` back as an [`EventKind::Button`] when pressed.
    Callback { label: String, data: String },
    /// Opens `url`.
    Url { label: String, url: String },
}

impl Button {
    pub fn callback(label: impl Into<String>, data: impl ToString) -> Self {
        Self::Callback {
            label: label.into(),
            data: data.to_string(),
        }
    }

    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Url {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// A message to deliver to a user or channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    /// Rows of inline buttons.
    pub keyboard: Vec<Vec<Button>>,
    /// Render `text` as HTML.
    pub html: bool,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn html(mut self) -> Self {
        self.html = true;
        self
    }

    pub fn with_row(mut self, row: Vec<Button>) -> Self {
        self.keyboard.push(row);
        self
    }

    /// Add one button per row.
    pub fn with_column(mut self, buttons: impl IntoIterator<Item = Button>) -> Self {
        self.keyboard.extend(buttons.into_iter().map(|b| vec![b]));
        self
    }
}

/// The bot's own membership in a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Creator,
    Administrator { can_post_messages: bool },
    Member,
    Restricted,
    Left,
    Kicked,
}

impl MemberStatus {
    /// Whether this membership allows publishing posts.
    pub fn can_post(&self) -> bool {
        match self {
            Self::Creator => true,
            Self::Administrator { can_post_messages } => *can_post_messages,
            _ => false,
        }
    }
}

/// Stream of incoming events from a gateway.
pub type EventStream = Pin<Box<dyn Stream<Item = IncomingEvent> + Send>>;

/// Outbound side of the messaging platform.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Gateway name for logging.
    fn name(&self) -> &str;

    /// Send a message to a user chat id or a channel (`@name`).
    async fn send(&self, chat: &str, message: &OutgoingMessage) -> Result<(), ChannelError>;

    /// Acknowledge a button press so the client stops its spinner.
    async fn acknowledge(&self, callback_id: &str) -> Result<(), ChannelError>;

    /// The bot's own membership in `channel` (`@name`).
    ///
    /// Returns [`ChannelError::ChatNotFound`] when the channel does not exist
    /// or is invisible to the bot.
    async fn bot_membership(&self, channel: &str) -> Result<MemberStatus, ChannelError>;

    /// The bot's own handle, without `@`.
    async fn bot_username(&self) -> Result<String, ChannelError>;

    /// Download a file previously received in an event.
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, ChannelError>;
}
