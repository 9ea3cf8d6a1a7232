//! Telegram gateway: long-polls the Bot API for updates.
//!
//! Native Rust Telegram Bot API implementation of [`ChatGateway`]: text,
//! inline keyboards, callback queries, voice downloads and the bot's own
//! channel membership lookup.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::sync::OnceCell;

use crate::channels::{
    Button, ChatGateway, EventKind, EventStream, IncomingEvent, MemberStatus, OutgoingMessage,
};
use crate::error::ChannelError;
use crate::onboarding::model::ChatIdentity;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Bound on every non-polling Bot API call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Long-poll wait passed to getUpdates.
const POLL_TIMEOUT_SECS: u64 = 30;

/// The bot's own account, from getMe.
#[derive(Debug, Clone)]
struct BotInfo {
    id: i64,
    username: String,
}

/// Telegram gateway: connects to the Bot API via long-polling.
pub struct TelegramGateway {
    bot_token: SecretString,
    client: reqwest::Client,
    me: OnceCell<BotInfo>,
}

impl TelegramGateway {
    pub fn new(bot_token: SecretString) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
            me: OnceCell::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            self.bot_token.expose_secret()
        )
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "https://api.telegram.org/file/bot{}/{file_path}",
            self.bot_token.expose_secret()
        )
    }

    /// POST a Bot API method and return its `result`, mapping API failures.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .timeout(REQUEST_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::Http(format!("{method}: {e}")))?;

        let data: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Http(format!("{method}: invalid response: {e}")))?;

        if data.get("ok").and_then(Value::as_bool) == Some(true) {
            return Ok(data.get("result").cloned().unwrap_or(Value::Null));
        }

        let description = data
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        if description.to_lowercase().contains("chat not found") {
            let chat = body
                .get("chat_id")
                .map(|c| c.to_string().trim_matches('"').to_string())
                .unwrap_or_default();
            return Err(ChannelError::ChatNotFound { chat });
        }
        Err(ChannelError::SendFailed {
            name: "telegram".into(),
            reason: format!("{method}: {description}"),
        })
    }

    /// The bot's own account, fetched once via getMe.
    async fn me(&self) -> Result<&BotInfo, ChannelError> {
        self.me
            .get_or_try_init(|| async {
                let me = self.call("getMe", &json!({})).await?;
                let id = me
                    .get("id")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| ChannelError::InvalidMessage("getMe: missing id".into()))?;
                let username = me
                    .get("username")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(BotInfo { id, username })
            })
            .await
    }

    /// Send a single chunk (≤4096 chars), HTML first with plain-text fallback.
    async fn send_chunk(
        &self,
        chat: &str,
        text: &str,
        html: bool,
        keyboard: Option<&Value>,
    ) -> Result<(), ChannelError> {
        let mut body = json!({ "chat_id": chat, "text": text });
        if let Some(markup) = keyboard {
            body["reply_markup"] = markup.clone();
        }
        if !html {
            return self.call("sendMessage", &body).await.map(|_| ());
        }

        let mut html_body = body.clone();
        html_body["parse_mode"] = json!("HTML");
        match self.call("sendMessage", &html_body).await {
            Ok(_) => Ok(()),
            Err(e @ ChannelError::ChatNotFound { .. }) => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Telegram sendMessage with HTML failed; retrying without parse_mode");
                self.call("sendMessage", &body).await.map(|_| ())
            }
        }
    }

    /// Start long-polling and return a stream of incoming events.
    pub fn start(&self) -> EventStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram gateway listening for updates...");

            loop {
                let body = json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client
                    .post(&url)
                    .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
                    .json(&body)
                    .send()
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    continue;
                };

                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(event) = parse_update(update) else {
                        continue;
                    };

                    if tx.send(event).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx))
    }
}

#[async_trait]
impl ChatGateway for TelegramGateway {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, chat: &str, message: &OutgoingMessage) -> Result<(), ChannelError> {
        let chunks = split_message(&message.text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let markup = (!message.keyboard.is_empty()).then(|| keyboard_json(&message.keyboard));
        let last = chunks.len().saturating_sub(1);

        // Buttons ride on the last chunk.
        for (i, chunk) in chunks.iter().enumerate() {
            let keyboard = if i == last { markup.as_ref() } else { None };
            self.send_chunk(chat, chunk, message.html, keyboard).await?;
        }
        Ok(())
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<(), ChannelError> {
        self.call("answerCallbackQuery", &json!({ "callback_query_id": callback_id }))
            .await
            .map(|_| ())
    }

    async fn bot_membership(&self, channel: &str) -> Result<MemberStatus, ChannelError> {
        let bot_id = self.me().await?.id;
        let member = self
            .call("getChatMember", &json!({ "chat_id": channel, "user_id": bot_id }))
            .await?;
        parse_member_status(&member)
    }

    async fn bot_username(&self) -> Result<String, ChannelError> {
        Ok(self.me().await?.username.clone())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, ChannelError> {
        let file = self.call("getFile", &json!({ "file_id": file_id })).await?;
        let file_path = file
            .get("file_path")
            .and_then(Value::as_str)
            .ok_or_else(|| ChannelError::DownloadFailed(format!("no file_path for {file_id}")))?;

        let resp = self
            .client
            .get(self.file_url(file_path))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| ChannelError::DownloadFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ChannelError::DownloadFailed(format!(
                "file download returned {}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ChannelError::DownloadFailed(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn identity_from(from: &Value, chat_id: i64) -> ChatIdentity {
    let text = |key: &str| from.get(key).and_then(Value::as_str).map(String::from);
    ChatIdentity {
        chat_id,
        username: text("username"),
        first_name: text("first_name"),
        last_name: text("last_name"),
    }
}

/// Turn a raw update into an event. Non-private chats and unsupported
/// message kinds yield `None`.
fn parse_update(update: &Value) -> Option<IncomingEvent> {
    if let Some(query) = update.get("callback_query") {
        let from = query.get("from")?;
        let chat_id = from.get("id").and_then(Value::as_i64)?;
        let callback_id = query.get("id").and_then(Value::as_str)?.to_string();
        let data = query.get("data").and_then(Value::as_str)?.to_string();
        return Some(IncomingEvent::new(
            identity_from(from, chat_id),
            EventKind::Button { callback_id, data },
        ));
    }

    let message = update.get("message")?;
    let chat = message.get("chat")?;
    if chat.get("type").and_then(Value::as_str) != Some("private") {
        return None;
    }
    let chat_id = chat.get("id").and_then(Value::as_i64)?;
    let from = message.get("from").unwrap_or(chat);
    let identity = identity_from(from, chat_id);

    if let Some(text) = message.get("text").and_then(Value::as_str) {
        return Some(IncomingEvent::new(identity, parse_text(text)));
    }

    if let Some(voice) = message.get("voice") {
        let file_id = voice.get("file_id").and_then(Value::as_str)?.to_string();
        let duration_secs = voice.get("duration").and_then(Value::as_u64).unwrap_or(0) as u32;
        return Some(IncomingEvent::new(
            identity,
            EventKind::Voice {
                file_id,
                duration_secs,
            },
        ));
    }

    None
}

/// Split `/command@bot args` into a command, or keep plain text.
fn parse_text(text: &str) -> EventKind {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return EventKind::Text(text.to_string());
    };
    let (head, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let name = head.split('@').next().unwrap_or(head);
    if name.is_empty() {
        return EventKind::Text(text.to_string());
    }
    EventKind::Command {
        name: name.to_lowercase(),
        args: args.trim().to_string(),
    }
}

fn parse_member_status(member: &Value) -> Result<MemberStatus, ChannelError> {
    let status = member
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| ChannelError::InvalidMessage("getChatMember: missing status".into()))?;

    Ok(match status {
        "creator" => MemberStatus::Creator,
        "administrator" => MemberStatus::Administrator {
            can_post_messages: member
                .get("can_post_messages")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        },
        "member" => MemberStatus::Member,
        "restricted" => MemberStatus::Restricted,
        "left" => MemberStatus::Left,
        "kicked" => MemberStatus::Kicked,
        other => {
            return Err(ChannelError::InvalidMessage(format!(
                "getChatMember: unknown status {other}"
            )));
        }
    })
}

/// Render button rows as a Bot API `reply_markup`.
fn keyboard_json(rows: &[Vec<Button>]) -> Value {
    let rows: Vec<Vec<Value>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| match button {
                    Button::Callback { label, data } => json!({ "text": label, "callback_data": data }),
                    Button::Url { label, url } => json!({ "text": label, "url": url }),
                })
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

/// Byte offset just past the first `max_chars` characters, or `None` if the
/// whole string fits.
fn char_limit(s: &str, max_chars: usize) -> Option<usize> {
    s.char_indices().nth(max_chars).map(|(i, _)| i)
}

/// Pull a cut point at byte `at` back so that it lands outside any tag and
/// outside any open element. Returns `at` unchanged when no earlier safe
/// point exists.
fn tag_safe_split(chunk: &str, at: usize) -> usize {
    let head = &chunk[..at];
    let mut open: Vec<(&str, usize)> = Vec::new();
    let mut pos = 0;

    while let Some(rel) = head[pos..].find('<') {
        let start = pos + rel;
        let Some(close) = head[start..].find('>') else {
            // Cut would land inside `<...>`.
            let back = open.first().map_or(start, |&(_, s)| s);
            return if back > 0 { back } else { at };
        };
        let tag = &head[start + 1..start + close];
        if let Some(name) = tag.strip_prefix('/') {
            let name = name.trim();
            if let Some(idx) = open.iter().rposition(|&(n, _)| n == name) {
                open.truncate(idx);
            }
        } else if !tag.ends_with('/') {
            let name = tag.split_whitespace().next().unwrap_or_default();
            open.push((name, start));
        }
        pos = start + close + 1;
    }

    match open.first() {
        Some(&(_, start)) if start > 0 => start,
        _ => at,
    }
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts; never inside an
/// HTML tag or between an opening tag and its close.
fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    loop {
        let Some(limit) = char_limit(remaining, max_chars) else {
            chunks.push(remaining.to_string());
            break;
        };

        let chunk = &remaining[..limit];
        let preferred = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            // Don't split at position 0 (infinite loop guard)
            .filter(|&i| i > 0)
            .unwrap_or(limit);
        let split_at = tag_safe_split(chunk, preferred);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
        if remaining.is_empty() {
            break;
        }
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
