//! Voice transcription through OpenAI Whisper.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::config::TranscriptionConfig;
use crate::error::TranscriptionError;

const WHISPER_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const WHISPER_MODEL: &str = "whisper-1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Speech-to-text for voice answers.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe an OGG/Opus voice note into trimmed, non-empty text.
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String, TranscriptionError>;
}

#[derive(Deserialize)]
struct WhisperResponse {
    #[serde(default)]
    text: String,
}

pub struct WhisperTranscriber {
    api_key: SecretString,
    language: String,
    client: reqwest::Client,
}

impl WhisperTranscriber {
    pub fn new(config: TranscriptionConfig) -> Self {
        Self {
            api_key: config.api_key,
            language: config.language,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String, TranscriptionError> {
        let size = audio.len();
        let file = Part::bytes(audio)
            .file_name("voice.ogg")
            .mime_str("audio/ogg")
            .map_err(|e| TranscriptionError::RequestFailed(e.to_string()))?;
        let form = Form::new()
            .text("model", WHISPER_MODEL)
            .text("language", self.language.clone())
            .part("file", file);

        let resp = self
            .client
            .post(WHISPER_URL)
            .bearer_auth(self.api_key.expose_secret())
            .timeout(REQUEST_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscriptionError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(TranscriptionError::RequestFailed(format!(
                "HTTP {}",
                resp.status()
            )));
        }

        let body: WhisperResponse = resp
            .json()
            .await
            .map_err(|e| TranscriptionError::RequestFailed(format!("invalid response: {e}")))?;

        let text = body.text.trim().to_string();
        debug!(bytes = size, chars = text.chars().count(), "Voice note transcribed");
        if text.is_empty() {
            return Err(TranscriptionError::Empty);
        }
        Ok(text)
    }
}
