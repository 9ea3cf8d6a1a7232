//! Error types for post-assist.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Transcription error: {0}")]
    Transcription(#[from] TranscriptionError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Chat gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Chat not found: {chat}")]
    ChatNotFound { chat: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("File download failed: {0}")]
    DownloadFailed(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Generation backend errors.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Generation backend is not configured")]
    NotConfigured,

    #[error("Generation request failed: {0}")]
    RequestFailed(String),

    #[error("Generation backend rejected the request with status {status}")]
    Rejected { status: u16 },

    #[error("Generation request timed out after {0:?}")]
    Timeout(Duration),
}

/// Voice transcription errors.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("Transcription is not available")]
    Unavailable,

    #[error("Transcription request failed: {0}")]
    RequestFailed(String),

    #[error("Transcription returned no text")]
    Empty,
}

/// Session state errors: the requested action does not match the stored state.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No active session for chat {chat_id}")]
    NotFound { chat_id: i64 },

    #[error("Session {id} is {actual}, expected {expected}")]
    StateMismatch {
        id: Uuid,
        expected: String,
        actual: String,
    },

    #[error("User not found for chat {chat_id}")]
    UserNotFound { chat_id: i64 },
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
