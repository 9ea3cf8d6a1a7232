//! Configuration types.
//!
//! Everything is read from the environment (optionally seeded from a `.env`
//! file by the binary). Each section has a `from_env()` constructor; the
//! parsing itself goes through a lookup closure so tests never touch the real
//! process environment.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Upper bound on interview questions.
pub const MAX_QUESTIONS: usize = 6;

/// Upper bound on collected (description, url) materials.
pub const MAX_MATERIALS: usize = 5;

/// Post-creation flow configuration.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Number of interview questions (N).
    pub question_count: usize,
    /// Whether the link-collection stage runs after the last answer.
    pub collect_links: bool,
    /// Whether the call-to-action button stages run after review approval.
    pub button_flow: bool,
    /// How long a session may stay in `generating` before it is reset.
    pub generation_timeout: Duration,
    /// How often the durable sweep looks for overdue `generating` sessions.
    pub sweep_interval: Duration,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            question_count: 5,
            collect_links: true,
            button_flow: true,
            generation_timeout: Duration::from_secs(180), // 3 minutes
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl FlowConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let question_count = parse_or(&lookup, "POST_ASSIST_QUESTION_COUNT", defaults.question_count)?;
        if !(1..=MAX_QUESTIONS).contains(&question_count) {
            return Err(ConfigError::InvalidValue {
                key: "POST_ASSIST_QUESTION_COUNT".into(),
                message: format!("must be between 1 and {MAX_QUESTIONS}, got {question_count}"),
            });
        }

        let timeout_secs: u64 = parse_or(
            &lookup,
            "POST_ASSIST_GENERATION_TIMEOUT_SECS",
            defaults.generation_timeout.as_secs(),
        )?;
        let sweep_secs: u64 = parse_or(
            &lookup,
            "POST_ASSIST_SWEEP_INTERVAL_SECS",
            defaults.sweep_interval.as_secs(),
        )?;
        if timeout_secs == 0 || sweep_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "POST_ASSIST_GENERATION_TIMEOUT_SECS".into(),
                message: "timeouts must be positive".into(),
            });
        }

        Ok(Self {
            question_count,
            collect_links: bool_or(&lookup, "POST_ASSIST_COLLECT_LINKS", defaults.collect_links)?,
            button_flow: bool_or(&lookup, "POST_ASSIST_BUTTON_FLOW", defaults.button_flow)?,
            generation_timeout: Duration::from_secs(timeout_secs),
            sweep_interval: Duration::from_secs(sweep_secs),
        })
    }
}

/// Operator alert channel (a separate admin bot posting to an admin chat).
#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub bot_token: SecretString,
    pub chat_id: String,
}

/// Voice transcription settings.
#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    pub api_key: SecretString,
    pub language: String,
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram_bot_token: SecretString,
    pub db_path: PathBuf,
    pub http_port: u16,
    pub n8n_webhook_url: Option<String>,
    pub alerts: Option<AlertConfig>,
    pub transcription: Option<TranscriptionConfig>,
    pub flow: FlowConfig,
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let telegram_bot_token = non_empty(&lookup, "TELEGRAM_BOT_TOKEN")
            .ok_or_else(|| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".into()))?;

        let alerts = match (
            non_empty(&lookup, "ADMIN_BOT_TOKEN"),
            non_empty(&lookup, "ADMIN_CHAT_ID"),
        ) {
            (Some(token), Some(chat_id)) => Some(AlertConfig {
                bot_token: SecretString::from(token),
                chat_id,
            }),
            _ => None,
        };

        let transcription = non_empty(&lookup, "OPENAI_API_KEY").map(|key| TranscriptionConfig {
            api_key: SecretString::from(key),
            language: non_empty(&lookup, "POST_ASSIST_TRANSCRIBE_LANGUAGE")
                .unwrap_or_else(|| "ru".to_string()),
        });

        Ok(Self {
            telegram_bot_token: SecretString::from(telegram_bot_token),
            db_path: non_empty(&lookup, "POST_ASSIST_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/post-assist.db")),
            http_port: parse_or(&lookup, "POST_ASSIST_HTTP_PORT", 8080)?,
            n8n_webhook_url: non_empty(&lookup, "N8N_WEBHOOK_URL"),
            alerts,
            transcription,
            flow: FlowConfig::from_lookup(&lookup)?,
            log_dir: non_empty(&lookup, "POST_ASSIST_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(lookup, key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn bool_or<F>(lookup: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup, key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {v:?}"),
        }),
    }
}
