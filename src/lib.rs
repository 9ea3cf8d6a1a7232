//! Post Assist: a Telegram bot that registers authors, interviews them,
//! has an n8n workflow write the post and publishes it to their channel.

pub mod actions;
pub mod alerts;
pub mod channels;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod generation;
pub mod onboarding;
pub mod posting;
pub mod routes;
pub mod store;
pub mod transcribe;
