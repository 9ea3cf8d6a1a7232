//! RegistrationManager: walks a new user from email to a verified channel.

use std::sync::Arc;

use tracing::{debug, info};

use crate::channels::{ChatGateway, OutgoingMessage};
use crate::error::Error;
use crate::store::Database;

use super::admin::{AdminCheck, AdminVerifier};
use super::extract::{extract_channel, extract_email};
use super::model::{ChatIdentity, User};
use super::prompts;
use super::state::RegistrationStage;

/// Coordinates the registration flow: email binding, channel linking and
/// the admin-rights check. Every reply goes straight out through the gateway.
pub struct RegistrationManager {
    db: Arc<dyn Database>,
    gateway: Arc<dyn ChatGateway>,
    verifier: Arc<AdminVerifier>,
}

impl RegistrationManager {
    pub fn new(
        db: Arc<dyn Database>,
        gateway: Arc<dyn ChatGateway>,
        verifier: Arc<AdminVerifier>,
    ) -> Self {
        Self {
            db,
            gateway,
            verifier,
        }
    }

    async fn reply(&self, chat_id: i64, message: OutgoingMessage) -> Result<(), Error> {
        self.gateway.send(&chat_id.to_string(), &message).await?;
        Ok(())
    }

    /// `/start`: greet newcomers, or remind known users where they left off.
    pub async fn handle_start(&self, from: &ChatIdentity) -> Result<(), Error> {
        let user = self.db.get_user_by_chat(from.chat_id).await?;
        let message = match user {
            None => prompts::welcome(),
            Some(user) => self.stage_prompt(&user).await?,
        };
        self.reply(from.chat_id, message).await
    }

    /// What a user at their current stage should see next.
    async fn stage_prompt(&self, user: &User) -> Result<OutgoingMessage, Error> {
        Ok(match user.registration_stage {
            RegistrationStage::Unverified => prompts::welcome(),
            RegistrationStage::EmailConfirmed => prompts::email_confirmed(),
            RegistrationStage::ChannelAdded => {
                let bot = self.gateway.bot_username().await?;
                prompts::admin_reminder(user.channel_url.as_deref().unwrap_or_default(), &bot)
            }
            RegistrationStage::Completed => prompts::already_registered(),
        })
    }

    /// Free text from a user who has not finished registering.
    pub async fn handle_text(
        &self,
        user: Option<User>,
        from: &ChatIdentity,
        text: &str,
    ) -> Result<(), Error> {
        let Some(user) = user else {
            return self.confirm_email(from, text).await;
        };

        match user.registration_stage {
            RegistrationStage::Unverified => self.confirm_email(from, text).await,
            RegistrationStage::EmailConfirmed => match extract_channel(text) {
                Some(channel) => self.link_channel(&user, from.chat_id, &channel.url, &channel.username).await,
                None => self.reply(from.chat_id, prompts::channel_invalid()).await,
            },
            RegistrationStage::ChannelAdded => match extract_channel(text) {
                Some(channel) => self.link_channel(&user, from.chat_id, &channel.url, &channel.username).await,
                None => {
                    let message = self.stage_prompt(&user).await?;
                    self.reply(from.chat_id, message).await
                }
            },
            RegistrationStage::Completed => {
                self.reply(from.chat_id, prompts::already_registered()).await
            }
        }
    }

    async fn confirm_email(&self, from: &ChatIdentity, text: &str) -> Result<(), Error> {
        let Some(email) = extract_email(text) else {
            return self.reply(from.chat_id, prompts::email_not_found_in_text()).await;
        };

        let Some(user) = self.db.get_user_by_email(&email).await? else {
            info!(chat_id = from.chat_id, "Unknown email submitted");
            return self.reply(from.chat_id, prompts::email_unknown(&email)).await;
        };

        if user.chat_id.is_some_and(|id| id != from.chat_id) {
            return self.reply(from.chat_id, prompts::email_taken()).await;
        }

        if !self.db.bind_chat_identity(user.id, from).await? {
            // Already bound to this chat; just resume.
            debug!(user_id = %user.id, "Email already confirmed");
            let message = self.stage_prompt(&user).await?;
            return self.reply(from.chat_id, message).await;
        }

        info!(user_id = %user.id, chat_id = from.chat_id, "Email confirmed");
        self.reply(from.chat_id, prompts::email_confirmed()).await
    }

    async fn link_channel(
        &self,
        user: &User,
        chat_id: i64,
        url: &str,
        username: &str,
    ) -> Result<(), Error> {
        self.db.update_channel(user.id, url, username).await?;
        info!(user_id = %user.id, channel = %url, "Channel linked");

        let bot = self.gateway.bot_username().await?;
        self.reply(chat_id, prompts::admin_instructions(url, &bot))
            .await
    }

    /// The "Done" button after adding the bot as a channel admin.
    pub async fn handle_admin_added(&self, from: &ChatIdentity) -> Result<(), Error> {
        let Some(user) = self.db.get_user_by_chat(from.chat_id).await? else {
            return self.reply(from.chat_id, prompts::welcome()).await;
        };
        if user.channel_url.is_none() {
            let message = self.stage_prompt(&user).await?;
            return self.reply(from.chat_id, message).await;
        }

        let check = self.verifier.verify(&user).await?;
        info!(user_id = %user.id, ?check, "Admin rights checked");
        let message = match check {
            AdminCheck::Confirmed => prompts::admin_confirmed(),
            AdminCheck::NotAdmin => prompts::not_admin(),
            AdminCheck::ChannelNotFound => prompts::channel_not_found(),
        };
        self.reply(from.chat_id, message).await
    }
}
