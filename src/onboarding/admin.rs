//! Admin-rights verification: can the bot post to the user's channel?

use std::sync::Arc;

use tracing::{info, warn};

use crate::channels::ChatGateway;
use crate::error::{ChannelError, Error};
use crate::onboarding::model::User;
use crate::store::Database;

/// Outcome of a live membership check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCheck {
    /// Administrator or creator with posting rights.
    Confirmed,
    /// In the channel (or not) but unable to post.
    NotAdmin,
    /// The channel does not exist, is not linked, or hides from the bot.
    ChannelNotFound,
}

impl AdminCheck {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

/// Queries the gateway for the bot's membership and records the result.
///
/// The stored `is_bot_admin` flag is written here but never read for gating:
/// every caller re-runs [`AdminVerifier::verify`].
pub struct AdminVerifier {
    db: Arc<dyn Database>,
    gateway: Arc<dyn ChatGateway>,
}

impl AdminVerifier {
    pub fn new(db: Arc<dyn Database>, gateway: Arc<dyn ChatGateway>) -> Self {
        Self { db, gateway }
    }

    /// Check and persist. A first confirmation completes registration.
    pub async fn verify(&self, user: &User) -> Result<AdminCheck, Error> {
        let Some(channel) = user.channel_handle() else {
            return Ok(AdminCheck::ChannelNotFound);
        };

        let check = match self.gateway.bot_membership(&channel).await {
            Ok(status) if status.can_post() => AdminCheck::Confirmed,
            Ok(status) => {
                info!(user_id = %user.id, channel = %channel, ?status, "Bot cannot post to channel");
                AdminCheck::NotAdmin
            }
            Err(ChannelError::ChatNotFound { .. }) => {
                warn!(user_id = %user.id, channel = %channel, "Channel not found");
                AdminCheck::ChannelNotFound
            }
            Err(e) => return Err(e.into()),
        };

        self.db
            .set_admin_verified(user.id, check.is_confirmed())
            .await?;
        Ok(check)
    }
}
