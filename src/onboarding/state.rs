//! Registration state machine: tracks how far a user got through sign-up.

use serde::{Deserialize, Serialize};

/// The stages of registration.
///
/// Progresses linearly: Unverified → EmailConfirmed → ChannelAdded →
/// Completed. A user at ChannelAdded may resubmit a channel, which keeps
/// them at ChannelAdded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStage {
    Unverified,
    EmailConfirmed,
    ChannelAdded,
    Completed,
}

impl RegistrationStage {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: RegistrationStage) -> bool {
        use RegistrationStage::*;
        matches!(
            (self, target),
            (Unverified, EmailConfirmed)
                | (EmailConfirmed, ChannelAdded)
                | (ChannelAdded, ChannelAdded)
                | (ChannelAdded, Completed)
        )
    }

    /// Whether registration is done.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Get the next stage in the linear progression, if any.
    pub fn next(&self) -> Option<RegistrationStage> {
        use RegistrationStage::*;
        match self {
            Unverified => Some(EmailConfirmed),
            EmailConfirmed => Some(ChannelAdded),
            ChannelAdded => Some(Completed),
            Completed => None,
        }
    }
}

impl Default for RegistrationStage {
    fn default() -> Self {
        Self::Unverified
    }
}

impl std::fmt::Display for RegistrationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unverified => "unverified",
            Self::EmailConfirmed => "email_confirmed",
            Self::ChannelAdded => "channel_added",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RegistrationStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unverified" => Ok(Self::Unverified),
            "email_confirmed" => Ok(Self::EmailConfirmed),
            "channel_added" => Ok(Self::ChannelAdded),
            "completed" => Ok(Self::Completed),
            other => Err(format!("Unknown registration stage: {other}")),
        }
    }
}
