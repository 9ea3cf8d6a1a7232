//! Inline-button actions and their wire encoding (`callback_data`).

use std::fmt;
use std::str::FromStr;

use crate::posting::model::ButtonType;

/// Everything a button press can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// Start a new post session.
    WritePost,
    /// The user says the bot is now a channel admin.
    AdminAdded,
    ReviewApproved,
    ReviewRejected,
    /// Stop collecting materials and generate.
    SkipLinks,
    ChooseButtonType(ButtonType),
    /// One of the canned labels, by index.
    CannedText(usize),
    CustomText,
    FinalApproved,
    FinalRejected,
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WritePost => write!(f, "write_post"),
            Self::AdminAdded => write!(f, "admin_added"),
            Self::ReviewApproved => write!(f, "post_approved"),
            Self::ReviewRejected => write!(f, "post_rejected"),
            Self::SkipLinks => write!(f, "skip_links"),
            Self::ChooseButtonType(t) => write!(f, "button_type:{t}"),
            Self::CannedText(i) => write!(f, "button_text:{i}"),
            Self::CustomText => write!(f, "button_text:custom"),
            Self::FinalApproved => write!(f, "final_approved"),
            Self::FinalRejected => write!(f, "final_rejected"),
        }
    }
}

impl FromStr for CallbackAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(kind) = s.strip_prefix("button_type:") {
            return kind.parse().map(Self::ChooseButtonType);
        }
        if let Some(choice) = s.strip_prefix("button_text:") {
            if choice == "custom" {
                return Ok(Self::CustomText);
            }
            return choice
                .parse::<usize>()
                .map(Self::CannedText)
                .map_err(|_| format!("Invalid button text choice: {choice}"));
        }
        match s {
            "write_post" => Ok(Self::WritePost),
            "admin_added" => Ok(Self::AdminAdded),
            "post_approved" => Ok(Self::ReviewApproved),
            "post_rejected" => Ok(Self::ReviewRejected),
            "skip_links" => Ok(Self::SkipLinks),
            "final_approved" => Ok(Self::FinalApproved),
            "final_rejected" => Ok(Self::FinalRejected),
            other => Err(format!("Unknown callback action: {other}")),
        }
    }
}
