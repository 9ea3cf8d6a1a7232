//! Post-session state machine: which input a session currently accepts.

use std::fmt;
use std::str::FromStr;

/// Status of a post-creation session.
///
/// Progresses forward: Question(1..=N) → CollectingLinks → Generating →
/// Reviewing → ButtonTypeSelection → [ButtonConfig] → ButtonTextSelection →
/// FinalReview → Completed. Rejection at review loops back to Question(1);
/// any live session can be Cancelled when a new one supersedes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// Waiting for the answer to question `k` (1-based).
    Question(u8),
    CollectingLinks,
    Generating,
    Reviewing,
    ButtonTypeSelection,
    ButtonConfig,
    ButtonTextSelection,
    FinalReview,
    Completed,
    Cancelled,
}

impl SessionStatus {
    /// Status of a freshly created (or reset) session.
    pub const FIRST: SessionStatus = SessionStatus::Question(1);

    /// Check if a transition from `self` to `target` is valid.
    ///
    /// The graph is the union of all flow configurations; whether an optional
    /// stage is actually visited is decided by the flow, not here.
    pub fn can_transition_to(&self, target: SessionStatus) -> bool {
        use SessionStatus::*;
        if target == Cancelled {
            return !self.is_terminal();
        }
        match (*self, target) {
            (Question(k), Question(next)) => next == k + 1,
            (Question(_), CollectingLinks | Generating) => true,
            (CollectingLinks, Generating) => true,
            // Generation failure or timeout resets to the first question.
            (Generating, Reviewing) => true,
            (Generating, Question(1)) => true,
            (Reviewing, ButtonTypeSelection | Completed) => true,
            (Reviewing, Question(1)) => true,
            (ButtonTypeSelection, ButtonConfig | ButtonTextSelection) => true,
            (ButtonConfig, ButtonTextSelection) => true,
            (ButtonTextSelection, FinalReview) => true,
            (FinalReview, Completed) => true,
            (FinalReview, Question(1)) => true,
            _ => false,
        }
    }

    /// Whether this status ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::FIRST
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Question(k) => return write!(f, "question_{k}"),
            Self::CollectingLinks => "collecting_links",
            Self::Generating => "generating",
            Self::Reviewing => "reviewing",
            Self::ButtonTypeSelection => "button_type_selection",
            Self::ButtonConfig => "button_config",
            Self::ButtonTextSelection => "button_text_selection",
            Self::FinalReview => "final_review",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(k) = s.strip_prefix("question_") {
            return match k.parse::<u8>() {
                Ok(k) if k >= 1 => Ok(Self::Question(k)),
                _ => Err(format!("Invalid question status: {s}")),
            };
        }
        match s {
            "collecting_links" => Ok(Self::CollectingLinks),
            "generating" => Ok(Self::Generating),
            "reviewing" => Ok(Self::Reviewing),
            "button_type_selection" => Ok(Self::ButtonTypeSelection),
            "button_config" => Ok(Self::ButtonConfig),
            "button_text_selection" => Ok(Self::ButtonTextSelection),
            "final_review" => Ok(Self::FinalReview),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("Unknown session status: {other}")),
        }
    }
}
