//! Pull registration details (email, channel) out of free-form text.

use std::sync::LazyLock;

use regex::Regex;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b").unwrap()
});

/// Channel patterns, tried in order.
static CHANNEL_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)t\.me/([a-zA-Z0-9_]+)",
        r"@([a-zA-Z0-9_]+)",
        r"(?i)telegram\.me/([a-zA-Z0-9_]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// A channel reference in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    /// Bare name without `@`.
    pub username: String,
    /// `https://t.me/<username>`.
    pub url: String,
}

/// The first email address in `text`, lower-cased.
pub fn extract_email(text: &str) -> Option<String> {
    let email = EMAIL_RE.find(text)?.as_str().to_lowercase();
    // Reject addresses with empty or dotted-edge local parts.
    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || local.starts_with('.') || local.ends_with('.') || domain.contains("..") {
        return None;
    }
    Some(email)
}

/// The first channel reference in `text`, normalized to a t.me link.
pub fn extract_channel(text: &str) -> Option<ChannelRef> {
    let text = text.trim();
    CHANNEL_RES.iter().find_map(|re| {
        let username = re.captures(text)?.get(1)?.as_str().to_string();
        Some(ChannelRef {
            url: format!("https://t.me/{username}"),
            username,
        })
    })
}
