//! Input validation for the post flow: materials, button targets, button text.

use std::sync::LazyLock;

use regex::Regex;

use super::model::Material;

/// Minimum description length (in characters) for a material.
const MIN_DESCRIPTION_CHARS: usize = 3;

/// Maximum custom button label length (in characters).
pub const MAX_BUTTON_TEXT_CHARS: usize = 100;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)https?://\S+").unwrap());

static EMPTY_BRACKETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*\)|\[\s*\]").unwrap());

static HANDLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]{5,32}$").unwrap());

/// A rejected input. Each variant maps to its own re-prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    /// No absolute http(s) URL in the text.
    MissingUrl,
    /// A URL was present but the description was shorter than 3 characters.
    MissingDescription,
    /// Not a numeric id and not a valid handle.
    InvalidHandle,
    InvalidUrl,
    /// Button label empty or longer than 100 characters.
    InvalidButtonText,
}

/// Whether `raw` is an absolute http(s) URL with a host.
pub fn is_valid_url(raw: &str) -> bool {
    match reqwest::Url::parse(raw.trim()) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

/// Drop sentence punctuation glued to the end of a matched URL. A closing
/// bracket stays when the URL itself opened it.
fn trim_url(raw: &str) -> &str {
    let mut url = raw;
    while let Some(last) = url.chars().last() {
        let strip = match last {
            '.' | ',' | ';' | ':' | '!' | '?' | '"' | '\'' => true,
            ')' => url.matches('(').count() < url.matches(')').count(),
            ']' => url.matches('[').count() < url.matches(']').count(),
            _ => false,
        };
        if !strip {
            break;
        }
        url = &url[..url.len() - last.len_utf8()];
    }
    url
}

/// Extract one (description, url) pair from free text.
///
/// The first valid URL wins; the description is whatever remains once every
/// URL is removed, with whitespace collapsed and dangling punctuation dropped.
pub fn extract_material(text: &str) -> Result<Material, InputError> {
    let url = URL_RE
        .find_iter(text)
        .map(|m| trim_url(m.as_str()))
        .find(|candidate| is_valid_url(candidate))
        .ok_or(InputError::MissingUrl)?;

    let mut rest = String::with_capacity(text.len());
    let mut last = 0;
    for m in URL_RE.find_iter(text) {
        rest.push_str(&text[last..m.start()]);
        rest.push(' ');
        last = m.start() + trim_url(m.as_str()).len();
    }
    rest.push_str(&text[last..]);

    let rest = EMPTY_BRACKETS.replace_all(&rest, " ");
    let description = rest.split_whitespace().collect::<Vec<_>>().join(" ");
    let description = description
        .trim_end_matches(['.', ',', ';', ':', '-'])
        .trim_end()
        .to_string();
    if description.chars().count() < MIN_DESCRIPTION_CHARS {
        return Err(InputError::MissingDescription);
    }

    Ok(Material {
        description,
        url: url.to_string(),
    })
}

/// Turn a numeric id or a handle into a direct-message URL.
///
/// Digits map to `tg://user?id=N`; handles (optionally prefixed with `@`)
/// map to `https://t.me/<handle>`.
pub fn dm_target_url(input: &str) -> Result<String, InputError> {
    let input = input.trim();
    if !input.is_empty() && input.chars().all(|c| c.is_ascii_digit()) {
        return Ok(format!("tg://user?id={input}"));
    }
    let handle = input.strip_prefix('@').unwrap_or(input);
    if HANDLE_RE.is_match(handle) {
        return Ok(format!("https://t.me/{handle}"));
    }
    Err(InputError::InvalidHandle)
}

/// Validate an external link target.
pub fn link_target_url(input: &str) -> Result<String, InputError> {
    let input = input.trim();
    if is_valid_url(input) {
        Ok(input.to_string())
    } else {
        Err(InputError::InvalidUrl)
    }
}

/// Validate a custom button label (1–100 characters after trimming).
pub fn button_text(input: &str) -> Result<String, InputError> {
    let text = input.trim();
    let len = text.chars().count();
    if len == 0 || len > MAX_BUTTON_TEXT_CHARS {
        return Err(InputError::InvalidButtonText);
    }
    Ok(text.to_string())
}
