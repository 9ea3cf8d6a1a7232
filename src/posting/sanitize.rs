//! Map generated HTML onto the subset Telegram renders.
//!
//! Block and structural tags become bold text or newlines; tags outside the
//! known set are left untouched.

use std::sync::LazyLock;

use regex::Regex;

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

fn rule(pattern: &str, replacement: &'static str) -> Rule {
    Rule {
        pattern: Regex::new(pattern).unwrap(),
        replacement,
    }
}

/// Applied in order. `(\s[^>]*)?` keeps `<p>` from matching `<pre>`.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(r"(?i)<h[1-6](\s[^>]*)?>", "<b>"),
        rule(r"(?i)</h[1-6]\s*>", "</b>\n\n"),
        rule(r"(?i)<(p|div)(\s[^>]*)?>", ""),
        rule(r"(?i)</(p|div)\s*>", "\n\n"),
        rule(r"(?i)<br\s*/?>", "\n"),
        rule(r"(?i)<li(\s[^>]*)?>", "• "),
        rule(r"(?i)</li\s*>", "\n"),
        rule(r"(?i)</?(ul|ol|table|thead|tbody|tfoot)(\s[^>]*)?>", ""),
        rule(r"(?i)<tr(\s[^>]*)?>", ""),
        rule(r"(?i)</tr\s*>", "\n"),
        rule(r"(?i)<(td|th)(\s[^>]*)?>", ""),
        rule(r"(?i)</(td|th)\s*>", " "),
    ]
});

/// Two or more blank (or whitespace-only) lines in a row.
static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n){2,}").unwrap());

/// Sanitize generated post markup for the chat gateway.
///
/// Deterministic; the result never contains three consecutive newlines.
pub fn sanitize(input: &str) -> String {
    let mut text = input.replace("\r\n", "\n");
    for rule in RULES.iter() {
        text = rule.pattern.replace_all(&text, rule.replacement).into_owned();
    }
    let text = BLANK_RUN.replace_all(&text, "\n\n");
    text.trim().to_string()
}
