use std::sync::LazyLock;

use html_escape::decode_html_entities;
use regex::Regex;

static RE_BR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static RE_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n+").unwrap());
static RE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Plain-text preview of an HTML body, at most `limit` characters.
/// A limit of 0 disables previews.
pub fn trim_description(html: &str, limit: usize) -> String {
    if limit == 0 {
        return String::new();
    }

    let text = decode_html_entities(html);
    let text = RE_BR.replace_all(&text, "\n");
    let text = RE_NEWLINES.replace_all(&text, "\n");
    let text = RE_TAG.replace_all(&text, "");
    let text = text.trim_matches('\n');

    text.chars().take(limit).collect()
}
