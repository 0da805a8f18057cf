//! Text canonicalization applied before every comparison.
//!
//! Two records are compared on their normalized form only. Normalization is
//! total (never fails) and idempotent: `normalize(normalize(x)) == normalize(x)`.

use std::sync::LazyLock;

use regex::Regex;

static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());

static INLINE_CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\(source:.*?\)").unwrap());

static TRAILING_CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)source:.*$").unwrap());

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());

/// Canonicalize `text` for comparison.
///
/// In order: lowercase, drop bare URLs, drop `(source: ...)` fragments and a
/// trailing `source: ...`, replace every character that is not a word
/// character or whitespace with a space, collapse whitespace, trim.
///
/// Empty input yields an empty string.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let no_urls = URL.replace_all(&lowered, "");
    let no_inline = INLINE_CITATION.replace_all(&no_urls, "");
    let no_trailing = TRAILING_CITATION.replace_all(&no_inline, "");
    let words_only = NON_WORD.replace_all(&no_trailing, " ");
    words_only.split_whitespace().collect::<Vec<_>>().join(" ")
}
