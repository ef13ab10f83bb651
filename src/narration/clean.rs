//! Text preparation for speech synthesis.

use regex::Regex;
use std::sync::LazyLock;

static MARKDOWN_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").expect("valid link regex"));
static PAREN_DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\([^)]*\.(com|org|net|gov)[^)]*\)").expect("valid domain regex")
});
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid url regex"));
static EMPTY_PARENS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*\)").expect("valid parens regex"));
static SPACE_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid space regex"));

/// Strip markup, links and citations, and collapse the text to one line.
///
/// Markdown links keep their label. Lines are joined as sentences.
pub fn clean_for_speech(text: &str) -> String {
    let text = text.replace("###", "").replace("**", "").replace('#', "");
    let text = MARKDOWN_LINK_RE.replace_all(&text, "$1");
    let text = PAREN_DOMAIN_RE.replace_all(&text, "");
    let text = URL_RE.replace_all(&text, "");
    let text = EMPTY_PARENS_RE.replace_all(&text, "");

    let mut joined = String::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if !joined.is_empty() {
            joined.push(' ');
        }
        joined.push_str(line);
        if !line.ends_with(['.', '!', '?', ':', ';']) {
            joined.push('.');
        }
    }

    SPACE_RUN_RE
        .replace_all(&joined, " ")
        .replace(" .", ".")
        .replace(" ,", ",")
        .trim()
        .to_string()
}

/// Split text into pieces of fewer than `limit` characters on sentence
/// boundaries, preserving order.
///
/// A sentence that alone reaches the limit is broken at word boundaries.
pub fn split_into_chunks(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    let sentences = text
        .split_inclusive(". ")
        .map(str::trim)
        .filter(|s| !s.is_empty());

    for sentence in sentences {
        for piece in wrap_words(sentence, limit) {
            let needed = if current.is_empty() {
                piece.chars().count()
            } else {
                current.chars().count() + 1 + piece.chars().count()
            };
            if needed < limit {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(&piece);
            } else {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                current = piece;
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Break text into pieces shorter than `limit` characters at whitespace,
/// cutting inside a word only when a single word is too long.
fn wrap_words(text: &str, limit: usize) -> Vec<String> {
    let max = limit.saturating_sub(1).max(1);
    if text.chars().count() <= max {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            pieces.push(word.drain(..max).collect());
        }
        let word: String = word.into_iter().collect();
        if word.is_empty() {
            continue;
        }
        let len = current.chars().count();
        if len > 0 && len + 1 + word.chars().count() > max {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
