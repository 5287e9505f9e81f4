use std::sync::OnceLock;

use regex::Regex;

use crate::types::ExpiryDate;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// Keyword, optional `[\s:.]` filler, then D{1,2} sep D{1,2} sep D{2,4}.
// Separators are matched independently, so `12/08-26` is accepted.
re!(re_expiry,
    r"(?i)(?:EXP|Expiry)[\s:.]*([0-9]{1,2}[/-][0-9]{1,2}[/-][0-9]{2,4})");

/// Literal misreadings of the "EXP" marker, applied in order, case-sensitive.
pub const KNOWN_MISREADINGS: [(&str, &str); 3] = [
    ("*P", "EXP"),
    ("E:", "EXP"),
    ("ExP", "EXP"),
];

// ── Public extraction API ─────────────────────────────────────────────────────

pub struct Extractor;

impl Extractor {
    /// Find the first date that directly follows an expiry marker in raw OCR text.
    pub fn extract(raw_text: &str) -> Option<ExpiryDate> {
        find_expiry(&clean_text(raw_text))
    }
}

/// Known-error substitution followed by character filtering.
pub fn clean_text(raw_text: &str) -> String {
    filter_allowed(&substitute_known_errors(raw_text))
}

pub fn substitute_known_errors(text: &str) -> String {
    KNOWN_MISREADINGS
        .iter()
        .fold(text.to_string(), |acc, &(from, to)| acc.replace(from, to))
}

/// Drop every char outside `[A-Za-z0-9/:\-.]` and whitespace.
pub fn filter_allowed(text: &str) -> String {
    text.chars().filter(|&c| is_allowed(c)).collect()
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '/' | ':' | '-' | '.') || c.is_whitespace()
}

/// Search already-cleaned text for the first marker-then-date match.
pub fn find_expiry(cleaned: &str) -> Option<ExpiryDate> {
    let c = re_expiry().captures(cleaned)?;
    Some(ExpiryDate::new(c.get(1)?.as_str()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
