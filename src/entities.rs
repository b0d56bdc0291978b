//! Entity recognition boundary
//!
//! The pipeline treats the recognizer as an opaque collaborator: text in,
//! typed spans out. Each worker loads its own instance, so recognition never
//! shares state across jobs.
//!
//! The production implementation is a deterministic pattern set over the
//! kinds of spans investigators actually query for in mail dumps: addresses,
//! URLs, phone numbers, IPv4 addresses and money amounts. Determinism means
//! re-running a scan produces identical entity counts, which the run report
//! relies on. A statistical model can be slotted in behind the same trait.

use regex::Regex;
use std::sync::LazyLock;

/// Name recorded in the run report's model identity
const PATTERN_MODEL_NAME: &str = "builtin-patterns";

/// Bumped whenever the pattern set changes
const PATTERN_MODEL_VERSION: &str = "1.2";

/// Maximum body length fed to the recognizer, in bytes
///
/// Longer bodies are truncated at a character boundary before recognition;
/// the stored message body is unaffected.
pub const MAX_RECOGNIZER_TEXT_LEN: usize = 1_000_000;

/// One recognized span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySpan {
    /// The matched text
    pub text: String,

    /// Label/category, e.g. "EMAIL"
    pub label: String,
}

/// Maps text to typed spans
///
/// Implementations must be deterministic and safe to run from independent
/// workers, one instance per worker.
pub trait EntityRecognizer: Send {
    /// Identity string recorded in the run report
    fn model_identity(&self) -> String;

    /// Recognize all spans in the given text, in pattern-then-position order
    fn recognize(&self, text: &str) -> Vec<EntitySpan>;
}

static PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("EMAIL", r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"),
        ("URL", r#"https?://[^\s<>"')\]]+"#),
        ("PHONE", r"(?:\+?\d{1,2}[ .-])?\(?\d{3}\)?[ .-]\d{3}[ .-]\d{4}\b"),
        ("IP_ADDR", r"\b(?:\d{1,3}\.){3}\d{1,3}\b"),
        ("MONEY", r"\$\s?\d+(?:,\d{3})*(?:\.\d+)?"),
    ]
    .into_iter()
    .map(|(label, pattern)| {
        (label, Regex::new(pattern).expect("invalid builtin pattern"))
    })
    .collect()
});

/// Deterministic regex-based recognizer
pub struct PatternRecognizer {
    patterns: &'static [(&'static str, Regex)],
}

impl PatternRecognizer {
    /// Create a recognizer over the builtin pattern set
    pub fn new() -> Self {
        Self {
            patterns: PATTERNS.as_slice(),
        }
    }
}

impl Default for PatternRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRecognizer for PatternRecognizer {
    fn model_identity(&self) -> String {
        format!("{PATTERN_MODEL_NAME}/{PATTERN_MODEL_VERSION}")
    }

    fn recognize(&self, text: &str) -> Vec<EntitySpan> {
        let mut spans = Vec::new();

        for (label, pattern) in self.patterns {
            for found in pattern.find_iter(text) {
                spans.push(EntitySpan {
                    text: found.as_str().to_string(),
                    label: (*label).to_string(),
                });
            }
        }

        spans
    }
}

/// Cap text at [`MAX_RECOGNIZER_TEXT_LEN`], respecting character boundaries
pub fn truncate_for_recognition(text: &str) -> &str {
    if text.len() <= MAX_RECOGNIZER_TEXT_LEN {
        return text;
    }

    let mut end = MAX_RECOGNIZER_TEXT_LEN;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognize_email_and_url() {
        let recognizer = PatternRecognizer::new();
        let spans = recognizer
            .recognize("Contact kay.mann@enron.com or see https://example.com/filings today.");

        let emails: Vec<_> = spans.iter().filter(|s| s.label == "EMAIL").collect();
        let urls: Vec<_> = spans.iter().filter(|s| s.label == "URL").collect();

        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].text, "kay.mann@enron.com");
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].text, "https://example.com/filings");
    }

    #[test]
    fn test_recognize_money_and_phone() {
        let recognizer = PatternRecognizer::new();
        let spans =
            recognizer.recognize("Wire $1,250,000.00 and call 713-555-0142 to confirm.");

        assert!(spans
            .iter()
            .any(|s| s.label == "MONEY" && s.text == "$1,250,000.00"));
        assert!(spans
            .iter()
            .any(|s| s.label == "PHONE" && s.text.contains("713")));
    }

    #[test]
    fn test_recognize_ip() {
        let recognizer = PatternRecognizer::new();
        let spans = recognizer.recognize("login from 10.20.30.40 denied");
        assert!(spans
            .iter()
            .any(|s| s.label == "IP_ADDR" && s.text == "10.20.30.40"));
    }

    #[test]
    fn test_no_entities_in_plain_text() {
        let recognizer = PatternRecognizer::new();
        assert!(recognizer.recognize("nothing of interest here").is_empty());
    }

    #[test]
    fn test_deterministic_output() {
        let recognizer = PatternRecognizer::new();
        let text = "a@b.co visits http://c.d and pays $5";
        assert_eq!(recognizer.recognize(text), recognizer.recognize(text));
    }

    #[test]
    fn test_truncation_respects_char_boundary() {
        let mut text = "é".repeat(MAX_RECOGNIZER_TEXT_LEN / 2);
        text.push_str("tail");
        let truncated = truncate_for_recognition(&text);
        assert!(truncated.len() <= MAX_RECOGNIZER_TEXT_LEN);
        // Must not panic on a split multibyte character
        let _ = truncated.chars().count();
    }

    #[test]
    fn test_short_text_untouched() {
        assert_eq!(truncate_for_recognition("short"), "short");
    }

    #[test]
    fn test_model_identity() {
        let recognizer = PatternRecognizer::new();
        assert!(recognizer.model_identity().starts_with(PATTERN_MODEL_NAME));
    }
}
