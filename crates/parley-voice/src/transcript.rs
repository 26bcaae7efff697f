//! Accumulation and normalization of dictated text.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Sentence-ending punctuation, whitespace, then a lowercase letter.
static SENTENCE_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([.!?]\s+)([a-z])").expect("invalid sentence regex"));

/// Uppercase the first letter of every sentence and of the whole string.
///
/// Only a `.`, `!` or `?` followed by whitespace starts a new sentence, so
/// fragment boundaries alone never introduce capitals.
pub fn capitalize_sentences(text: &str) -> String {
    let replaced = SENTENCE_START_RE.replace_all(text, |caps: &Captures| {
        format!("{}{}", &caps[1], caps[2].to_uppercase())
    });
    capitalize_first(&replaced)
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Final text accumulated over one recognition session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptBuffer {
    final_text: String,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything accumulated so far.
    pub fn reset(&mut self) {
        self.final_text.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.final_text.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.final_text
    }

    /// Append a final fragment and return the normalized text.
    pub fn commit(&mut self, fragment: &str) -> &str {
        let joined = if self.final_text.is_empty() {
            fragment.to_string()
        } else {
            format!("{} {}", self.final_text, fragment)
        };
        self.final_text = capitalize_sentences(joined.trim());
        &self.final_text
    }

    /// The display value for an interim fragment. Nothing is committed.
    pub fn preview(&self, interim: &str) -> String {
        if self.final_text.is_empty() {
            interim.to_string()
        } else {
            format!("{} {}", self.final_text, interim)
        }
    }

    /// The text to leave in the field when the session stops.
    pub fn committed(&self) -> String {
        self.final_text.trim().to_string()
    }
}
