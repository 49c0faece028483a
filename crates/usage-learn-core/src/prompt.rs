//! Prompt and reason analysis: intent keywords, expectation sentences,
//! prompt-pattern normalization, and the replacement-reason taxonomy.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

/// Keyword-to-intent table. An intent is reported once, in table order,
/// if any of its keywords appears as a word in the prompt.
const INTENT_TABLE: &[(&str, &[&str])] = &[
    ("create", &["create", "build", "make", "generate"]),
    ("modify", &["change", "modify", "update", "edit"]),
    ("fix", &["fix", "repair", "correct", "debug"]),
    ("theme", &["theme", "color", "style", "design"]),
    ("text", &["text", "content", "string", "message"]),
];

const EXPECTATION_MARKERS: &[&str] = &[
    "should", "must", "need", "require", "expect", "want", "create", "build", "generate",
];

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "to", "of", "for", "and", "in", "on", "with", "is", "it",
];

/// Lowercased alphanumeric tokens, stopwords removed, first occurrence kept.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut seen = HashSet::new();
    let tokens = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(t))
        .filter(|t| seen.insert(*t))
        .map(str::to_string)
        .collect();
    tokens
}

/// Normalized prompt pattern stored alongside each record for retrieval.
pub fn normalize_prompt(prompt: &str) -> String {
    tokenize(prompt).join(" ")
}

/// Intents named by the prompt, in table order.
pub fn prompt_intents(prompt: &str) -> Vec<&'static str> {
    let words: HashSet<String> = prompt
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    INTENT_TABLE
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| words.contains(*k)))
        .map(|(intent, _)| *intent)
        .collect()
}

/// Prompt sentences that state an expectation about the result.
pub fn extract_expectations(prompt: &str) -> Vec<String> {
    prompt
        .split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| {
            let lower = s.to_lowercase();
            EXPECTATION_MARKERS.iter().any(|m| lower.contains(m))
        })
        .map(str::to_string)
        .collect()
}

/// Why a piece of code was replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonType {
    ErrorFix,
    Optimization,
    Addition,
    Removal,
    Modification,
    General,
}

impl ReasonType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonType::ErrorFix => "error_fix",
            ReasonType::Optimization => "optimization",
            ReasonType::Addition => "addition",
            ReasonType::Removal => "removal",
            ReasonType::Modification => "modification",
            ReasonType::General => "general",
        }
    }

    /// Classify a free-text reason by keyword containment, first match wins.
    pub fn classify(reason: &str) -> Self {
        const RULES: &[(ReasonType, &[&str])] = &[
            (
                ReasonType::ErrorFix,
                &["fix", "bug", "error", "crash", "exception", "broken", "issue"],
            ),
            (
                ReasonType::Optimization,
                &["optimiz", "performance", "faster", "speed", "efficien"],
            ),
            (
                ReasonType::Addition,
                &["add", "new", "implement", "introduce", "support"],
            ),
            (
                ReasonType::Removal,
                &["remove", "delete", "drop", "unused", "clean"],
            ),
            (
                ReasonType::Modification,
                &["change", "update", "modify", "rename", "replace", "adjust"],
            ),
        ];

        let lower = reason.to_lowercase();
        RULES
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
            .map(|(kind, _)| *kind)
            .unwrap_or(ReasonType::General)
    }
}

impl fmt::Display for ReasonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
