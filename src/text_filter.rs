//! User-input rewriting and "say that again" detection

use crate::config::RepeatPhrases;
use regex::Regex;

/// Repeat-phrase matcher built from configured pattern fragments
#[derive(Debug, Clone, Default)]
pub struct TextFilter {
    repeat: Option<Regex>,
}

impl TextFilter {
    /// Fragments are regex snippets: `repeat_matches` must match the whole input,
    /// the others anchor as prefix, substring and suffix respectively
    pub fn new(phrases: &RepeatPhrases) -> Self {
        let alternatives: Vec<String> = phrases
            .repeat_matches
            .iter()
            .cloned()
            .chain(phrases.repeat_starts.iter().map(|p| format!("{}.*", p)))
            .chain(phrases.repeat_contains.iter().map(|p| format!(".*{}.*", p)))
            .chain(phrases.repeat_ends.iter().map(|p| format!(".*{}", p)))
            .collect();
        if alternatives.is_empty() {
            return Self::default();
        }

        let pattern = format!("(?i)^(?:{})$", alternatives.join("|"));
        match Regex::new(&pattern) {
            Ok(regex) => {
                tracing::debug!(pattern = %pattern, "Repeat-phrase pattern compiled");
                Self {
                    repeat: Some(regex),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Invalid repeat-phrase pattern; detection disabled");
                Self::default()
            }
        }
    }

    /// True when the whole input asks for the previous answer again
    pub fn has_repeat_word(&self, text: &str) -> bool {
        self.repeat.as_ref().is_some_and(|regex| regex.is_match(text))
    }
}

/// Apply `[from, to]` substring rewrites in order
pub fn preprocess(text: &str, rules: &[(String, String)]) -> String {
    let mut text = text.to_string();
    for (from, to) in rules {
        if from.is_empty() || !text.contains(from.as_str()) {
            continue;
        }
        let rewritten = text.replace(from.as_str(), to);
        tracing::debug!(before = %text, after = %rewritten, "Input rewritten");
        text = rewritten;
    }
    text
}
