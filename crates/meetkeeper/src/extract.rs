//! Action-item extraction from note text.
//!
//! A fixed, ordered set of regex patterns scans freeform text for phrases
//! that look like tasks. Output follows pattern order, then match order
//! within a pattern; exact duplicates are dropped, first occurrence wins.
//!
//! Extraction is advisory. Nothing here creates tasks; callers surface the
//! suggestions and create a task only when one is explicitly accepted.

use std::collections::HashSet;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::config::ExtractionConfig;

/// Subjects that never start a modal-verb suggestion.
///
/// "we should ..." is a first-person commitment handled by its own pattern,
/// and "it will ..." style clauses are statements rather than assignments.
const IGNORED_SUBJECTS: &[&str] = &["we", "it", "this", "that", "there", "which", "what"];

/// Words that join clauses and so cannot be part of a subject.
const CLAUSE_WORDS: &[&str] = &["and", "or", "but", "so", "then", "because", "if", "when", "also"];

/// Capture groups holding a modal-verb subject, one word each; the last is the head.
const SUBJECT_WORDS: usize = 3;

/// A candidate action item found in note text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Suggestion {
    /// The suggested task title.
    pub text: String,
    /// Name of the pattern that produced it.
    pub pattern: String,
}

/// Which part of a match becomes the suggestion text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Take {
    Whole,
    Group(usize),
    /// From the subject words to the end of the match.
    Assignment,
}

/// A compiled extraction pattern.
#[derive(Debug)]
pub struct ExtractionPattern {
    /// Name of the pattern for identification.
    pub name: String,

    /// Description of what this pattern matches.
    pub description: String,

    regex: Regex,
    take: Take,
}

impl ExtractionPattern {
    /// Create a built-in pattern.
    ///
    /// # Panics
    ///
    /// Panics if the regex pattern is invalid.
    fn builtin(name: &str, description: &str, pattern: &str, take: Take) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            regex: Regex::new(pattern).expect("Invalid regex pattern"),
            take,
        }
    }

    /// Compile a user-supplied pattern.
    ///
    /// The first capture group becomes the suggestion text, or the whole
    /// match when the pattern has no groups.
    ///
    /// # Errors
    ///
    /// Returns the regex compilation error for an invalid pattern.
    pub fn custom(name: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(pattern)?;
        let take = if regex.captures_len() > 1 {
            Take::Group(1)
        } else {
            Take::Whole
        };
        Ok(Self {
            name: name.into(),
            description: format!("custom pattern {pattern}"),
            regex,
            take,
        })
    }

    /// Check if the text contains a match.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Candidate strings in match order, trimmed of surrounding punctuation.
    pub fn candidates<'a>(&'a self, text: &'a str) -> impl Iterator<Item = String> + 'a {
        self.regex.captures_iter(text).filter_map(move |caps| {
            let found = match self.take {
                Take::Whole => caps.get(0)?.as_str(),
                Take::Group(index) => caps.get(index)?.as_str(),
                Take::Assignment => assignment(text, &caps).or_else(|| {
                    trace!(pattern = %self.name, matched = &caps[0], "skipping ignored subject");
                    None
                })?,
            };
            let cleaned = clean(found);
            (!cleaned.is_empty()).then(|| cleaned.to_string())
        })
    }
}

/// The assignment from its subject to the end of the match, with leading
/// clause words dropped from the subject.
///
/// Returns `None` when the subject's head is not someone work can be
/// assigned to.
fn assignment<'t>(text: &'t str, caps: &Captures<'t>) -> Option<&'t str> {
    let head = caps.get(SUBJECT_WORDS)?.as_str().to_lowercase();
    if IGNORED_SUBJECTS.contains(&head.as_str()) {
        return None;
    }

    let mut start = None;
    for word in (1..=SUBJECT_WORDS).filter_map(|group| caps.get(group)) {
        if CLAUSE_WORDS.contains(&word.as_str().to_lowercase().as_str()) {
            start = None;
        } else if start.is_none() {
            start = Some(word.start());
        }
    }
    Some(&text[start?..caps.get(0)?.end()])
}

fn clean(candidate: &str) -> &str {
    candidate
        .trim()
        .trim_end_matches(['.', '!', '?', ',', ';', ':'])
        .trim()
}

/// Get all built-in extraction patterns, in application order.
#[must_use]
pub fn builtin_patterns() -> Vec<ExtractionPattern> {
    vec![
        ExtractionPattern::builtin(
            "explicit_marker",
            "Lines marked with action item:, todo: or task:",
            r"(?im)\b(?:action\s+items?|to-?dos?|tasks?)\s*:\s*([^\n]+)",
            Take::Group(1),
        ),
        ExtractionPattern::builtin(
            "modal_verb",
            "Someone will, should or must do something",
            r"\b(?:([A-Za-z][\w'-]*)[ \t]+)?(?:([A-Za-z][\w'-]*)[ \t]+)?([A-Za-z][\w'-]*)\s+(?:will|should|must)\s+[^.!?\n]+",
            Take::Assignment,
        ),
        ExtractionPattern::builtin(
            "first_person",
            "Commitments such as let's, we should or we need to",
            r"(?i)\b(?:let's|let\s+us|we\s+should|we\s+need\s+to|we\s+must|we\s+have\s+to)\s+([^.!?\n]+)",
            Take::Group(1),
        ),
    ]
}

/// Scans text for action items.
#[derive(Debug)]
pub struct TaskExtractor {
    config: ExtractionConfig,
    patterns: Vec<ExtractionPattern>,
}

impl Default for TaskExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskExtractor {
    /// Create an extractor with the built-in patterns only.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ExtractionConfig::default())
    }

    /// Create an extractor from configuration.
    ///
    /// Custom patterns run after the built-in ones. Invalid custom patterns
    /// are logged and skipped; `Config::validate` rejects them earlier.
    #[must_use]
    pub fn with_config(config: ExtractionConfig) -> Self {
        let mut patterns = builtin_patterns();
        for (i, source) in config.custom_patterns.iter().enumerate() {
            match ExtractionPattern::custom(format!("custom_{i}"), source) {
                Ok(pattern) => patterns.push(pattern),
                Err(e) => warn!(pattern = %source, error = %e, "Invalid custom regex pattern"),
            }
        }
        Self { config, patterns }
    }

    /// Check if extraction is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// The patterns applied, in order.
    #[must_use]
    pub fn patterns(&self) -> &[ExtractionPattern] {
        &self.patterns
    }

    /// Extract suggestions from `text`.
    ///
    /// Returns nothing when extraction is disabled.
    #[must_use]
    pub fn extract(&self, text: &str) -> Vec<Suggestion> {
        if !self.config.enabled {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut suggestions = Vec::new();

        for pattern in &self.patterns {
            for candidate in pattern.candidates(text) {
                let length = candidate.chars().count();
                if length < self.config.min_length || length > self.config.max_length {
                    trace!(pattern = %pattern.name, length, "candidate outside length bounds");
                    continue;
                }
                if seen.insert(candidate.clone()) {
                    suggestions.push(Suggestion {
                        text: candidate,
                        pattern: pattern.name.clone(),
                    });
                }
            }
        }

        debug!(count = suggestions.len(), "extracted suggestions");
        suggestions
    }
}
