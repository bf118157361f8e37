//! Question text handling.
//!
//! Every incoming question carries two representations: the `raw` text as
//! received and the `normalized` text used as the cache key. Normalization
//! lower-cases, keeps alphabetic characters and single spaces, and strips
//! leading salutations ("hey", "ok", "good morning", ...). It is a pure
//! string transform and plays no part in similarity scoring.

use serde::{Deserialize, Serialize};

use crate::storage::schema::MAX_SLUG_LENGTH;

/// Greeting prefixes removed from the front of a question.
///
/// Multi-word entries must come before their single-word prefixes.
const SALUTATIONS: &[&str] = &[
    "good morning",
    "good afternoon",
    "good evening",
    "excuse me",
    "hey there",
    "hi there",
    "hello there",
    "hey",
    "hi",
    "hello",
    "ok",
    "okay",
    "yo",
    "greetings",
    "please",
    "so",
];

/// A question in both raw and normalized form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Question {
    /// Text as received from the caller.
    pub raw: String,

    /// Normalized cache key.
    pub normalized: String,
}

impl Question {
    /// Builds a question from raw text.
    ///
    /// # Example
    /// ```
    /// use solvecache::Question;
    ///
    /// let q = Question::new("Hey, what's on my calendar today?");
    /// assert_eq!(q.normalized, "whats on my calendar today");
    /// ```
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = normalize(&raw);
        Self { raw, normalized }
    }

    /// Returns true if nothing survives normalization.
    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    /// File-name friendly form of the normalized text.
    pub fn slug(&self) -> String {
        slugify(&self.normalized)
    }
}

/// Normalizes question text into its cache key.
///
/// If removing salutations would leave nothing (the whole question was a
/// greeting), the un-stripped text is returned instead.
pub fn normalize(raw: &str) -> String {
    let lowered: String = raw
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphabetic() || c.is_whitespace())
        .collect();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");

    let stripped = strip_salutations(&collapsed);
    if stripped.is_empty() {
        collapsed
    } else {
        stripped.to_string()
    }
}

/// Removes any number of leading salutations from normalized text.
///
/// Matches whole words only, so "hiking" keeps its "hi".
pub fn strip_salutations(normalized: &str) -> &str {
    let mut rest = normalized;
    'outer: loop {
        for salutation in SALUTATIONS {
            if let Some(tail) = rest.strip_prefix(salutation) {
                if tail.is_empty() {
                    return "";
                }
                if let Some(tail) = tail.strip_prefix(' ') {
                    rest = tail;
                    continue 'outer;
                }
            }
        }
        return rest;
    }
}

/// Converts normalized text into a file-name slug.
///
/// Spaces become dashes, the result is capped at [`MAX_SLUG_LENGTH`]
/// characters, and an empty input yields `"question"`.
pub fn slugify(normalized: &str) -> String {
    let slug: String = normalized
        .chars()
        .map(|c| if c == ' ' { '-' } else { c })
        .take(MAX_SLUG_LENGTH)
        .collect();
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "question".to_string()
    } else {
        slug.to_string()
    }
}
