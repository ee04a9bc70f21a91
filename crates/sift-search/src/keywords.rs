//! Keyword extraction and scoring
//!
//! The keyword path needs no external full-text index: candidates are scored
//! by counting keyword occurrences in the stringified metadata payload,
//! normalized into [0, 1].

use std::collections::HashMap;

/// Fixed stop-word set excluded from keyword extraction
pub const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "is", "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should",
];

/// Minimum token length kept as a keyword
const MIN_TOKEN_LEN: usize = 3;

/// Normalization divisor: a keyword saturates at ten occurrences
const OCCURRENCE_SATURATION: f32 = 10.0;

/// Split a query into scoring keywords
///
/// Tokens are lowercased, stripped of non-word characters, and dropped when
/// shorter than three characters or in the stop-word set.
pub fn tokenize(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|token| {
            token
                .to_lowercase()
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '_')
                .collect::<String>()
        })
        .filter(|token| token.len() >= MIN_TOKEN_LEN && !STOP_WORDS.contains(&token.as_str()))
        .collect()
}

/// Score a candidate's metadata payload against the keywords
///
/// Each keyword contributes its occurrence count times its optional boost;
/// the sum is normalized by `|keywords| * 10` and clamped to 1.
pub fn keyword_score(
    keywords: &[String],
    boosts: &HashMap<String, f32>,
    metadata: &HashMap<String, serde_json::Value>,
) -> f32 {
    if keywords.is_empty() {
        return 0.0;
    }

    let haystack = stringify_metadata(metadata);

    let mut sum = 0.0f32;
    for keyword in keywords {
        let occurrences = count_occurrences(&haystack, keyword) as f32;
        let boost = boosts.get(keyword).copied().unwrap_or(1.0);
        sum += occurrences * boost;
    }

    (sum / (keywords.len() as f32 * OCCURRENCE_SATURATION)).min(1.0)
}

/// Lowercased flat text form of a metadata payload
fn stringify_metadata(metadata: &HashMap<String, serde_json::Value>) -> String {
    let mut entries: Vec<(&String, &serde_json::Value)> = metadata.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = String::new();
    for (key, value) in entries {
        out.push_str(key);
        out.push(' ');
        match value {
            serde_json::Value::String(s) => out.push_str(s),
            other => out.push_str(&other.to_string()),
        }
        out.push(' ');
    }
    out.to_lowercase()
}

/// Non-overlapping occurrence count
fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut rest = haystack;
    while let Some(idx) = rest.find(needle) {
        count += 1;
        rest = &rest[idx + needle.len()..];
    }
    count
}
