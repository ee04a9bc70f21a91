//! Query parsing
//!
//! Rule-based analysis of the raw query text: normalization, entity
//! detection (quoted phrases and capitalized terms), inline filter
//! extraction (date ranges and `type:` tags), and intent classification.

use regex::Regex;
use sift_core::{FilterOperator, ParsedQuery, Query, QueryFilter, QueryIntent};
use std::collections::HashSet;

/// Leading words that mark a question
const QUESTION_WORDS: &[&str] = &[
    "what", "how", "why", "when", "where", "who", "which", "is", "are", "can", "could",
    "should", "would", "does", "do", "did", "will",
];

/// Words that mark an explicit search request
const SEARCH_WORDS: &[&str] = &["find", "search", "show", "list", "lookup"];

/// Minimum length for a capitalized token to count as an entity
const MIN_ENTITY_LEN: usize = 3;

/// Rule-based query parser with precompiled patterns
pub struct QueryParser {
    quoted_re: Regex,
    date_gte_re: Regex,
    date_lte_re: Regex,
    type_re: Regex,
}

impl QueryParser {
    pub fn new() -> Self {
        Self {
            quoted_re: Regex::new(r#""([^"]+)""#).expect("quoted pattern"),
            date_gte_re: Regex::new(r"(?i)\b(?:after|since)\s+(\d{4}-\d{2}-\d{2})")
                .expect("after/since pattern"),
            date_lte_re: Regex::new(r"(?i)\b(?:before|until)\s+(\d{4}-\d{2}-\d{2})")
                .expect("before/until pattern"),
            type_re: Regex::new(r"(?i)\btype:([A-Za-z0-9_-]+)").expect("type pattern"),
        }
    }

    /// Parse a validated query
    pub fn parse(&self, query: &Query) -> ParsedQuery {
        let original = query.text.clone();
        let processed = normalize_text(&original);
        let entities = self.extract_entities(&original);

        let mut filters = self.extract_filters(&original);
        if let Some(supplied) = &query.filters {
            filters.extend(supplied.iter().cloned());
        }

        let intent = classify_intent(&original, &processed);

        ParsedQuery {
            original_text: original,
            processed_text: processed,
            intent,
            entities,
            filters,
        }
    }

    /// Quoted phrases plus capitalized non-question words, deduplicated
    fn extract_entities(&self, text: &str) -> Vec<String> {
        let mut entities = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for capture in self.quoted_re.captures_iter(text) {
            let phrase = capture[1].trim();
            if !phrase.is_empty() && seen.insert(phrase.to_lowercase()) {
                entities.push(phrase.to_string());
            }
        }

        for token in text.split_whitespace() {
            let word = token.trim_matches(|c: char| !c.is_alphanumeric());
            if word.chars().count() < MIN_ENTITY_LEN {
                continue;
            }
            let starts_upper = word.chars().next().map(char::is_uppercase).unwrap_or(false);
            if !starts_upper {
                continue;
            }
            let lower = word.to_lowercase();
            if QUESTION_WORDS.contains(&lower.as_str()) {
                continue;
            }
            if seen.insert(lower) {
                entities.push(word.to_string());
            }
        }

        entities
    }

    /// Inline date and type filters
    fn extract_filters(&self, text: &str) -> Vec<QueryFilter> {
        let mut filters = Vec::new();

        for capture in self.date_gte_re.captures_iter(text) {
            filters.push(QueryFilter::new(
                "date",
                FilterOperator::Gte,
                capture[1].to_string(),
            ));
        }
        for capture in self.date_lte_re.captures_iter(text) {
            filters.push(QueryFilter::new(
                "date",
                FilterOperator::Lte,
                capture[1].to_string(),
            ));
        }
        for capture in self.type_re.captures_iter(text) {
            filters.push(QueryFilter::new(
                "type",
                FilterOperator::Eq,
                capture[1].to_lowercase(),
            ));
        }

        filters
    }
}

impl Default for QueryParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase, strip punctuation except `-`, `_`, `.`, normalize whitespace
pub fn normalize_text(text: &str) -> String {
    let replaced: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                ' '
            }
        })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn classify_intent(original: &str, processed: &str) -> QueryIntent {
    if original.trim_end().ends_with('?') {
        return QueryIntent::Question;
    }

    let mut tokens = processed.split_whitespace();
    if let Some(first) = tokens.next() {
        if QUESTION_WORDS.contains(&first) {
            return QueryIntent::Question;
        }
    }

    if processed
        .split_whitespace()
        .any(|t| SEARCH_WORDS.contains(&t))
    {
        return QueryIntent::Search;
    }

    QueryIntent::General
}
