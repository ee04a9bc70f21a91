//! Content metadata extraction
//!
//! Lightweight, rule-based extraction run during indexing: structural counts,
//! a coarse language heuristic, frequency keywords, and regex entity sets.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Number of keywords kept
const KEYWORD_LIMIT: usize = 10;

/// Numbers captured before the extractor stops
const NUMBER_LIMIT: usize = 20;

/// Tokens inspected by the language heuristic
const LANGUAGE_SAMPLE: usize = 100;

/// English common-word ratio above which text is tagged `en`
const ENGLISH_RATIO: f64 = 0.1;

/// Small English common-word list for the language heuristic
const COMMON_ENGLISH: &[&str] = &[
    "the", "be", "to", "of", "and", "a", "in", "that", "have", "it", "for", "not", "on",
    "with", "he", "as", "you", "do", "at", "this", "but", "his", "by", "from", "they",
    "we", "say", "her", "she", "or", "an", "will", "my", "one", "all", "would", "there",
    "their", "what", "is", "are", "was",
];

/// Extracted metadata attached to content during indexing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    pub word_count: usize,
    pub char_count: usize,
    pub sentence_count: usize,
    pub paragraph_count: usize,

    /// `en` or `unknown`
    pub language: String,

    /// Top keywords by frequency
    pub keywords: Vec<String>,

    /// Regex-detected entities
    pub entities: ExtractedEntities,
}

/// Entity sets detected by fixed regex patterns
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedEntities {
    pub emails: Vec<String>,
    pub urls: Vec<String>,
    pub dates: Vec<String>,
    pub numbers: Vec<String>,
}

/// Rule-based metadata extractor with precompiled patterns
pub struct MetadataExtractor {
    email_re: Regex,
    url_re: Regex,
    date_res: Vec<Regex>,
    number_re: Regex,
}

impl MetadataExtractor {
    pub fn new() -> Self {
        Self {
            email_re: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
                .expect("email pattern"),
            url_re: Regex::new(r"https?://[^\s)>\]]+").expect("url pattern"),
            date_res: vec![
                Regex::new(r"\b\d{2}/\d{2}/\d{4}\b").expect("dd/mm/yyyy pattern"),
                Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("yyyy-mm-dd pattern"),
            ],
            number_re: Regex::new(r"\b\d+(?:\.\d+)?\b").expect("number pattern"),
        }
    }

    /// Run the full extraction pass over a text
    pub fn extract(&self, text: &str) -> ExtractedMetadata {
        ExtractedMetadata {
            word_count: text.split_whitespace().count(),
            char_count: text.chars().count(),
            sentence_count: count_sentences(text),
            paragraph_count: count_paragraphs(text),
            language: detect_language(text),
            keywords: extract_keywords(text),
            entities: self.extract_entities(text),
        }
    }

    fn extract_entities(&self, text: &str) -> ExtractedEntities {
        let emails = self
            .email_re
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect();
        let urls = self
            .url_re
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect();

        let mut dates = Vec::new();
        for re in &self.date_res {
            dates.extend(re.find_iter(text).map(|m| m.as_str().to_string()));
        }

        let numbers = self
            .number_re
            .find_iter(text)
            .take(NUMBER_LIMIT)
            .map(|m| m.as_str().to_string())
            .collect();

        ExtractedEntities {
            emails,
            urls,
            dates,
            numbers,
        }
    }
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn count_sentences(text: &str) -> usize {
    let count = text
        .chars()
        .filter(|c| matches!(c, '.' | '!' | '?'))
        .count();
    if count == 0 && !text.trim().is_empty() {
        1
    } else {
        count
    }
}

fn count_paragraphs(text: &str) -> usize {
    text.split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .count()
        .max(usize::from(!text.trim().is_empty()))
}

/// Coarse language heuristic over the first hundred tokens
fn detect_language(text: &str) -> String {
    let tokens: Vec<String> = text
        .split_whitespace()
        .take(LANGUAGE_SAMPLE)
        .map(|t| {
            t.to_lowercase()
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect()
        })
        .filter(|t: &String| !t.is_empty())
        .collect();

    if tokens.is_empty() {
        return "unknown".to_string();
    }

    let matches = tokens
        .iter()
        .filter(|t| COMMON_ENGLISH.contains(&t.as_str()))
        .count();

    if matches as f64 / tokens.len() as f64 > ENGLISH_RATIO {
        "en".to_string()
    } else {
        "unknown".to_string()
    }
}

/// Top keywords by frequency among tokens longer than three characters
fn extract_keywords(text: &str) -> Vec<String> {
    let mut frequency: HashMap<String, usize> = HashMap::new();
    for token in text.split_whitespace() {
        let cleaned: String = token
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        if cleaned.len() > 3 {
            *frequency.entry(cleaned).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = frequency.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
        .into_iter()
        .take(KEYWORD_LIMIT)
        .map(|(token, _)| token)
        .collect()
}
