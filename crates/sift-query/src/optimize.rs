//! Query optimization
//!
//! Expands search terms with naive suffix stems, looks detected entities up
//! in a static synonym table, and derives field boosts from request context.

use sift_core::{ParsedQuery, QueryOptimization};
use std::collections::{HashMap, HashSet};

/// Boost applied to the context-provided domain
const DOMAIN_BOOST: f32 = 1.5;

/// Boost applied when the context asks for recent content
const RECENCY_BOOST: f32 = 1.2;

/// Tokens must be longer than this to be stemmed
const STEM_MIN_LEN: usize = 3;

/// Static synonym table keyed by lowercase entity
pub struct QueryOptimizer {
    synonyms: HashMap<&'static str, &'static [&'static str]>,
}

impl QueryOptimizer {
    pub fn new() -> Self {
        let mut synonyms: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
        synonyms.insert("ai", &["artificial intelligence"]);
        synonyms.insert("ml", &["machine learning"]);
        synonyms.insert("nlp", &["natural language processing"]);
        synonyms.insert("db", &["database"]);
        synonyms.insert("k8s", &["kubernetes"]);
        synonyms.insert("docs", &["documentation"]);
        synonyms.insert("repo", &["repository"]);
        synonyms.insert("config", &["configuration"]);
        synonyms.insert("auth", &["authentication"]);
        synonyms.insert("api", &["application programming interface"]);

        Self { synonyms }
    }

    /// Build the optimization for a parsed query
    pub fn optimize(
        &self,
        parsed: &ParsedQuery,
        context: Option<&HashMap<String, String>>,
    ) -> QueryOptimization {
        let mut optimization = QueryOptimization {
            expanded_terms: expand_terms(&parsed.processed_text),
            synonyms: self.lookup_synonyms(&parsed.entities),
            filters: parsed.filters.clone(),
            boosts: HashMap::new(),
        };

        if let Some(context) = context {
            if let Some(domain) = context.get("domain") {
                optimization.add_boost(domain.clone(), DOMAIN_BOOST);
            }
            if context.get("recency").map(String::as_str) == Some("recent") {
                optimization.add_boost("recent", RECENCY_BOOST);
            }
        }

        optimization
    }

    fn lookup_synonyms(&self, entities: &[String]) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for entity in entities {
            if let Some(expansions) = self.synonyms.get(entity.to_lowercase().as_str()) {
                for expansion in *expansions {
                    if seen.insert(*expansion) {
                        out.push((*expansion).to_string());
                    }
                }
            }
        }
        out
    }
}

impl Default for QueryOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Naive suffix stems for tokens longer than three characters
///
/// `-ing` and `-ed` are stripped outright; a trailing plural `-s` is dropped
/// unless the token ends in `ss`.
pub fn expand_terms(processed_text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for token in processed_text.split_whitespace() {
        if token.chars().count() <= STEM_MIN_LEN {
            continue;
        }
        if let Some(stem) = stem(token) {
            if stem.chars().count() >= 2 && seen.insert(stem.clone()) {
                out.push(stem);
            }
        }
    }

    out
}

fn stem(token: &str) -> Option<String> {
    if let Some(base) = token.strip_suffix("ing") {
        return Some(base.to_string());
    }
    if let Some(base) = token.strip_suffix("ed") {
        return Some(base.to_string());
    }
    if !token.ends_with("ss") {
        if let Some(base) = token.strip_suffix('s') {
            return Some(base.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::QueryIntent;

    fn parsed(text: &str, entities: Vec<&str>) -> ParsedQuery {
        ParsedQuery {
            original_text: text.to_string(),
            processed_text: text.to_string(),
            intent: QueryIntent::General,
            entities: entities.into_iter().map(str::to_string).collect(),
            filters: Vec::new(),
        }
    }

    #[test]
    fn test_expand_terms_suffixes() {
        let terms = expand_terms("running indexed queries");
        assert!(terms.contains(&"runn".to_string()));
        assert!(terms.contains(&"index".to_string()));
        assert!(terms.contains(&"querie".to_string()));
    }

    #[test]
    fn test_expand_terms_skips_short_and_ss() {
        let terms = expand_terms("dogs its process");
        assert!(terms.contains(&"dog".to_string()));
        // "its" is too short to stem
        assert!(!terms.contains(&"it".to_string()));
        // "-ss" endings are not plurals
        assert!(!terms.contains(&"proces".to_string()));
    }

    #[test]
    fn test_synonym_lookup() {
        let optimizer = QueryOptimizer::new();
        let optimization = optimizer.optimize(&parsed("what about ml", vec!["ML"]), None);
        assert_eq!(optimization.synonyms, vec!["machine learning"]);
    }

    #[test]
    fn test_context_boosts() {
        let optimizer = QueryOptimizer::new();
        let mut context = HashMap::new();
        context.insert("domain".to_string(), "engineering".to_string());
        context.insert("recency".to_string(), "recent".to_string());

        let optimization = optimizer.optimize(&parsed("anything", vec![]), Some(&context));
        assert_eq!(optimization.boosts["engineering"], 1.5);
        assert_eq!(optimization.boosts["recent"], 1.2);
    }

    #[test]
    fn test_no_boosts_without_context() {
        let optimizer = QueryOptimizer::new();
        let optimization = optimizer.optimize(&parsed("anything", vec![]), None);
        assert!(optimization.boosts.is_empty());
    }

    #[test]
    fn test_non_recent_recency_ignored() {
        let optimizer = QueryOptimizer::new();
        let mut context = HashMap::new();
        context.insert("recency".to_string(), "all".to_string());
        let optimization = optimizer.optimize(&parsed("anything", vec![]), Some(&context));
        assert!(!optimization.boosts.contains_key("recent"));
    }
}
