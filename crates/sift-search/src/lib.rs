//! Sift Search - Hybrid retrieval engine
//!
//! Combines two signals over the vector store:
//! - Semantic: embedding k-NN similarity
//! - Keyword: occurrence scoring over retrieved metadata payloads
//!
//! Fused scores are adjusted by metadata and recency factors, and an optional
//! greedy diversity pass trades raw score for source/category variety.

use chrono::Utc;
use sift_core::config::SearchConfig;
use sift_core::{
    EmbeddingProvider, RankingFactors, Result, ScoredPoint, SearchHit, SearchParams, VectorStore,
};
use std::collections::HashMap;
use std::sync::Arc;

pub mod keywords;
pub mod ranking;

pub use keywords::{keyword_score, tokenize, STOP_WORDS};
pub use ranking::{apply_post_ranking, diversity_rerank};

// ============================================================================
// Options
// ============================================================================

/// Options shared by both search paths
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Number of hits requested
    pub top_k: usize,

    /// Metadata equality filter pushed to the vector store
    pub filter: Option<HashMap<String, serde_json::Value>>,

    /// Minimum similarity accepted from the store
    pub threshold: Option<f32>,
}

impl SearchOptions {
    pub fn top_k(k: usize) -> Self {
        Self {
            top_k: k,
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: HashMap<String, serde_json::Value>) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Options for the hybrid path
#[derive(Debug, Clone)]
pub struct HybridOptions {
    pub search: SearchOptions,

    /// Weight of the semantic score in fusion
    pub vector_weight: f32,

    /// Weight of the keyword score in fusion
    pub keyword_weight: f32,

    /// Per-keyword boost multipliers
    pub keyword_boost: HashMap<String, f32>,

    /// Extra terms (stems, synonyms) scored alongside the query's own
    /// keywords
    pub extra_keywords: Vec<String>,

    /// Run the diversity re-rank instead of post-ranking factors
    pub rerank_results: bool,
}

impl HybridOptions {
    pub fn new(search: SearchOptions) -> Self {
        Self {
            search,
            vector_weight: 0.7,
            keyword_weight: 0.3,
            keyword_boost: HashMap::new(),
            extra_keywords: Vec::new(),
            rerank_results: false,
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Translates a query plus options into ranked hits
pub struct SearchEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorStore>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorStore>,
        config: SearchConfig,
    ) -> Self {
        Self {
            embedder,
            vectors,
            config,
        }
    }

    /// Hybrid options seeded from this engine's configured defaults
    pub fn default_options(&self, search: SearchOptions) -> HybridOptions {
        HybridOptions {
            search,
            vector_weight: self.config.vector_weight,
            keyword_weight: self.config.keyword_weight,
            keyword_boost: HashMap::new(),
            extra_keywords: Vec::new(),
            rerank_results: self.config.rerank_results,
        }
    }

    /// Pure semantic search with post-ranking factors
    pub async fn semantic_search(
        &self,
        query_text: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let embedding = self.embedder.embed(query_text).await?;
        let points = self.retrieve(&embedding.vector, options, options.top_k).await?;
        tracing::debug!(count = points.len(), "semantic search retrieved");

        let query_lower = query_text.to_lowercase();
        let now = Utc::now();

        let mut hits: Vec<SearchHit> = points.into_iter().map(Self::hit_from_point).collect();
        for hit in &mut hits {
            ranking::apply_post_ranking(hit, &query_lower, now);
        }

        sort_by_score(&mut hits);
        hits.truncate(options.top_k);
        Ok(hits)
    }

    /// Hybrid semantic + keyword search
    ///
    /// Candidates are retrieved semantically with a widened k, keyword-scored
    /// against their own payloads, fused by the configured weights, then
    /// either diversity re-ranked or post-ranked.
    pub async fn hybrid_search(
        &self,
        query_text: &str,
        options: &HybridOptions,
    ) -> Result<Vec<SearchHit>> {
        let embedding = self.embedder.embed(query_text).await?;
        self.hybrid_search_with_embedding(&embedding.vector, query_text, options)
            .await
    }

    /// Hybrid search with a precomputed query embedding
    ///
    /// Lets callers embed once and fan the same vector out across several
    /// source-scoped searches.
    pub async fn hybrid_search_with_embedding(
        &self,
        vector: &[f32],
        query_text: &str,
        options: &HybridOptions,
    ) -> Result<Vec<SearchHit>> {
        let candidate_k = options
            .search
            .top_k
            .saturating_mul(self.config.candidate_multiplier.max(1));
        let points = self
            .retrieve(vector, &options.search, candidate_k)
            .await?;
        tracing::debug!(candidates = points.len(), "hybrid search candidate pool");

        let mut keywords = keywords::tokenize(query_text);
        for term in &options.extra_keywords {
            for token in keywords::tokenize(term) {
                if !keywords.contains(&token) {
                    keywords.push(token);
                }
            }
        }

        let mut hits: Vec<SearchHit> = points
            .into_iter()
            .map(|point| {
                let kw = keywords::keyword_score(&keywords, &options.keyword_boost, &point.metadata);
                let vector_score = point.score.clamp(0.0, 1.0);
                let fused = (vector_score * options.vector_weight + kw * options.keyword_weight)
                    .clamp(0.0, 1.0);
                SearchHit {
                    id: point.id,
                    vector_score,
                    keyword_score: Some(kw),
                    final_score: fused,
                    ranking_factors: RankingFactors {
                        semantic: vector_score,
                        keyword: Some(kw),
                        ..Default::default()
                    },
                    metadata: point.metadata,
                }
            })
            .collect();

        sort_by_score(&mut hits);

        if options.rerank_results {
            Ok(ranking::diversity_rerank(hits, options.search.top_k))
        } else {
            let query_lower = query_text.to_lowercase();
            let now = Utc::now();
            for hit in &mut hits {
                ranking::apply_post_ranking(hit, &query_lower, now);
            }
            sort_by_score(&mut hits);
            hits.truncate(options.search.top_k);
            Ok(hits)
        }
    }

    async fn retrieve(
        &self,
        vector: &[f32],
        options: &SearchOptions,
        top_k: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let mut params = SearchParams::top_k(top_k);
        if let Some(filter) = &options.filter {
            params = params.with_filter(filter.clone());
        }
        if let Some(threshold) = options.threshold {
            params = params.with_threshold(threshold);
        }
        self.vectors.search(vector, &params).await
    }

    fn hit_from_point(point: ScoredPoint) -> SearchHit {
        let score = point.score.clamp(0.0, 1.0);
        SearchHit {
            id: point.id,
            vector_score: score,
            keyword_score: None,
            final_score: score,
            ranking_factors: RankingFactors {
                semantic: score,
                ..Default::default()
            },
            metadata: point.metadata,
        }
    }
}

/// Stable descending sort by final score
pub fn sort_by_score(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sift_core::{Embedding, ProviderHealth, VectorRecord, VectorStoreStats};

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Embedding> {
            Ok(Embedding::new(vec![1.0, 0.0], "fixed"))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
            Ok(texts
                .iter()
                .map(|_| Embedding::new(vec![1.0, 0.0], "fixed"))
                .collect())
        }

        async fn health(&self) -> Result<ProviderHealth> {
            Ok(ProviderHealth::healthy())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    struct FixedStore {
        points: Vec<ScoredPoint>,
    }

    #[async_trait]
    impl VectorStore for FixedStore {
        async fn upsert(&self, _records: Vec<VectorRecord>) -> Result<()> {
            Ok(())
        }

        async fn search(
            &self,
            _vector: &[f32],
            params: &SearchParams,
        ) -> Result<Vec<ScoredPoint>> {
            Ok(self.points.iter().take(params.top_k).cloned().collect())
        }

        async fn delete(&self, _ids: &[String]) -> Result<u64> {
            Ok(0)
        }

        async fn stats(&self) -> Result<VectorStoreStats> {
            Ok(VectorStoreStats {
                total_vectors: self.points.len() as u64,
                dimension: 2,
                index_type: "flat".to_string(),
                last_updated: None,
            })
        }

        async fn health(&self) -> Result<ProviderHealth> {
            Ok(ProviderHealth::healthy())
        }
    }

    fn point(id: &str, score: f32, text: &str) -> ScoredPoint {
        let mut metadata = HashMap::new();
        metadata.insert("text".to_string(), serde_json::json!(text));
        metadata.insert("source_id".to_string(), serde_json::json!("s1"));
        ScoredPoint {
            id: id.to_string(),
            score,
            metadata,
        }
    }

    fn engine(points: Vec<ScoredPoint>) -> SearchEngine {
        SearchEngine::new(
            Arc::new(FixedEmbedder),
            Arc::new(FixedStore { points }),
            SearchConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_semantic_search_orders_by_score() {
        let engine = engine(vec![
            point("low", 0.3, "unrelated"),
            point("high", 0.9, "unrelated"),
        ]);

        let hits = engine
            .semantic_search("anything", &SearchOptions::top_k(5))
            .await
            .unwrap();
        assert_eq!(hits[0].id, "high");
        assert_eq!(hits[1].id, "low");
    }

    #[tokio::test]
    async fn test_semantic_monotone_in_vector_score() {
        let engine = engine(vec![
            point("a", 0.8, "same text"),
            point("b", 0.6, "same text"),
        ]);

        let hits = engine
            .semantic_search("query words", &SearchOptions::top_k(5))
            .await
            .unwrap();
        let a = hits.iter().find(|h| h.id == "a").unwrap();
        let b = hits.iter().find(|h| h.id == "b").unwrap();
        assert!(a.final_score >= b.final_score);
    }

    #[tokio::test]
    async fn test_hybrid_fusion_weights() {
        let engine = engine(vec![point("x", 1.0, "rust rust rust rust rust")]);

        let options = HybridOptions::new(SearchOptions::top_k(1));
        let hits = engine.hybrid_search("rust", &options).await.unwrap();

        let hit = &hits[0];
        let kw = hit.keyword_score.unwrap();
        // 5 occurrences of "rust" in "key text + value" stringification may
        // exceed the raw text count; assert the fusion formula rather than
        // the keyword count itself.
        let expected_base = 1.0 * 0.7 + kw * 0.3;
        assert!(hit.final_score >= expected_base - 0.001);
        assert!(hit.vector_score == 1.0);
    }

    #[tokio::test]
    async fn test_hybrid_keyword_lifts_matching_candidate() {
        let engine = engine(vec![
            point("match", 0.5, "rust rust rust rust rust rust"),
            point("nomatch", 0.5, "gardening tips"),
        ]);

        let options = HybridOptions::new(SearchOptions::top_k(2));
        let hits = engine.hybrid_search("rust", &options).await.unwrap();
        assert_eq!(hits[0].id, "match");
        assert!(hits[0].final_score > hits[1].final_score);
    }

    #[tokio::test]
    async fn test_extra_keywords_lift_matching_candidate() {
        let engine = engine(vec![
            point("synonym", 0.5, "natural language processing overview"),
            point("plain", 0.5, "gardening tips"),
        ]);

        // Without the expansion the tie stands; with it the synonym text
        // scores on the keyword path
        let mut options = HybridOptions::new(SearchOptions::top_k(2));
        options.extra_keywords = vec!["natural language processing".to_string()];
        let hits = engine.hybrid_search("nlp basics", &options).await.unwrap();

        assert_eq!(hits[0].id, "synonym");
        assert!(hits[0].final_score > hits[1].final_score);
        assert!(hits[0].keyword_score.unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_hybrid_rerank_diversity() {
        let mut p1 = point("1", 0.9, "alpha");
        let mut p2 = point("2", 0.85, "alpha");
        let mut p3 = point("3", 0.8, "alpha");
        p1.metadata
            .insert("category".to_string(), serde_json::json!("T"));
        p2.metadata
            .insert("category".to_string(), serde_json::json!("T"));
        p3.metadata
            .insert("source_id".to_string(), serde_json::json!("u"));
        p3.metadata
            .insert("category".to_string(), serde_json::json!("V"));

        let engine = engine(vec![p1, p2, p3]);

        let mut options = HybridOptions::new(SearchOptions::top_k(3));
        options.rerank_results = true;
        let hits = engine.hybrid_search("alpha", &options).await.unwrap();

        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3", "2"]);
    }

    #[tokio::test]
    async fn test_top_k_truncation() {
        let engine = engine(vec![
            point("1", 0.9, "a"),
            point("2", 0.8, "b"),
            point("3", 0.7, "c"),
        ]);

        let hits = engine
            .semantic_search("q", &SearchOptions::top_k(2))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
    }
}
