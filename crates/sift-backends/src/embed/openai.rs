//! OpenAI embedding provider

use crate::embed::truncate_to_tokens;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sift_core::config::EmbeddingConfig;
use sift_core::{Embedding, EmbeddingProvider, ProviderHealth, Result, SiftError};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI embedding API client
pub struct OpenAiEmbedding {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    max_tokens: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbedding {
    /// Create a new client
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = match model.as_str() {
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            "text-embedding-ada-002" => 1536,
            _ => 1536, // Default
        };

        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model,
            dimension,
            max_tokens: 8191,
        }
    }

    /// Create from config
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_ref()
            .ok_or_else(|| SiftError::Config("OpenAI API key required".to_string()))?;

        let mut provider = Self::new(api_key.clone(), config.model.clone());
        if let Some(base_url) = &config.base_url {
            provider.base_url = base_url.trim_end_matches('/').to_string();
        }
        provider.max_tokens = config.max_tokens;
        provider.client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SiftError::Config(format!("http client: {e}")))?;
        Ok(provider)
    }

    async fn request(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        let request = EmbeddingRequest {
            input: texts,
            model: self.model.clone(),
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SiftError::Timeout { elapsed_ms: 0 }
                } else {
                    SiftError::Provider(format!("embedding request failed: {e}"))
                }
            })?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(SiftError::RateLimit(
                "embedding provider rate limit".to_string(),
            ));
        }
        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SiftError::Provider(format!(
                "embedding provider error: {error_text}"
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| SiftError::Provider(format!("failed to parse embedding response: {e}")))?;

        // Sort by index so the output matches the input order
        let mut data = result.data;
        data.sort_by_key(|d| d.index);

        Ok(data
            .into_iter()
            .map(|d| Embedding::new(d.embedding, self.model.clone()))
            .collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let truncated = truncate_to_tokens(text, self.max_tokens);
        let results = self.request(vec![truncated]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| SiftError::Provider("no embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let truncated: Vec<String> = texts
            .iter()
            .map(|t| truncate_to_tokens(t, self.max_tokens))
            .collect();
        self.request(truncated).await
    }

    async fn health(&self) -> Result<ProviderHealth> {
        match self.embed("ping").await {
            Ok(embedding) if !embedding.vector.is_empty() => Ok(ProviderHealth::healthy()
                .with_detail("model", self.model.clone())
                .with_detail("dimension", embedding.vector.len())),
            Ok(_) => Ok(ProviderHealth::unhealthy("empty vector returned")),
            Err(e) => Ok(ProviderHealth::unhealthy(e.to_string())),
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
