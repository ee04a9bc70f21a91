//! Ollama embedding provider

use crate::embed::truncate_to_tokens;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sift_core::config::EmbeddingConfig;
use sift_core::{Embedding, EmbeddingProvider, ProviderHealth, Result, SiftError};
use std::time::Duration;

/// Ollama embedding API client
pub struct OllamaEmbedding {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
    max_tokens: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    /// Create a new client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = match model.as_str() {
            "nomic-embed-text" => 768,
            "mxbai-embed-large" => 1024,
            "all-minilm" => 384,
            _ => 768, // Default for most models
        };

        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model,
            dimension,
            max_tokens: 8191,
        }
    }

    /// Create from config
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let mut provider = Self::new(config.ollama_url.clone(), config.model.clone());
        provider.max_tokens = config.max_tokens;
        provider.client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SiftError::Config(format!("http client: {e}")))?;
        Ok(provider)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let request = EmbeddingRequest {
            model: self.model.clone(),
            prompt: truncate_to_tokens(text, self.max_tokens),
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SiftError::Timeout { elapsed_ms: 0 }
                } else {
                    SiftError::Provider(format!("ollama embedding request failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SiftError::Provider(format!(
                "ollama embedding error: {error_text}"
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| SiftError::Provider(format!("failed to parse embedding response: {e}")))?;

        Ok(Embedding::new(result.embedding, self.model.clone()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        // Ollama has no native batch endpoint; embed sequentially
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_dimensions() {
        let client = OllamaEmbedding::new("http://localhost:11434", "nomic-embed-text");
        assert_eq!(client.dimension(), 768);

        let client = OllamaEmbedding::new("http://localhost:11434", "mxbai-embed-large");
        assert_eq!(client.dimension(), 1024);

        let client = OllamaEmbedding::new("http://localhost:11434", "all-minilm");
        assert_eq!(client.dimension(), 384);
    }
}
