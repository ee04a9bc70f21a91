//! Embedding provider adapters
//!
//! Each provider is its own adapter behind `EmbeddingProvider`; the factory
//! below is the only place that maps configuration to a concrete client.

pub mod ollama;
pub mod openai;

pub use ollama::OllamaEmbedding;
pub use openai::OpenAiEmbedding;

use sift_core::config::{EmbeddingConfig, EmbeddingProviderKind};
use sift_core::{EmbeddingProvider, Result};
use std::sync::Arc;

/// Characters per token, the approximation used for input truncation
const CHARS_PER_TOKEN: usize = 4;

/// Truncate text to a token budget at four characters per token
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    let max_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN);
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

/// Create an embedding provider from config
pub fn create_embedding_provider(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        EmbeddingProviderKind::OpenAi => {
            Ok(Arc::new(OpenAiEmbedding::from_config(config)?))
        }
        EmbeddingProviderKind::Ollama => {
            Ok(Arc::new(OllamaEmbedding::from_config(config)?))
        }
    }
}
