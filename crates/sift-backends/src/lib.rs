//! Sift Backends - Adapters for external capabilities
//!
//! Concrete implementations of the collaborator traits:
//! - Embedding providers: OpenAI and Ollama HTTP clients
//! - Vector stores: in-process cosine table and remote Qdrant
//! - Data-source registry: config-seeded static registry
//!
//! Each backend is its own adapter; the factories here are the only code
//! that maps configuration onto concrete types.

pub mod embed;
pub mod registry;
pub mod vector;

pub use embed::{create_embedding_provider, OllamaEmbedding, OpenAiEmbedding};
pub use registry::StaticSourceRegistry;
pub use vector::{create_vector_store, InMemoryVectorStore, QdrantStore};
