//! Vector store adapters
//!
//! Two backends behind the same `VectorStore` contract: a FAISS-style
//! in-process table and a remote Qdrant collection.

pub mod memory;
pub mod qdrant;

pub use memory::InMemoryVectorStore;
pub use qdrant::QdrantStore;

use sift_core::config::{VectorBackendKind, VectorConfig};
use sift_core::{Result, VectorStore};
use std::sync::Arc;

/// Create a vector store from config, initializing remote state as needed
pub async fn create_vector_store(config: &VectorConfig) -> Result<Arc<dyn VectorStore>> {
    match config.backend {
        VectorBackendKind::Memory => Ok(Arc::new(InMemoryVectorStore::new(config.dimension))),
        VectorBackendKind::Qdrant => {
            let store = QdrantStore::new(config)?;
            store.init_collection().await?;
            Ok(Arc::new(store))
        }
    }
}
