/// Embedding & indexing
///
/// Local embedding generation and the two search indexes behind hybrid search:
/// - EmbeddingProvider trait for abstraction
/// - FastEmbedProvider for local embedding (all-MiniLM-L6-v2, 384-dim)
/// - RandomEmbeddingProvider as the deterministic fallback
/// - HNSW for vector similarity search
/// - Tantivy for keyword search
/// - IndexLoader to fill both indexes from the store
mod keyword_index;
mod loader;
mod provider;
mod random;
mod vector_index;

pub use keyword_index::{analyzer_language, KeywordIndex, KeywordIndexError};
pub use loader::{IndexLoader, LoadResult};
pub use provider::{truncate_input, EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use random::RandomEmbeddingProvider;
pub use vector_index::{VectorIndex, VectorIndexError};

use crate::config::EmbeddingConfig;
use std::sync::Arc;

/// Build the provider selected by `embedding.mode`
pub fn provider_from_config(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.mode.as_str() {
        "local" => Ok(Arc::new(FastEmbedProvider::new(
            &config.model,
            config.max_input_chars,
        )?)),
        "random" => {
            tracing::warn!(
                "Using random embeddings ({}D); vector search results carry no meaning",
                config.dimension
            );
            Ok(Arc::new(RandomEmbeddingProvider::new(
                config.dimension,
                config.max_input_chars,
            )))
        }
        other => Err(EmbeddingError::InitializationError(format!(
            "Unknown embedding mode: {}",
            other
        ))),
    }
}
