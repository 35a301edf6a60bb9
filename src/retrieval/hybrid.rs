//! Hybrid search combining semantic and keyword search

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::models::{SearchFilter, SearchResult};
use crate::retrieval::{
    reciprocal_rank_fusion, FusionConfig, FusionError, KeywordSearch, SearchError, SearchMode,
    VectorSearch,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Hybrid searcher combining semantic and keyword search
///
/// Provider failures never surface to callers: the failing side contributes
/// an empty list and a warning is logged.
pub struct HybridSearcher {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    keyword: Arc<dyn KeywordSearch>,
    vector: Arc<dyn VectorSearch>,
    fusion: FusionConfig,
    search_multiplier: usize,
    embedding_timeout: Duration,
}

impl HybridSearcher {
    /// Create a new hybrid searcher
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        keyword: Arc<dyn KeywordSearch>,
        vector: Arc<dyn VectorSearch>,
        config: &RetrievalConfig,
        embedding_timeout: Duration,
    ) -> Result<Self, FusionError> {
        Ok(Self {
            embedding_provider,
            keyword,
            vector,
            fusion: FusionConfig::from_retrieval(config)?,
            search_multiplier: config.search_multiplier.max(1),
            embedding_timeout,
        })
    }

    /// Search with the providers selected by `mode`
    ///
    /// Single-provider modes fetch exactly `limit` and keep provider scores.
    /// Hybrid mode over-fetches `search_multiplier × limit` from each side and
    /// returns fused scores.
    pub async fn search(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
        mode: SearchMode,
    ) -> Vec<SearchResult> {
        if query.trim().is_empty() || limit == 0 {
            return Vec::new();
        }

        match mode {
            SearchMode::Fts => self.keyword_search(query, filter, limit).await,
            SearchMode::Vector => self.semantic_search(query, filter, limit).await,
            SearchMode::Hybrid => self.hybrid_search(query, filter, limit).await,
        }
    }

    /// Perform hybrid search
    pub async fn hybrid_search(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> Vec<SearchResult> {
        if query.trim().is_empty() || limit == 0 {
            return Vec::new();
        }

        let search_limit = limit.saturating_mul(self.search_multiplier);

        // Step 1: Parallel keyword + (embed -> semantic) search
        let (keyword_results, semantic_results) = tokio::join!(
            self.keyword_search(query, filter, search_limit),
            self.semantic_search(query, filter, search_limit)
        );

        debug!(
            "Hybrid search: {} keyword hits, {} semantic hits",
            keyword_results.len(),
            semantic_results.len()
        );

        // Step 2: Reciprocal Rank Fusion
        reciprocal_rank_fusion(keyword_results, semantic_results, &self.fusion, limit)
    }

    /// Embed `text` on the blocking pool, bounded by the embedding timeout
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        let provider = Arc::clone(&self.embedding_provider);
        let text = text.to_string();
        let task = tokio::task::spawn_blocking(move || provider.embed(&text));

        match tokio::time::timeout(self.embedding_timeout, task).await {
            Ok(Ok(result)) => result.map_err(|e| SearchError::EmbeddingError(e.to_string())),
            Ok(Err(join_error)) => Err(SearchError::TaskError(join_error.to_string())),
            Err(_) => Err(SearchError::EmbeddingTimeout(self.embedding_timeout)),
        }
    }

    /// Keyword search; failures yield no hits
    async fn keyword_search(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> Vec<SearchResult> {
        match self.keyword.search(query, filter, limit).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Keyword search unavailable: {}", e);
                Vec::new()
            }
        }
    }

    /// Semantic search using the query embedding; failures yield no hits
    async fn semantic_search(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> Vec<SearchResult> {
        let embedding = match self.embed_query(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Semantic search skipped: {}", e);
                return Vec::new();
            }
        };

        match self.vector.search(&embedding, filter, limit).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Vector search unavailable: {}", e);
                Vec::new()
            }
        }
    }
}
