//! Search trait implementations for the local indexes

use super::{KeywordSearch, SearchError, VectorSearch};
use crate::embedding::{KeywordIndex, VectorIndex};
use crate::models::{SearchFilter, SearchResult};
use async_trait::async_trait;

// Both indexes answer from memory-mapped or in-process structures, so they are
// queried inline rather than on the blocking pool.

#[async_trait]
impl KeywordSearch for KeywordIndex {
    async fn search(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        KeywordIndex::search(self, query, filter, limit)
            .map_err(|e| SearchError::KeywordSearchError(e.to_string()))
    }
}

#[async_trait]
impl VectorSearch for VectorIndex {
    async fn search(
        &self,
        embedding: &[f32],
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        VectorIndex::search(self, embedding, filter, limit, self.filtered_overfetch())
            .map_err(|e| SearchError::VectorSearchError(e.to_string()))
    }
}
