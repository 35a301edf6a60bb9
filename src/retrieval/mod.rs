//! Hybrid retrieval
//!
//! Full-text and vector search behind narrow traits, merged with Reciprocal
//! Rank Fusion.

mod fusion;
mod hybrid;
mod providers;

pub use fusion::{reciprocal_rank_fusion, FusionConfig, FusionError};
pub use hybrid::HybridSearcher;

use crate::models::{Period, SearchFilter, SearchResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Embedding generation failed: {0}")]
    EmbeddingError(String),

    #[error("Embedding timed out after {0:?}")]
    EmbeddingTimeout(Duration),

    #[error("Vector search failed: {0}")]
    VectorSearchError(String),

    #[error("Keyword search failed: {0}")]
    KeywordSearchError(String),

    #[error("Search task failed: {0}")]
    TaskError(String),
}

/// Ranked keyword search over message content
#[async_trait]
pub trait KeywordSearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<SearchResult>, SearchError>;
}

/// Nearest-neighbour search over stored message embeddings.
/// Scores are similarities, never raw distances.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn search(
        &self,
        embedding: &[f32],
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<SearchResult>, SearchError>;
}

/// Which providers a search request uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Fts,
    Vector,
    #[default]
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Fts => "fts",
            SearchMode::Vector => "vector",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound search request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,

    /// Restrict to messages sent by this entity
    #[serde(default)]
    pub entity_filter: Option<Uuid>,

    /// Inclusive time window
    #[serde(default)]
    pub period: Option<Period>,

    /// Maximum number of results; `retrieval.default_limit` when absent
    #[serde(default)]
    pub limit: Option<usize>,

    #[serde(default)]
    pub mode: SearchMode,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            entity_filter: None,
            period: None,
            limit: None,
            mode: SearchMode::default(),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_entity(mut self, entity_id: Uuid) -> Self {
        self.entity_filter = Some(entity_id);
        self
    }

    pub fn with_period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn filter(&self) -> SearchFilter {
        SearchFilter {
            entity_id: self.entity_filter,
            period: self.period,
        }
    }
}

/// Outbound search response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total: usize,
    pub search_type: SearchMode,
}

impl SearchResponse {
    pub fn new(results: Vec<SearchResult>, search_type: SearchMode) -> Self {
        Self {
            total: results.len(),
            results,
            search_type,
        }
    }
}
