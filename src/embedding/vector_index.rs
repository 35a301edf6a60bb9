/// HNSW vector index for similarity search over message embeddings
use crate::models::{Message, ResultKind, SearchFilter, SearchResult};
use chrono::{DateTime, Utc};
use hnsw_rs::prelude::*;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Initial capacity hint for the graph; it grows past this
const DEFAULT_MAX_ELEMENTS: usize = 100_000;
const MAX_LAYERS: usize = 16;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

/// Message data kept next to the graph so hits can be filtered and returned
/// without a store round-trip
#[derive(Debug, Clone)]
struct IndexedMessage {
    interaction_id: Uuid,
    sender_id: Option<Uuid>,
    content: String,
    timestamp: DateTime<Utc>,
    vector: Vec<f32>,
}

/// HNSW vector index wrapper
///
/// Approximate nearest neighbour search with cosine distance. Scores are
/// reported as similarity (`1 - distance`), higher is better.
pub struct VectorIndex {
    index: RwLock<Hnsw<'static, f32, DistCosine>>,
    messages: RwLock<HashMap<i64, IndexedMessage>>,
    dimension: usize,
    m: usize,
    ef_construction: usize,
    ef_search: usize,
    filtered_overfetch: usize,
}

impl VectorIndex {
    /// Create a new, empty vector index
    ///
    /// # Arguments
    /// * `dimension` - Vector dimension (must match embedding dimension)
    /// * `ef_construction` - HNSW construction parameter (higher = better recall, slower build)
    /// * `m` - HNSW M parameter (number of connections per layer)
    /// * `ef_search` - HNSW search parameter, raised to `k` when smaller
    pub fn new(dimension: usize, ef_construction: usize, m: usize, ef_search: usize) -> Self {
        Self {
            index: RwLock::new(Self::build_graph(m, ef_construction)),
            messages: RwLock::new(HashMap::new()),
            dimension,
            m,
            ef_construction,
            ef_search,
            filtered_overfetch: 10,
        }
    }

    /// Set the over-fetch factor applied when a search carries a filter
    pub fn with_filtered_overfetch(mut self, overfetch: usize) -> Self {
        self.filtered_overfetch = overfetch.max(1);
        self
    }

    pub fn filtered_overfetch(&self) -> usize {
        self.filtered_overfetch
    }

    fn build_graph(m: usize, ef_construction: usize) -> Hnsw<'static, f32, DistCosine> {
        Hnsw::<f32, DistCosine>::new(
            m,
            DEFAULT_MAX_ELEMENTS,
            MAX_LAYERS,
            ef_construction,
            DistCosine,
        )
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Insert a message embedding
    ///
    /// Returns false when the message has no content or its id is already
    /// indexed (the graph does not support replacement).
    pub fn insert(&self, message: &Message, vector: &[f32]) -> Result<bool, VectorIndexError> {
        self.check_dimension(vector)?;

        let Some(content) = message.content.as_deref() else {
            return Ok(false);
        };

        let mut messages = self
            .messages
            .write()
            .map_err(|_| VectorIndexError::InsertError("Metadata lock poisoned".to_string()))?;
        if messages.contains_key(&message.id) {
            return Ok(false);
        }

        let data = vector.to_vec();
        {
            let index = self
                .index
                .write()
                .map_err(|_| VectorIndexError::InsertError("Index lock poisoned".to_string()))?;
            index.insert((data.as_slice(), message.id as usize));
        }

        messages.insert(
            message.id,
            IndexedMessage {
                interaction_id: message.interaction_id,
                sender_id: message.sender_id,
                content: content.to_string(),
                timestamp: message.timestamp,
                vector: data,
            },
        );

        Ok(true)
    }

    /// Search for the nearest messages to `query`
    ///
    /// A non-empty filter restricts the graph walk to eligible ids, with
    /// `ef` widened by `overfetch`. When the walk finds fewer than
    /// `limit` eligible neighbours, the eligible vectors are scanned exactly.
    pub fn search(
        &self,
        query: &[f32],
        filter: &SearchFilter,
        limit: usize,
        overfetch: usize,
    ) -> Result<Vec<SearchResult>, VectorIndexError> {
        self.check_dimension(query)?;

        let messages = self
            .messages
            .read()
            .map_err(|_| VectorIndexError::SearchError("Metadata lock poisoned".to_string()))?;
        if limit == 0 || messages.is_empty() {
            return Ok(Vec::new());
        }

        let index = self
            .index
            .read()
            .map_err(|_| VectorIndexError::SearchError("Index lock poisoned".to_string()))?;

        let hits: Vec<(i64, f32)> = if filter.is_empty() {
            let k = limit.min(messages.len());
            index
                .search(query, k, self.ef_search.max(k))
                .into_iter()
                .map(|n| (n.d_id as i64, n.distance))
                .collect()
        } else {
            // FilterT for Vec<usize> binary-searches, so ids must be sorted
            let mut eligible: Vec<usize> = messages
                .iter()
                .filter(|(_, meta)| filter.matches(meta.sender_id, meta.timestamp))
                .map(|(id, _)| *id as usize)
                .collect();
            eligible.sort_unstable();

            let k = limit.min(eligible.len());
            if k == 0 {
                return Ok(Vec::new());
            }
            let ef = self
                .ef_search
                .max(k.saturating_mul(overfetch.max(1)));

            let walked: Vec<(i64, f32)> = index
                .search_filter(query, k, ef, Some(&eligible as &dyn FilterT))
                .into_iter()
                .map(|n| (n.d_id as i64, n.distance))
                .collect();

            if walked.len() < k {
                debug!(
                    "Filtered graph walk found {} of {}, scanning {} eligible vectors",
                    walked.len(),
                    k,
                    eligible.len()
                );
                eligible
                    .iter()
                    .filter_map(|id| {
                        let id = *id as i64;
                        let meta = messages.get(&id)?;
                        Some((id, cosine_distance(query, &meta.vector)))
                    })
                    .collect()
            } else {
                walked
            }
        };
        drop(index);

        let mut results: Vec<SearchResult> = hits
            .into_iter()
            .filter_map(|(id, distance)| {
                let meta = messages.get(&id)?;
                if !filter.matches(meta.sender_id, meta.timestamp) {
                    return None;
                }
                Some(SearchResult {
                    id,
                    kind: ResultKind::Message,
                    content: meta.content.clone(),
                    timestamp: meta.timestamp,
                    entity_id: meta.sender_id,
                    interaction_id: meta.interaction_id,
                    score: 1.0 - distance,
                    highlight: None,
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        results.truncate(limit);

        Ok(results)
    }

    /// Check whether a message id is indexed
    pub fn contains(&self, id: i64) -> bool {
        self.messages
            .read()
            .map(|m| m.contains_key(&id))
            .unwrap_or(false)
    }

    /// Get the number of vectors in the index
    pub fn len(&self) -> usize {
        self.messages.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get vector dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Clear the index (remove all vectors)
    pub fn clear(&self) -> Result<(), VectorIndexError> {
        let mut messages = self
            .messages
            .write()
            .map_err(|_| VectorIndexError::InsertError("Metadata lock poisoned".to_string()))?;
        let mut index = self
            .index
            .write()
            .map_err(|_| VectorIndexError::InsertError("Index lock poisoned".to_string()))?;

        *index = Self::build_graph(self.m, self.ef_construction);
        messages.clear();

        Ok(())
    }
}

/// Cosine distance matching `DistCosine`; a zero vector is at distance 1
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())).max(0.0)
}
