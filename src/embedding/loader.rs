/// Populates the keyword and vector indexes from the message store
use super::{EmbeddingProvider, KeywordIndex, VectorIndex};
use crate::error::{RapportError, Result};
use crate::models::Message;
use crate::storage::Database;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of an index load
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadResult {
    /// Messages added to the keyword index
    pub keyword_indexed: usize,
    /// Messages added to the vector index
    pub vector_indexed: usize,
    /// Embeddings computed for messages that had none stored
    pub backfilled: usize,
    /// Messages with content left out of the vector index because their
    /// embedding was missing, unusable or could not be computed
    pub skipped: usize,
    pub duration_ms: u64,
}

/// Batch loader for the search indexes
///
/// Reads messages in id order, `batch_size` at a time. Stored embeddings go
/// straight into the vector index. With an embedder attached, messages without
/// one are embedded and the vector is written back to the store.
pub struct IndexLoader {
    database: Database,
    keyword_index: Arc<KeywordIndex>,
    vector_index: Arc<VectorIndex>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    batch_size: usize,
}

impl IndexLoader {
    pub fn new(
        database: Database,
        keyword_index: Arc<KeywordIndex>,
        vector_index: Arc<VectorIndex>,
        batch_size: usize,
    ) -> Self {
        Self {
            database,
            keyword_index,
            vector_index,
            embedder: None,
            batch_size: batch_size.max(1),
        }
    }

    /// Backfill missing embeddings with `provider`
    pub fn with_embedder(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(provider);
        self
    }

    /// Load every message with content, committing the keyword index once
    pub fn load(&self) -> Result<LoadResult> {
        let start = Instant::now();
        let mut result = LoadResult::default();
        let mut after_id = 0;

        info!("Loading search indexes (batch size {})", self.batch_size);

        loop {
            let batch = self
                .database
                .messages_for_indexing(after_id, self.batch_size)?;
            let Some(last) = batch.last() else {
                break;
            };
            after_id = last.id;

            self.load_batch(&batch, &mut result)?;
            debug!("Indexed batch ending at message {}", after_id);
        }

        self.keyword_index
            .commit()
            .map_err(|e| RapportError::Index(e.to_string()))?;

        result.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Index load complete: {} keyword, {} vector ({} backfilled), {} skipped, {}ms",
            result.keyword_indexed,
            result.vector_indexed,
            result.backfilled,
            result.skipped,
            result.duration_ms
        );

        Ok(result)
    }

    fn load_batch(&self, batch: &[Message], result: &mut LoadResult) -> Result<()> {
        result.keyword_indexed += self
            .keyword_index
            .insert_batch(batch)
            .map_err(|e| RapportError::Index(e.to_string()))?;

        let missing: Vec<&Message> = batch
            .iter()
            .filter(|m| m.embedding.is_none() && !self.vector_index.contains(m.id))
            .collect();
        let backfilled = self.backfill(&missing);

        for message in batch {
            let vector = message
                .embedding
                .as_deref()
                .or_else(|| backfilled.get(&message.id).map(Vec::as_slice));
            let Some(vector) = vector else {
                if message.content.is_some() && !self.vector_index.contains(message.id) {
                    result.skipped += 1;
                }
                continue;
            };

            match self.vector_index.insert(message, vector) {
                Ok(true) => result.vector_indexed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Skipping vector for message {}: {}", message.id, e);
                    result.skipped += 1;
                }
            }
        }

        for (id, vector) in &backfilled {
            self.database.set_message_embedding(*id, vector)?;
        }
        result.backfilled += backfilled.len();

        Ok(())
    }

    /// Embed `messages`, leaving out any the provider cannot embed
    ///
    /// Blank texts are never sent. A failed batch is retried one message at
    /// a time so a single bad input does not cost the rest of the batch.
    fn backfill(&self, messages: &[&Message]) -> HashMap<i64, Vec<f32>> {
        let mut vectors = HashMap::new();
        let Some(embedder) = &self.embedder else {
            return vectors;
        };

        let embeddable: Vec<(i64, String)> = messages
            .iter()
            .filter_map(|m| {
                let content = m.content.as_deref()?;
                if content.trim().is_empty() {
                    debug!("Message {} has blank content, not embedding", m.id);
                    return None;
                }
                Some((m.id, content.to_string()))
            })
            .collect();
        if embeddable.is_empty() {
            return vectors;
        }

        let texts: Vec<String> = embeddable.iter().map(|(_, text)| text.clone()).collect();
        match embedder.embed_batch(&texts) {
            Ok(embeddings) if embeddings.len() == embeddable.len() => {
                for ((id, _), embedding) in embeddable.into_iter().zip(embeddings) {
                    vectors.insert(id, embedding);
                }
            }
            Ok(embeddings) => {
                warn!(
                    "Embedding batch returned {} vectors for {} messages, retrying one by one",
                    embeddings.len(),
                    embeddable.len()
                );
                self.embed_each(embedder.as_ref(), embeddable, &mut vectors);
            }
            Err(e) => {
                warn!(
                    "Failed to embed batch of {} message(s), retrying one by one: {}",
                    embeddable.len(),
                    e
                );
                self.embed_each(embedder.as_ref(), embeddable, &mut vectors);
            }
        }
        vectors
    }

    fn embed_each(
        &self,
        embedder: &dyn EmbeddingProvider,
        messages: Vec<(i64, String)>,
        vectors: &mut HashMap<i64, Vec<f32>>,
    ) {
        for (id, text) in messages {
            match embedder.embed(&text) {
                Ok(embedding) => {
                    vectors.insert(id, embedding);
                }
                Err(e) => warn!("Failed to embed message {}: {}", id, e),
            }
        }
    }
}
