//! Engine facade
//!
//! [`ContextEngine`] wires storage, search, assembly and synthesis together and
//! exposes the two inbound calls: [`ContextEngine::generate_context`] and
//! [`ContextEngine::hybrid_search`].

use crate::config::{Config, ConfigValidator};
use crate::context::{
    estimate_tokens, render_degraded, render_minimal, render_synthesized, ContextResult,
    SynthesisOrchestrator, SynthesisOutcome, TieredContextAssembler,
};
use crate::embedding::{
    provider_from_config, EmbeddingProvider, IndexLoader, KeywordIndex, LoadResult, VectorIndex,
};
use crate::error::{RapportError, Result};
use crate::llm::{GenerationCapability, OpenAiCompatibleGenerator};
use crate::retrieval::{HybridSearcher, KeywordSearch, SearchRequest, SearchResponse, VectorSearch};
use crate::storage::{ContextStore, Database};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Components for [`ContextEngine::new`]
pub struct EngineParts {
    pub config: Config,
    pub store: Arc<dyn ContextStore>,
    pub embedding_provider: Arc<dyn EmbeddingProvider>,
    pub keyword_search: Arc<dyn KeywordSearch>,
    pub vector_search: Arc<dyn VectorSearch>,
    /// Synthesis is skipped when absent
    pub generator: Option<Arc<dyn GenerationCapability>>,
}

pub struct ContextEngine {
    config: Config,
    searcher: Arc<HybridSearcher>,
    assembler: TieredContextAssembler,
    orchestrator: SynthesisOrchestrator,
    load_result: Option<LoadResult>,
}

impl ContextEngine {
    /// Open the engine from configuration
    ///
    /// Opens the SQLite store under `storage.data_dir`, the keyword index and
    /// an in-memory vector index, then loads both indexes from the store.
    /// Blocking; call it before serving requests or from a blocking task.
    pub fn open(config: Config) -> Result<Self> {
        ConfigValidator::validate(&config)?;

        let data_dir = config.storage.resolved_data_dir();
        std::fs::create_dir_all(&data_dir).map_err(|e| RapportError::Io {
            source: e,
            context: format!("Failed to create data directory: {:?}", data_dir),
        })?;

        let database = Database::new(&config.storage.database_path())?;

        let provider = provider_from_config(&config.embedding)
            .map_err(|e| RapportError::Config(format!("Embedding provider: {}", e)))?;
        if provider.dimension() != config.embedding.dimension {
            warn!(
                "Model {} produces {}D vectors, overriding embedding.dimension = {}",
                provider.model_name(),
                provider.dimension(),
                config.embedding.dimension
            );
        }

        let keyword_index = Arc::new(
            KeywordIndex::new(
                config.storage.keyword_index_path(),
                &config.indexing.language,
                config.indexing.highlight_chars,
            )
            .map_err(|e| RapportError::Index(e.to_string()))?,
        );
        let vector_index = Arc::new(
            VectorIndex::new(
                provider.dimension(),
                config.indexing.hnsw_ef_construction,
                config.indexing.hnsw_m,
                config.indexing.hnsw_ef_search,
            )
            .with_filtered_overfetch(config.retrieval.filtered_overfetch),
        );

        let mut loader = IndexLoader::new(
            database.clone(),
            Arc::clone(&keyword_index),
            Arc::clone(&vector_index),
            config.embedding.batch_size,
        );
        // Random vectors are never written back as if they were real embeddings
        if !provider.is_random() {
            loader = loader.with_embedder(Arc::clone(&provider));
        }
        let load_result = loader.load()?;

        let generator = if config.llm.enabled {
            match OpenAiCompatibleGenerator::from_config(&config.llm, config.llm_timeout()?) {
                Ok(generator) => Some(Arc::new(generator) as Arc<dyn GenerationCapability>),
                Err(e) => {
                    warn!("LLM synthesis disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let mut engine = Self::new(EngineParts {
            config,
            store: Arc::new(database),
            embedding_provider: provider,
            keyword_search: keyword_index,
            vector_search: vector_index,
            generator,
        })?;
        engine.load_result = Some(load_result);

        info!("Context engine ready (data dir {:?})", data_dir);

        Ok(engine)
    }

    /// Build the engine from explicit components
    pub fn new(parts: EngineParts) -> Result<Self> {
        ConfigValidator::validate(&parts.config)?;

        let embedding_timeout = parts.config.embedding_timeout()?;
        let llm_timeout = parts.config.llm_timeout()?;

        let searcher = Arc::new(
            HybridSearcher::new(
                parts.embedding_provider,
                parts.keyword_search,
                parts.vector_search,
                &parts.config.retrieval,
                embedding_timeout,
            )
            .map_err(|e| RapportError::Config(e.to_string()))?,
        );

        let assembler = TieredContextAssembler::new(
            parts.store,
            Some(Arc::clone(&searcher)),
            parts.config.context.clone(),
        );
        let orchestrator = SynthesisOrchestrator::new(parts.generator, llm_timeout);

        Ok(Self {
            config: parts.config,
            searcher,
            assembler,
            orchestrator,
            load_result: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Outcome of the index load performed by [`ContextEngine::open`]
    pub fn load_result(&self) -> Option<&LoadResult> {
        self.load_result.as_ref()
    }

    /// Build the context artifact for a subject
    ///
    /// The only error a caller sees is [`RapportError::SubjectNotFound`] (or
    /// the store being unable to look the subject up at all). Tier and
    /// synthesis failures degrade the result instead.
    pub async fn generate_context(
        &self,
        subject_id: Uuid,
        task_hint: Option<&str>,
    ) -> Result<ContextResult> {
        self.generate_context_at(subject_id, task_hint, Utc::now())
            .await
    }

    /// [`ContextEngine::generate_context`] with a pinned clock
    pub async fn generate_context_at(
        &self,
        subject_id: Uuid,
        task_hint: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ContextResult> {
        let bundle = self
            .assembler
            .build_context_at(subject_id, task_hint, now)
            .await?;
        let tier_counts = bundle.tier_counts();

        let (context_markdown, synthesized_context) = if bundle.subject.is_bot {
            (render_minimal(&bundle.subject), None)
        } else {
            match self.orchestrator.synthesize(&bundle).await {
                SynthesisOutcome::Synthesized(context) => {
                    (render_synthesized(&bundle.subject, &context), Some(context))
                }
                SynthesisOutcome::Degraded(_) => (render_degraded(&bundle), None),
            }
        };

        let token_estimate = estimate_tokens(&context_markdown);
        info!(
            "Generated context for {} ({} tier items, ~{} tokens, synthesized: {})",
            subject_id,
            tier_counts.total(),
            token_estimate,
            synthesized_context.is_some()
        );

        Ok(ContextResult {
            subject_id,
            subject_name: bundle.subject.name,
            context_markdown,
            synthesized_context,
            tier_counts,
            token_estimate,
            generated_at: now,
        })
    }

    /// Search messages; provider failures reduce results rather than erroring
    pub async fn hybrid_search(&self, request: &SearchRequest) -> SearchResponse {
        let limit = request
            .limit
            .unwrap_or(self.config.retrieval.default_limit);
        let results = self
            .searcher
            .search(&request.query, &request.filter(), limit, request.mode)
            .await;

        SearchResponse::new(results, request.mode)
    }
}
