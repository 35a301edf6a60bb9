//! Rapport - Hybrid Retrieval & Tiered Context Synthesis
//!
//! Answers "what do we currently know about this person, relevant to a task?"
//! by combining full-text search, vector similarity search and time-bucketed
//! aggregation of communication history into one ranked, size-bounded context
//! artifact, optionally refined by a structured-output LLM call.

pub mod config;
pub mod context;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod llm;
pub mod logging;
pub mod models;
pub mod retrieval;
pub mod storage;

pub use config::Config;
pub use context::{ContextBundle, ContextResult, SynthesizedContext, TierCounts};
pub use engine::{ContextEngine, EngineParts};
pub use error::{RapportError, Result};
pub use retrieval::{SearchMode, SearchRequest, SearchResponse};
