//! Schema-constrained text generation
//!
//! The synthesis step only sees [`GenerationCapability`]: a prompt and a JSON
//! schema go in, a JSON value comes out or the call fails.

mod openai;

pub use openai::OpenAiCompatibleGenerator;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generation capability unavailable: {0}")]
    Unavailable(String),

    #[error("Generation request failed: {0}")]
    RequestFailed(String),

    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid generation output: {0}")]
    InvalidOutput(String),
}

/// One structured-output request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub schema_name: String,
    pub schema: Value,
    /// Ask the provider to enforce the schema exactly
    pub strict: bool,
}

#[async_trait]
pub trait GenerationCapability: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<Value, GenerationError>;
}
