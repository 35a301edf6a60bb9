//! OpenAI-compatible chat completions client with JSON-schema output

use super::{GenerationCapability, GenerationError, GenerationRequest};
use crate::config::LlmConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Generator for any endpoint speaking the `/chat/completions` protocol
/// (OpenAI, Groq, OpenRouter, Ollama)
pub struct OpenAiCompatibleGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

impl OpenAiCompatibleGenerator {
    /// Build a generator from configuration. The API key is read from the
    /// environment variable named by `llm.api_key_env`; local providers may
    /// run without one.
    pub fn from_config(config: &LlmConfig, timeout: Duration) -> Result<Self, GenerationError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());

        if api_key.is_none() && config.provider != "ollama" {
            return Err(GenerationError::Unavailable(format!(
                "environment variable {} is not set",
                config.api_key_env
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(&self, request: &GenerationRequest) -> Value {
        json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "user", "content": request.prompt }
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema_name,
                    "schema": request.schema,
                    "strict": request.strict
                }
            }
        })
    }
}

/// Pull the JSON object out of a chat completion response
fn parse_completion(response: ChatResponse) -> Result<Value, GenerationError> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| GenerationError::InvalidOutput("response has no choices".to_string()))?;

    if let Some(refusal) = message.refusal {
        return Err(GenerationError::InvalidOutput(format!(
            "model refused: {}",
            refusal
        )));
    }

    let content = message
        .content
        .ok_or_else(|| GenerationError::InvalidOutput("empty message content".to_string()))?;

    serde_json::from_str(&content)
        .map_err(|e| GenerationError::InvalidOutput(format!("content is not JSON: {}", e)))
}

#[async_trait]
impl GenerationCapability for OpenAiCompatibleGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<Value, GenerationError> {
        let body = self.request_body(&request);
        debug!(
            "Requesting structured output '{}' from {} ({} prompt chars)",
            request.schema_name,
            self.model,
            request.prompt.len()
        );

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status { status, body });
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidOutput(e.to_string()))?;

        parse_completion(completion)
    }
}
