//! LLM synthesis of a context bundle
//!
//! The bundle is rendered into one prompt in a fixed section order and sent
//! with a strict JSON schema. Anything other than a well-formed result is a
//! degraded outcome, never an error.

use super::ContextBundle;
use crate::llm::{GenerationCapability, GenerationError, GenerationRequest};
use crate::models::{truncate_chars, Importance};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const CONTEXT_SCHEMA_NAME: &str = "entity_context";

/// Longest message excerpt placed in the prompt
const PROMPT_MESSAGE_CHARS: usize = 500;

/// Structured narrative produced by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SynthesizedContext {
    pub current_status: String,
    pub recent_context: Vec<String>,
    pub key_facts: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Why synthesis fell back to direct rendering
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DegradeReason {
    #[error("synthesis disabled")]
    Disabled,

    #[error("generation unavailable: {0}")]
    Unavailable(String),

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid generation output: {0}")]
    InvalidOutput(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisOutcome {
    Synthesized(SynthesizedContext),
    Degraded(DegradeReason),
}

/// JSON schema for [`SynthesizedContext`], passed to the provider unchanged
pub fn context_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "currentStatus": {
                "type": "string",
                "minLength": 10,
                "description": "Where the relationship stands right now, in one or two sentences"
            },
            "recentContext": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Notable recent events and open threads"
            },
            "keyFacts": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Facts worth remembering before the next interaction"
            },
            "recommendations": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Concrete suggestions for the task at hand"
            }
        },
        "required": ["currentStatus", "recentContext", "keyFacts", "recommendations"],
        "additionalProperties": false
    })
}

/// Render the bundle into the synthesis prompt
///
/// Section order: entity header, task hint (if any), permanent, cold, warm,
/// hot, relevant, then the output instruction.
pub fn build_prompt(bundle: &ContextBundle) -> String {
    let mut prompt = String::new();

    // Entity header
    prompt.push_str(&format!("# Entity: {}\n", bundle.subject.name));
    if let Some(org) = &bundle.subject.organization_name {
        prompt.push_str(&format!("Organization: {}\n", org));
    }
    prompt.push_str(&format!(
        "Context assembled at {}\n",
        bundle.assembled_at.format("%Y-%m-%d %H:%M UTC")
    ));

    if let Some(hint) = &bundle.task_hint {
        prompt.push_str(&format!("\n## Task\n{}\n", hint));
    }

    prompt.push_str("\n## Known facts\n");
    if bundle.permanent.is_empty() {
        prompt.push_str("(none)\n");
    }
    for fact in &bundle.permanent {
        prompt.push_str(&format!("- {}: {}", fact.fact_type, fact.display_value()));
        if let Some(confidence) = fact.confidence {
            prompt.push_str(&format!(" (confidence {:.2})", confidence));
        }
        prompt.push('\n');
    }

    prompt.push_str("\n## Relationship profile\n");
    match &bundle.cold {
        None => prompt.push_str("(none)\n"),
        Some(profile) => {
            prompt.push_str(&format!(
                "Type: {}\nFrequency: {}\nSummary: {}\n",
                profile.relationship_type,
                profile.communication_frequency,
                profile.relationship_summary
            ));
            for milestone in &profile.milestones {
                prompt.push_str(&format!("- Milestone: {}\n", milestone));
            }
            for decision in &profile.key_decisions {
                prompt.push_str(&format!("- Key decision: {}\n", decision));
            }
        }
    }

    prompt.push_str(&format!(
        "\n## Interaction summaries ({} to {} days ago)\n",
        bundle.hot_tier_days, bundle.warm_tier_days
    ));
    if bundle.warm.is_empty() {
        prompt.push_str("(none)\n");
    }
    for summary in &bundle.warm {
        prompt.push_str(&format!(
            "- [{}] {}\n",
            summary.created_at.format("%Y-%m-%d"),
            summary.summary
        ));
        for point in &summary.key_points {
            prompt.push_str(&format!("  - {}\n", point));
        }
        for decision in &summary.decisions {
            let marker = if decision.importance == Importance::High {
                "Decision (high)"
            } else {
                "Decision"
            };
            prompt.push_str(&format!("  - {}: {}\n", marker, decision.description));
        }
        for item in &summary.action_items {
            prompt.push_str(&format!("  - Action: {}", item.description));
            if let Some(owner) = &item.owner {
                prompt.push_str(&format!(" (owner: {})", owner));
            }
            prompt.push('\n');
        }
    }

    prompt.push_str(&format!(
        "\n## Recent communication (last {} days)\n",
        bundle.hot_tier_days
    ));
    if bundle.hot.is_empty() {
        prompt.push_str("(none)\n");
    }
    for message in &bundle.hot.messages {
        let sender = match (&message.sender_name, message.is_outgoing) {
            (_, true) => "Me",
            (Some(name), false) => name.as_str(),
            (None, false) => "Unknown",
        };
        let content = message.content.as_deref().unwrap_or("[media]");
        prompt.push_str(&format!(
            "[{}] {}: {}\n",
            message.timestamp.format("%Y-%m-%d %H:%M"),
            sender,
            truncate_chars(content, PROMPT_MESSAGE_CHARS)
        ));
    }
    for segment in &bundle.hot.segments {
        prompt.push_str(&format!(
            "[{} call] {}: {}\n",
            segment.timestamp.format("%Y-%m-%d %H:%M"),
            segment.speaker,
            truncate_chars(&segment.content, PROMPT_MESSAGE_CHARS)
        ));
    }

    prompt.push_str("\n## Relevant excerpts\n");
    if bundle.relevant.is_empty() {
        prompt.push_str("(none)\n");
    }
    for hit in &bundle.relevant {
        prompt.push_str(&format!(
            "- [{}] {}\n",
            hit.timestamp.format("%Y-%m-%d"),
            hit.preview(PROMPT_MESSAGE_CHARS)
        ));
    }

    prompt.push_str(
        "\n## Output\n\
         Using only the information above, respond with a JSON object with the fields \
         currentStatus (string, at least 10 characters), recentContext (array of strings), \
         keyFacts (array of strings) and recommendations (array of strings). \
         Do not invent facts that are not supported above.\n",
    );

    prompt
}

/// Runs synthesis against an optional generation capability
pub struct SynthesisOrchestrator {
    generator: Option<Arc<dyn GenerationCapability>>,
    timeout: Duration,
}

impl SynthesisOrchestrator {
    /// With no generator every call degrades with [`DegradeReason::Disabled`]
    pub fn new(generator: Option<Arc<dyn GenerationCapability>>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    pub fn is_enabled(&self) -> bool {
        self.generator.is_some()
    }

    pub async fn synthesize(&self, bundle: &ContextBundle) -> SynthesisOutcome {
        let Some(generator) = &self.generator else {
            return SynthesisOutcome::Degraded(DegradeReason::Disabled);
        };

        let request = GenerationRequest {
            prompt: build_prompt(bundle),
            schema_name: CONTEXT_SCHEMA_NAME.to_string(),
            schema: context_schema(),
            strict: true,
        };
        debug!(
            "Synthesizing context for {} ({} prompt chars)",
            bundle.subject.id,
            request.prompt.len()
        );

        let reason = match tokio::time::timeout(self.timeout, generator.generate(request)).await {
            Ok(Ok(value)) => match serde_json::from_value::<SynthesizedContext>(value) {
                Ok(context) => return SynthesisOutcome::Synthesized(context),
                Err(e) => DegradeReason::InvalidOutput(e.to_string()),
            },
            Ok(Err(GenerationError::InvalidOutput(message))) => {
                DegradeReason::InvalidOutput(message)
            }
            Ok(Err(e)) => DegradeReason::Unavailable(e.to_string()),
            Err(_) => DegradeReason::Timeout(self.timeout),
        };

        warn!(
            "Context synthesis degraded for {}: {}",
            bundle.subject.id, reason
        );
        SynthesisOutcome::Degraded(reason)
    }
}
