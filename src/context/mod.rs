//! Tiered context assembly and synthesis
//!
//! A [`ContextBundle`] groups what is known about a subject into five tiers:
//!
//! - **Permanent**: current facts
//! - **Hot**: recent messages and call transcript segments
//! - **Warm**: interaction summaries older than the hot window
//! - **Cold**: the long-term relationship profile
//! - **Relevant**: hybrid search hits for the task hint
//!
//! The bundle is turned into markdown either through LLM synthesis or, when
//! that is unavailable, by rendering the tiers directly.

mod assembler;
mod markdown;
mod synthesis;

pub use assembler::TieredContextAssembler;
pub use markdown::{estimate_tokens, render_degraded, render_minimal, render_synthesized};
pub use synthesis::{
    build_prompt, context_schema, DegradeReason, SynthesisOrchestrator, SynthesisOutcome,
    SynthesizedContext, CONTEXT_SCHEMA_NAME,
};

use crate::models::{
    Fact, InteractionSummary, Message, RelationshipProfile, SearchResult, Subject,
    TranscriptSegment,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recent communication, in chronological order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HotTier {
    pub messages: Vec<Message>,
    pub segments: Vec<TranscriptSegment>,
}

impl HotTier {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.segments.is_empty()
    }
}

/// Everything assembled for one subject. Built per request, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub subject: Subject,
    pub task_hint: Option<String>,
    /// Current facts, newest first
    pub permanent: Vec<Fact>,
    pub hot: HotTier,
    /// Summaries newest first, decisions narrowed to high importance
    pub warm: Vec<InteractionSummary>,
    /// Relationship profile with capped milestone and decision lists
    pub cold: Option<RelationshipProfile>,
    pub relevant: Vec<SearchResult>,
    /// Reference time the tier windows were computed from
    pub assembled_at: DateTime<Utc>,
    /// Hot window length used for this bundle
    pub hot_tier_days: i64,
    /// Warm window length used for this bundle
    pub warm_tier_days: i64,
}

impl ContextBundle {
    /// Bundle with no tiers, used for bots
    pub fn minimal(subject: Subject, task_hint: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            subject,
            task_hint,
            permanent: Vec::new(),
            hot: HotTier::default(),
            warm: Vec::new(),
            cold: None,
            relevant: Vec::new(),
            assembled_at: now,
            hot_tier_days: 0,
            warm_tier_days: 0,
        }
    }

    pub fn tier_counts(&self) -> TierCounts {
        TierCounts {
            hot_messages: self.hot.messages.len(),
            hot_segments: self.hot.segments.len(),
            warm_summaries: self.warm.len(),
            cold_decisions: self
                .cold
                .as_ref()
                .map_or(0, |profile| profile.key_decisions.len()),
            relevant_chunks: self.relevant.len(),
            facts_included: self.permanent.len(),
        }
    }

    /// True when no tier holds anything
    pub fn is_empty(&self) -> bool {
        self.permanent.is_empty()
            && self.hot.is_empty()
            && self.warm.is_empty()
            && self.cold.is_none()
            && self.relevant.is_empty()
    }
}

/// Per-tier item counts reported with every context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierCounts {
    pub hot_messages: usize,
    pub hot_segments: usize,
    pub warm_summaries: usize,
    pub cold_decisions: usize,
    pub relevant_chunks: usize,
    pub facts_included: usize,
}

impl TierCounts {
    pub fn total(&self) -> usize {
        self.hot_messages
            + self.hot_segments
            + self.warm_summaries
            + self.cold_decisions
            + self.relevant_chunks
            + self.facts_included
    }
}

/// Final artifact returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextResult {
    pub subject_id: Uuid,
    pub subject_name: String,
    pub context_markdown: String,
    pub synthesized_context: Option<SynthesizedContext>,
    pub tier_counts: TierCounts,
    /// Rough size of `context_markdown` in tokens (chars / 4)
    pub token_estimate: usize,
    pub generated_at: DateTime<Utc>,
}

impl ContextResult {
    pub fn is_synthesized(&self) -> bool {
        self.synthesized_context.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResultKind;

    #[test]
    fn test_minimal_bundle_counts_are_zero() {
        let bundle = ContextBundle::minimal(Subject::bot("Reminder Bot"), None, Utc::now());
        assert!(bundle.is_empty());
        assert_eq!(bundle.tier_counts(), TierCounts::default());
        assert_eq!(bundle.tier_counts().total(), 0);
    }

    #[test]
    fn test_tier_counts() {
        let subject = Subject::new("Ana");
        let mut bundle = ContextBundle::minimal(subject.clone(), None, Utc::now());
        bundle.cold = Some(RelationshipProfile {
            subject_id: subject.id,
            relationship_type: "client".to_string(),
            communication_frequency: "weekly".to_string(),
            relationship_summary: "Long-term client".to_string(),
            milestones: vec!["first deal".to_string()],
            key_decisions: vec!["annual billing".to_string(), "EU hosting".to_string()],
            updated_at: Utc::now(),
        });
        bundle.relevant.push(SearchResult {
            id: 1,
            kind: ResultKind::Message,
            content: "hi".to_string(),
            timestamp: Utc::now(),
            entity_id: Some(subject.id),
            interaction_id: Uuid::new_v4(),
            score: 0.1,
            highlight: None,
        });

        let counts = bundle.tier_counts();
        assert_eq!(counts.cold_decisions, 2);
        assert_eq!(counts.relevant_chunks, 1);
        assert_eq!(counts.total(), 3);
        assert!(!bundle.is_empty());
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = ContextResult {
            subject_id: Uuid::nil(),
            subject_name: "Ana".to_string(),
            context_markdown: "# Ana".to_string(),
            synthesized_context: None,
            tier_counts: TierCounts::default(),
            token_estimate: 2,
            generated_at: Utc::now(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["subjectName"], "Ana");
        assert_eq!(json["tokenEstimate"], 2);
        assert_eq!(json["tierCounts"]["hotMessages"], 0);
        assert_eq!(json["tierCounts"]["factsIncluded"], 0);
        assert!(json["synthesizedContext"].is_null());
    }
}
