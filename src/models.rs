//! Read-side data model
//!
//! Subjects, facts, communication history and the aggregates built on top of
//! them. Upstream ingestion owns these records; the engine only reads them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The person or organization a context is built for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: Uuid,
    pub name: String,
    /// Bots get a minimal context without any tier fetch
    pub is_bot: bool,
    pub organization_id: Option<Uuid>,
    /// Display name of the linked organization, if any
    pub organization_name: Option<String>,
}

impl Subject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_bot: false,
            organization_id: None,
            organization_name: None,
        }
    }

    pub fn bot(name: impl Into<String>) -> Self {
        Self {
            is_bot: true,
            ..Self::new(name)
        }
    }
}

/// An atomic, typed statement about a subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: i64,
    pub subject_id: Uuid,
    pub fact_type: String,
    pub value: Option<String>,
    pub value_date: Option<DateTime<Utc>>,
    pub valid_from: Option<DateTime<Utc>>,
    /// Facts with this set are historical and never feed synthesis
    pub valid_until: Option<DateTime<Utc>>,
    pub confidence: Option<f32>,
    pub created_at: DateTime<Utc>,
}

impl Fact {
    pub fn is_current(&self) -> bool {
        self.valid_until.is_none()
    }

    /// Human readable value, preferring the textual value over the date
    pub fn display_value(&self) -> String {
        match (&self.value, &self.value_date) {
            (Some(value), _) => value.clone(),
            (None, Some(date)) => date.format("%Y-%m-%d").to_string(),
            (None, None) => String::from("(unknown)"),
        }
    }
}

/// Kind of interaction a message or segment belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Chat,
    Call,
    Meeting,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Chat => "chat",
            InteractionKind::Call => "call",
            InteractionKind::Meeting => "meeting",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "chat" => Some(InteractionKind::Chat),
            "call" => Some(InteractionKind::Call),
            "meeting" => Some(InteractionKind::Meeting),
            _ => None,
        }
    }
}

/// A conversation thread or call with its participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: Uuid,
    pub kind: InteractionKind,
    pub started_at: DateTime<Utc>,
    pub participants: Vec<Uuid>,
}

/// A timestamped unit of written communication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub interaction_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub sender_name: Option<String>,
    /// None for media-only messages
    pub content: Option<String>,
    pub is_outgoing: bool,
    pub timestamp: DateTime<Utc>,
    pub is_archived: bool,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

/// A spoken turn from a call transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub id: i64,
    pub interaction_id: Uuid,
    pub speaker: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Importance of a recorded decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub description: String,
    pub importance: Importance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub description: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
}

/// Compressed record of one interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionSummary {
    pub id: i64,
    pub interaction_id: Uuid,
    pub summary: String,
    pub key_points: Vec<String>,
    pub decisions: Vec<Decision>,
    pub action_items: Vec<ActionItem>,
    pub created_at: DateTime<Utc>,
}

/// Long-lived aggregate describing the relationship with a subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipProfile {
    pub subject_id: Uuid,
    pub relationship_type: String,
    pub communication_frequency: String,
    pub relationship_summary: String,
    pub milestones: Vec<String>,
    pub key_decisions: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// What a search hit points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Message,
}

/// Uniform output of both search providers and of fusion.
///
/// `score` is always higher-is-better: BM25 relevance, cosine similarity or
/// fused RRF score depending on where the result came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: i64,
    pub kind: ResultKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub entity_id: Option<Uuid>,
    pub interaction_id: Uuid,
    pub score: f32,
    pub highlight: Option<String>,
}

impl SearchResult {
    /// Get a short preview of the content (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        truncate_chars(&self.content, max_chars)
    }
}

/// Inclusive time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Period {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.from && ts <= self.to
    }
}

/// Conjunctive filters shared by both search providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilter {
    /// Restrict to messages sent by this entity
    pub entity_id: Option<Uuid>,
    pub period: Option<Period>,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        self.entity_id.is_none() && self.period.is_none()
    }

    pub fn matches(&self, sender_id: Option<Uuid>, timestamp: DateTime<Utc>) -> bool {
        let entity_ok = match self.entity_id {
            Some(entity) => sender_id == Some(entity),
            None => true,
        };
        let period_ok = self.period.map_or(true, |p| p.contains(timestamp));
        entity_ok && period_ok
    }
}

/// Truncate on a char boundary, appending "..." when anything was cut
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
