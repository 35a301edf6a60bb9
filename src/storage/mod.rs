//! Storage layer for rapport
//!
//! The context assembler reads through [`ContextStore`]; [`Database`] is the
//! SQLite implementation.

pub mod database;

use crate::error::Result;
use crate::models::{Fact, InteractionSummary, Message, RelationshipProfile, Subject, TranscriptSegment};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use database::{decode_embedding, encode_embedding, Database, DbPool, DbStats};

/// Read access needed to assemble context tiers.
///
/// Implementations are blocking; the assembler runs them on the blocking pool.
pub trait ContextStore: Send + Sync {
    fn subject(&self, id: Uuid) -> Result<Option<Subject>>;

    /// Facts with no `valid_until`, newest first
    fn current_facts(&self, subject_id: Uuid) -> Result<Vec<Fact>>;

    /// Non-archived messages with `timestamp >= since`, newest first
    fn recent_messages(
        &self,
        subject_id: Uuid,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Message>>;

    /// Transcript segments with `timestamp >= since`, newest first
    fn recent_segments(
        &self,
        subject_id: Uuid,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TranscriptSegment>>;

    /// Summaries with `after < created_at <= until`, newest first
    fn summaries_between(
        &self,
        subject_id: Uuid,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<InteractionSummary>>;

    fn relationship_profile(&self, subject_id: Uuid) -> Result<Option<RelationshipProfile>>;
}

impl ContextStore for Database {
    fn subject(&self, id: Uuid) -> Result<Option<Subject>> {
        self.get_subject(id)
    }

    fn current_facts(&self, subject_id: Uuid) -> Result<Vec<Fact>> {
        Database::current_facts(self, subject_id)
    }

    fn recent_messages(
        &self,
        subject_id: Uuid,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Message>> {
        Database::recent_messages(self, subject_id, since, limit)
    }

    fn recent_segments(
        &self,
        subject_id: Uuid,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TranscriptSegment>> {
        Database::recent_segments(self, subject_id, since, limit)
    }

    fn summaries_between(
        &self,
        subject_id: Uuid,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<InteractionSummary>> {
        Database::summaries_between(self, subject_id, after, until, limit)
    }

    fn relationship_profile(&self, subject_id: Uuid) -> Result<Option<RelationshipProfile>> {
        Database::relationship_profile(self, subject_id)
    }
}
