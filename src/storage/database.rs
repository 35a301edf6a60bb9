//! SQLite database management with migrations
//!
//! Structured storage for subjects, facts, communication history and the
//! summaries derived from it. All tier queries used by the context assembler
//! live here.

use crate::error::{RapportError, Result};
use crate::models::{
    Fact, Interaction, InteractionSummary, Message, RelationshipProfile, Subject,
    TranscriptSegment,
};
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use std::path::Path;
use uuid::Uuid;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database manager with migration support
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Create a new database connection
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RapportError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        // Every pooled connection gets the same pragmas
        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder().max_size(16).build(manager)?;

        {
            let conn = pool.get()?;
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                ",
            )?;
        }

        let db = Self { pool };

        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);

                conn.execute_batch(migration)?;

                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.get_conn()?;

        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(DbStats {
            subject_count: count("SELECT COUNT(*) FROM subjects")?,
            fact_count: count("SELECT COUNT(*) FROM facts")?,
            message_count: count("SELECT COUNT(*) FROM messages")?,
            embedded_message_count: count(
                "SELECT COUNT(*) FROM messages WHERE embedding IS NOT NULL",
            )?,
            summary_count: count("SELECT COUNT(*) FROM interaction_summaries")?,
        })
    }

    // ----------------------------------------------------------------------
    // Reads
    // ----------------------------------------------------------------------

    /// Look up a subject with its linked organization name
    pub fn get_subject(&self, id: Uuid) -> Result<Option<Subject>> {
        let conn = self.get_conn()?;
        let subject = conn
            .query_row(
                "SELECT s.id, s.name, s.is_bot, s.organization_id, o.name
                 FROM subjects s
                 LEFT JOIN subjects o ON o.id = s.organization_id
                 WHERE s.id = ?1",
                params![id.to_string()],
                |row| {
                    Ok(Subject {
                        id: uuid_column(row, 0)?,
                        name: row.get(1)?,
                        is_bot: row.get(2)?,
                        organization_id: opt_uuid_column(row, 3)?,
                        organization_name: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(subject)
    }

    /// Facts without `valid_until`, newest first
    pub fn current_facts(&self, subject_id: Uuid) -> Result<Vec<Fact>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, subject_id, fact_type, value, value_date, valid_from, valid_until,
                    confidence, created_at
             FROM facts
             WHERE subject_id = ?1 AND valid_until IS NULL
             ORDER BY created_at DESC, id DESC",
        )?;
        let facts = stmt
            .query_map(params![subject_id.to_string()], fact_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(facts)
    }

    /// Non-archived messages from the subject's interactions with
    /// `timestamp >= since`, newest first
    pub fn recent_messages(
        &self,
        subject_id: Uuid,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT m.id, m.interaction_id, m.sender_id, snd.name, m.content, m.is_outgoing,
                    m.timestamp, m.is_archived, NULL
             FROM messages m
             JOIN interaction_participants p ON p.interaction_id = m.interaction_id
             LEFT JOIN subjects snd ON snd.id = m.sender_id
             WHERE p.subject_id = ?1 AND m.is_archived = 0 AND m.timestamp >= ?2
             ORDER BY m.timestamp DESC, m.id DESC
             LIMIT ?3",
        )?;
        let messages = stmt
            .query_map(
                params![subject_id.to_string(), to_millis(since), limit as i64],
                message_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    /// Transcript segments from the subject's interactions with
    /// `timestamp >= since`, newest first
    pub fn recent_segments(
        &self,
        subject_id: Uuid,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TranscriptSegment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT t.id, t.interaction_id, t.speaker, t.content, t.timestamp
             FROM transcript_segments t
             JOIN interaction_participants p ON p.interaction_id = t.interaction_id
             WHERE p.subject_id = ?1 AND t.timestamp >= ?2
             ORDER BY t.timestamp DESC, t.id DESC
             LIMIT ?3",
        )?;
        let segments = stmt
            .query_map(
                params![subject_id.to_string(), to_millis(since), limit as i64],
                |row| {
                    Ok(TranscriptSegment {
                        id: row.get(0)?,
                        interaction_id: uuid_column(row, 1)?,
                        speaker: row.get(2)?,
                        content: row.get(3)?,
                        timestamp: from_millis(row.get(4)?),
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(segments)
    }

    /// Summaries with `after < created_at <= until`, newest first
    pub fn summaries_between(
        &self,
        subject_id: Uuid,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<InteractionSummary>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.interaction_id, s.summary, s.key_points, s.decisions,
                    s.action_items, s.created_at
             FROM interaction_summaries s
             JOIN interaction_participants p ON p.interaction_id = s.interaction_id
             WHERE p.subject_id = ?1 AND s.created_at > ?2 AND s.created_at <= ?3
             ORDER BY s.created_at DESC, s.id DESC
             LIMIT ?4",
        )?;
        let summaries = stmt
            .query_map(
                params![
                    subject_id.to_string(),
                    to_millis(after),
                    to_millis(until),
                    limit as i64
                ],
                |row| {
                    Ok(InteractionSummary {
                        id: row.get(0)?,
                        interaction_id: uuid_column(row, 1)?,
                        summary: row.get(2)?,
                        key_points: json_column(row, 3)?,
                        decisions: json_column(row, 4)?,
                        action_items: json_column(row, 5)?,
                        created_at: from_millis(row.get(6)?),
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(summaries)
    }

    pub fn relationship_profile(&self, subject_id: Uuid) -> Result<Option<RelationshipProfile>> {
        let conn = self.get_conn()?;
        let profile = conn
            .query_row(
                "SELECT subject_id, relationship_type, communication_frequency,
                        relationship_summary, milestones, key_decisions, updated_at
                 FROM relationship_profiles
                 WHERE subject_id = ?1",
                params![subject_id.to_string()],
                |row| {
                    Ok(RelationshipProfile {
                        subject_id: uuid_column(row, 0)?,
                        relationship_type: row.get(1)?,
                        communication_frequency: row.get(2)?,
                        relationship_summary: row.get(3)?,
                        milestones: json_column(row, 4)?,
                        key_decisions: json_column(row, 5)?,
                        updated_at: from_millis(row.get(6)?),
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    /// Messages with content and id greater than `after_id`, oldest id first.
    /// Used to (re)build the search indexes in batches.
    pub fn messages_for_indexing(&self, after_id: i64, limit: usize) -> Result<Vec<Message>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT m.id, m.interaction_id, m.sender_id, snd.name, m.content, m.is_outgoing,
                    m.timestamp, m.is_archived, m.embedding
             FROM messages m
             LEFT JOIN subjects snd ON snd.id = m.sender_id
             WHERE m.id > ?1 AND m.content IS NOT NULL
             ORDER BY m.id ASC
             LIMIT ?2",
        )?;
        let messages = stmt
            .query_map(params![after_id, limit as i64], message_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    // ----------------------------------------------------------------------
    // Writes (host-side ingestion and tests; the engine never calls these)
    // ----------------------------------------------------------------------

    pub fn insert_subject(&self, subject: &Subject) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO subjects (id, name, is_bot, organization_id) VALUES (?1, ?2, ?3, ?4)",
            params![
                subject.id.to_string(),
                subject.name,
                subject.is_bot,
                subject.organization_id.map(|id| id.to_string())
            ],
        )?;
        Ok(())
    }

    /// Insert a fact, returning its row id (the `id` field is ignored)
    pub fn insert_fact(&self, fact: &Fact) -> Result<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO facts (subject_id, fact_type, value, value_date, valid_from,
                                valid_until, confidence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                fact.subject_id.to_string(),
                fact.fact_type,
                fact.value,
                fact.value_date.map(to_millis),
                fact.valid_from.map(to_millis),
                fact.valid_until.map(to_millis),
                fact.confidence,
                to_millis(fact.created_at)
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_interaction(&self, interaction: &Interaction) -> Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO interactions (id, kind, started_at) VALUES (?1, ?2, ?3)",
            params![
                interaction.id.to_string(),
                interaction.kind.as_str(),
                to_millis(interaction.started_at)
            ],
        )?;
        for participant in &interaction.participants {
            tx.execute(
                "INSERT INTO interaction_participants (interaction_id, subject_id) VALUES (?1, ?2)",
                params![interaction.id.to_string(), participant.to_string()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Insert a message, returning its row id (the `id` field is ignored)
    pub fn insert_message(&self, message: &Message) -> Result<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO messages (interaction_id, sender_id, content, is_outgoing, timestamp,
                                   is_archived, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.interaction_id.to_string(),
                message.sender_id.map(|id| id.to_string()),
                message.content,
                message.is_outgoing,
                to_millis(message.timestamp),
                message.is_archived,
                message.embedding.as_deref().map(encode_embedding)
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Store a backfilled embedding for a message
    pub fn set_message_embedding(&self, message_id: i64, vector: &[f32]) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE messages SET embedding = ?1 WHERE id = ?2",
            params![encode_embedding(vector), message_id],
        )?;
        Ok(())
    }

    pub fn insert_segment(&self, segment: &TranscriptSegment) -> Result<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO transcript_segments (interaction_id, speaker, content, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                segment.interaction_id.to_string(),
                segment.speaker,
                segment.content,
                to_millis(segment.timestamp)
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_summary(&self, summary: &InteractionSummary) -> Result<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO interaction_summaries (interaction_id, summary, key_points, decisions,
                                                action_items, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                summary.interaction_id.to_string(),
                summary.summary,
                to_json(&summary.key_points)?,
                to_json(&summary.decisions)?,
                to_json(&summary.action_items)?,
                to_millis(summary.created_at)
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn upsert_profile(&self, profile: &RelationshipProfile) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO relationship_profiles (subject_id, relationship_type,
                 communication_frequency, relationship_summary, milestones, key_decisions,
                 updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(subject_id) DO UPDATE SET
                 relationship_type = excluded.relationship_type,
                 communication_frequency = excluded.communication_frequency,
                 relationship_summary = excluded.relationship_summary,
                 milestones = excluded.milestones,
                 key_decisions = excluded.key_decisions,
                 updated_at = excluded.updated_at",
            params![
                profile.subject_id.to_string(),
                profile.relationship_type,
                profile.communication_frequency,
                profile.relationship_summary,
                to_json(&profile.milestones)?,
                to_json(&profile.key_decisions)?,
                to_millis(profile.updated_at)
            ],
        )?;
        Ok(())
    }
}

/// Database statistics
#[derive(Debug)]
pub struct DbStats {
    pub subject_count: usize,
    pub fact_count: usize,
    pub message_count: usize,
    pub embedded_message_count: usize,
    pub summary_count: usize,
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| RapportError::Json {
        source: e,
        context: "Failed to encode JSON column".to_string(),
    })
}

fn conversion_error(
    idx: usize,
    ty: Type,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, Type::Text, e))
}

fn opt_uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| Uuid::parse_str(&s).map_err(|e| conversion_error(idx, Type::Text, e)))
        .transpose()
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, Type::Text, e))
}

fn fact_from_row(row: &Row<'_>) -> rusqlite::Result<Fact> {
    Ok(Fact {
        id: row.get(0)?,
        subject_id: uuid_column(row, 1)?,
        fact_type: row.get(2)?,
        value: row.get(3)?,
        value_date: row.get::<_, Option<i64>>(4)?.map(from_millis),
        valid_from: row.get::<_, Option<i64>>(5)?.map(from_millis),
        valid_until: row.get::<_, Option<i64>>(6)?.map(from_millis),
        confidence: row.get(7)?,
        created_at: from_millis(row.get(8)?),
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        interaction_id: uuid_column(row, 1)?,
        sender_id: opt_uuid_column(row, 2)?,
        sender_name: row.get(3)?,
        content: row.get(4)?,
        is_outgoing: row.get(5)?,
        timestamp: from_millis(row.get(6)?),
        is_archived: row.get(7)?,
        embedding: row
            .get::<_, Option<Vec<u8>>>(8)?
            .map(|bytes| decode_embedding(&bytes)),
    })
}

/// Embeddings are stored as little-endian f32 blobs
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    CREATE TABLE subjects (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        is_bot BOOLEAN NOT NULL DEFAULT 0,
        organization_id TEXT,
        FOREIGN KEY (organization_id) REFERENCES subjects(id) ON DELETE SET NULL
    );

    CREATE TABLE facts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        subject_id TEXT NOT NULL,
        fact_type TEXT NOT NULL,
        value TEXT,
        value_date INTEGER,
        valid_from INTEGER,
        valid_until INTEGER,
        confidence REAL,
        created_at INTEGER NOT NULL,
        FOREIGN KEY (subject_id) REFERENCES subjects(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_facts_subject_current ON facts(subject_id, valid_until);

    CREATE TABLE interactions (
        id TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        started_at INTEGER NOT NULL
    );

    CREATE TABLE interaction_participants (
        interaction_id TEXT NOT NULL,
        subject_id TEXT NOT NULL,
        PRIMARY KEY (interaction_id, subject_id),
        FOREIGN KEY (interaction_id) REFERENCES interactions(id) ON DELETE CASCADE,
        FOREIGN KEY (subject_id) REFERENCES subjects(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_participants_subject ON interaction_participants(subject_id);

    CREATE TABLE messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        interaction_id TEXT NOT NULL,
        sender_id TEXT,
        content TEXT,
        is_outgoing BOOLEAN NOT NULL DEFAULT 0,
        timestamp INTEGER NOT NULL,
        is_archived BOOLEAN NOT NULL DEFAULT 0,
        embedding BLOB,
        FOREIGN KEY (interaction_id) REFERENCES interactions(id) ON DELETE CASCADE,
        FOREIGN KEY (sender_id) REFERENCES subjects(id) ON DELETE SET NULL
    );

    CREATE INDEX idx_messages_interaction_ts ON messages(interaction_id, timestamp);
    CREATE INDEX idx_messages_sender ON messages(sender_id);

    CREATE TABLE transcript_segments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        interaction_id TEXT NOT NULL,
        speaker TEXT NOT NULL,
        content TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        FOREIGN KEY (interaction_id) REFERENCES interactions(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_segments_interaction_ts ON transcript_segments(interaction_id, timestamp);

    CREATE TABLE interaction_summaries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        interaction_id TEXT NOT NULL,
        summary TEXT NOT NULL,
        key_points TEXT NOT NULL DEFAULT '[]',
        decisions TEXT NOT NULL DEFAULT '[]',
        action_items TEXT NOT NULL DEFAULT '[]',
        created_at INTEGER NOT NULL,
        FOREIGN KEY (interaction_id) REFERENCES interactions(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_summaries_interaction ON interaction_summaries(interaction_id, created_at);

    CREATE TABLE relationship_profiles (
        subject_id TEXT PRIMARY KEY,
        relationship_type TEXT NOT NULL,
        communication_frequency TEXT NOT NULL,
        relationship_summary TEXT NOT NULL,
        milestones TEXT NOT NULL DEFAULT '[]',
        key_decisions TEXT NOT NULL DEFAULT '[]',
        updated_at INTEGER NOT NULL,
        FOREIGN KEY (subject_id) REFERENCES subjects(id) ON DELETE CASCADE
    );
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InteractionKind;
    use chrono::Duration;
    use tempfile::TempDir;

    fn setup() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        (db, temp_dir)
    }

    fn message(interaction_id: Uuid, content: &str, timestamp: DateTime<Utc>) -> Message {
        Message {
            id: 0,
            interaction_id,
            sender_id: None,
            sender_name: None,
            content: Some(content.to_string()),
            is_outgoing: false,
            timestamp,
            is_archived: false,
            embedding: None,
        }
    }

    #[test]
    fn test_migrations() {
        let (db, _temp) = setup();

        let conn = db.get_conn().unwrap();
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM _migrations", [], |row| row.get(0))
            .unwrap();

        assert_eq!(version, MIGRATIONS.len() as i32);
    }

    #[test]
    fn test_reopen_does_not_reapply_migrations() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.db");

        Database::new(&path).unwrap();
        let db = Database::new(&path).unwrap();

        let conn = db.get_conn().unwrap();
        let rows: i32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, MIGRATIONS.len() as i32);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let (db, _temp) = setup();
        let conn = db.get_conn().unwrap();

        let fk_enabled: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();

        assert_eq!(fk_enabled, 1);
    }

    #[test]
    fn test_subject_with_organization() {
        let (db, _temp) = setup();

        let org = Subject::new("Acme Corp");
        let mut person = Subject::new("Alice");
        person.organization_id = Some(org.id);

        db.insert_subject(&org).unwrap();
        db.insert_subject(&person).unwrap();

        let loaded = db.get_subject(person.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Alice");
        assert_eq!(loaded.organization_name.as_deref(), Some("Acme Corp"));
        assert!(db.get_subject(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_embedding_blob_roundtrip() {
        let (db, _temp) = setup();
        let subject = Subject::new("Bob");
        db.insert_subject(&subject).unwrap();

        let interaction = Interaction {
            id: Uuid::new_v4(),
            kind: InteractionKind::Chat,
            started_at: Utc::now(),
            participants: vec![subject.id],
        };
        db.insert_interaction(&interaction).unwrap();

        let mut msg = message(interaction.id, "hello", Utc::now());
        msg.embedding = Some(vec![0.25, -1.5, 3.0]);
        let id = db.insert_message(&msg).unwrap();

        let indexed = db.messages_for_indexing(0, 10).unwrap();
        assert_eq!(indexed.len(), 1);
        assert_eq!(indexed[0].id, id);
        assert_eq!(indexed[0].embedding, Some(vec![0.25, -1.5, 3.0]));
    }

    #[test]
    fn test_recent_messages_skips_archived_and_other_subjects() {
        let (db, _temp) = setup();
        let now = Utc::now();

        let alice = Subject::new("Alice");
        let bob = Subject::new("Bob");
        db.insert_subject(&alice).unwrap();
        db.insert_subject(&bob).unwrap();

        let with_alice = Interaction {
            id: Uuid::new_v4(),
            kind: InteractionKind::Chat,
            started_at: now,
            participants: vec![alice.id],
        };
        let with_bob = Interaction {
            id: Uuid::new_v4(),
            kind: InteractionKind::Chat,
            started_at: now,
            participants: vec![bob.id],
        };
        db.insert_interaction(&with_alice).unwrap();
        db.insert_interaction(&with_bob).unwrap();

        db.insert_message(&message(with_alice.id, "visible", now - Duration::hours(1)))
            .unwrap();
        let mut archived = message(with_alice.id, "archived", now - Duration::hours(2));
        archived.is_archived = true;
        db.insert_message(&archived).unwrap();
        db.insert_message(&message(with_bob.id, "bob only", now)).unwrap();

        let messages = db
            .recent_messages(alice.id, now - Duration::days(7), 50)
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content.as_deref(), Some("visible"));
    }

    #[test]
    fn test_profile_upsert_replaces() {
        let (db, _temp) = setup();
        let subject = Subject::new("Carol");
        db.insert_subject(&subject).unwrap();

        let mut profile = RelationshipProfile {
            subject_id: subject.id,
            relationship_type: "client".to_string(),
            communication_frequency: "weekly".to_string(),
            relationship_summary: "Long-term client".to_string(),
            milestones: vec!["Signed contract".to_string()],
            key_decisions: vec![],
            updated_at: Utc::now(),
        };
        db.upsert_profile(&profile).unwrap();

        profile.communication_frequency = "daily".to_string();
        db.upsert_profile(&profile).unwrap();

        let loaded = db.relationship_profile(subject.id).unwrap().unwrap();
        assert_eq!(loaded.communication_frequency, "daily");
        assert_eq!(loaded.milestones, vec!["Signed contract".to_string()]);
    }

    #[test]
    fn test_stats() {
        let (db, _temp) = setup();
        db.insert_subject(&Subject::new("Dave")).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.subject_count, 1);
        assert_eq!(stats.message_count, 0);
    }

    fn chat_with(db: &Database, subject: &Subject, started_at: DateTime<Utc>) -> Uuid {
        let interaction = Interaction {
            id: Uuid::new_v4(),
            kind: InteractionKind::Chat,
            started_at,
            participants: vec![subject.id],
        };
        db.insert_interaction(&interaction).unwrap();
        interaction.id
    }

    fn summary_at(
        interaction_id: Uuid,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> InteractionSummary {
        InteractionSummary {
            id: 0,
            interaction_id,
            summary: text.to_string(),
            key_points: Vec::new(),
            decisions: Vec::new(),
            action_items: Vec::new(),
            created_at,
        }
    }

    #[test]
    fn test_hot_window_includes_exact_cutoff() {
        let (db, _temp) = setup();
        let subject = Subject::new("Ana");
        db.insert_subject(&subject).unwrap();

        let now = DateTime::from_timestamp_millis(1_740_830_400_000).unwrap();
        let cutoff = now - Duration::days(7);
        let chat = chat_with(&db, &subject, now - Duration::days(30));

        db.insert_message(&message(chat, "on the edge", cutoff)).unwrap();
        let outside = cutoff - Duration::milliseconds(1);
        db.insert_message(&message(chat, "just outside", outside))
            .unwrap();
        db.insert_segment(&TranscriptSegment {
            id: 0,
            interaction_id: chat,
            speaker: "Ana".to_string(),
            content: "edge call".to_string(),
            timestamp: cutoff,
        })
        .unwrap();

        let messages = db.recent_messages(subject.id, cutoff, 10).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content.as_deref(), Some("on the edge"));
        assert_eq!(messages[0].timestamp, cutoff);

        let segments = db.recent_segments(subject.id, cutoff, 10).unwrap();
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn test_warm_window_boundaries() {
        let (db, _temp) = setup();
        let subject = Subject::new("Ana");
        db.insert_subject(&subject).unwrap();

        let now = DateTime::from_timestamp_millis(1_740_830_400_000).unwrap();
        let hot_cutoff = now - Duration::days(7);
        let warm_cutoff = now - Duration::days(90);
        let chat = chat_with(&db, &subject, now - Duration::days(120));

        db.insert_summary(&summary_at(chat, "at hot cutoff", hot_cutoff))
            .unwrap();
        db.insert_summary(&summary_at(chat, "at warm cutoff", warm_cutoff))
            .unwrap();
        db.insert_summary(&summary_at(
            chat,
            "inside warm cutoff",
            warm_cutoff + Duration::milliseconds(1),
        ))
        .unwrap();
        db.insert_summary(&summary_at(
            chat,
            "inside hot window",
            hot_cutoff + Duration::milliseconds(1),
        ))
        .unwrap();

        let warm = db
            .summaries_between(subject.id, warm_cutoff, hot_cutoff, 10)
            .unwrap();
        let texts: Vec<&str> = warm.iter().map(|s| s.summary.as_str()).collect();
        assert_eq!(texts, vec!["at hot cutoff", "inside warm cutoff"]);
    }
}
