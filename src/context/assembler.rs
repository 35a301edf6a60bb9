//! Tier assembly
//!
//! Every tier is fetched independently and concurrently. A tier whose fetch
//! fails is logged and left empty; only an unknown subject aborts assembly.

use super::{ContextBundle, HotTier};
use crate::config::ContextConfig;
use crate::error::{RapportError, Result};
use crate::models::{
    Fact, Importance, InteractionSummary, RelationshipProfile, SearchFilter, SearchResult, Subject,
};
use crate::retrieval::HybridSearcher;
use crate::storage::ContextStore;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct TieredContextAssembler {
    store: Arc<dyn ContextStore>,
    searcher: Option<Arc<HybridSearcher>>,
    config: ContextConfig,
}

impl TieredContextAssembler {
    /// Without a searcher the Relevant tier is always empty
    pub fn new(
        store: Arc<dyn ContextStore>,
        searcher: Option<Arc<HybridSearcher>>,
        config: ContextConfig,
    ) -> Self {
        Self {
            store,
            searcher,
            config,
        }
    }

    pub async fn build_context(
        &self,
        subject_id: Uuid,
        task_hint: Option<&str>,
    ) -> Result<ContextBundle> {
        self.build_context_at(subject_id, task_hint, Utc::now())
            .await
    }

    /// Assemble all tiers relative to `now`
    pub async fn build_context_at(
        &self,
        subject_id: Uuid,
        task_hint: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ContextBundle> {
        // Stored timestamps have millisecond precision
        let now = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
        let subject = self.load_subject(subject_id).await?;
        let task_hint = task_hint
            .map(str::trim)
            .filter(|hint| !hint.is_empty())
            .map(String::from);

        if subject.is_bot {
            debug!("Subject {} is a bot, skipping tier fetch", subject_id);
            return Ok(ContextBundle::minimal(subject, task_hint, now));
        }

        let hot_cutoff = now - Duration::days(self.config.hot_tier_days);
        let warm_cutoff = now - Duration::days(self.config.warm_tier_days);

        let (permanent, hot, warm, cold, relevant) = tokio::join!(
            self.permanent_tier(subject_id),
            self.hot_tier(subject_id, hot_cutoff),
            self.warm_tier(subject_id, warm_cutoff, hot_cutoff),
            self.cold_tier(subject_id),
            self.relevant_tier(subject_id, task_hint.as_deref()),
        );

        let bundle = ContextBundle {
            subject,
            task_hint,
            permanent,
            hot,
            warm,
            cold,
            relevant,
            assembled_at: now,
            hot_tier_days: self.config.hot_tier_days,
            warm_tier_days: self.config.warm_tier_days,
        };

        debug!("Assembled context for {}: {:?}", subject_id, bundle.tier_counts());

        Ok(bundle)
    }

    async fn load_subject(&self, subject_id: Uuid) -> Result<Subject> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.subject(subject_id))
            .await
            .map_err(|e| RapportError::Other(anyhow::anyhow!("Subject lookup failed: {}", e)))??
            .ok_or(RapportError::SubjectNotFound { id: subject_id })
    }

    /// Run a blocking store read; failures yield an empty tier
    async fn fetch<T, F>(&self, tier: &'static str, read: F) -> T
    where
        T: Default + Send + 'static,
        F: FnOnce(&dyn ContextStore) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || read(store.as_ref())).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                warn!("{} tier unavailable: {}", tier, e);
                T::default()
            }
            Err(e) => {
                warn!("{} tier task failed: {}", tier, e);
                T::default()
            }
        }
    }

    async fn permanent_tier(&self, subject_id: Uuid) -> Vec<Fact> {
        let mut facts = self
            .fetch("Permanent", move |store| store.current_facts(subject_id))
            .await;
        facts.retain(|fact| fact.is_current());
        facts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        facts
    }

    async fn hot_tier(&self, subject_id: Uuid, since: DateTime<Utc>) -> HotTier {
        let message_limit = self.config.hot_message_limit;
        let segment_limit = self.config.hot_segment_limit;

        let (mut messages, mut segments) = tokio::join!(
            self.fetch("Hot (messages)", move |store| {
                store.recent_messages(subject_id, since, message_limit)
            }),
            self.fetch("Hot (segments)", move |store| {
                store.recent_segments(subject_id, since, segment_limit)
            }),
        );

        // Keep the newest within the cap, then present oldest first
        messages.retain(|m| !m.is_archived && m.timestamp >= since);
        messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        messages.truncate(message_limit);
        messages.reverse();

        segments.retain(|s| s.timestamp >= since);
        segments.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        segments.truncate(segment_limit);
        segments.reverse();

        HotTier { messages, segments }
    }

    async fn warm_tier(
        &self,
        subject_id: Uuid,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Vec<InteractionSummary> {
        let limit = self.config.warm_summary_limit;
        let mut summaries = self
            .fetch("Warm", move |store| {
                store.summaries_between(subject_id, after, until, limit)
            })
            .await;

        summaries.retain(|s| s.created_at > after && s.created_at <= until);
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries.truncate(limit);
        for summary in &mut summaries {
            summary
                .decisions
                .retain(|decision| decision.importance == Importance::High);
        }
        summaries
    }

    async fn cold_tier(&self, subject_id: Uuid) -> Option<RelationshipProfile> {
        let mut profile = self
            .fetch("Cold", move |store| store.relationship_profile(subject_id))
            .await?;
        profile.milestones.truncate(self.config.cold_milestone_limit);
        profile
            .key_decisions
            .truncate(self.config.cold_decision_limit);
        Some(profile)
    }

    async fn relevant_tier(&self, subject_id: Uuid, task_hint: Option<&str>) -> Vec<SearchResult> {
        let (Some(hint), Some(searcher)) = (task_hint, &self.searcher) else {
            return Vec::new();
        };

        let filter = SearchFilter {
            entity_id: Some(subject_id),
            period: None,
        };
        searcher
            .hybrid_search(hint, &filter, self.config.relevant_limit)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Decision, Message, TranscriptSegment};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    /// In-memory store that applies the same windows as the SQLite queries
    #[derive(Default)]
    struct MemoryStore {
        subjects: Vec<Subject>,
        facts: Vec<Fact>,
        messages: Vec<Message>,
        segments: Vec<TranscriptSegment>,
        summaries: Vec<InteractionSummary>,
        profile: Option<RelationshipProfile>,
        fail_facts: bool,
        reads: AtomicUsize,
    }

    impl ContextStore for MemoryStore {
        fn subject(&self, id: Uuid) -> Result<Option<Subject>> {
            Ok(self.subjects.iter().find(|s| s.id == id).cloned())
        }

        fn current_facts(&self, _subject_id: Uuid) -> Result<Vec<Fact>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail_facts {
                return Err(RapportError::Index("facts offline".to_string()));
            }
            Ok(self.facts.clone())
        }

        fn recent_messages(
            &self,
            _subject_id: Uuid,
            since: DateTime<Utc>,
            _limit: usize,
        ) -> Result<Vec<Message>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .messages
                .iter()
                .filter(|m| m.timestamp >= since)
                .cloned()
                .collect())
        }

        fn recent_segments(
            &self,
            _subject_id: Uuid,
            since: DateTime<Utc>,
            _limit: usize,
        ) -> Result<Vec<TranscriptSegment>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .segments
                .iter()
                .filter(|s| s.timestamp >= since)
                .cloned()
                .collect())
        }

        fn summaries_between(
            &self,
            _subject_id: Uuid,
            _after: DateTime<Utc>,
            _until: DateTime<Utc>,
            _limit: usize,
        ) -> Result<Vec<InteractionSummary>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            // Deliberately unfiltered; the assembler enforces the window
            Ok(self.summaries.clone())
        }

        fn relationship_profile(&self, _subject_id: Uuid) -> Result<Option<RelationshipProfile>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.profile.clone())
        }
    }

    fn message(id: i64, ts: DateTime<Utc>) -> Message {
        Message {
            id,
            interaction_id: Uuid::nil(),
            sender_id: None,
            sender_name: Some("Ana".to_string()),
            content: Some(format!("message {}", id)),
            is_outgoing: false,
            timestamp: ts,
            is_archived: false,
            embedding: None,
        }
    }

    fn summary(id: i64, created_at: DateTime<Utc>, decisions: Vec<Decision>) -> InteractionSummary {
        InteractionSummary {
            id,
            interaction_id: Uuid::nil(),
            summary: format!("summary {}", id),
            key_points: Vec::new(),
            decisions,
            action_items: Vec::new(),
            created_at,
        }
    }

    fn fact(id: i64, subject_id: Uuid, created_at: DateTime<Utc>, current: bool) -> Fact {
        Fact {
            id,
            subject_id,
            fact_type: "role".to_string(),
            value: Some(format!("value {}", id)),
            value_date: None,
            valid_from: None,
            valid_until: (!current).then_some(created_at),
            confidence: None,
            created_at,
        }
    }

    fn assembler(store: MemoryStore) -> TieredContextAssembler {
        TieredContextAssembler::new(Arc::new(store), None, ContextConfig::default())
    }

    #[tokio::test]
    async fn test_unknown_subject_is_error() {
        let assembler = assembler(MemoryStore::default());
        let missing = Uuid::new_v4();

        let result = assembler.build_context(missing, None).await;
        assert!(matches!(
            result,
            Err(RapportError::SubjectNotFound { id }) if id == missing
        ));
    }

    #[tokio::test]
    async fn test_bot_short_circuits_without_reads() {
        let bot = Subject::bot("Deploy Bot");
        let store = Arc::new(MemoryStore {
            subjects: vec![bot.clone()],
            facts: vec![fact(1, bot.id, Utc::now(), true)],
            ..Default::default()
        });
        let assembler =
            TieredContextAssembler::new(store.clone(), None, ContextConfig::default());

        let bundle = assembler.build_context(bot.id, Some("status")).await.unwrap();
        assert!(bundle.is_empty());
        assert_eq!(bundle.task_hint.as_deref(), Some("status"));
        assert_eq!(store.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_hot_window_is_inclusive_and_chronological() {
        let subject = Subject::new("Ana");
        let now = fixed_now();
        let edge = now - Duration::days(7);

        let mut archived = message(4, now);
        archived.is_archived = true;

        let store = MemoryStore {
            subjects: vec![subject.clone()],
            messages: vec![
                message(1, now - Duration::hours(1)),
                message(2, edge),
                message(3, edge - Duration::seconds(1)),
                archived,
            ],
            ..Default::default()
        };

        let bundle = assembler(store)
            .build_context_at(subject.id, None, now)
            .await
            .unwrap();
        let ids: Vec<i64> = bundle.hot.messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_hot_cap_keeps_newest() {
        let subject = Subject::new("Ana");
        let now = Utc::now();
        let messages = (0..60)
            .map(|i| message(i, now - Duration::minutes(i)))
            .collect();

        let store = MemoryStore {
            subjects: vec![subject.clone()],
            messages,
            ..Default::default()
        };

        let bundle = assembler(store)
            .build_context_at(subject.id, None, now)
            .await
            .unwrap();
        assert_eq!(bundle.hot.messages.len(), 50);
        // Oldest kept is id 49, newest is id 0, in chronological order
        assert_eq!(bundle.hot.messages.first().map(|m| m.id), Some(49));
        assert_eq!(bundle.hot.messages.last().map(|m| m.id), Some(0));
    }

    #[tokio::test]
    async fn test_warm_window_boundaries_and_high_decisions() {
        let subject = Subject::new("Ana");
        let now = fixed_now();
        let hot_edge = now - Duration::days(7);
        let warm_edge = now - Duration::days(90);

        let decisions = vec![
            Decision {
                description: "switch vendor".to_string(),
                importance: Importance::High,
            },
            Decision {
                description: "lunch place".to_string(),
                importance: Importance::Low,
            },
        ];

        let store = MemoryStore {
            subjects: vec![subject.clone()],
            summaries: vec![
                summary(1, hot_edge, decisions),
                summary(2, warm_edge, Vec::new()),
                summary(3, now - Duration::days(1), Vec::new()),
                summary(4, warm_edge + Duration::seconds(1), Vec::new()),
            ],
            ..Default::default()
        };

        let bundle = assembler(store)
            .build_context_at(subject.id, None, now)
            .await
            .unwrap();
        let ids: Vec<i64> = bundle.warm.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 4]);
        assert_eq!(bundle.warm[0].decisions.len(), 1);
        assert_eq!(bundle.warm[0].decisions[0].description, "switch vendor");
    }

    #[tokio::test]
    async fn test_only_current_facts_newest_first() {
        let subject = Subject::new("Ana");
        let now = Utc::now();
        let store = MemoryStore {
            subjects: vec![subject.clone()],
            facts: vec![
                fact(1, subject.id, now - Duration::days(3), true),
                fact(2, subject.id, now - Duration::days(1), false),
                fact(3, subject.id, now - Duration::days(1), true),
            ],
            ..Default::default()
        };

        let bundle = assembler(store)
            .build_context_at(subject.id, None, now)
            .await
            .unwrap();
        let ids: Vec<i64> = bundle.permanent.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert!(bundle.permanent.iter().all(|f| f.valid_until.is_none()));
    }

    #[tokio::test]
    async fn test_cold_lists_capped() {
        let subject = Subject::new("Ana");
        let store = MemoryStore {
            subjects: vec![subject.clone()],
            profile: Some(RelationshipProfile {
                subject_id: subject.id,
                relationship_type: "partner".to_string(),
                communication_frequency: "daily".to_string(),
                relationship_summary: "Co-founder".to_string(),
                milestones: (0..6).map(|i| format!("milestone {}", i)).collect(),
                key_decisions: (0..8).map(|i| format!("decision {}", i)).collect(),
                updated_at: Utc::now(),
            }),
            ..Default::default()
        };

        let bundle = assembler(store).build_context(subject.id, None).await.unwrap();
        let cold = bundle.cold.unwrap();
        assert_eq!(cold.milestones.len(), 3);
        assert_eq!(cold.key_decisions.len(), 5);
        assert_eq!(cold.milestones[0], "milestone 0");
    }

    #[tokio::test]
    async fn test_tier_failure_is_isolated() {
        let subject = Subject::new("Ana");
        let now = Utc::now();
        let store = MemoryStore {
            subjects: vec![subject.clone()],
            facts: vec![fact(1, subject.id, now, true)],
            messages: vec![message(1, now)],
            fail_facts: true,
            ..Default::default()
        };

        let bundle = assembler(store)
            .build_context_at(subject.id, None, now)
            .await
            .unwrap();
        assert!(bundle.permanent.is_empty());
        assert_eq!(bundle.hot.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_task_hint_dropped() {
        let subject = Subject::new("Ana");
        let store = MemoryStore {
            subjects: vec![subject.clone()],
            ..Default::default()
        };

        let bundle = assembler(store)
            .build_context(subject.id, Some("   "))
            .await
            .unwrap();
        assert!(bundle.task_hint.is_none());
        assert!(bundle.relevant.is_empty());
    }
}
