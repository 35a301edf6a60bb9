//! Reciprocal Rank Fusion algorithm for combining search results

use crate::config::RetrievalConfig;
use crate::models::SearchResult;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Invalid weight configuration: weights must be positive")]
    InvalidWeights,

    #[error("Invalid RRF constant: k must be non-negative")]
    InvalidK,
}

/// Configuration for fusion algorithm
#[derive(Debug, Clone)]
pub struct FusionConfig {
    /// RRF K constant (typically 60)
    pub rrf_k: f32,

    /// Weight for semantic results
    pub semantic_weight: f32,

    /// Weight for keyword results
    pub keyword_weight: f32,
}

impl FusionConfig {
    pub fn new(rrf_k: f32, semantic_weight: f32, keyword_weight: f32) -> Result<Self, FusionError> {
        if semantic_weight <= 0.0 || keyword_weight <= 0.0 {
            return Err(FusionError::InvalidWeights);
        }
        if rrf_k < 0.0 || !rrf_k.is_finite() {
            return Err(FusionError::InvalidK);
        }

        Ok(Self {
            rrf_k,
            semantic_weight,
            keyword_weight,
        })
    }

    pub fn from_retrieval(config: &RetrievalConfig) -> Result<Self, FusionError> {
        Self::new(config.rrf_k, config.semantic_weight, config.keyword_weight)
    }

    fn partial(&self, weight: f32, rank: usize) -> f32 {
        weight / (self.rrf_k + rank as f32 + 1.0)
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            semantic_weight: 1.0,
            keyword_weight: 1.0,
        }
    }
}

/// Apply Reciprocal Rank Fusion to combine two ranked lists
///
/// RRF formula: score(id) = sum over all rankings of: weight / (k + rank + 1)
///
/// # Arguments
/// * `keyword_results` - Ranked hits from keyword search, processed first
/// * `semantic_results` - Ranked hits from vector search
/// * `config` - Fusion configuration
/// * `limit` - Maximum number of fused results
///
/// # Returns
/// One result per id carrying the fused score, sorted by score descending.
/// Equal scores keep first-seen order. The first occurrence of an id supplies
/// its fields; a missing highlight is taken from a later occurrence.
pub fn reciprocal_rank_fusion(
    keyword_results: Vec<SearchResult>,
    semantic_results: Vec<SearchResult>,
    config: &FusionConfig,
    limit: usize,
) -> Vec<SearchResult> {
    let mut fused: Vec<SearchResult> = Vec::new();
    let mut positions: HashMap<i64, usize> = HashMap::new();

    let ranked = [
        (keyword_results, config.keyword_weight),
        (semantic_results, config.semantic_weight),
    ];

    for (results, weight) in ranked {
        for (rank, result) in results.into_iter().enumerate() {
            let rrf_score = config.partial(weight, rank);
            match positions.get(&result.id) {
                Some(&pos) => {
                    let existing = &mut fused[pos];
                    existing.score += rrf_score;
                    if existing.highlight.is_none() {
                        existing.highlight = result.highlight;
                    }
                }
                None => {
                    positions.insert(result.id, fused.len());
                    fused.push(SearchResult {
                        score: rrf_score,
                        ..result
                    });
                }
            }
        }
    }

    // Stable sort keeps first-seen order among equal scores
    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused.truncate(limit);

    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResultKind;
    use chrono::Utc;
    use uuid::Uuid;

    fn hit(id: i64, score: f32) -> SearchResult {
        SearchResult {
            id,
            kind: ResultKind::Message,
            content: format!("message {}", id),
            timestamp: Utc::now(),
            entity_id: None,
            interaction_id: Uuid::nil(),
            score,
            highlight: None,
        }
    }

    fn ids(results: &[SearchResult]) -> Vec<i64> {
        results.iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_rrf_basic() {
        let keyword = vec![hit(1, 12.0), hit(2, 8.0)];
        let semantic = vec![hit(2, 0.9), hit(3, 0.8)];

        let fused = reciprocal_rank_fusion(keyword, semantic, &FusionConfig::default(), 10);

        assert_eq!(ids(&fused), vec![2, 1, 3]);
        assert!((fused[0].score - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-6);
        assert!((fused[1].score - 1.0 / 61.0).abs() < 1e-6);
        assert!((fused[2].score - 1.0 / 62.0).abs() < 1e-6);
    }

    #[test]
    fn test_rrf_weighted() {
        let keyword = vec![hit(2, 0.9)];
        let semantic = vec![hit(1, 0.9)];

        // Prefer semantic
        let config = FusionConfig::new(60.0, 0.7, 0.3).unwrap();
        let fused = reciprocal_rank_fusion(keyword, semantic, &config, 10);

        assert_eq!(fused[0].id, 1); // Semantic result should win
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        // Same rank in each list gives equal scores; keyword list comes first
        let keyword = vec![hit(10, 1.0)];
        let semantic = vec![hit(20, 1.0)];

        let fused = reciprocal_rank_fusion(keyword, semantic, &FusionConfig::default(), 10);
        assert_eq!(ids(&fused), vec![10, 20]);
        assert_eq!(fused[0].score, fused[1].score);
    }

    #[test]
    fn test_highlight_filled_from_later_occurrence() {
        let mut from_keyword = hit(5, 3.0);
        from_keyword.highlight = Some("<b>renewal</b> date".to_string());

        let fused = reciprocal_rank_fusion(
            vec![hit(7, 4.0), from_keyword],
            vec![hit(5, 0.9)],
            &FusionConfig::default(),
            10,
        );
        let five = fused.iter().find(|r| r.id == 5).unwrap();
        assert_eq!(five.highlight.as_deref(), Some("<b>renewal</b> date"));

        // Vector hit seen first, highlight arrives later from nowhere else
        let mut later = hit(8, 1.0);
        later.highlight = Some("late".to_string());
        let fused = reciprocal_rank_fusion(
            Vec::new(),
            vec![hit(8, 0.5), later],
            &FusionConfig::default(),
            10,
        );
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].highlight.as_deref(), Some("late"));
    }

    #[test]
    fn test_limit_enforced() {
        let keyword: Vec<_> = (0..10).map(|i| hit(i, 1.0)).collect();
        let semantic: Vec<_> = (5..15).map(|i| hit(i, 1.0)).collect();

        let fused = reciprocal_rank_fusion(keyword, semantic, &FusionConfig::default(), 4);
        assert_eq!(fused.len(), 4);

        let fused = reciprocal_rank_fusion(
            vec![hit(1, 1.0)],
            vec![hit(1, 1.0), hit(2, 1.0)],
            &FusionConfig::default(),
            10,
        );
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            FusionConfig::new(60.0, 0.0, 1.0),
            Err(FusionError::InvalidWeights)
        ));
        assert!(matches!(
            FusionConfig::new(-1.0, 1.0, 1.0),
            Err(FusionError::InvalidK)
        ));
    }
}
