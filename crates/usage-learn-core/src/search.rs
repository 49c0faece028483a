//! Prompt-pattern retrieval ranking.
//!
//! Stores fetch candidate records and delegate ordering here, so every
//! backend ranks identically.
//!
//! # Ranking
//!
//! 1. Tokenize the query the same way prompt patterns are normalized.
//! 2. Score each record by the number of distinct query tokens that also
//!    occur in its `prompt_pattern`.
//! 3. Drop records with zero overlap.
//! 4. Sort by overlap (desc), score (desc), updated_at (desc), id (asc).
//! 5. Truncate to `limit`.

use std::collections::HashSet;

use serde::Serialize;

use crate::models::LearnedRecord;
use crate::prompt::tokenize;

/// A retrieved record together with its token overlap against the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternMatch {
    pub overlap: usize,
    pub record: LearnedRecord,
}

/// Number of distinct query tokens present in `prompt_pattern`.
pub fn overlap_score(query_tokens: &[String], prompt_pattern: &str) -> usize {
    let pattern: HashSet<String> = tokenize(prompt_pattern).into_iter().collect();
    query_tokens.iter().filter(|t| pattern.contains(*t)).count()
}

/// Rank candidate records against `query`.
pub fn rank_matches<I>(records: I, query: &str, limit: usize) -> Vec<PatternMatch>
where
    I: IntoIterator<Item = LearnedRecord>,
{
    let query_tokens = tokenize(query);
    if query_tokens.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut matches: Vec<PatternMatch> = records
        .into_iter()
        .filter_map(|record| {
            let overlap = overlap_score(&query_tokens, &record.prompt_pattern);
            (overlap > 0).then_some(PatternMatch { overlap, record })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.overlap
            .cmp(&a.overlap)
            .then_with(|| b.record.score.cmp(&a.record.score))
            .then_with(|| b.record.updated_at.cmp(&a.record.updated_at))
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    matches.truncate(limit);
    matches
}
