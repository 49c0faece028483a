//! Storage abstractions for learned records and descriptor state.
//!
//! [`PatternStore`] persists [`LearnedRecord`]s deduplicated by
//! `(kind, content)`. [`KvStore`] is a namespaced string store backing the
//! model registry. Both are `Send + Sync` so one instance can be shared by
//! the pipeline workers and the read path.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::models::{Category, LearnedRecord, NewRecord};
use crate::search::PatternMatch;

/// Per-kind record count and summed score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindStats {
    pub kind: Category,
    pub records: i64,
    pub score: i64,
}

/// Aggregate store statistics. `by_kind` lists every category, zeros included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_records: i64,
    pub total_score: i64,
    pub by_kind: Vec<KindStats>,
}

impl StoreStats {
    /// Build stats from `(kind, records, score)` rows; missing kinds count as zero.
    pub fn from_rows(rows: impl IntoIterator<Item = (Category, i64, i64)>) -> Self {
        let mut by_kind: Vec<KindStats> = Category::ALL
            .iter()
            .map(|&kind| KindStats {
                kind,
                records: 0,
                score: 0,
            })
            .collect();
        for (kind, records, score) in rows {
            if let Some(entry) = by_kind.iter_mut().find(|k| k.kind == kind) {
                entry.records += records;
                entry.score += score;
            }
        }
        Self {
            total_records: by_kind.iter().map(|k| k.records).sum(),
            total_score: by_kind.iter().map(|k| k.score).sum(),
            by_kind,
        }
    }

    pub fn for_kind(&self, kind: Category) -> Option<&KindStats> {
        self.by_kind.iter().find(|k| k.kind == kind)
    }
}

/// SHA-256 hex digest of record content, used as the dedup key column.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Persistent, upsertable record store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](PatternStore::upsert) | Insert with `score = 1`, or bump score of the existing `(kind, content)` |
/// | [`search_by_prompt_pattern`](PatternStore::search_by_prompt_pattern) | Token-overlap retrieval |
/// | [`get_stats`](PatternStore::get_stats) | Counts per kind and aggregate score |
/// | [`get_record`](PatternStore::get_record) | Fetch one record by id |
///
/// `upsert` must be atomic per `(kind, content)`: concurrent upserts of the
/// same key must each increment the score exactly once.
#[async_trait]
pub trait PatternStore: Send + Sync {
    async fn upsert(&self, record: &NewRecord) -> Result<LearnedRecord>;

    async fn search_by_prompt_pattern(&self, query: &str, limit: usize)
        -> Result<Vec<PatternMatch>>;

    async fn get_stats(&self) -> Result<StoreStats>;

    async fn get_record(&self, id: &str) -> Result<Option<LearnedRecord>>;
}

/// Durable namespaced key/value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>>;

    async fn put(&self, namespace: &str, key: &str, value: &str) -> Result<()>;

    /// Returns whether a value was removed.
    async fn delete(&self, namespace: &str, key: &str) -> Result<bool>;
}
