//! In-memory [`PatternStore`] and [`KvStore`] implementations for tests
//! and embedders without a database.
//!
//! State lives behind `std::sync::RwLock`. Each upsert holds the write
//! lock for its whole lookup-then-write, which serializes same-key writers.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{LearnedRecord, NewRecord};
use crate::search::{rank_matches, PatternMatch};

use super::{KvStore, PatternStore, StoreStats};

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

/// In-memory pattern store.
#[derive(Default)]
pub struct InMemoryPatternStore {
    records: RwLock<Vec<LearnedRecord>>,
}

impl InMemoryPatternStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct records held.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every record, in insertion order.
    pub fn all(&self) -> Result<Vec<LearnedRecord>> {
        Ok(self.records.read().map_err(poisoned)?.clone())
    }
}

#[async_trait]
impl PatternStore for InMemoryPatternStore {
    async fn upsert(&self, record: &NewRecord) -> Result<LearnedRecord> {
        let now = chrono::Utc::now().timestamp();
        let mut records = self.records.write().map_err(poisoned)?;

        if let Some(existing) = records
            .iter_mut()
            .find(|r| r.kind == record.kind && r.content == record.content)
        {
            existing.score += 1;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let stored = LearnedRecord {
            id: uuid::Uuid::new_v4().to_string(),
            kind: record.kind,
            content: record.content.clone(),
            source: record.source,
            metadata: record.metadata.clone(),
            prompt_pattern: record.prompt_pattern.clone(),
            score: 1,
            created_at: now,
            updated_at: now,
        };
        records.push(stored.clone());
        Ok(stored)
    }

    async fn search_by_prompt_pattern(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<PatternMatch>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(rank_matches(records.iter().cloned(), query, limit))
    }

    async fn get_stats(&self) -> Result<StoreStats> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(StoreStats::from_rows(
            records.iter().map(|r| (r.kind, 1, r.score)),
        ))
    }

    async fn get_record(&self, id: &str) -> Result<Option<LearnedRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }
}

/// In-memory namespaced key/value store.
#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<(String, String), String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    async fn put(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(
            (namespace.to_string(), key.to_string()),
            value.to_string(),
        );
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        Ok(entries
            .remove(&(namespace.to_string(), key.to_string()))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::{Category, RecordSource};

    fn new_record(kind: Category, content: &str, pattern: &str) -> NewRecord {
        NewRecord {
            kind,
            content: content.to_string(),
            source: RecordSource::Normal,
            metadata: serde_json::json!({}),
            prompt_pattern: pattern.to_string(),
        }
    }

    #[tokio::test]
    async fn identical_upserts_bump_score() {
        let store = InMemoryPatternStore::new();
        let r = new_record(Category::CodeSnippet, "fun a() {}", "make a");
        let first = store.upsert(&r).await.unwrap();
        let second = store.upsert(&r).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(first.id, second.id);
        assert_eq!(first.score, 1);
        assert_eq!(second.score, 2);
        assert!(second.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn same_content_different_kind_is_distinct() {
        let store = InMemoryPatternStore::new();
        store
            .upsert(&new_record(Category::CodeSnippet, "x", "p"))
            .await
            .unwrap();
        store
            .upsert(&new_record(Category::FixPatch, "x", "p"))
            .await
            .unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_upserts_of_one_key_never_lose_increments() {
        let store = Arc::new(InMemoryPatternStore::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .upsert(&new_record(Category::ApiUsage, "api.call()", "call"))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let all = store.all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].score, 50);
    }

    #[tokio::test]
    async fn stats_and_lookup() {
        let store = InMemoryPatternStore::new();
        let a = store
            .upsert(&new_record(Category::CodeSnippet, "a", "p"))
            .await
            .unwrap();
        store
            .upsert(&new_record(Category::CodeSnippet, "a", "p"))
            .await
            .unwrap();
        store
            .upsert(&new_record(Category::FixPatch, "b", "p"))
            .await
            .unwrap();

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.total_score, 3);
        assert_eq!(
            stats.for_kind(Category::CodeSnippet).map(|k| k.score),
            Some(2)
        );

        let fetched = store.get_record(&a.id).await.unwrap().unwrap();
        assert_eq!(fetched.content, "a");
        assert!(store.get_record("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_ranks_by_overlap() {
        let store = InMemoryPatternStore::new();
        store
            .upsert(&new_record(Category::CodeSnippet, "one", "login"))
            .await
            .unwrap();
        store
            .upsert(&new_record(Category::CodeSnippet, "three", "create login screen"))
            .await
            .unwrap();
        let results = store
            .search_by_prompt_pattern("create a login screen", 5)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record.content, "three");
    }

    #[tokio::test]
    async fn kv_namespaces_are_isolated() {
        let kv = MemoryKv::new();
        kv.put("models", "selected", "a").await.unwrap();
        kv.put("other", "selected", "b").await.unwrap();
        assert_eq!(kv.get("models", "selected").await.unwrap().as_deref(), Some("a"));
        assert!(kv.delete("models", "selected").await.unwrap());
        assert!(!kv.delete("models", "selected").await.unwrap());
        assert_eq!(kv.get("other", "selected").await.unwrap().as_deref(), Some("b"));
    }
}
