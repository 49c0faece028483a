//! SQLite-backed [`PatternStore`] and [`KvStore`].
//!
//! The dedup key `(kind, content)` is enforced by a unique index on
//! `(kind, content_hash)`. Upsert is a single `INSERT … ON CONFLICT DO
//! UPDATE … RETURNING` statement, so concurrent writers of the same key
//! are serialized by SQLite and never lose a score increment.

use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use usage_learn_core::models::{Category, LearnedRecord, NewRecord, RecordSource};
use usage_learn_core::prompt::tokenize;
use usage_learn_core::search::{rank_matches, PatternMatch};
use usage_learn_core::store::{content_hash, KvStore, PatternStore, StoreStats};

const RECORD_COLUMNS: &str =
    "id, kind, content, source, metadata_json, prompt_pattern, score, created_at, updated_at";

/// SQLite implementation of [`PatternStore`].
#[derive(Clone)]
pub struct SqlitePatternStore {
    pool: SqlitePool,
}

impl SqlitePatternStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn record_from_row(row: &SqliteRow) -> Result<LearnedRecord> {
    let kind: String = row.get("kind");
    let source: String = row.get("source");
    let metadata_json: String = row.get("metadata_json");
    let id: String = row.get("id");
    let metadata = serde_json::from_str(&metadata_json)
        .with_context(|| format!("Corrupt metadata for record {}", id))?;

    Ok(LearnedRecord {
        id,
        kind: Category::from_str(&kind)?,
        content: row.get("content"),
        source: RecordSource::from_str(&source)?,
        metadata,
        prompt_pattern: row.get("prompt_pattern"),
        score: row.get("score"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl PatternStore for SqlitePatternStore {
    async fn upsert(&self, record: &NewRecord) -> Result<LearnedRecord> {
        let now = chrono::Utc::now().timestamp();
        let id = uuid::Uuid::new_v4().to_string();
        let metadata_json = serde_json::to_string(&record.metadata)?;

        let sql = format!(
            r#"
            INSERT INTO learned_records (id, kind, content, content_hash, source,
                                         metadata_json, prompt_pattern, score,
                                         created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(kind, content_hash) DO UPDATE SET
                score = score + 1,
                updated_at = excluded.updated_at
            RETURNING {}
            "#,
            RECORD_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(&id)
            .bind(record.kind.as_str())
            .bind(&record.content)
            .bind(content_hash(&record.content))
            .bind(record.source.as_str())
            .bind(&metadata_json)
            .bind(&record.prompt_pattern)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to upsert {} record", record.kind))?;

        record_from_row(&row)
    }

    async fn search_by_prompt_pattern(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<PatternMatch>> {
        let tokens = tokenize(query);
        if tokens.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        // Coarse LIKE prefilter; exact token overlap is scored in Rust.
        let filter = vec!["prompt_pattern LIKE ?"; tokens.len()].join(" OR ");
        let sql = format!(
            "SELECT {} FROM learned_records WHERE {}",
            RECORD_COLUMNS, filter
        );
        let mut q = sqlx::query(&sql);
        for token in &tokens {
            q = q.bind(format!("%{}%", token));
        }
        let rows = q.fetch_all(&self.pool).await?;

        let records = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(rank_matches(records, query, limit))
    }

    async fn get_stats(&self) -> Result<StoreStats> {
        let rows = sqlx::query(
            "SELECT kind, COUNT(*) AS records, COALESCE(SUM(score), 0) AS score FROM learned_records GROUP BY kind",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut parsed = Vec::with_capacity(rows.len());
        for row in &rows {
            let kind: String = row.get("kind");
            parsed.push((
                Category::from_str(&kind)?,
                row.get::<i64, _>("records"),
                row.get::<i64, _>("score"),
            ));
        }
        Ok(StoreStats::from_rows(parsed))
    }

    async fn get_record(&self, id: &str) -> Result<Option<LearnedRecord>> {
        let sql = format!("SELECT {} FROM learned_records WHERE id = ?", RECORD_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }
}

/// SQLite implementation of [`KvStore`] over the `kv_store` table.
#[derive(Clone)]
pub struct SqliteKv {
    pool: SqlitePool,
}

impl SqliteKv {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM kv_store WHERE namespace = ? AND key = ?")
                .bind(namespace)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn put(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO kv_store (namespace, key, value, updated_at) VALUES (?, ?, ?, ?)
            ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(namespace)
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv_store WHERE namespace = ? AND key = ?")
            .bind(namespace)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
