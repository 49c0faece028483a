//! Learning pipeline behavior against real and instrumented stores.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use usage_learn::config::{Config, PipelineConfig};
use usage_learn::engine::Engine;
use usage_learn::pipeline::{Consumer, LearningPipeline};
use usage_learn_core::classifier::Classifier;
use usage_learn_core::learning::{Generation, Observation, Replacement};
use usage_learn_core::models::{Category, LearnedRecord, NewRecord, RecordSource};
use usage_learn_core::search::PatternMatch;
use usage_learn_core::store::memory::InMemoryPatternStore;
use usage_learn_core::store::{PatternStore, StoreStats};

fn remote() -> Consumer {
    Consumer::RemoteModel("remote-llm".to_string())
}

fn observation(name: &str) -> Observation {
    Observation {
        object_name: name.to_string(),
        object_type: "Button".to_string(),
        properties: BTreeMap::from([("color".to_string(), "red".to_string())]),
        prompt: "make a red button".to_string(),
        context: String::new(),
    }
}

fn pipeline_config(workers: usize, queue_capacity: Option<usize>) -> PipelineConfig {
    PipelineConfig {
        enabled: true,
        workers,
        queue_capacity,
    }
}

/// Fails any upsert whose content mentions "boom".
struct FailingStore {
    inner: InMemoryPatternStore,
}

#[async_trait]
impl PatternStore for FailingStore {
    async fn upsert(&self, record: &NewRecord) -> Result<LearnedRecord> {
        if record.content.contains("boom") {
            bail!("disk full");
        }
        self.inner.upsert(record).await
    }

    async fn search_by_prompt_pattern(&self, query: &str, limit: usize) -> Result<Vec<PatternMatch>> {
        self.inner.search_by_prompt_pattern(query, limit).await
    }

    async fn get_stats(&self) -> Result<StoreStats> {
        self.inner.get_stats().await
    }

    async fn get_record(&self, id: &str) -> Result<Option<LearnedRecord>> {
        self.inner.get_record(id).await
    }
}

/// Blocks every upsert until released, signalling when one starts.
struct GateStore {
    inner: InMemoryPatternStore,
    started: Notify,
    release: Semaphore,
}

#[async_trait]
impl PatternStore for GateStore {
    async fn upsert(&self, record: &NewRecord) -> Result<LearnedRecord> {
        self.started.notify_one();
        let _permit = self.release.acquire().await?;
        self.inner.upsert(record).await
    }

    async fn search_by_prompt_pattern(&self, query: &str, limit: usize) -> Result<Vec<PatternMatch>> {
        self.inner.search_by_prompt_pattern(query, limit).await
    }

    async fn get_stats(&self) -> Result<StoreStats> {
        self.inner.get_stats().await
    }

    async fn get_record(&self, id: &str) -> Result<Option<LearnedRecord>> {
        self.inner.get_record(id).await
    }
}

#[tokio::test]
async fn failing_task_does_not_stop_later_tasks() {
    let store = Arc::new(FailingStore {
        inner: InMemoryPatternStore::new(),
    });
    let pipeline = LearningPipeline::spawn(
        store.clone(),
        Classifier::rule_based(),
        &pipeline_config(1, None),
    );

    assert!(pipeline.ingest_object_observation(&remote(), observation("first")));
    assert!(pipeline.ingest_object_observation(&remote(), observation("boom")));
    assert!(pipeline.ingest_object_observation(&remote(), observation("third")));
    pipeline.shutdown().await;

    assert_eq!(pipeline.enqueued(), 3);
    assert_eq!(pipeline.processed(), 2);
    assert_eq!(pipeline.failed(), 1);

    let stored: Vec<String> = store
        .inner
        .all()
        .unwrap()
        .into_iter()
        .map(|r| r.content)
        .collect();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().any(|c| c.contains("'first'")));
    assert!(stored.iter().any(|c| c.contains("'third'")));
}

#[tokio::test]
async fn offline_engine_events_are_not_learned() {
    let store = Arc::new(InMemoryPatternStore::new());
    let pipeline = LearningPipeline::spawn(
        store.clone(),
        Classifier::rule_based(),
        &pipeline_config(2, None),
    );

    let offline = Consumer::from_model_name("offline-rules");
    assert_eq!(offline, Consumer::OfflineEngine);
    assert!(!pipeline.ingest_object_observation(&offline, observation("ignored")));
    assert!(!pipeline.ingest_complete_generation(
        &offline,
        Generation {
            prompt: "create a login screen".to_string(),
            code: "fun login() {}".to_string(),
            metadata: None,
            source: RecordSource::Normal,
            language: None,
        },
    ));
    pipeline.shutdown().await;

    assert_eq!(pipeline.enqueued(), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn disabled_pipeline_accepts_nothing() {
    let store = Arc::new(InMemoryPatternStore::new());
    let config = PipelineConfig {
        enabled: false,
        ..pipeline_config(1, None)
    };
    let pipeline = LearningPipeline::spawn(store.clone(), Classifier::rule_based(), &config);

    assert!(!pipeline.is_enabled());
    assert!(!pipeline.ingest_object_observation(&remote(), observation("x")));
    pipeline.shutdown().await;
    assert!(store.is_empty());
}

#[tokio::test]
async fn full_bounded_queue_drops_instead_of_blocking() {
    let store = Arc::new(GateStore {
        inner: InMemoryPatternStore::new(),
        started: Notify::new(),
        release: Semaphore::new(0),
    });
    let pipeline = LearningPipeline::spawn(
        store.clone(),
        Classifier::rule_based(),
        &pipeline_config(1, Some(1)),
    );

    // First task is taken by the worker and parks inside upsert.
    assert!(pipeline.ingest_object_observation(&remote(), observation("one")));
    store.started.notified().await;

    // Second fills the single queue slot; third has nowhere to go.
    assert!(pipeline.ingest_object_observation(&remote(), observation("two")));
    assert!(!pipeline.ingest_object_observation(&remote(), observation("three")));
    assert_eq!(pipeline.dropped(), 1);

    store.release.add_permits(8);
    pipeline.shutdown().await;

    assert_eq!(pipeline.processed(), 2);
    assert_eq!(store.inner.len(), 2);
}

#[tokio::test]
async fn repeated_generations_raise_score() {
    let store = Arc::new(InMemoryPatternStore::new());
    let pipeline = LearningPipeline::spawn(
        store.clone(),
        Classifier::rule_based(),
        &pipeline_config(3, None),
    );

    for _ in 0..3 {
        assert!(pipeline.ingest_complete_generation(
            &remote(),
            Generation {
                prompt: "create a greeting function".to_string(),
                code: "fun greet(name: String): String {\n    return name\n}".to_string(),
                metadata: None,
                source: RecordSource::Normal,
                language: Some("kotlin".to_string()),
            },
        ));
    }
    pipeline.shutdown().await;

    let records = store.all().unwrap();
    let greet = records
        .iter()
        .find(|r| r.content.contains("fun greet"))
        .expect("function record stored");
    assert_eq!(greet.score, 3);
    assert_eq!(greet.metadata["chunk"]["name"], "greet");

    let matches = store
        .search_by_prompt_pattern("greeting function", 5)
        .await
        .unwrap();
    assert!(!matches.is_empty());
    assert_eq!(matches[0].overlap, 2);
}

#[tokio::test]
async fn replacement_stores_one_fix_patch_per_difference() {
    let store = Arc::new(InMemoryPatternStore::new());
    let pipeline = LearningPipeline::spawn(
        store.clone(),
        Classifier::rule_based(),
        &pipeline_config(1, None),
    );

    assert!(pipeline.ingest_reasoned_replacement(
        &remote(),
        Replacement {
            prompt: "fix the total".to_string(),
            old_code: Some("fun a() {\n    return 1\n}".to_string()),
            new_code: "fun a() {\n    return 2\n}\n\nfun b() {\n    return 3\n}".to_string(),
            reason: "fix crash in total".to_string(),
            metadata: None,
            language: Some("kt".to_string()),
        },
    ));
    pipeline.shutdown().await;

    let records = store.all().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.kind == Category::FixPatch));
    assert!(records
        .iter()
        .all(|r| r.source == RecordSource::DebugFeedback));
    assert!(records
        .iter()
        .all(|r| r.metadata["reason_type"] == "error_fix"));

    let changes: Vec<&str> = records
        .iter()
        .filter_map(|r| r.metadata["change_type"].as_str())
        .collect();
    assert!(changes.contains(&"modified"));
    assert!(changes.contains(&"added"));
}

#[tokio::test]
async fn sqlite_engine_learns_and_retrieves() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::minimal();
    config.db.path = dir.path().join("ulearn.sqlite");
    config.models.data_root = dir.path().to_path_buf();

    let engine = Engine::open(&config).await.unwrap();
    assert!(engine
        .pipeline()
        .ingest_object_observation(&remote(), observation("submit")));
    assert!(engine
        .pipeline()
        .ingest_object_observation(&remote(), observation("submit")));
    engine.pipeline().shutdown().await;

    let results = engine.search("red button", None).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record.score, 2);
    assert_eq!(results[0].record.kind, Category::MetadataTransformation);
    assert_eq!(results[0].record.source, RecordSource::Background);

    let stats = engine.store().get_stats().await.unwrap();
    assert_eq!(stats.total_records, 1);
    assert_eq!(stats.total_score, 2);
    engine.shutdown().await;

    // Records survive a reopen.
    let engine = Engine::open(&config).await.unwrap();
    let results = engine.search("button", Some(5)).await.unwrap();
    assert_eq!(results.len(), 1);
    engine.shutdown().await;
}
