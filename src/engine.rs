//! Composition point: builds the store, registry, classifier, and pipeline
//! once and owns their lifetimes.
//!
//! A classification backend is attached only when a [`BackendLoader`] is
//! supplied and the selected model's file resolves. A successful load
//! marks the model ready; a failed one clears the flag and the engine
//! keeps the rule-based classifier.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

use usage_learn_core::classifier::{ClassificationBackend, Classifier};
use usage_learn_core::models::ModelDescriptor;
use usage_learn_core::search::PatternMatch;
use usage_learn_core::store::memory::{InMemoryPatternStore, MemoryKv};
use usage_learn_core::store::{KvStore, PatternStore};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::model_registry::ModelRegistry;
use crate::pipeline::{Consumer, LearningPipeline};
use crate::sqlite_store::{SqliteKv, SqlitePatternStore};

/// Turns a resolved model file into a running classification backend.
pub trait BackendLoader: Send + Sync {
    fn load(
        &self,
        descriptor: &ModelDescriptor,
        path: &Path,
    ) -> Result<Arc<dyn ClassificationBackend>>;
}

pub struct Engine {
    config: Config,
    pool: Option<SqlitePool>,
    store: Arc<dyn PatternStore>,
    registry: Arc<ModelRegistry>,
    classifier: Classifier,
    pipeline: LearningPipeline,
}

impl Engine {
    /// Open the SQLite database (applying the schema) and start the pipeline.
    pub async fn open(config: &Config) -> Result<Self> {
        Self::open_with_loader(config, None).await
    }

    pub async fn open_with_loader(
        config: &Config,
        loader: Option<&dyn BackendLoader>,
    ) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool).await?;

        let store: Arc<dyn PatternStore> = Arc::new(SqlitePatternStore::new(pool.clone()));
        let kv: Arc<dyn KvStore> = Arc::new(SqliteKv::new(pool.clone()));
        let mut engine = Self::assemble(config, store, kv, loader).await?;
        engine.pool = Some(pool);
        Ok(engine)
    }

    /// An engine backed entirely by in-memory stores.
    pub async fn in_memory(config: &Config) -> Result<Self> {
        Self::assemble(
            config,
            Arc::new(InMemoryPatternStore::new()),
            Arc::new(MemoryKv::new()),
            None,
        )
        .await
    }

    /// Wire the components over caller-supplied stores.
    pub async fn assemble(
        config: &Config,
        store: Arc<dyn PatternStore>,
        kv: Arc<dyn KvStore>,
        loader: Option<&dyn BackendLoader>,
    ) -> Result<Self> {
        let registry = Arc::new(ModelRegistry::from_config(kv, config));
        let classifier = match loader {
            Some(loader) => select_classifier(&registry, loader).await?,
            None => Classifier::rule_based(),
        };
        let pipeline =
            LearningPipeline::spawn(Arc::clone(&store), classifier.clone(), &config.pipeline);

        Ok(Self {
            config: config.clone(),
            pool: None,
            store,
            registry,
            classifier,
            pipeline,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The SQLite pool, when the engine was opened on a database.
    pub fn pool(&self) -> Option<&SqlitePool> {
        self.pool.as_ref()
    }

    pub fn store(&self) -> &Arc<dyn PatternStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn pipeline(&self) -> &LearningPipeline {
        &self.pipeline
    }

    /// Consumer identity of whatever model is currently active.
    ///
    /// Only an explicitly configured `models.active_model_name` is a remote
    /// model. A selected on-device descriptor is still the offline engine,
    /// so its output never feeds back into learning.
    pub async fn active_consumer(&self) -> Result<Consumer> {
        match self.config.models.active_model_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Ok(Consumer::from_model_name(name)),
            _ => Ok(Consumer::OfflineEngine),
        }
    }

    /// Ranked prompt-pattern matches, using the configured default limit.
    pub async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<PatternMatch>> {
        let limit = limit.unwrap_or(self.config.retrieval.default_limit);
        self.store.search_by_prompt_pattern(query, limit).await
    }

    /// Drain the pipeline and close the database.
    pub async fn shutdown(self) {
        self.pipeline.shutdown().await;
        if let Some(pool) = self.pool {
            pool.close().await;
        }
    }
}

/// Load the selected model through `loader`, falling back to rules.
async fn select_classifier(
    registry: &ModelRegistry,
    loader: &dyn BackendLoader,
) -> Result<Classifier> {
    let Some(selected) = registry.get_selected().await? else {
        return Ok(Classifier::rule_based());
    };
    let Some(path) = registry.resolve_file_path(&selected.id).await? else {
        warn!(id = %selected.id, "Selected model file is missing; using rule-based classifier");
        return Ok(Classifier::rule_based());
    };

    match loader.load(&selected, &path) {
        Ok(backend) => {
            registry.mark_ready(&selected.id).await?;
            info!(id = %selected.id, backend = backend.name(), "Classification backend loaded");
            Ok(Classifier::with_backend(backend))
        }
        Err(e) => {
            registry.clear_ready(&selected.id).await?;
            warn!(id = %selected.id, error = %format!("{:#}", e), "Backend failed to load; using rule-based classifier");
            Ok(Classifier::rule_based())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usage_learn_core::models::{Category, ClassificationResult};

    struct AlwaysApi;

    impl ClassificationBackend for AlwaysApi {
        fn name(&self) -> &str {
            "always-api"
        }

        fn classify(&self, _text: &str, _context: Option<&str>) -> Option<ClassificationResult> {
            Some(ClassificationResult {
                category: Category::ApiUsage,
                confidence: 0.99,
            })
        }
    }

    struct Loader {
        fail: bool,
    }

    impl BackendLoader for Loader {
        fn load(
            &self,
            _descriptor: &ModelDescriptor,
            _path: &Path,
        ) -> Result<Arc<dyn ClassificationBackend>> {
            if self.fail {
                anyhow::bail!("corrupt weights");
            }
            Ok(Arc::new(AlwaysApi))
        }
    }

    fn config_in(dir: &tempfile::TempDir) -> Config {
        let mut cfg = Config::minimal();
        cfg.db.path = dir.path().join("ulearn.sqlite");
        cfg.models.data_root = dir.path().to_path_buf();
        cfg
    }

    async fn select_with_file(cfg: &Config) {
        let engine = Engine::open(cfg).await.unwrap();
        engine.registry().set_selected("bpe-code").await.unwrap();
        let path = cfg.models_dir().join("bpe-code.merges");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"merges").unwrap();
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn without_loader_uses_rules() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(&config_in(&dir)).await.unwrap();
        assert!(engine.classifier().backend_name().is_none());
        assert_eq!(
            engine.active_consumer().await.unwrap(),
            Consumer::OfflineEngine
        );
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn successful_load_attaches_backend_and_marks_ready() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(&dir);
        select_with_file(&cfg).await;

        let engine = Engine::open_with_loader(&cfg, Some(&Loader { fail: false }))
            .await
            .unwrap();
        assert_eq!(engine.classifier().backend_name(), Some("always-api"));
        assert_eq!(
            engine.classifier().classify("fun a() {}", None),
            Category::ApiUsage
        );
        assert!(engine.registry().is_ready().await.unwrap());
        assert_eq!(
            engine.active_consumer().await.unwrap(),
            Consumer::OfflineEngine
        );
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn configured_model_name_is_a_remote_consumer() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config_in(&dir);
        cfg.models.active_model_name = Some("remote-llm".to_string());
        let engine = Engine::in_memory(&cfg).await.unwrap();
        assert_eq!(
            engine.active_consumer().await.unwrap(),
            Consumer::RemoteModel("remote-llm".to_string())
        );
        engine.shutdown().await;

        cfg.models.active_model_name = Some("   ".to_string());
        let engine = Engine::in_memory(&cfg).await.unwrap();
        assert_eq!(
            engine.active_consumer().await.unwrap(),
            Consumer::OfflineEngine
        );
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn failed_load_falls_back_to_rules() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(&dir);
        select_with_file(&cfg).await;

        let engine = Engine::open_with_loader(&cfg, Some(&Loader { fail: true }))
            .await
            .unwrap();
        assert!(engine.classifier().backend_name().is_none());
        assert!(!engine.registry().is_ready().await.unwrap());
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn search_uses_default_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config_in(&dir);
        cfg.retrieval.default_limit = 2;
        let engine = Engine::in_memory(&cfg).await.unwrap();
        for i in 0..4 {
            engine
                .store()
                .upsert(&usage_learn_core::models::NewRecord {
                    kind: Category::CodeSnippet,
                    content: format!("snippet {}", i),
                    source: usage_learn_core::models::RecordSource::Normal,
                    metadata: serde_json::json!({}),
                    prompt_pattern: "login screen".to_string(),
                })
                .await
                .unwrap();
        }
        assert_eq!(engine.search("login", None).await.unwrap().len(), 2);
        assert_eq!(engine.search("login", Some(3)).await.unwrap().len(), 3);
        engine.shutdown().await;
    }
}
