//! Catalog of classification-backend descriptors.
//!
//! Built-in descriptors are defined in code and cannot be removed.
//! User-added descriptors, the current selection, and per-model readiness
//! flags are persisted in a [`KvStore`] under one namespace:
//!
//! | Key | Value |
//! |-----|-------|
//! | `custom_descriptors` | JSON array of user-added [`ModelDescriptor`]s |
//! | `selected` | id of the selected descriptor |
//! | `ready.<id>` | `"true"` once the backend for `<id>` initialized successfully |
//!
//! Model files live at `<data_root>/models/<id>.<ext>`, where the extension
//! depends on the backend type (`vocab`, `merges`, or `bin`). A user-added
//! descriptor may point elsewhere with `local_file_path`.
//!
//! Mutations are read-modify-write on the persisted set and are serialized
//! by an internal mutex.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info};

use usage_learn_core::models::{BackendType, ModelDescriptor};
use usage_learn_core::store::KvStore;

use crate::config::Config;

/// Name reported when no model is configured or selected.
pub const OFFLINE_MODEL_NAME: &str = "offline-rules";

const CUSTOM_KEY: &str = "custom_descriptors";
const SELECTED_KEY: &str = "selected";

fn ready_key(id: &str) -> String {
    format!("ready.{}", id)
}

fn built_in(id: &str, display_name: &str, backend_type: BackendType) -> ModelDescriptor {
    ModelDescriptor {
        id: id.to_string(),
        display_name: display_name.to_string(),
        backend_type,
        local_file_path: None,
        download_url: None,
        downloaded: false,
        built_in: true,
    }
}

/// Descriptors shipped with the engine.
pub fn built_in_descriptors() -> Vec<ModelDescriptor> {
    vec![
        built_in(
            "wordpiece-intent",
            "WordPiece Intent Classifier",
            BackendType::WordPiece,
        ),
        built_in("bpe-code", "BPE Code Classifier", BackendType::Bpe),
        built_in(
            "generic-classifier",
            "Generic Binary Classifier",
            BackendType::Generic,
        ),
    ]
}

pub struct ModelRegistry {
    kv: Arc<dyn KvStore>,
    namespace: String,
    models_dir: PathBuf,
    active_model_name: Option<String>,
    write_lock: Mutex<()>,
}

impl ModelRegistry {
    pub fn new(
        kv: Arc<dyn KvStore>,
        namespace: impl Into<String>,
        models_dir: impl Into<PathBuf>,
        active_model_name: Option<String>,
    ) -> Self {
        Self {
            kv,
            namespace: namespace.into(),
            models_dir: models_dir.into(),
            active_model_name,
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(kv: Arc<dyn KvStore>, config: &Config) -> Self {
        Self::new(
            kv,
            config.models.namespace.clone(),
            config.models_dir(),
            config.models.active_model_name.clone(),
        )
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Conventional storage path for a descriptor, whether or not it exists.
    pub fn expected_path(&self, descriptor: &ModelDescriptor) -> PathBuf {
        match &descriptor.local_file_path {
            Some(p) if !descriptor.built_in => PathBuf::from(p),
            _ => self.models_dir.join(format!(
                "{}.{}",
                descriptor.id,
                descriptor.backend_type.file_extension()
            )),
        }
    }

    async fn custom_descriptors(&self) -> Result<Vec<ModelDescriptor>> {
        match self.kv.get(&self.namespace, CUSTOM_KEY).await? {
            Some(json) => serde_json::from_str(&json)
                .with_context(|| format!("Corrupt descriptor set in namespace '{}'", self.namespace)),
            None => Ok(Vec::new()),
        }
    }

    async fn save_custom(&self, descriptors: &[ModelDescriptor]) -> Result<()> {
        let json = serde_json::to_string(descriptors)?;
        self.kv.put(&self.namespace, CUSTOM_KEY, &json).await
    }

    /// Built-in descriptors followed by user-added ones.
    ///
    /// Built-ins report `downloaded` and `local_file_path` from the file
    /// at their conventional path.
    pub async fn list_available(&self) -> Result<Vec<ModelDescriptor>> {
        let mut all: Vec<ModelDescriptor> = built_in_descriptors()
            .into_iter()
            .map(|mut d| {
                let path = self.expected_path(&d);
                d.downloaded = path.is_file();
                d.local_file_path = Some(path.display().to_string());
                d
            })
            .collect();
        all.extend(self.custom_descriptors().await?);
        Ok(all)
    }

    pub async fn find(&self, id: &str) -> Result<Option<ModelDescriptor>> {
        Ok(self
            .list_available()
            .await?
            .into_iter()
            .find(|d| d.id == id))
    }

    /// Register a user-added descriptor. Returns `false` on an id collision.
    ///
    /// The stored copy is never built-in and starts as not downloaded.
    pub async fn add_custom(&self, descriptor: ModelDescriptor) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        if built_in_descriptors().iter().any(|d| d.id == descriptor.id) {
            debug!(id = %descriptor.id, "add_custom: collides with built-in descriptor");
            return Ok(false);
        }
        let mut custom = self.custom_descriptors().await?;
        if custom.iter().any(|d| d.id == descriptor.id) {
            debug!(id = %descriptor.id, "add_custom: duplicate id");
            return Ok(false);
        }

        let id = descriptor.id.clone();
        custom.push(ModelDescriptor {
            built_in: false,
            downloaded: false,
            ..descriptor
        });
        self.save_custom(&custom).await?;
        info!(id = %id, "Added custom model descriptor");
        Ok(true)
    }

    /// Remove a user-added descriptor. Returns `false` if no such custom id.
    ///
    /// Clears the selection and readiness flag when they refer to `id`.
    pub async fn remove_custom(&self, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        let mut custom = self.custom_descriptors().await?;
        let before = custom.len();
        custom.retain(|d| d.id != id);
        if custom.len() == before {
            return Ok(false);
        }
        self.save_custom(&custom).await?;

        if self.kv.get(&self.namespace, SELECTED_KEY).await?.as_deref() == Some(id) {
            self.kv.delete(&self.namespace, SELECTED_KEY).await?;
            info!(id = %id, "Cleared selection of removed model");
        }
        self.kv.delete(&self.namespace, &ready_key(id)).await?;
        info!(id = %id, "Removed custom model descriptor");
        Ok(true)
    }

    pub async fn set_selected(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if self.find(id).await?.is_none() {
            bail!("Unknown model id: '{}'", id);
        }
        self.kv.put(&self.namespace, SELECTED_KEY, id).await?;
        info!(id = %id, "Selected model");
        Ok(())
    }

    pub async fn clear_selected(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.kv.delete(&self.namespace, SELECTED_KEY).await?;
        Ok(())
    }

    /// The selected descriptor, or `None` when nothing (or a vanished id) is selected.
    pub async fn get_selected(&self) -> Result<Option<ModelDescriptor>> {
        match self.kv.get(&self.namespace, SELECTED_KEY).await? {
            Some(id) => self.find(&id).await,
            None => Ok(None),
        }
    }

    /// Path of the model file for `id`, only if the file exists.
    pub async fn resolve_file_path(&self, id: &str) -> Result<Option<PathBuf>> {
        let Some(descriptor) = self.find(id).await? else {
            return Ok(None);
        };
        let path = self.expected_path(&descriptor);
        Ok(path.is_file().then_some(path))
    }

    /// Flip a custom descriptor to `downloaded = true` if its file exists.
    ///
    /// Built-ins have no stored flag; for them this just reports presence.
    pub async fn verify_download(&self, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        if let Some(d) = built_in_descriptors().into_iter().find(|d| d.id == id) {
            return Ok(self.expected_path(&d).is_file());
        }

        let mut custom = self.custom_descriptors().await?;
        let Some(pos) = custom.iter().position(|d| d.id == id) else {
            return Ok(false);
        };
        let present = self.expected_path(&custom[pos]).is_file();
        if present && !custom[pos].downloaded {
            custom[pos].downloaded = true;
            self.save_custom(&custom).await?;
            info!(id = %id, "Verified model download");
        }
        Ok(present)
    }

    /// SHA-256 of the model file for `id`, if present.
    pub async fn file_digest(&self, id: &str) -> Result<Option<String>> {
        let Some(path) = self.resolve_file_path(id).await? else {
            return Ok(None);
        };
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read model file: {}", path.display()))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(Some(format!("{:x}", hasher.finalize())))
    }

    /// Record that the backend for `id` initialized successfully.
    pub async fn mark_ready(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.kv.put(&self.namespace, &ready_key(id), "true").await?;
        info!(id = %id, "Marked model ready");
        Ok(())
    }

    pub async fn clear_ready(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.kv.delete(&self.namespace, &ready_key(id)).await?;
        Ok(())
    }

    /// File present and ready flag set for `id`.
    pub async fn is_model_ready(&self, id: &str) -> Result<bool> {
        if self.resolve_file_path(id).await?.is_none() {
            return Ok(false);
        }
        let flag = self.kv.get(&self.namespace, &ready_key(id)).await?;
        Ok(flag.as_deref() == Some("true"))
    }

    /// Whether the selected model can be used.
    pub async fn is_ready(&self) -> Result<bool> {
        match self.get_selected().await? {
            Some(d) => self.is_model_ready(&d.id).await,
            None => Ok(false),
        }
    }

    /// Configured name, else the selected display name, else [`OFFLINE_MODEL_NAME`].
    pub async fn get_active_model_name(&self) -> Result<String> {
        if let Some(name) = self
            .active_model_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
        {
            return Ok(name.to_string());
        }
        Ok(self
            .get_selected()
            .await?
            .map(|d| d.display_name)
            .unwrap_or_else(|| OFFLINE_MODEL_NAME.to_string()))
    }
}
