//! TOML configuration for `ulearn`.
//!
//! ```toml
//! [db]
//! path = "./data/ulearn.sqlite"
//!
//! [models]
//! data_root = "./data"            # models live under <data_root>/models/
//! active_model_name = "my-model"  # optional override
//! namespace = "classification_models"
//!
//! [pipeline]
//! enabled = true
//! workers = 1
//! queue_capacity = 1024           # omit for an unbounded queue
//!
//! [retrieval]
//! default_limit = 5
//!
//! [logging]
//! level = "info"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,
    #[serde(default)]
    pub active_model_name: Option<String>,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            active_model_name: None,
            namespace: default_namespace(),
        }
    }
}

fn default_data_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("usage-learn")
}

fn default_namespace() -> String {
    "classification_models".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// `None` means unbounded.
    #[serde(default)]
    pub queue_capacity: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            workers: default_workers(),
            queue_capacity: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}
fn default_workers() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
        }
    }
}

fn default_limit() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl Config {
    /// In-code defaults for commands that work without a config file.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: default_data_root().join("ulearn.sqlite"),
            },
            models: ModelsConfig::default(),
            pipeline: PipelineConfig::default(),
            retrieval: RetrievalConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Directory holding model files.
    pub fn models_dir(&self) -> PathBuf {
        self.models.data_root.join("models")
    }

    pub fn validate(&self) -> Result<()> {
        if self.models.namespace.trim().is_empty() {
            bail!("models.namespace must not be empty");
        }

        if self.pipeline.workers == 0 {
            bail!("pipeline.workers must be >= 1");
        }

        if self.pipeline.queue_capacity == Some(0) {
            bail!("pipeline.queue_capacity must be >= 1 when set");
        }

        if self.retrieval.default_limit == 0 {
            bail!("retrieval.default_limit must be >= 1");
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => bail!(
                "Unknown logging level: '{}'. Must be trace, debug, info, warn, or error.",
                other
            ),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
