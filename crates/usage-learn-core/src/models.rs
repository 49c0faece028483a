//! Core data models shared by the parser, classifier, pipeline, and stores.
//!
//! [`CodeChunk`] and [`CodeDifference`] are transient values produced while
//! processing a single ingestion event. [`LearnedRecord`] and
//! [`ModelDescriptor`] are the only types that outlive a pipeline run.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// Structural kind of a [`CodeChunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Class,
    Function,
    Object,
    Variable,
    Property,
}

impl ChunkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkKind::Class => "class",
            ChunkKind::Function => "function",
            ChunkKind::Object => "object",
            ChunkKind::Variable => "variable",
            ChunkKind::Property => "property",
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structurally identified fragment of source text.
///
/// Two chunks describe the same entity across versions iff their
/// `(kind, name)` pair matches; content is irrelevant to identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChunk {
    pub kind: ChunkKind,
    pub name: String,
    pub content: String,
    pub properties: BTreeMap<String, String>,
}

impl CodeChunk {
    pub fn new(kind: ChunkKind, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            content: content.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.properties = properties;
        self
    }

    /// Identity key used when diffing two versions of the same source.
    pub fn identity(&self) -> (ChunkKind, &str) {
        (self.kind, self.name.as_str())
    }
}

/// Classifier output label. Also the `kind` of a persisted [`LearnedRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    CodeSnippet,
    ApiUsage,
    FixPatch,
    MetadataTransformation,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::CodeSnippet,
        Category::ApiUsage,
        Category::FixPatch,
        Category::MetadataTransformation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::CodeSnippet => "code_snippet",
            Category::ApiUsage => "api_usage",
            Category::FixPatch => "fix_patch",
            Category::MetadataTransformation => "metadata_transformation",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "code_snippet" => Ok(Category::CodeSnippet),
            "api_usage" => Ok(Category::ApiUsage),
            "fix_patch" => Ok(Category::FixPatch),
            "metadata_transformation" => Ok(Category::MetadataTransformation),
            other => bail!("unknown record kind: '{}'", other),
        }
    }
}

/// Category plus a confidence in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub category: Category,
    pub confidence: f64,
}

/// Provenance of a learned record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    /// Regular generation flow.
    Normal,
    /// Feedback captured while debugging generated code.
    DebugFeedback,
    /// Passive observation of objects and properties.
    Background,
}

impl RecordSource {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordSource::Normal => "normal",
            RecordSource::DebugFeedback => "debug_feedback",
            RecordSource::Background => "background",
        }
    }
}

impl fmt::Display for RecordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "normal" => Ok(RecordSource::Normal),
            "debug_feedback" | "debug" => Ok(RecordSource::DebugFeedback),
            "background" => Ok(RecordSource::Background),
            other => bail!(
                "unknown record source: '{}'. Must be normal, debug, or background.",
                other
            ),
        }
    }
}

/// A record ready to be upserted, before the store assigns identity and score.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub kind: Category,
    pub content: String,
    pub source: RecordSource,
    pub metadata: serde_json::Value,
    pub prompt_pattern: String,
}

/// The persisted unit of learned knowledge.
///
/// Deduplicated by `(kind, content)`; repeated observations bump `score`
/// and `updated_at` instead of inserting a second row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearnedRecord {
    pub id: String,
    pub kind: Category,
    pub content: String,
    pub source: RecordSource,
    pub metadata: serde_json::Value,
    pub prompt_pattern: String,
    pub score: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// How a chunk changed between two code versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Modified => "modified",
            ChangeType::Removed => "removed",
        }
    }
}

/// A single chunk-level change. Derived, never persisted directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeDifference {
    pub change_type: ChangeType,
    pub chunk_kind: ChunkKind,
    pub chunk_name: String,
    pub old_content: String,
    pub new_content: String,
}

/// Classification backend families. Each maps to a model-file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    /// WordPiece tokenizer vocabulary.
    WordPiece,
    /// Byte-pair-encoding merge rules.
    Bpe,
    /// Opaque binary model weights.
    Generic,
}

impl BackendType {
    pub fn file_extension(self) -> &'static str {
        match self {
            BackendType::WordPiece => "vocab",
            BackendType::Bpe => "merges",
            BackendType::Generic => "bin",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BackendType::WordPiece => "wordpiece",
            BackendType::Bpe => "bpe",
            BackendType::Generic => "generic",
        }
    }
}

impl FromStr for BackendType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "wordpiece" | "vocab" => Ok(BackendType::WordPiece),
            "bpe" | "merges" => Ok(BackendType::Bpe),
            "generic" | "bin" => Ok(BackendType::Generic),
            other => bail!(
                "unknown backend type: '{}'. Must be wordpiece, bpe, or generic.",
                other
            ),
        }
    }
}

/// Describes a classification backend, independent of whether its file exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub display_name: String,
    pub backend_type: BackendType,
    #[serde(default)]
    pub local_file_path: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub downloaded: bool,
    #[serde(default)]
    pub built_in: bool,
}
