//! Record building for the three ingestion events.
//!
//! These functions are pure: they parse, classify, and derive metadata, and
//! return the [`NewRecord`]s a store should upsert. Queueing and
//! persistence live in the application crate.
//!
//! | Event | Records |
//! |-------|---------|
//! | [`Generation`] | one per chunk, plus one per theme property / text literal |
//! | [`Replacement`] | one `FixPatch` per chunk difference |
//! | [`Observation`] | one `MetadataTransformation` |

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Map, Value};

use crate::classifier::Classifier;
use crate::diff::compute_differences;
use crate::models::{
    Category, ChangeType, ChunkKind, CodeChunk, CodeDifference, NewRecord, RecordSource,
};
use crate::parser::{extract_text_content, extract_theme_properties, parse_to_chunks};
use crate::prompt::{extract_expectations, normalize_prompt, prompt_intents, ReasonType};

/// A completed code generation.
#[derive(Debug, Clone)]
pub struct Generation {
    pub prompt: String,
    pub code: String,
    pub metadata: Option<Value>,
    pub source: RecordSource,
    pub language: Option<String>,
}

/// Code that replaced an earlier version for a stated reason.
#[derive(Debug, Clone)]
pub struct Replacement {
    pub prompt: String,
    pub old_code: Option<String>,
    pub new_code: String,
    pub reason: String,
    pub metadata: Option<Value>,
    pub language: Option<String>,
}

/// A raw object/property observation.
#[derive(Debug, Clone)]
pub struct Observation {
    pub object_name: String,
    pub object_type: String,
    pub properties: BTreeMap<String, String>,
    pub prompt: String,
    pub context: String,
}

/// Caller metadata as a JSON object. Non-object values are kept under `"caller"`.
fn caller_fields(metadata: Option<&Value>) -> Map<String, Value> {
    match metadata {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::Null) | None => Map::new(),
        Some(other) => {
            let mut map = Map::new();
            map.insert("caller".to_string(), other.clone());
            map
        }
    }
}

/// Derived fields overwrite caller fields of the same name.
fn merged(base: &Map<String, Value>, derived: Value) -> Value {
    let mut out = base.clone();
    if let Value::Object(fields) = derived {
        out.extend(fields);
    }
    Value::Object(out)
}

fn distinct_names(chunks: &[CodeChunk]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    chunks
        .iter()
        .filter(|c| seen.insert(c.name.as_str()))
        .map(|c| c.name.clone())
        .collect()
}

fn distinct_property_keys(chunks: &[CodeChunk]) -> Vec<String> {
    chunks
        .iter()
        .flat_map(|c| c.properties.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Records for a completed generation.
pub fn generation_records(event: &Generation, classifier: &Classifier) -> Vec<NewRecord> {
    if event.code.trim().is_empty() {
        return Vec::new();
    }

    let chunks = parse_to_chunks(&event.code, event.language.as_deref());
    let prompt_pattern = normalize_prompt(&event.prompt);
    let base = caller_fields(event.metadata.as_ref());
    let shared = json!({
        "prompt": event.prompt,
        "expectations": extract_expectations(&event.prompt),
        "intents": prompt_intents(&event.prompt),
        "chunk_names": distinct_names(&chunks),
        "property_keys": distinct_property_keys(&chunks),
    });

    let record = |kind: Category, content: &str, extra: Value| {
        let mut metadata = merged(&base, shared.clone());
        if let (Value::Object(out), Value::Object(fields)) = (&mut metadata, extra) {
            out.extend(fields);
        }
        NewRecord {
            kind,
            content: content.to_string(),
            source: event.source,
            metadata,
            prompt_pattern: prompt_pattern.clone(),
        }
    };

    let mut records = Vec::new();

    if chunks.is_empty() {
        let content = event.code.trim();
        let result = classifier.classify_with_confidence(content, Some(&event.prompt));
        records.push(record(
            result.category,
            content,
            json!({
                "chunk": null,
                "classification": { "category": result.category, "confidence": result.confidence },
            }),
        ));
        return records;
    }

    for chunk in &chunks {
        let result = classifier.classify_with_confidence(&chunk.content, Some(&event.prompt));
        records.push(record(
            result.category,
            &chunk.content,
            json!({
                "chunk": {
                    "type": chunk.kind,
                    "name": chunk.name,
                    "properties": chunk.properties,
                },
                "classification": { "category": result.category, "confidence": result.confidence },
            }),
        ));
    }

    for (key, value) in extract_theme_properties(&chunks) {
        records.push(record(
            Category::MetadataTransformation,
            &format!("theme property {} = {}", key, value),
            json!({ "pattern_type": "theme_property", "property": key, "value": value }),
        ));
    }

    for text in extract_text_content(&chunks) {
        records.push(record(
            Category::MetadataTransformation,
            &format!("text content \"{}\"", text),
            json!({ "pattern_type": "text_content", "text": text }),
        ));
    }

    records
}

/// Render a difference as `-`/`+` prefixed lines.
pub fn render_patch(diff: &CodeDifference) -> String {
    let mut out = format!("{} {} {}\n", diff.change_type.as_str(), diff.chunk_kind, diff.chunk_name);
    for line in diff.old_content.lines() {
        out.push('-');
        out.push_str(line);
        out.push('\n');
    }
    for line in diff.new_content.lines() {
        out.push('+');
        out.push_str(line);
        out.push('\n');
    }
    out.trim_end().to_string()
}

/// Chunk differences between the two code versions of a replacement.
///
/// When neither version yields chunks, the whole texts are compared as a
/// single unnamed chunk.
pub fn replacement_differences(event: &Replacement) -> Vec<CodeDifference> {
    let old_code = event.old_code.as_deref().unwrap_or("");
    let hint = event.language.as_deref();
    let old_chunks = parse_to_chunks(old_code, hint);
    let new_chunks = parse_to_chunks(&event.new_code, hint);

    if old_chunks.is_empty() && new_chunks.is_empty() {
        let (old, new) = (old_code.trim(), event.new_code.trim());
        if old == new || new.is_empty() {
            return Vec::new();
        }
        return vec![CodeDifference {
            change_type: if old.is_empty() {
                ChangeType::Added
            } else {
                ChangeType::Modified
            },
            chunk_kind: ChunkKind::Variable,
            chunk_name: String::new(),
            old_content: old.to_string(),
            new_content: new.to_string(),
        }];
    }

    compute_differences(&old_chunks, &new_chunks)
}

/// Records for a reasoned replacement.
pub fn replacement_records(event: &Replacement) -> Vec<NewRecord> {
    let reason_type = ReasonType::classify(&event.reason);
    let prompt_pattern = normalize_prompt(&event.prompt);
    let base = caller_fields(event.metadata.as_ref());

    replacement_differences(event)
        .into_iter()
        .map(|diff| NewRecord {
            kind: Category::FixPatch,
            content: render_patch(&diff),
            source: RecordSource::DebugFeedback,
            metadata: merged(
                &base,
                json!({
                    "prompt": event.prompt,
                    "reason": event.reason,
                    "reason_type": reason_type,
                    "change_type": diff.change_type,
                    "chunk": { "type": diff.chunk_kind, "name": diff.chunk_name },
                    "old_content": diff.old_content,
                    "new_content": diff.new_content,
                }),
            ),
            prompt_pattern: prompt_pattern.clone(),
        })
        .collect()
}

/// Human-readable rendering of an observation.
pub fn render_observation(event: &Observation) -> String {
    let mut out = format!("{} '{}'", event.object_type, event.object_name);
    if !event.properties.is_empty() {
        let props: Vec<String> = event
            .properties
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        out.push_str(&format!(" with {}", props.join(", ")));
    }
    if !event.context.trim().is_empty() {
        out.push_str(&format!(" (context: {})", event.context.trim()));
    }
    out
}

/// The single record for an object observation.
pub fn observation_record(event: &Observation) -> NewRecord {
    NewRecord {
        kind: Category::MetadataTransformation,
        content: render_observation(event),
        source: RecordSource::Background,
        metadata: json!({
            "prompt": event.prompt,
            "intents": prompt_intents(&event.prompt),
            "object_name": event.object_name,
            "object_type": event.object_type,
            "properties": event.properties,
            "context": event.context,
        }),
        prompt_pattern: normalize_prompt(&event.prompt),
    }
}
