//! `ulearn learn`: feed one usage event through the learning pipeline.
//!
//! Each command enqueues a single event, then shuts the pipeline down so
//! the event is fully processed before the process exits.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

use usage_learn_core::learning::{Generation, Observation, Replacement};
use usage_learn_core::models::RecordSource;

use crate::config::Config;
use crate::engine::Engine;
use crate::pipeline::Consumer;

/// Which usage event to learn from.
pub enum LearnEvent {
    Generation(Generation),
    Replacement(Replacement),
    Observation(Observation),
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read source file: {}", path.display()))
}

fn extension_hint(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().into_owned())
}

/// Parse `--metadata` as a JSON value.
pub fn parse_metadata(raw: Option<&str>) -> Result<Option<serde_json::Value>> {
    raw.map(|s| serde_json::from_str(s).with_context(|| "Invalid --metadata JSON"))
        .transpose()
}

pub fn generation_event(
    prompt: &str,
    code_file: &Path,
    metadata: Option<&str>,
    source: &str,
    language: Option<&str>,
) -> Result<LearnEvent> {
    Ok(LearnEvent::Generation(Generation {
        prompt: prompt.to_string(),
        code: read_source(code_file)?,
        metadata: parse_metadata(metadata)?,
        source: RecordSource::from_str(source)?,
        language: language
            .map(str::to_string)
            .or_else(|| extension_hint(code_file)),
    }))
}

pub fn replacement_event(
    prompt: &str,
    old_file: Option<&Path>,
    new_file: &Path,
    reason: &str,
    metadata: Option<&str>,
    language: Option<&str>,
) -> Result<LearnEvent> {
    let old_code = old_file.map(read_source).transpose()?;
    Ok(LearnEvent::Replacement(Replacement {
        prompt: prompt.to_string(),
        old_code,
        new_code: read_source(new_file)?,
        reason: reason.to_string(),
        metadata: parse_metadata(metadata)?,
        language: language
            .map(str::to_string)
            .or_else(|| extension_hint(new_file)),
    }))
}

pub fn observation_event(
    object_name: &str,
    object_type: &str,
    props: Vec<(String, String)>,
    prompt: &str,
    context: Option<&str>,
) -> LearnEvent {
    LearnEvent::Observation(Observation {
        object_name: object_name.to_string(),
        object_type: object_type.to_string(),
        properties: props.into_iter().collect::<BTreeMap<_, _>>(),
        prompt: prompt.to_string(),
        context: context.unwrap_or_default().to_string(),
    })
}

/// Enqueue `event` on behalf of `model`, drain the pipeline, and report.
pub async fn run_learn(config: &Config, model: &str, event: LearnEvent) -> Result<()> {
    if !config.pipeline.enabled {
        bail!("Learning pipeline is disabled (pipeline.enabled = false)");
    }

    let engine = Engine::open(config).await?;
    let consumer = Consumer::from_model_name(model);

    let accepted = match event {
        LearnEvent::Generation(e) => engine.pipeline().ingest_complete_generation(&consumer, e),
        LearnEvent::Replacement(e) => engine.pipeline().ingest_reasoned_replacement(&consumer, e),
        LearnEvent::Observation(e) => engine.pipeline().ingest_object_observation(&consumer, e),
    };

    if !accepted {
        engine.shutdown().await;
        println!("Skipped: event from '{}' was not queued.", model);
        return Ok(());
    }

    let pipeline = engine.pipeline();
    pipeline.shutdown().await;
    let (written, failed) = (pipeline.records_written(), pipeline.failed());
    engine.shutdown().await;

    if failed > 0 {
        bail!("Learning task failed; see log output for details");
    }
    println!("Learned {} record(s).", written);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_must_be_json() {
        assert!(parse_metadata(None).unwrap().is_none());
        assert_eq!(
            parse_metadata(Some(r#"{"screen":"login"}"#)).unwrap().unwrap()["screen"],
            "login"
        );
        assert!(parse_metadata(Some("{not json")).is_err());
    }

    #[test]
    fn generation_takes_language_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Main.kt");
        std::fs::write(&path, "fun main() {}").unwrap();

        let LearnEvent::Generation(g) =
            generation_event("make main", &path, None, "debug", None).unwrap()
        else {
            panic!("expected generation");
        };
        assert_eq!(g.language.as_deref(), Some("kt"));
        assert_eq!(g.source, RecordSource::DebugFeedback);
    }

    #[test]
    fn unknown_source_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.kt");
        std::fs::write(&path, "val a = 1").unwrap();
        assert!(generation_event("p", &path, None, "weird", None).is_err());
    }

    #[test]
    fn missing_old_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let new = dir.path().join("new.kt");
        std::fs::write(&new, "val a = 2").unwrap();
        let err = replacement_event(
            "p",
            Some(&dir.path().join("missing.kt")),
            &new,
            "fix",
            None,
            None,
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("missing.kt"));
    }
}
