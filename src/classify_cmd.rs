//! `ulearn classify` and `ulearn parse`: offline inspection commands that
//! need no database.

use std::path::Path;

use anyhow::{Context, Result};

use usage_learn_core::classifier::{extract_features, Classifier};
use usage_learn_core::parser::{parse_to_chunks, resolve_language};

/// Classify a text with the rule-based classifier and print the result.
pub fn run_classify(text: &str, context: Option<&str>, json: bool) -> Result<()> {
    let result = Classifier::rule_based().classify_with_confidence(text, context);
    let features = extract_features(text);

    if json {
        let body = serde_json::json!({
            "category": result.category,
            "confidence": result.confidence,
            "features": features,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("category:   {}", result.category);
    println!("confidence: {:.2}", result.confidence);
    println!("features:   {}", serde_json::to_string(&features)?);
    Ok(())
}

/// Parse a source file into chunks and print them as JSON.
///
/// Without `--language`, the file extension is tried as a hint before
/// falling back to content sniffing.
pub fn run_parse(file: &Path, language: Option<&str>) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read source file: {}", file.display()))?;

    let hint = language
        .map(str::to_string)
        .or_else(|| file.extension().map(|e| e.to_string_lossy().into_owned()));
    let detected = resolve_language(&text, hint.as_deref());
    let chunks = parse_to_chunks(&text, hint.as_deref());

    let body = serde_json::json!({
        "file": file.display().to_string(),
        "language": detected.as_str(),
        "chunks": chunks,
    });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
