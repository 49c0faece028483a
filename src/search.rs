//! Prompt-pattern retrieval for `ulearn search`.

use anyhow::Result;

use usage_learn_core::search::PatternMatch;

use crate::config::Config;
use crate::engine::Engine;

/// Ranked matches for `query`. `limit` falls back to `retrieval.default_limit`.
pub async fn search_patterns(
    config: &Config,
    query: &str,
    limit: Option<usize>,
) -> Result<Vec<PatternMatch>> {
    let engine = Engine::open(config).await?;
    let results = engine.search(query, limit).await;
    engine.shutdown().await;
    results
}

pub async fn run_search(
    config: &Config,
    query: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let results = search_patterns(config, query, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, m) in results.iter().enumerate() {
        let record = &m.record;
        let date = chrono::DateTime::from_timestamp(record.updated_at, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        println!(
            "{}. [overlap {} / score {}] {}",
            i + 1,
            m.overlap,
            record.score,
            record.kind
        );
        println!("    prompt: \"{}\"", record.prompt_pattern);
        println!("    source: {}", record.source);
        println!("    updated: {}", date);
        println!("    content: \"{}\"", excerpt(&record.content, 120));
        println!("    id: {}", record.id);
        println!();
    }

    Ok(())
}

/// Single-line excerpt of at most `max` characters.
fn excerpt(content: &str, max: usize) -> String {
    let flat = content.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= max {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{}...", cut)
}
