//! Learned-record retrieval by ID.

use anyhow::{bail, Result};

use usage_learn_core::models::LearnedRecord;

use crate::config::Config;
use crate::engine::Engine;

pub async fn get_record(config: &Config, id: &str) -> Result<LearnedRecord> {
    let engine = Engine::open(config).await?;
    let record = engine.store().get_record(id).await;
    engine.shutdown().await;
    match record? {
        Some(r) => Ok(r),
        None => bail!("record not found: {}", id),
    }
}

/// CLI entry point: fetch one record and print it.
pub async fn run_get(config: &Config, id: &str, json: bool) -> Result<()> {
    let record = match get_record(config, id).await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!("--- Record ---");
    println!("id:             {}", record.id);
    println!("kind:           {}", record.kind);
    println!("source:         {}", record.source);
    println!("score:          {}", record.score);
    println!("prompt_pattern: {}", record.prompt_pattern);
    println!("created_at:     {}", format_ts_iso(record.created_at));
    println!("updated_at:     {}", format_ts_iso(record.updated_at));
    println!();

    println!("--- Content ---");
    println!("{}", record.content);
    println!();

    println!("--- Metadata ---");
    println!("{}", serde_json::to_string_pretty(&record.metadata)?);

    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}
