//! Pattern store statistics and model status overview.
//!
//! Used by `ulearn stats` to show how much has been learned, split by
//! record kind, along with the state of the selected classification model.

use anyhow::Result;

use crate::config::Config;
use crate::engine::Engine;

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let engine = Engine::open(config).await?;
    let stats = engine.store().get_stats().await?;
    let last_update: Option<i64> = match engine.pool() {
        Some(pool) => {
            sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(updated_at) FROM learned_records")
                .fetch_one(pool)
                .await?
        }
        None => None,
    };
    let active = engine.registry().get_active_model_name().await?;
    let selected = engine.registry().get_selected().await?;
    let ready = engine.registry().is_ready().await?;
    engine.shutdown().await;

    if json {
        let body = serde_json::json!({
            "database": config.db.path.display().to_string(),
            "stats": stats,
            "last_update": last_update,
            "active_model": active,
            "selected_model": selected.as_ref().map(|d| d.id.clone()),
            "model_ready": ready,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Usage Learn: Pattern Store Stats");
    println!("================================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Records:     {}", stats.total_records);
    println!("  Total score: {}", stats.total_score);
    println!(
        "  Last update: {}",
        match last_update {
            Some(ts) => format_ts_relative(ts),
            None => "never".to_string(),
        }
    );
    println!();
    println!("  By kind:");
    println!("  {:<26} {:>8} {:>8}", "KIND", "RECORDS", "SCORE");
    println!("  {}", "-".repeat(44));
    for k in &stats.by_kind {
        println!("  {:<26} {:>8} {:>8}", k.kind, k.records, k.score);
    }
    println!();
    println!("  Active model:   {}", active);
    println!(
        "  Selected model: {}{}",
        selected
            .as_ref()
            .map(|d| d.id.as_str())
            .unwrap_or("(none)"),
        if ready { " (ready)" } else { "" }
    );
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
