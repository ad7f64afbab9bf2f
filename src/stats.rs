//! Index statistics and health checks.
//!
//! `sdx stats` summarises what is indexed: engine entries, catalog rows per
//! doctype and item type, the watermarks and whether a writer holds the
//! index. `sdx check` runs the consistency sweep and fails if the engine
//! and the shadow catalog disagree. `sdx unlock` clears a stuck busy flag.

use anyhow::{bail, Result};

use shadowdex_core::consistency;
use shadowdex_core::index::FullTextEngine;

use crate::config::Config;
use crate::db;
use crate::fts_engine::SqliteFtsEngine;
use crate::sqlite_catalog::SqliteCatalog;
use crate::state::{force_unlock, load_state, lock_info};

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let engine = SqliteFtsEngine::new(pool.clone());

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Shadowdex Index Stats");
    println!("=====================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));

    if !engine.is_available().await {
        println!();
        println!("  Index not initialized. Run `sdx init`.");
        pool.close().await;
        return Ok(());
    }

    let entries = engine.count().await?;
    let catalog = SqliteCatalog::new(pool.clone());
    let counts = catalog.counts().await?;
    let descriptors: i64 = counts.iter().map(|(_, _, n)| n).sum();
    let state = load_state(&pool).await?;
    let lock = lock_info(&pool).await?;

    println!();
    println!("  Entries:     {}", entries);
    println!("  Documents:   {}", descriptors);
    println!("  Added since: {}", format_cursor(state.addition_cursor));
    println!("  Updated since: {}", format_cursor(state.update_cursor));
    println!("  Busy:        {}", if state.busy { "yes" } else { "no" });
    match lock {
        Some((holder, at)) => println!("  Lock:        {} ({})", holder, format_ts_relative(at)),
        None => println!("  Lock:        free"),
    }

    if !counts.is_empty() {
        println!();
        println!("  By doctype:");
        println!("  {:<20} {:<16} {:>8}", "DOCTYPE", "ITEM TYPE", "DOCS");
        println!("  {}", "-".repeat(46));
        for (doc_type, item_type, n) in &counts {
            println!("  {:<20} {:<16} {:>8}", doc_type, item_type, n);
        }
    }

    println!();
    pool.close().await;
    Ok(())
}

/// Consistency sweep. Read-only; fails if any problem is found.
pub async fn run_check(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let engine = SqliteFtsEngine::new(pool.clone());
    if !engine.is_available().await {
        bail!("Index not initialized. Run `sdx init` first.");
    }
    let catalog = SqliteCatalog::new(pool.clone());
    let report = consistency::check(&engine, &catalog).await?;
    pool.close().await;

    println!("check");
    println!("  engine entries: {}", report.engine_entries);
    println!("  documents: {}", report.descriptors);
    println!("  orphan documents: {}", report.orphan_descriptors.len());
    for desc in &report.orphan_descriptors {
        println!("    {} (shadow id {})", desc.key(), desc.shadow_id);
    }
    println!("  unreachable entries: {}", report.unreachable_entries.len());
    for entry in &report.unreachable_entries {
        match entry.shadow_id {
            Some(id) => println!("    {} (shadow id {})", entry.key, id),
            None => println!("    {} (no shadow id)", entry.key),
        }
    }
    println!("  duplicate keys: {}", report.duplicate_keys.len());
    for key in &report.duplicate_keys {
        println!("    {}", key);
    }

    if !report.is_consistent() {
        bail!("index and document catalog are out of step; run `sdx index` to rebuild");
    }
    println!("ok");
    Ok(())
}

pub async fn run_unlock(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    if !SqliteFtsEngine::new(pool.clone()).is_available().await {
        bail!("Index not initialized. Run `sdx init` first.");
    }
    force_unlock(&pool, chrono::Utc::now().timestamp()).await?;
    pool.close().await;
    println!("Busy flag and sync lock cleared.");
    Ok(())
}

fn format_cursor(ts: i64) -> String {
    if ts == 0 {
        "never".to_string()
    } else {
        format_ts_relative(ts)
    }
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
    let delta = chrono::Utc::now().timestamp() - ts;

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
