use chrono::Utc;
use colored::Colorize;
use tfe_coverage_config::CoverageConfig;
use tfe_coverage_core::CacheStore;

pub fn handle_show(config: &CoverageConfig) -> anyhow::Result<()> {
    let store = CacheStore::new(config.cache_path()?);
    println!("Cache file: {}", store.path().display().to_string().cyan());

    let loaded = store.load();
    if let Some(diagnostic) = &loaded.diagnostic {
        eprintln!("{} {}", "⚠".yellow(), diagnostic);
    }

    let cache = loaded.cache;
    if cache.is_empty() {
        println!("{}", "No cached snapshots".dimmed());
        return Ok(());
    }

    let ttl = chrono::Duration::seconds(i64::try_from(config.cache.ttl_secs).unwrap_or(i64::MAX));
    let now = Utc::now();
    println!("{} snapshot(s):", cache.len());
    for (key, entry) in cache.entries() {
        let age = now.signed_duration_since(entry.fetched_at);
        let state = if age < ttl {
            "fresh".green()
        } else {
            "expired".yellow()
        };
        println!(
            "  {:<40} {:>6} items  fetched {} ({}, {}m old)",
            key.to_string().cyan(),
            entry.snapshot.len(),
            entry.fetched_at.format("%Y-%m-%d %H:%M:%S UTC"),
            state,
            age.num_minutes()
        );
        if entry.stats.skipped > 0 {
            println!("      {} invalid record(s) skipped", entry.stats.skipped);
        }
    }

    Ok(())
}

pub fn handle_clear(config: &CoverageConfig) -> anyhow::Result<()> {
    let store = CacheStore::new(config.cache_path()?);
    if store.clear()? {
        println!("{} Cache cleared: {}", "✓".green(), store.path().display());
    } else {
        println!("No cache file at {}", store.path().display());
    }
    Ok(())
}
