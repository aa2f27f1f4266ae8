use anyhow::{Context, Result};
use console::style;
use datamapper_core::SqliteStore;

use crate::config::Config;

pub async fn run(config: &Config) -> Result<()> {
    let schema = config.load_schema()?;
    let store = SqliteStore::open(config.db_url()?, &schema)
        .await
        .with_context(|| format!("failed to open {}", config.db_path.display()))?;

    let history = store.import_history().await?;
    if history.is_empty() {
        eprintln!("{} No imports recorded", style("○").dim());
        return Ok(());
    }

    for log in history {
        println!(
            "{}  {}  {} entities ({} new, {} existing)",
            log.imported_at.format("%Y-%m-%d %H:%M:%S"),
            log.source,
            log.entity_count,
            log.created_count,
            log.matched_count
        );
    }

    Ok(())
}
