use anyhow::Result;
use chrono::Utc;
use dealwatch::{config::Config, scraping::DedupStore};

/// Evict expired records and compact the dedup file
pub fn prune_store(config: Config) -> Result<()> {
    let mut store = DedupStore::new(config.dedup.path.clone(), config.dedup.retention());
    let kept = store.prune(Utc::now())?;
    println!(
        "{}: {} record(s) within the last {}h",
        store.path().display(),
        kept,
        config.dedup.retention_hours
    );
    Ok(())
}
