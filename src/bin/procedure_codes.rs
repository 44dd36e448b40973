//! Worklist extraction entrypoint
//!
//! Reads the previously accepted codes back out of the warehouse, drives
//! the authenticated catalog session through each detail page in chunks
//! and appends the results.

use anyhow::Result;
use tracing::info;

use medcode_crawler::application::batch::load_worklist;
use medcode_crawler::application::{BatchDriver, ReferenceKeys};
use medcode_crawler::infrastructure::config::AppConfig;
use medcode_crawler::infrastructure::extract::CatalogScraper;
use medcode_crawler::infrastructure::logging::init_logging;
use medcode_crawler::infrastructure::session::BrowserSession;
use medcode_crawler::infrastructure::warehouse::LocalWarehouse;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging, "procedure-codes")?;
    config.validate_for_extraction()?;
    info!("Running on date: {}", config.logical_date);

    let warehouse = LocalWarehouse::new(&config.warehouse.root);

    let worklist = load_worklist(&warehouse, &config.warehouse)?;
    info!("{} codes on the worklist", worklist.len());

    // Captured once; chunks within this run intentionally share it.
    let reference = ReferenceKeys::capture(&warehouse, &config.warehouse)?;

    let session = BrowserSession::launch(&config.crawl).await?;
    session.login(&config.site, &config.auth).await?;
    let scraper = CatalogScraper::new(session, config.site.base_url.clone())?;

    let driver = BatchDriver::new(
        &scraper,
        &warehouse,
        &config.warehouse,
        &reference,
        config.crawl.chunk_size,
        config.run_file_prefix(),
    );
    let summary = driver.run(&worklist).await;

    scraper.shutdown().await;
    info!("Run summary: {}", serde_json::to_string(&summary)?);
    info!("Process finished");

    if summary.failed_flushes > 0 {
        anyhow::bail!("{} chunk flushes failed; see log for tables", summary.failed_flushes);
    }
    Ok(())
}
