//! Exempt-code snapshot entrypoint
//!
//! Walks every published year of the exempt-code archive and lets the
//! reconciler decide, per year, whether the calendar table needs a new
//! snapshot version.

use anyhow::Result;
use tracing::{error, info};

use medcode_crawler::application::{ExemptPipeline, ReconcileOutcome};
use medcode_crawler::infrastructure::archive::ArchiveClient;
use medcode_crawler::infrastructure::config::AppConfig;
use medcode_crawler::infrastructure::logging::init_logging;
use medcode_crawler::infrastructure::warehouse::LocalWarehouse;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging, "exempt-codes")?;
    config.validate_for_exempt()?;
    info!("Running on date: {}", config.logical_date);

    let warehouse = LocalWarehouse::new(&config.warehouse.root);
    let client = ArchiveClient::new()?;

    let pipeline = ExemptPipeline::new(&client, &warehouse, &config);
    let summary = match pipeline.run().await {
        Ok(summary) => summary,
        Err(e) => {
            error!("Exempt pipeline failed: {e:#}");
            return Err(e);
        }
    };

    for (year, outcome) in &summary.outcomes {
        match outcome {
            ReconcileOutcome::Committed { version, rows } => {
                info!("Year {year}: committed version {version} ({rows} rows)");
            }
            ReconcileOutcome::Unchanged { version } => {
                info!("Year {year}: unchanged at version {version}");
            }
        }
    }
    info!("Run summary: {}", serde_json::to_string(&summary)?);
    info!("Process finished");
    Ok(())
}
