//! Yearly exempt-code pipeline
//!
//! For every year the source has published, pull the archive link off the
//! listing page, dig out the spreadsheet payload and hand the rows to the
//! snapshot reconciler. A year with no matching download link is fatal:
//! either the source layout changed or the link pattern needs updating,
//! and silently skipping a year would leave a hole in the calendar table.

use anyhow::Result;
use tracing::info;

use crate::domain::ExemptRow;
use crate::infrastructure::archive::{extract_payload_rows, ArchiveClient, SourceError};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::warehouse::Warehouse;

use super::reconcile::{ReconcileOutcome, SnapshotReconciler};

/// Per-year outcomes of one pipeline run.
#[derive(Debug, Default, serde::Serialize)]
pub struct ExemptRunSummary {
    pub outcomes: Vec<(String, ReconcileOutcome)>,
}

pub struct ExemptPipeline<'a> {
    client: &'a ArchiveClient,
    warehouse: &'a dyn Warehouse,
    config: &'a AppConfig,
}

impl<'a> ExemptPipeline<'a> {
    pub fn new(
        client: &'a ArchiveClient,
        warehouse: &'a dyn Warehouse,
        config: &'a AppConfig,
    ) -> Self {
        Self {
            client,
            warehouse,
            config,
        }
    }

    pub async fn run(&self) -> Result<ExemptRunSummary> {
        let exempt = &self.config.exempt;
        let year_links = self.client.year_links(&exempt.listing_url).await?;
        let last_year = self.config.logical_year()?;

        let reconciler =
            SnapshotReconciler::new(self.warehouse, &self.config.warehouse.exempt_table);
        let mut summary = ExemptRunSummary::default();

        for year in exempt.first_year..=last_year {
            let year = year.to_string();
            info!("Extracting year {year}");

            let available = year_links.get(&year).cloned().unwrap_or_default();
            let url = available
                .iter()
                .find(|url| url.contains(&exempt.link_pattern))
                .ok_or_else(|| SourceError::NotFound {
                    year: year.clone(),
                    pattern: exempt.link_pattern.clone(),
                    available: available.clone(),
                })?;

            let archive_bytes = self.client.download(url).await?;
            let raw_rows = extract_payload_rows(&archive_bytes, &exempt.payload_pattern, &year)?;

            let rows: Vec<ExemptRow> = raw_rows
                .into_iter()
                .map(|[order, code, description]| ExemptRow {
                    order,
                    code,
                    description,
                    year: year.clone(),
                    date_parse: self.config.logical_date.clone(),
                })
                .collect();

            info!("Year {year}: {} rows parsed", rows.len());
            let outcome = reconciler.reconcile(&year, rows, &self.config.logical_date)?;
            summary.outcomes.push((year, outcome));
        }

        Ok(summary)
    }
}
