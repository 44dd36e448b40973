//! Chunked batch driver
//!
//! Walks the worklist sequentially (the session owns one rendered page),
//! accumulating the three output tables per chunk and flushing each chunk
//! independently. A failing item is logged and skipped; a failing chunk
//! flush is logged and must not block the chunks after it.

use serde::Serialize;
use tracing::{error, info};

use crate::domain::{normalize_worklist, ModifierRow, NdcRow, ProcedureRecord};
use crate::infrastructure::config::WarehouseConfig;
use crate::infrastructure::extract::RecordSource;
use crate::infrastructure::warehouse::schema::{modifier_batch, ndc_batch, procedure_batch};
use crate::infrastructure::warehouse::{Warehouse, WarehouseResult};

use super::dedup::ReferenceKeys;

/// What a run did, for the closing log line and the scheduler's records.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub items: usize,
    pub skipped: usize,
    pub record_rows: usize,
    pub modifier_rows: usize,
    pub ndc_rows: usize,
    pub failed_flushes: usize,
}

/// The worklist is the code column of the main table, with the blank and
/// literal "false" sentinels dropped.
pub fn load_worklist(
    warehouse: &dyn Warehouse,
    tables: &WarehouseConfig,
) -> WarehouseResult<Vec<String>> {
    use crate::infrastructure::warehouse::schema::string_column_values;

    let batches = warehouse.read_table(&tables.procedure_table)?;
    let raw = string_column_values(&batches, &tables.procedure_table, "code")?;
    Ok(normalize_worklist(raw))
}

pub struct BatchDriver<'a, S: RecordSource> {
    source: &'a S,
    warehouse: &'a dyn Warehouse,
    tables: &'a WarehouseConfig,
    reference: &'a ReferenceKeys,
    chunk_size: usize,
    file_prefix: String,
}

impl<'a, S: RecordSource> BatchDriver<'a, S> {
    pub fn new(
        source: &'a S,
        warehouse: &'a dyn Warehouse,
        tables: &'a WarehouseConfig,
        reference: &'a ReferenceKeys,
        chunk_size: usize,
        file_prefix: impl Into<String>,
    ) -> Self {
        Self {
            source,
            warehouse,
            tables,
            reference,
            chunk_size: chunk_size.max(1),
            file_prefix: file_prefix.into(),
        }
    }

    pub async fn run(&self, worklist: &[String]) -> RunSummary {
        let mut summary = RunSummary::default();

        for (chunk_index, chunk) in worklist.chunks(self.chunk_size).enumerate() {
            info!("Processing chunk {chunk_index} ({} codes)", chunk.len());

            let mut records: Vec<ProcedureRecord> = Vec::new();
            let mut modifiers: Vec<ModifierRow> = Vec::new();
            let mut ndc_rows: Vec<NdcRow> = Vec::new();

            for code in chunk {
                summary.items += 1;
                match self.source.extract(code).await {
                    Ok(result) => {
                        let (r, m, n) = result.into_rows(code);
                        records.extend(r);
                        modifiers.extend(m);
                        ndc_rows.extend(n);
                    }
                    // One bad item never takes its chunk down.
                    Err(e) => {
                        error!("Skipping code {code}: {e:#}");
                        summary.skipped += 1;
                    }
                }
            }

            let modifiers = self.reference.filter_modifiers(modifiers);
            let ndc_rows = self.reference.filter_ndc(ndc_rows);

            summary.record_rows += records.len();
            summary.modifier_rows += modifiers.len();
            summary.ndc_rows += ndc_rows.len();

            self.flush_chunk(chunk_index, &records, &modifiers, &ndc_rows, &mut summary);
        }

        info!(
            "Run finished: {} items, {} skipped, {} record rows, {} modifier rows, {} drug-code rows, {} failed flushes",
            summary.items,
            summary.skipped,
            summary.record_rows,
            summary.modifier_rows,
            summary.ndc_rows,
            summary.failed_flushes
        );
        summary
    }

    fn flush_chunk(
        &self,
        chunk_index: usize,
        records: &[ProcedureRecord],
        modifiers: &[ModifierRow],
        ndc_rows: &[NdcRow],
        summary: &mut RunSummary,
    ) {
        if records.is_empty() {
            info!("No new records for chunk {chunk_index}");
        } else {
            self.flush_table(
                &self.tables.procedure_table,
                procedure_batch(records).map_err(Into::into),
                summary,
            );
        }

        if modifiers.is_empty() {
            info!("No new modifiers for chunk {chunk_index}");
        } else {
            self.flush_table(
                &self.tables.modifier_table,
                modifier_batch(modifiers).map_err(Into::into),
                summary,
            );
        }

        if ndc_rows.is_empty() {
            info!("No new drug codes for chunk {chunk_index}");
        } else {
            self.flush_table(
                &self.tables.ndc_table,
                ndc_batch(ndc_rows).map_err(Into::into),
                summary,
            );
        }
    }

    fn flush_table(
        &self,
        table: &str,
        batch: Result<arrow::record_batch::RecordBatch, anyhow::Error>,
        summary: &mut RunSummary,
    ) {
        let result = batch.and_then(|batch| {
            self.warehouse
                .append(table, &self.file_prefix, batch)
                .map_err(Into::into)
        });
        // A failed flush costs this chunk's rows, never the run.
        if let Err(e) = result {
            error!("Failed to flush chunk rows to {table}: {e:#}");
            summary.failed_flushes += 1;
        }
    }
}
