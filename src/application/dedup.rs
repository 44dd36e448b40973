//! Dedup filter reference snapshot
//!
//! Sub-record tables are append-only, so duplicate protection happens
//! before the write: any modifier or drug-code row whose natural key is
//! already in the warehouse is dropped. The reference set is captured once
//! at run start and deliberately not refreshed per chunk; the keys are
//! stable reference data, and a same-run duplicate would require the site
//! to publish the same key under two codes within one run.

use std::collections::HashSet;

use tracing::info;

use crate::domain::{ModifierRow, NdcRow};
use crate::infrastructure::config::WarehouseConfig;
use crate::infrastructure::warehouse::schema::string_column_values;
use crate::infrastructure::warehouse::{Warehouse, WarehouseResult};

/// Natural keys already present in the sub-record tables.
#[derive(Debug, Default)]
pub struct ReferenceKeys {
    modifiers: HashSet<String>,
    ndc_ids: HashSet<String>,
}

impl ReferenceKeys {
    pub fn new(modifiers: HashSet<String>, ndc_ids: HashSet<String>) -> Self {
        Self { modifiers, ndc_ids }
    }

    /// Snapshot the known keys from the warehouse.
    pub fn capture(warehouse: &dyn Warehouse, tables: &WarehouseConfig) -> WarehouseResult<Self> {
        let modifier_batches = warehouse.read_table(&tables.modifier_table)?;
        let modifiers: HashSet<String> =
            string_column_values(&modifier_batches, &tables.modifier_table, "modifier")?
                .into_iter()
                .collect();

        let ndc_batches = warehouse.read_table(&tables.ndc_table)?;
        let ndc_ids: HashSet<String> =
            string_column_values(&ndc_batches, &tables.ndc_table, "ndc_alternate_id")?
                .into_iter()
                .collect();

        info!(
            "Reference snapshot: {} known modifiers, {} known drug codes",
            modifiers.len(),
            ndc_ids.len()
        );
        Ok(Self::new(modifiers, ndc_ids))
    }

    /// Drop modifier rows whose code is already known.
    pub fn filter_modifiers(&self, rows: Vec<ModifierRow>) -> Vec<ModifierRow> {
        rows.into_iter()
            .filter(|row| !self.modifiers.contains(&row.modifier))
            .collect()
    }

    /// Drop drug-code rows whose alternate id is already known.
    pub fn filter_ndc(&self, rows: Vec<NdcRow>) -> Vec<NdcRow> {
        rows.into_iter()
            .filter(|row| !self.ndc_ids.contains(&row.ndc_alternate_id))
            .collect()
    }
}
