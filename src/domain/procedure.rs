//! Procedure code entities
//!
//! Row shapes for the three output tables plus the per-item extraction
//! outcome. A detail page resolves to exactly one `ExtractionResult`.

use serde::{Deserialize, Serialize};

/// Code system a detail page belongs to, disambiguated from the page URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeSystem {
    Cpt,
    Hcpcs,
}

impl CodeSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpt => "CPT",
            Self::Hcpcs => "HCPCS",
        }
    }
}

/// One row of the main procedure code table (21 columns).
///
/// Everything except `code` and `code_type` is optional: a missing DOM
/// section on the source page yields a null column, not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcedureRecord {
    pub code: String,
    pub code_type: String,
    pub main_interval: Option<String>,
    pub main_interval_name: Option<Vec<String>>,
    pub modifiers: Option<Vec<String>>,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub date_deleted: Option<String>,
    pub betos_code: Option<String>,
    pub betos_description: Option<String>,
    pub guidelines: Option<String>,
    pub advice: Option<String>,
    pub lay_term: Option<String>,
    pub report: Option<String>,
    pub revenue_lookup: Option<Vec<String>>,
    pub icd10_cm: Option<Vec<String>>,
    pub ndc_alternate_id: Option<Vec<String>>,
    pub icd_10_pcs_x: Option<Vec<String>>,
    pub cpt_code_symbols: Option<Vec<String>>,
}

/// One row of the modifier crosswalk table. Natural key: `modifier`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierRow {
    pub modifier: String,
    pub description: String,
}

/// One row of the drug code (NDC) table. Natural key: `ndc_alternate_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NdcRow {
    pub ndc_alternate_id: String,
    pub drug_name: String,
    pub labeler_name: String,
    pub hcpcs_dosage: String,
    pub bill_unit: String,
}

/// Reduced field set scraped from a per-code deleted page.
///
/// Deleted entries structurally lack the tabbed sections, so only the
/// inline panels are read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TombstoneRecord {
    pub date_deleted: Option<String>,
    pub advice: Option<String>,
    pub lay_term: Option<String>,
    pub guidelines: Option<String>,
    pub description: Option<String>,
}

impl TombstoneRecord {
    /// Shape the tombstone as a full-table row. Tab-dependent and interval
    /// columns stay null.
    pub fn into_record(self, code: &str, system: CodeSystem) -> ProcedureRecord {
        ProcedureRecord {
            code: code.to_string(),
            code_type: system.as_str().to_string(),
            description: self.description,
            date_deleted: self.date_deleted,
            guidelines: self.guidelines,
            advice: self.advice,
            lay_term: self.lay_term,
            ..ProcedureRecord::default()
        }
    }
}

/// Terminal outcome of resolving one worklist code against the site.
#[derive(Debug, Clone)]
pub enum ExtractionResult {
    /// Structural 404 page or the generic deleted-codes index page.
    NotFound,
    /// Per-code deleted page with an inline "Deleted" marker.
    Tombstone {
        system: CodeSystem,
        record: TombstoneRecord,
    },
    /// Regular detail page.
    Full {
        record: Box<ProcedureRecord>,
        modifiers: Vec<ModifierRow>,
        ndc_entries: Vec<NdcRow>,
    },
}

impl ExtractionResult {
    /// Flatten the outcome into rows for the three output tables.
    pub fn into_rows(self, code: &str) -> (Vec<ProcedureRecord>, Vec<ModifierRow>, Vec<NdcRow>) {
        match self {
            Self::NotFound => (Vec::new(), Vec::new(), Vec::new()),
            Self::Tombstone { system, record } => {
                (vec![record.into_record(code, system)], Vec::new(), Vec::new())
            }
            Self::Full {
                record,
                modifiers,
                ndc_entries,
            } => (vec![*record], modifiers, ndc_entries),
        }
    }
}
