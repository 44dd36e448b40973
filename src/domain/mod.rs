//! Domain entities and value types
//!
//! Pure data shapes shared across the extraction and snapshot pipelines.
//! No I/O lives here.

pub mod exempt;
pub mod procedure;
pub mod worklist;

pub use exempt::ExemptRow;
pub use procedure::{
    CodeSystem, ExtractionResult, ModifierRow, NdcRow, ProcedureRecord, TombstoneRecord,
};
pub use worklist::normalize_worklist;
