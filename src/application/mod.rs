//! Application layer
//!
//! Orchestration over the domain and infrastructure: the chunked batch
//! driver, the dedup filter's reference snapshot, the versioned snapshot
//! reconciler and the yearly exempt-code pipeline.

pub mod batch;
pub mod dedup;
pub mod exempt;
pub mod reconcile;

pub use batch::{BatchDriver, RunSummary};
pub use dedup::ReferenceKeys;
pub use exempt::ExemptPipeline;
pub use reconcile::{ReconcileOutcome, SnapshotReconciler};
