//! Warehouse boundary
//!
//! Partitioned columnar storage behind a trait so the pipelines never care
//! where the files live. Provisioning, DDL and the query layer on top are
//! external concerns; this boundary only appends, writes, lists and reads
//! datasets. Zero-row input is a no-write, never an empty file.

pub mod local;
pub mod schema;

use arrow::record_batch::RecordBatch;
use thiserror::Error;

pub use local::LocalWarehouse;

#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("Failed to write dataset at '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to read dataset at '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to list partitions under '{path}': {source}")]
    List {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Unexpected schema for '{table}': {message}")]
    Schema { table: String, message: String },
}

pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// Append/overwrite partitioned columnar datasets and read them back.
///
/// Paths are relative to the warehouse root and use the hive-style layout
/// `table/key=value/...`. Writes are synchronous; retries belong to the
/// caller.
pub trait Warehouse: Send + Sync {
    /// Append one batch to a table as a new file named
    /// `<file_prefix><uuid>.parquet`. Empty batches are skipped.
    fn append(&self, table: &str, file_prefix: &str, batch: RecordBatch) -> WarehouseResult<()>;

    /// Write one batch to an exact relative file path. Empty batches are
    /// skipped.
    fn write_dataset(&self, relative_path: &str, batch: RecordBatch) -> WarehouseResult<()>;

    /// Read every data file under a table directory.
    fn read_table(&self, table: &str) -> WarehouseResult<Vec<RecordBatch>>;

    /// Read every data file under a relative path (a partition directory or
    /// a single file).
    fn read_dataset(&self, relative_path: &str) -> WarehouseResult<Vec<RecordBatch>>;

    /// Immediate child partition directory names under a relative path.
    /// A missing parent lists as empty: the first run has no partitions.
    fn list_partitions(&self, parent: &str) -> WarehouseResult<Vec<String>>;
}
