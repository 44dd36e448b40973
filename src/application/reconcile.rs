//! Incremental snapshot reconciler
//!
//! A calendar partition only grows a new version when the fetched content
//! actually differs from the latest committed snapshot. Each version is a
//! complete dataset, immutable once written; readers take the numeric max
//! version per partition.

use std::collections::HashSet;

use tracing::info;
use uuid::Uuid;

use crate::domain::ExemptRow;
use crate::infrastructure::warehouse::schema::{exempt_batch, exempt_rows_from_batches};
use crate::infrastructure::warehouse::{Warehouse, WarehouseError, WarehouseResult};

/// What the reconciler decided for one partition.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum ReconcileOutcome {
    /// Content differed (or the partition was new); a full snapshot was
    /// committed under this version.
    Committed { version: u32, rows: usize },
    /// Content matched the latest snapshot; nothing was written.
    Unchanged { version: u32 },
}

pub struct SnapshotReconciler<'a> {
    warehouse: &'a dyn Warehouse,
    table: String,
}

impl<'a> SnapshotReconciler<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, table: impl Into<String>) -> Self {
        Self {
            warehouse,
            table: table.into(),
        }
    }

    /// Diff a freshly fetched dataset against the latest committed version
    /// of its year partition and commit only on change.
    pub fn reconcile(
        &self,
        year: &str,
        rows: Vec<ExemptRow>,
        as_of_date: &str,
    ) -> WarehouseResult<ReconcileOutcome> {
        let partition = format!("{}/year={year}", self.table);
        let versions = self.warehouse.list_partitions(&partition)?;

        let version = match latest_version(&versions) {
            None => {
                info!("No previous snapshot under {partition}; committing version 0");
                0
            }
            Some(previous) => {
                let previous_path = format!("{partition}/version={previous}");
                let batches = self.warehouse.read_dataset(&previous_path)?;
                let previous_rows = exempt_rows_from_batches(&batches, &self.table)?;

                if content_equal(&rows, &previous_rows) {
                    info!(
                        "Partition {partition} has no updates; keeping version {previous}"
                    );
                    return Ok(ReconcileOutcome::Unchanged { version: previous });
                }
                info!("Partition {partition} changed; committing version {}", previous + 1);
                previous + 1
            }
        };

        let batch = exempt_batch(&rows, version).map_err(|e| WarehouseError::Schema {
            table: self.table.clone(),
            message: e.to_string(),
        })?;
        let file_path = format!(
            "{partition}/version={version}/{as_of_date}_{}.parquet",
            Uuid::new_v4()
        );
        self.warehouse.write_dataset(&file_path, batch)?;

        Ok(ReconcileOutcome::Committed {
            version,
            rows: rows.len(),
        })
    }
}

/// Numerically greatest `version=<n>` partition. The embedded integer is
/// compared as a number: `version=10` outranks `version=9` even though a
/// path sort would put it first.
fn latest_version(partitions: &[String]) -> Option<u32> {
    partitions
        .iter()
        .filter_map(|name| name.strip_prefix("version=")?.parse::<u32>().ok())
        .max()
}

/// Order-insensitive content equality over everything except the
/// bookkeeping columns.
fn content_equal(a: &[ExemptRow], b: &[ExemptRow]) -> bool {
    let a_keys: HashSet<_> = a.iter().map(ExemptRow::content_key).collect();
    let b_keys: HashSet<_> = b.iter().map(ExemptRow::content_key).collect();
    a_keys == b_keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::warehouse::LocalWarehouse;
    use tempfile::tempdir;

    const TABLE: &str = "poa_exempt_code";

    fn row(order: &str, code: &str, description: &str, date_parse: &str) -> ExemptRow {
        ExemptRow {
            order: order.to_string(),
            code: code.to_string(),
            description: description.to_string(),
            year: "2024".to_string(),
            date_parse: date_parse.to_string(),
        }
    }

    #[test]
    fn test_first_run_commits_version_zero() {
        let dir = tempdir().unwrap();
        let warehouse = LocalWarehouse::new(dir.path());
        let reconciler = SnapshotReconciler::new(&warehouse, TABLE);

        let outcome = reconciler
            .reconcile("2024", vec![row("1", "A01", "x", "2024-05-01")], "2024-05-01")
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Committed { version: 0, rows: 1 });
        assert_eq!(
            warehouse.list_partitions(&format!("{TABLE}/year=2024")).unwrap(),
            vec!["version=0"]
        );
    }

    #[test]
    fn test_reparse_with_new_date_only_is_a_noop() {
        let dir = tempdir().unwrap();
        let warehouse = LocalWarehouse::new(dir.path());
        let reconciler = SnapshotReconciler::new(&warehouse, TABLE);

        reconciler
            .reconcile("2024", vec![row("1", "A01", "x", "2024-05-01")], "2024-05-01")
            .unwrap();
        let outcome = reconciler
            .reconcile("2024", vec![row("1", "A01", "x", "2024-06-01")], "2024-06-01")
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Unchanged { version: 0 });
        assert_eq!(
            warehouse.list_partitions(&format!("{TABLE}/year=2024")).unwrap(),
            vec!["version=0"]
        );
    }

    #[test]
    fn test_changed_content_bumps_version_with_full_dataset() {
        let dir = tempdir().unwrap();
        let warehouse = LocalWarehouse::new(dir.path());
        let reconciler = SnapshotReconciler::new(&warehouse, TABLE);

        reconciler
            .reconcile("2024", vec![row("1", "A01", "x", "2024-05-01")], "2024-05-01")
            .unwrap();
        let outcome = reconciler
            .reconcile(
                "2024",
                vec![
                    row("1", "A01", "x", "2024-06-01"),
                    row("2", "B46", "y", "2024-06-01"),
                ],
                "2024-06-01",
            )
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Committed { version: 1, rows: 2 });

        // The new version is the complete dataset, not a delta.
        let batches = warehouse
            .read_dataset(&format!("{TABLE}/year=2024/version=1"))
            .unwrap();
        let committed = exempt_rows_from_batches(&batches, TABLE).unwrap();
        assert_eq!(committed.len(), 2);
    }

    #[test]
    fn test_rerun_after_commit_is_idempotent() {
        let dir = tempdir().unwrap();
        let warehouse = LocalWarehouse::new(dir.path());
        let reconciler = SnapshotReconciler::new(&warehouse, TABLE);

        let dataset = vec![row("1", "A01", "x", "2024-05-01")];
        reconciler
            .reconcile("2024", dataset.clone(), "2024-05-01")
            .unwrap();
        let outcome = reconciler.reconcile("2024", dataset, "2024-05-01").unwrap();

        assert_eq!(outcome, ReconcileOutcome::Unchanged { version: 0 });
    }

    #[test]
    fn test_latest_version_is_numeric_not_lexicographic() {
        assert_eq!(
            latest_version(&[
                "version=2".to_string(),
                "version=10".to_string(),
                "version=9".to_string(),
            ]),
            Some(10)
        );
        assert_eq!(latest_version(&[]), None);
    }

    #[test]
    fn test_version_after_double_digit_predecessor() {
        let dir = tempdir().unwrap();
        let warehouse = LocalWarehouse::new(dir.path());
        let reconciler = SnapshotReconciler::new(&warehouse, TABLE);

        // Seed versions 9 and 10 directly.
        for version in [9u32, 10] {
            let batch = exempt_batch(&[row("1", "A01", "x", "2024-01-01")], version).unwrap();
            warehouse
                .write_dataset(
                    &format!("{TABLE}/year=2024/version={version}/2024-01-01_seed.parquet"),
                    batch,
                )
                .unwrap();
        }

        let outcome = reconciler
            .reconcile("2024", vec![row("2", "B46", "y", "2024-07-01")], "2024-07-01")
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Committed { version: 11, rows: 1 });
    }
}
