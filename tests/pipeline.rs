//! End-to-end pipeline behavior over a temp-dir warehouse: worklist
//! normalization through extraction, dedup and flush, then the snapshot
//! lifecycle of the calendar table across reruns.

use std::collections::HashSet;

use anyhow::anyhow;
use async_trait::async_trait;
use tempfile::tempdir;

use medcode_crawler::application::batch::load_worklist;
use medcode_crawler::application::{BatchDriver, ReconcileOutcome, ReferenceKeys, SnapshotReconciler};
use medcode_crawler::domain::{
    normalize_worklist, CodeSystem, ExemptRow, ExtractionResult, ModifierRow, NdcRow,
    ProcedureRecord, TombstoneRecord,
};
use medcode_crawler::infrastructure::config::WarehouseConfig;
use medcode_crawler::infrastructure::extract::RecordSource;
use medcode_crawler::infrastructure::warehouse::schema::{
    exempt_rows_from_batches, string_column_values,
};
use medcode_crawler::infrastructure::warehouse::{LocalWarehouse, Warehouse};

/// Deterministic stand-in for the browser-backed scraper.
struct ScriptedSource;

#[async_trait]
impl RecordSource for ScriptedSource {
    async fn extract(&self, code: &str) -> anyhow::Result<ExtractionResult> {
        match code {
            "404" => Ok(ExtractionResult::NotFound),
            "BROKEN" => Err(anyhow!("page never loaded")),
            "J0130" => Ok(ExtractionResult::Tombstone {
                system: CodeSystem::Hcpcs,
                record: TombstoneRecord {
                    date_deleted: Some("Deleted effective 01/01/2024".to_string()),
                    description: Some("Injection, acetaminophen".to_string()),
                    ..TombstoneRecord::default()
                },
            }),
            code => Ok(ExtractionResult::Full {
                record: Box::new(ProcedureRecord {
                    code: code.to_string(),
                    code_type: "CPT".to_string(),
                    modifiers: Some(vec!["25".to_string()]),
                    ..ProcedureRecord::default()
                }),
                modifiers: vec![ModifierRow {
                    modifier: "25".to_string(),
                    description: "Significant, separately identifiable E/M".to_string(),
                }],
                ndc_entries: vec![NdcRow {
                    ndc_alternate_id: format!("{code}-NDC"),
                    drug_name: "Drug".to_string(),
                    labeler_name: "Labeler".to_string(),
                    hcpcs_dosage: "10 mg".to_string(),
                    bill_unit: "UN".to_string(),
                }],
            }),
        }
    }
}

#[tokio::test]
async fn worklist_to_warehouse_round() {
    let dir = tempdir().unwrap();
    let warehouse = LocalWarehouse::new(dir.path());
    let tables = WarehouseConfig::default();

    // "25" is already known; its re-extraction must not duplicate.
    let reference = ReferenceKeys::new(
        ["25".to_string()].into_iter().collect::<HashSet<_>>(),
        HashSet::new(),
    );

    let worklist = normalize_worklist(vec!["99213", "", "false", "404", "BROKEN", "J0130"]);
    assert_eq!(worklist, vec!["99213", "404", "BROKEN", "J0130"]);

    let driver = BatchDriver::new(&ScriptedSource, &warehouse, &tables, &reference, 200, "t_");
    let summary = driver.run(&worklist).await;

    assert_eq!(summary.items, 4);
    assert_eq!(summary.skipped, 1); // BROKEN
    assert_eq!(summary.record_rows, 2); // 99213 + tombstone J0130
    assert_eq!(summary.modifier_rows, 0); // deduped against the reference
    assert_eq!(summary.ndc_rows, 1);
    assert_eq!(summary.failed_flushes, 0);

    let batches = warehouse.read_table(&tables.procedure_table).unwrap();
    let mut codes = string_column_values(&batches, &tables.procedure_table, "code").unwrap();
    codes.sort();
    assert_eq!(codes, vec!["99213", "J0130"]);

    // The freshly written codes become the next run's worklist.
    let next_worklist = load_worklist(&warehouse, &tables).unwrap();
    assert_eq!(next_worklist.len(), 2);
}

#[test]
fn snapshot_lifecycle_across_reruns() {
    let dir = tempdir().unwrap();
    let warehouse = LocalWarehouse::new(dir.path());
    let reconciler = SnapshotReconciler::new(&warehouse, "poa_exempt_code");

    let fetched = |date: &str, extra: bool| {
        let mut rows = vec![ExemptRow {
            order: "1".to_string(),
            code: "B46.4".to_string(),
            description: "Mucormycosis".to_string(),
            year: "2024".to_string(),
            date_parse: date.to_string(),
        }];
        if extra {
            rows.push(ExemptRow {
                order: "2".to_string(),
                code: "C50".to_string(),
                description: "Neoplasm".to_string(),
                year: "2024".to_string(),
                date_parse: date.to_string(),
            });
        }
        rows
    };

    // First run: unconditional version 0.
    let first = reconciler
        .reconcile("2024", fetched("2024-05-01", false), "2024-05-01")
        .unwrap();
    assert_eq!(first, ReconcileOutcome::Committed { version: 0, rows: 1 });

    // Weekly rerun, content unchanged: no new version despite the new date.
    let second = reconciler
        .reconcile("2024", fetched("2024-05-08", false), "2024-05-08")
        .unwrap();
    assert_eq!(second, ReconcileOutcome::Unchanged { version: 0 });

    // Source published a new row: full snapshot under version 1.
    let third = reconciler
        .reconcile("2024", fetched("2024-05-15", true), "2024-05-15")
        .unwrap();
    assert_eq!(third, ReconcileOutcome::Committed { version: 1, rows: 2 });

    let latest = warehouse
        .read_dataset("poa_exempt_code/year=2024/version=1")
        .unwrap();
    let rows = exempt_rows_from_batches(&latest, "poa_exempt_code").unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.date_parse == "2024-05-15"));

    // Other partitions stay untouched.
    assert!(warehouse
        .list_partitions("poa_exempt_code/year=2023")
        .unwrap()
        .is_empty());
}
