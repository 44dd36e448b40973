//! Directory-rooted parquet warehouse
//!
//! Hive-style partition layout under a local root, snappy-compressed
//! parquet files. The lake-facing deployment mounts the object store at
//! the root; the implementation only ever sees relative paths.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::Context;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Warehouse, WarehouseError, WarehouseResult};

pub struct LocalWarehouse {
    root: PathBuf,
}

impl LocalWarehouse {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn write_file(path: &Path, batch: &RecordBatch) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
        writer.write(batch)?;
        writer.close()?;
        Ok(())
    }

    fn read_file(path: &Path) -> anyhow::Result<Vec<RecordBatch>> {
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
        let batches = reader.collect::<Result<Vec<_>, _>>()?;
        Ok(batches)
    }

    /// Every `.parquet` file under a path, depth first, stable order.
    fn collect_data_files(path: &Path, files: &mut Vec<PathBuf>) -> anyhow::Result<()> {
        if path.is_file() {
            files.push(path.to_path_buf());
            return Ok(());
        }
        let mut entries: Vec<_> = fs::read_dir(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let entry_path = entry.path();
            if entry_path.is_dir() {
                Self::collect_data_files(&entry_path, files)?;
            } else if entry_path.extension().is_some_and(|ext| ext == "parquet") {
                files.push(entry_path);
            }
        }
        Ok(())
    }

    fn read_all(&self, relative: &str) -> WarehouseResult<Vec<RecordBatch>> {
        let path = self.root.join(relative);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        Self::collect_data_files(&path, &mut files).map_err(|source| WarehouseError::Read {
            path: relative.to_string(),
            source,
        })?;

        let mut batches = Vec::new();
        for file in files {
            batches.extend(Self::read_file(&file).map_err(|source| WarehouseError::Read {
                path: file.display().to_string(),
                source,
            })?);
        }
        Ok(batches)
    }
}

impl Warehouse for LocalWarehouse {
    fn append(&self, table: &str, file_prefix: &str, batch: RecordBatch) -> WarehouseResult<()> {
        if batch.num_rows() == 0 {
            debug!("Skipping zero-row append to {table}");
            return Ok(());
        }
        let file_name = format!("{file_prefix}{}.parquet", Uuid::new_v4());
        let path = self.root.join(table).join(&file_name);
        Self::write_file(&path, &batch).map_err(|source| WarehouseError::Write {
            path: format!("{table}/{file_name}"),
            source,
        })?;
        info!("Appended {} rows to {table}/{file_name}", batch.num_rows());
        Ok(())
    }

    fn write_dataset(&self, relative_path: &str, batch: RecordBatch) -> WarehouseResult<()> {
        if batch.num_rows() == 0 {
            debug!("Skipping zero-row dataset write to {relative_path}");
            return Ok(());
        }
        let path = self.root.join(relative_path);
        Self::write_file(&path, &batch).map_err(|source| WarehouseError::Write {
            path: relative_path.to_string(),
            source,
        })?;
        info!("Wrote {} rows to {relative_path}", batch.num_rows());
        Ok(())
    }

    fn read_table(&self, table: &str) -> WarehouseResult<Vec<RecordBatch>> {
        self.read_all(table)
    }

    fn read_dataset(&self, relative_path: &str) -> WarehouseResult<Vec<RecordBatch>> {
        self.read_all(relative_path)
    }

    fn list_partitions(&self, parent: &str) -> WarehouseResult<Vec<String>> {
        let path = self.root.join(parent);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&path).map_err(|e| WarehouseError::List {
            path: parent.to_string(),
            source: e.into(),
        })?;

        let mut partitions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| WarehouseError::List {
                path: parent.to_string(),
                source: e.into(),
            })?;
            if entry.path().is_dir() {
                partitions.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        partitions.sort();
        Ok(partitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModifierRow;
    use crate::infrastructure::warehouse::schema::{modifier_batch, string_column_values};
    use tempfile::tempdir;

    fn sample_batch() -> RecordBatch {
        modifier_batch(&[
            ModifierRow {
                modifier: "25".to_string(),
                description: "Separate E/M".to_string(),
            },
            ModifierRow {
                modifier: "59".to_string(),
                description: "Distinct service".to_string(),
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_append_and_read_table() {
        let dir = tempdir().unwrap();
        let warehouse = LocalWarehouse::new(dir.path());

        warehouse
            .append("modifiers", "20240413_", sample_batch())
            .unwrap();
        warehouse
            .append("modifiers", "20240413_", sample_batch())
            .unwrap();

        let batches = warehouse.read_table("modifiers").unwrap();
        let values = string_column_values(&batches, "modifiers", "modifier").unwrap();
        assert_eq!(values.len(), 4);
    }

    #[test]
    fn test_zero_row_append_writes_nothing() {
        let dir = tempdir().unwrap();
        let warehouse = LocalWarehouse::new(dir.path());

        let empty = modifier_batch(&[]).unwrap();
        warehouse.append("modifiers", "x_", empty).unwrap();

        assert!(!dir.path().join("modifiers").exists());
        assert!(warehouse.read_table("modifiers").unwrap().is_empty());
    }

    #[test]
    fn test_list_partitions_missing_parent_is_empty() {
        let dir = tempdir().unwrap();
        let warehouse = LocalWarehouse::new(dir.path());
        assert!(warehouse.list_partitions("nope/year=2024").unwrap().is_empty());
    }

    #[test]
    fn test_versioned_dataset_layout() {
        let dir = tempdir().unwrap();
        let warehouse = LocalWarehouse::new(dir.path());

        warehouse
            .write_dataset("exempt/year=2024/version=0/20240413_a.parquet", sample_batch())
            .unwrap();
        warehouse
            .write_dataset("exempt/year=2024/version=1/20240420_b.parquet", sample_batch())
            .unwrap();

        assert_eq!(
            warehouse.list_partitions("exempt/year=2024").unwrap(),
            vec!["version=0", "version=1"]
        );
        let latest = warehouse
            .read_dataset("exempt/year=2024/version=1")
            .unwrap();
        assert_eq!(latest[0].num_rows(), 2);
    }
}
