//! Table schemas and row/batch conversion
//!
//! Fixed arrow schemas for the four tables plus the conversions between
//! domain rows and `RecordBatch`es. Scalar columns are nullable strings;
//! the crosswalk columns on the main table are lists of strings.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, ListBuilder, StringArray, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;

use crate::domain::{ExemptRow, ModifierRow, NdcRow, ProcedureRecord};

use super::WarehouseError;

fn utf8(name: &str) -> Field {
    Field::new(name, DataType::Utf8, true)
}

fn utf8_required(name: &str) -> Field {
    Field::new(name, DataType::Utf8, false)
}

fn utf8_list(name: &str) -> Field {
    Field::new(
        name,
        DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
        true,
    )
}

/// Main procedure code table, 21 columns.
pub fn procedure_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        utf8_required("code"),
        utf8_required("code_type"),
        utf8("main_interval"),
        utf8_list("main_interval_name"),
        utf8_list("modifiers"),
        utf8("short_description"),
        utf8("long_description"),
        utf8("description"),
        utf8("summary"),
        utf8("date_deleted"),
        utf8("betos_code"),
        utf8("betos_description"),
        utf8("guidelines"),
        utf8("advice"),
        utf8("lay_term"),
        utf8("report"),
        utf8_list("revenue_lookup"),
        utf8_list("icd10_cm"),
        utf8_list("ndc_alternate_id"),
        utf8_list("icd_10_pcs_x"),
        utf8_list("cpt_code_symbols"),
    ]))
}

/// Modifier crosswalk sibling table.
pub fn modifier_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        utf8_required("modifier"),
        utf8_required("description"),
    ]))
}

/// Drug code sibling table.
pub fn ndc_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        utf8_required("ndc_alternate_id"),
        utf8_required("drug_name"),
        utf8_required("labeler_name"),
        utf8_required("hcpcs_dosage"),
        utf8_required("bill_unit"),
    ]))
}

/// Calendar-versioned exempt code table: three data columns plus
/// year/version/date_parse bookkeeping.
pub fn exempt_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        utf8_required("order"),
        utf8_required("code"),
        utf8_required("description"),
        utf8_required("year"),
        utf8_required("date_parse"),
        utf8_required("version"),
    ]))
}

fn append_opt(builder: &mut StringBuilder, value: &Option<String>) {
    match value {
        Some(v) => builder.append_value(v),
        None => builder.append_null(),
    }
}

fn append_list(builder: &mut ListBuilder<StringBuilder>, values: &Option<Vec<String>>) {
    match values {
        Some(items) => {
            for item in items {
                builder.values().append_value(item);
            }
            builder.append(true);
        }
        None => builder.append(false),
    }
}

pub fn procedure_batch(rows: &[ProcedureRecord]) -> Result<RecordBatch, ArrowError> {
    let mut code = StringBuilder::new();
    let mut code_type = StringBuilder::new();
    let mut main_interval = StringBuilder::new();
    let mut main_interval_name = ListBuilder::new(StringBuilder::new());
    let mut modifiers = ListBuilder::new(StringBuilder::new());
    let mut short_description = StringBuilder::new();
    let mut long_description = StringBuilder::new();
    let mut description = StringBuilder::new();
    let mut summary = StringBuilder::new();
    let mut date_deleted = StringBuilder::new();
    let mut betos_code = StringBuilder::new();
    let mut betos_description = StringBuilder::new();
    let mut guidelines = StringBuilder::new();
    let mut advice = StringBuilder::new();
    let mut lay_term = StringBuilder::new();
    let mut report = StringBuilder::new();
    let mut revenue_lookup = ListBuilder::new(StringBuilder::new());
    let mut icd10_cm = ListBuilder::new(StringBuilder::new());
    let mut ndc_alternate_id = ListBuilder::new(StringBuilder::new());
    let mut icd_10_pcs_x = ListBuilder::new(StringBuilder::new());
    let mut cpt_code_symbols = ListBuilder::new(StringBuilder::new());

    for row in rows {
        code.append_value(&row.code);
        code_type.append_value(&row.code_type);
        append_opt(&mut main_interval, &row.main_interval);
        append_list(&mut main_interval_name, &row.main_interval_name);
        append_list(&mut modifiers, &row.modifiers);
        append_opt(&mut short_description, &row.short_description);
        append_opt(&mut long_description, &row.long_description);
        append_opt(&mut description, &row.description);
        append_opt(&mut summary, &row.summary);
        append_opt(&mut date_deleted, &row.date_deleted);
        append_opt(&mut betos_code, &row.betos_code);
        append_opt(&mut betos_description, &row.betos_description);
        append_opt(&mut guidelines, &row.guidelines);
        append_opt(&mut advice, &row.advice);
        append_opt(&mut lay_term, &row.lay_term);
        append_opt(&mut report, &row.report);
        append_list(&mut revenue_lookup, &row.revenue_lookup);
        append_list(&mut icd10_cm, &row.icd10_cm);
        append_list(&mut ndc_alternate_id, &row.ndc_alternate_id);
        append_list(&mut icd_10_pcs_x, &row.icd_10_pcs_x);
        append_list(&mut cpt_code_symbols, &row.cpt_code_symbols);
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(code.finish()),
        Arc::new(code_type.finish()),
        Arc::new(main_interval.finish()),
        Arc::new(main_interval_name.finish()),
        Arc::new(modifiers.finish()),
        Arc::new(short_description.finish()),
        Arc::new(long_description.finish()),
        Arc::new(description.finish()),
        Arc::new(summary.finish()),
        Arc::new(date_deleted.finish()),
        Arc::new(betos_code.finish()),
        Arc::new(betos_description.finish()),
        Arc::new(guidelines.finish()),
        Arc::new(advice.finish()),
        Arc::new(lay_term.finish()),
        Arc::new(report.finish()),
        Arc::new(revenue_lookup.finish()),
        Arc::new(icd10_cm.finish()),
        Arc::new(ndc_alternate_id.finish()),
        Arc::new(icd_10_pcs_x.finish()),
        Arc::new(cpt_code_symbols.finish()),
    ];

    RecordBatch::try_new(procedure_schema(), columns)
}

pub fn modifier_batch(rows: &[ModifierRow]) -> Result<RecordBatch, ArrowError> {
    let modifier: StringArray = rows.iter().map(|r| Some(r.modifier.as_str())).collect();
    let description: StringArray = rows.iter().map(|r| Some(r.description.as_str())).collect();
    RecordBatch::try_new(
        modifier_schema(),
        vec![Arc::new(modifier), Arc::new(description)],
    )
}

pub fn ndc_batch(rows: &[NdcRow]) -> Result<RecordBatch, ArrowError> {
    let ids: StringArray = rows
        .iter()
        .map(|r| Some(r.ndc_alternate_id.as_str()))
        .collect();
    let drug: StringArray = rows.iter().map(|r| Some(r.drug_name.as_str())).collect();
    let labeler: StringArray = rows.iter().map(|r| Some(r.labeler_name.as_str())).collect();
    let dosage: StringArray = rows.iter().map(|r| Some(r.hcpcs_dosage.as_str())).collect();
    let bill: StringArray = rows.iter().map(|r| Some(r.bill_unit.as_str())).collect();
    RecordBatch::try_new(
        ndc_schema(),
        vec![
            Arc::new(ids),
            Arc::new(drug),
            Arc::new(labeler),
            Arc::new(dosage),
            Arc::new(bill),
        ],
    )
}

/// The version is stamped across the whole batch at commit time.
pub fn exempt_batch(rows: &[ExemptRow], version: u32) -> Result<RecordBatch, ArrowError> {
    let order: StringArray = rows.iter().map(|r| Some(r.order.as_str())).collect();
    let code: StringArray = rows.iter().map(|r| Some(r.code.as_str())).collect();
    let description: StringArray = rows.iter().map(|r| Some(r.description.as_str())).collect();
    let year: StringArray = rows.iter().map(|r| Some(r.year.as_str())).collect();
    let date_parse: StringArray = rows.iter().map(|r| Some(r.date_parse.as_str())).collect();
    let version_text = version.to_string();
    let version: StringArray = rows.iter().map(|_| Some(version_text.as_str())).collect();
    RecordBatch::try_new(
        exempt_schema(),
        vec![
            Arc::new(order),
            Arc::new(code),
            Arc::new(description),
            Arc::new(year),
            Arc::new(date_parse),
            Arc::new(version),
        ],
    )
}

fn string_column<'a>(
    batch: &'a RecordBatch,
    table: &str,
    name: &str,
) -> Result<&'a StringArray, WarehouseError> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| WarehouseError::Schema {
            table: table.to_string(),
            message: format!("missing or non-string column '{name}'"),
        })
}

/// Read exempt rows back out of stored batches. The `version` column is
/// bookkeeping and intentionally not part of the row.
pub fn exempt_rows_from_batches(
    batches: &[RecordBatch],
    table: &str,
) -> Result<Vec<ExemptRow>, WarehouseError> {
    let mut rows = Vec::new();
    for batch in batches {
        let order = string_column(batch, table, "order")?;
        let code = string_column(batch, table, "code")?;
        let description = string_column(batch, table, "description")?;
        let year = string_column(batch, table, "year")?;
        let date_parse = string_column(batch, table, "date_parse")?;

        for i in 0..batch.num_rows() {
            rows.push(ExemptRow {
                order: order.value(i).to_string(),
                code: code.value(i).to_string(),
                description: description.value(i).to_string(),
                year: year.value(i).to_string(),
                date_parse: date_parse.value(i).to_string(),
            });
        }
    }
    Ok(rows)
}

/// Pull one string column out of a table's batches, e.g. a natural key
/// column for the dedup reference set or the worklist code column.
pub fn string_column_values(
    batches: &[RecordBatch],
    table: &str,
    column: &str,
) -> Result<Vec<String>, WarehouseError> {
    let mut values = Vec::new();
    for batch in batches {
        let array = string_column(batch, table, column)?;
        for i in 0..batch.num_rows() {
            if !array.is_null(i) {
                values.push(array.value(i).to_string());
            }
        }
    }
    Ok(values)
}
