use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use serde::Serialize;

use crate::data::model::PlateKey;
use crate::pipeline::calibrate::CalibrationModel;
use crate::state::Batch;

// ---------------------------------------------------------------------------
// Calibration summary table
// ---------------------------------------------------------------------------

/// One row per processed plate: the curve and its status.
pub fn calibration_batch(batch: &Batch) -> Result<RecordBatch> {
    let plates: Vec<_> = batch.plates.values().collect();
    let model = |i: usize| plates[i].calibration.as_ref().ok();

    let schema = Arc::new(Schema::new(vec![
        Field::new("plate", DataType::Utf8, false),
        Field::new("file", DataType::Utf8, false),
        Field::new("standards", DataType::UInt64, true),
        Field::new("slope", DataType::Float64, true),
        Field::new("intercept", DataType::Float64, true),
        Field::new("r_squared", DataType::Float64, true),
        Field::new("status", DataType::Utf8, false),
    ]));

    let n = plates.len();
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(plates.iter().map(|p| p.key.to_string()))),
        Arc::new(StringArray::from_iter_values(plates.iter().map(|p| p.filename.as_str()))),
        Arc::new(UInt64Array::from_iter(
            (0..n).map(|i| model(i).map(|m| m.n_standards as u64)),
        )),
        Arc::new(Float64Array::from_iter((0..n).map(|i| model(i).map(|m| m.slope)))),
        Arc::new(Float64Array::from_iter((0..n).map(|i| model(i).map(|m| m.intercept)))),
        Arc::new(Float64Array::from_iter(
            (0..n).map(|i| model(i).and_then(|m| m.r_squared)),
        )),
        Arc::new(StringArray::from_iter_values(plates.iter().map(|p| p.status()))),
    ];

    RecordBatch::try_new(schema, columns).context("building calibration summary")
}

/// Human-readable report: the calibration table, then dropped plates and
/// warnings.
pub fn render_summary(batch: &Batch) -> Result<String> {
    let mut out = String::new();
    if batch.is_empty() {
        out.push_str("no plates processed\n");
    } else {
        let table = pretty_format_batches(&[calibration_batch(batch)?])
            .context("formatting calibration summary")?;
        out.push_str(&table.to_string());
        out.push('\n');
    }

    if !batch.failures.is_empty() {
        out.push_str(&format!("\n{} plate(s) dropped:\n", batch.failures.len()));
        for failure in &batch.failures {
            out.push_str(&format!("  - {failure}\n"));
        }
    }
    if !batch.warnings.is_empty() {
        out.push_str("\nwarnings:\n");
        for warning in &batch.warnings {
            out.push_str(&format!("  - {warning}\n"));
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Model dump
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CalibrationEntry<'a> {
    plate: &'a PlateKey,
    filename: &'a str,
    identifier_file: &'a str,
    model: Option<&'a CalibrationModel>,
    error: Option<String>,
}

fn calibration_entries(batch: &Batch) -> Vec<CalibrationEntry<'_>> {
    batch
        .plates
        .values()
        .map(|p| CalibrationEntry {
            plate: &p.key,
            filename: &p.filename,
            identifier_file: &p.identifier_file,
            model: p.calibration.as_ref().ok(),
            error: p.calibration.as_ref().err().map(|e| e.to_string()),
        })
        .collect()
}

/// Write every plate's model (or fit error) as a JSON array.
pub fn write_calibration_json(batch: &Batch, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&calibration_entries(batch))
        .context("serialising calibration models")?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}
