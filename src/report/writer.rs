use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{
    ArrayRef, BooleanBuilder, Date32Builder, Float64Builder, Int64Builder, StringBuilder,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate};
use clap::ValueEnum;
use parquet::arrow::ArrowWriter;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::data::model::CellValue;
use crate::pipeline::flatten::FlatTable;

// ---------------------------------------------------------------------------
// Output format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
    Parquet,
}

impl OutputFormat {
    /// Guess from a file extension; anything unknown is CSV.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "json" => OutputFormat::Json,
            "parquet" | "pq" => OutputFormat::Parquet,
            _ => OutputFormat::Csv,
        }
    }
}

/// Write the table to `path`, or to stdout when `path` is `None`.
pub fn write_table(table: &FlatTable, path: Option<&Path>, format: OutputFormat) -> Result<()> {
    match path {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            let out = std::io::BufWriter::new(file);
            let written = match format {
                OutputFormat::Csv => write_csv(table, out),
                OutputFormat::Json => write_json(table, out),
                OutputFormat::Parquet => write_parquet(table, out),
            };
            written.with_context(|| format!("writing {}", path.display()))
        }
        None => {
            let out = std::io::stdout().lock();
            match format {
                OutputFormat::Csv => write_csv(table, out),
                OutputFormat::Json => write_json(table, out),
                OutputFormat::Parquet => bail!("Parquet output needs --output <FILE>"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Header row then one record per row; `Null` is an empty field.
pub fn write_csv<W: Write>(table: &FlatTable, out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(&table.columns).context("writing CSV header")?;
    for row in &table.rows {
        writer
            .write_record(row.iter().map(|c| c.to_string()))
            .context("writing CSV row")?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Array of records, keys in column order, `Null` as JSON `null`.
pub fn write_json<W: Write>(table: &FlatTable, mut out: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, &Records(table)).context("serialising JSON")?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

struct Records<'a>(&'a FlatTable);

struct Record<'a> {
    columns: &'a [String],
    cells: &'a [CellValue],
}

impl Serialize for Records<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.rows.len()))?;
        for cells in &self.0.rows {
            seq.serialize_element(&Record {
                columns: &self.0.columns,
                cells,
            })?;
        }
        seq.end()
    }
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, cell) in self.columns.iter().zip(self.cells) {
            map.serialize_entry(name, cell)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Arrow / Parquet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Integer,
    Float,
    Bool,
    Date,
    Text,
}

impl ColumnKind {
    fn data_type(self) -> DataType {
        match self {
            ColumnKind::Integer => DataType::Int64,
            ColumnKind::Float => DataType::Float64,
            ColumnKind::Bool => DataType::Boolean,
            ColumnKind::Date => DataType::Date32,
            ColumnKind::Text => DataType::Utf8,
        }
    }
}

/// Narrowest Arrow type that holds every non-null cell. Integers widen to
/// float when mixed with floats; any other mix (or an all-null column) is text.
fn infer_kind<'a>(cells: impl Iterator<Item = &'a CellValue>) -> ColumnKind {
    let mut kind: Option<ColumnKind> = None;
    for cell in cells {
        let this = match cell {
            CellValue::Null => continue,
            CellValue::Integer(_) => ColumnKind::Integer,
            CellValue::Float(_) => ColumnKind::Float,
            CellValue::Bool(_) => ColumnKind::Bool,
            CellValue::Date(_) => ColumnKind::Date,
            CellValue::String(_) => ColumnKind::Text,
        };
        kind = Some(match (kind, this) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (Some(ColumnKind::Integer), ColumnKind::Float)
            | (Some(ColumnKind::Float), ColumnKind::Integer) => ColumnKind::Float,
            _ => return ColumnKind::Text,
        });
    }
    kind.unwrap_or(ColumnKind::Text)
}

/// `num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn days_since_epoch(d: &NaiveDate) -> i32 {
    d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

fn build_array<'a>(kind: ColumnKind, cells: impl Iterator<Item = &'a CellValue>) -> ArrayRef {
    match kind {
        ColumnKind::Integer => {
            let mut b = Int64Builder::new();
            for c in cells {
                match c {
                    CellValue::Integer(i) => b.append_value(*i),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        ColumnKind::Float => {
            let mut b = Float64Builder::new();
            for c in cells {
                b.append_option(c.as_f64());
            }
            Arc::new(b.finish())
        }
        ColumnKind::Bool => {
            let mut b = BooleanBuilder::new();
            for c in cells {
                match c {
                    CellValue::Bool(v) => b.append_value(*v),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        ColumnKind::Date => {
            let mut b = Date32Builder::new();
            for c in cells {
                match c {
                    CellValue::Date(d) => b.append_value(days_since_epoch(d)),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        ColumnKind::Text => {
            let mut b = StringBuilder::new();
            for c in cells {
                if c.is_null() {
                    b.append_null();
                } else {
                    b.append_value(c.to_string());
                }
            }
            Arc::new(b.finish())
        }
    }
}

/// Convert the flat table into one Arrow record batch.
pub fn to_record_batch(table: &FlatTable) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(table.columns.len());
    let mut arrays = Vec::with_capacity(table.columns.len());
    for (idx, name) in table.columns.iter().enumerate() {
        let kind = infer_kind(table.rows.iter().map(|r| &r[idx]));
        fields.push(Field::new(name, kind.data_type(), true));
        arrays.push(build_array(kind, table.rows.iter().map(|r| &r[idx])));
    }
    let schema = Arc::new(Schema::new(fields));
    RecordBatch::try_new(schema, arrays).context("building Arrow record batch")
}

pub fn write_parquet<W: Write + Send>(table: &FlatTable, out: W) -> Result<()> {
    let batch = to_record_batch(table)?;
    let mut writer =
        ArrowWriter::try_new(out, batch.schema(), None).context("creating Parquet writer")?;
    writer.write(&batch).context("writing Parquet batch")?;
    writer.close().context("closing Parquet writer")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::{Float64Type, Int64Type};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use tempfile::TempDir;

    fn sample_table() -> FlatTable {
        FlatTable {
            columns: vec![
                "filename".into(),
                "position".into(),
                "absorbance".into(),
                "dilution".into(),
                "predicted_concentration".into(),
            ],
            rows: vec![
                vec![
                    CellValue::String("a.csv".into()),
                    CellValue::Integer(1),
                    CellValue::Float(0.5),
                    CellValue::Integer(2),
                    CellValue::Float(5.0),
                ],
                vec![
                    CellValue::String("b.csv".into()),
                    CellValue::Integer(2),
                    CellValue::Float(0.25),
                    CellValue::Null,
                    CellValue::Null,
                ],
            ],
        }
    }

    #[test]
    fn csv_writes_nulls_as_empty_fields() {
        let mut buf = Vec::new();
        write_csv(&sample_table(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "filename,position,absorbance,dilution,predicted_concentration");
        assert_eq!(lines[1], "a.csv,1,0.5,2,5");
        assert_eq!(lines[2], "b.csv,2,0.25,,");
    }

    #[test]
    fn json_keeps_column_order_and_nulls() {
        let mut buf = Vec::new();
        write_json(&sample_table(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.find("\"filename\"").unwrap() < text.find("\"position\"").unwrap());

        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[0]["dilution"], 2);
        assert!(parsed[1]["dilution"].is_null());
        assert_eq!(parsed[1]["absorbance"], 0.25);
    }

    #[test]
    fn arrow_types_are_inferred_per_column() {
        let batch = to_record_batch(&sample_table()).unwrap();
        let schema = batch.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(1).data_type(), &DataType::Int64);
        assert_eq!(schema.field(2).data_type(), &DataType::Float64);
        assert_eq!(schema.field(3).data_type(), &DataType::Int64);
        assert!(batch.column(3).is_null(1));
    }

    #[test]
    fn mixed_columns_fall_back() {
        let cells = [CellValue::Integer(1), CellValue::Float(0.5)];
        assert_eq!(infer_kind(cells.iter()), ColumnKind::Float);
        let cells = [CellValue::Integer(1), CellValue::String("x".into())];
        assert_eq!(infer_kind(cells.iter()), ColumnKind::Text);
        let cells = [CellValue::Null, CellValue::Null];
        assert_eq!(infer_kind(cells.iter()), ColumnKind::Text);
    }

    #[test]
    fn parquet_round_trips_values_and_nulls() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.parquet");
        write_table(&sample_table(), Some(path.as_path()), OutputFormat::Parquet).unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file).unwrap().build().unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 2);

        let batch = &batches[0];
        let positions = batch.column(1).as_primitive::<Int64Type>();
        assert_eq!(positions.value(1), 2);
        let predicted = batch.column(4).as_primitive::<Float64Type>();
        assert_eq!(predicted.value(0), 5.0);
        assert!(predicted.is_null(1));
    }

    #[test]
    fn date_cells_become_date32() {
        let d = NaiveDate::from_ymd_opt(1970, 1, 11).unwrap();
        assert_eq!(days_since_epoch(&d), 10);
        let table = FlatTable {
            columns: vec!["date".into()],
            rows: vec![vec![CellValue::Date(d)]],
        };
        let batch = to_record_batch(&table).unwrap();
        assert_eq!(batch.schema().field(0).data_type(), &DataType::Date32);
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(OutputFormat::from_path(Path::new("x.parquet")), OutputFormat::Parquet);
        assert_eq!(OutputFormat::from_path(Path::new("x.JSON")), OutputFormat::Json);
        assert_eq!(OutputFormat::from_path(Path::new("x.tsv")), OutputFormat::Csv);
    }
}
