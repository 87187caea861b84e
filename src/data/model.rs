use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::Serialize;

/// Rows of a plate (A..H).
pub const PLATE_ROWS: usize = 8;
/// Columns of a plate (1..12).
pub const PLATE_COLS: usize = 12;
/// Wells per plate.
pub const PLATE_WELLS: usize = PLATE_ROWS * PLATE_COLS;

// ---------------------------------------------------------------------------
// CellValue – a single cell of an identifier sheet or of the output table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value. `Null` is the explicit "absent" marker
/// used when a column does not exist for a plate.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    Null,
}

/// Full-precision rendering; `Null` renders as the empty string so CSV
/// output carries an empty field for absent cells.
impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::String(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            CellValue::Null => Ok(()),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::String(s) => serializer.serialize_str(s),
            CellValue::Integer(i) => serializer.serialize_i64(*i),
            CellValue::Float(v) if v.is_finite() => serializer.serialize_f64(*v),
            CellValue::Float(_) | CellValue::Null => serializer.serialize_none(),
            CellValue::Bool(b) => serializer.serialize_bool(*b),
            CellValue::Date(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
        }
    }
}

impl CellValue {
    /// Guess the type of a raw CSV field. Blank means `Null`.
    pub fn guess(s: &str) -> CellValue {
        let s = s.trim();
        if s.is_empty() || s == "NA" {
            return CellValue::Null;
        }
        if let Ok(i) = s.parse::<i64>() {
            return CellValue::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return CellValue::Float(f);
        }
        if s == "true" || s == "false" {
            return CellValue::Bool(s == "true");
        }
        CellValue::String(s.to_string())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(v) => Some(*v),
            CellValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl From<Option<f64>> for CellValue {
    fn from(v: Option<f64>) -> Self {
        v.map_or(CellValue::Null, CellValue::Float)
    }
}

// ---------------------------------------------------------------------------
// Filename-derived identity
// ---------------------------------------------------------------------------

/// What a filename tells us: the assay date and, for raw files, the plate id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTag {
    pub date: NaiveDate,
    pub plate_id: Option<String>,
}

/// Key of one plate within a batch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PlateKey {
    pub date: NaiveDate,
    pub plate_id: String,
}

impl fmt::Display for PlateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.date.format("%Y-%m-%d"), self.plate_id)
    }
}

// ---------------------------------------------------------------------------
// Raw measurements
// ---------------------------------------------------------------------------

/// An 8x12 absorbance grid, stored row-major as read from the file.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateGrid {
    cells: Vec<f64>,
}

impl PlateGrid {
    /// Build a grid from its rows; anything but 8 rows of 12 values fails.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        if rows.len() != PLATE_ROWS {
            bail!("expected {PLATE_ROWS} grid rows, found {}", rows.len());
        }
        let mut cells = Vec::with_capacity(PLATE_WELLS);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != PLATE_COLS {
                bail!("grid row {i}: expected {PLATE_COLS} values, found {}", row.len());
            }
            cells.extend(row);
        }
        Ok(PlateGrid { cells })
    }

    #[cfg(test)]
    pub fn filled(value: f64) -> Self {
        PlateGrid {
            cells: vec![value; PLATE_WELLS],
        }
    }

    /// Value at zero-based `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.cells[row * PLATE_COLS + col]
    }
}

/// One raw-measurement file.
#[derive(Debug, Clone)]
pub struct RawPlate {
    pub filename: String,
    pub key: PlateKey,
    pub grid: PlateGrid,
}

/// One well after reshaping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionReading {
    pub position: u32,
    pub absorbance: f64,
}

// ---------------------------------------------------------------------------
// Identifier sheets
// ---------------------------------------------------------------------------

/// One row of an identifier sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifierRow {
    pub position: u32,
    pub is_standard: bool,
    pub known_concentration: Option<f64>,
    pub plate_id: String,
    /// Sample labels and every other column: column_name → value.
    pub extra: BTreeMap<String, CellValue>,
}

/// One identifier file; may describe several plates measured the same day.
#[derive(Debug, Clone)]
pub struct IdentifierTable {
    pub filename: String,
    pub date: NaiveDate,
    pub rows: Vec<IdentifierRow>,
}

// ---------------------------------------------------------------------------
// Joined rows
// ---------------------------------------------------------------------------

/// A reading joined with its identifier row and, after calibration, a
/// predicted concentration.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRow {
    pub reading: PositionReading,
    pub identifier: Option<IdentifierRow>,
    pub predicted: Option<f64>,
}

impl SampleRow {
    pub fn is_standard(&self) -> bool {
        self.identifier.as_ref().is_some_and(|id| id.is_standard)
    }

    pub fn known_concentration(&self) -> Option<f64> {
        self.identifier.as_ref().and_then(|id| id.known_concentration)
    }
}
