use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::{debug, info};

use super::filename::FilenamePattern;
use super::model::{
    CellValue, IdentifierRow, IdentifierTable, PLATE_COLS, PlateGrid, PlateKey, RawPlate,
};
use crate::config::{IdentifierColumns, RawFormat};

// ---------------------------------------------------------------------------
// File discovery
// ---------------------------------------------------------------------------

/// List the `.csv` files of a directory, sorted by name so every run sees the
/// same order. A missing directory is an error.
pub fn discover_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("reading directory {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("listing directory {}", dir.display()))?
            .path();
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    debug!("{}: {} csv files", dir.display(), files.len());
    Ok(files)
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("{} has no UTF-8 file name", path.display()))
}

// ---------------------------------------------------------------------------
// Raw measurement grids
// ---------------------------------------------------------------------------

/// CSV layout (defaults):
///
/// ```text
/// ,1,2,3,4,5,6,7,8,9,10,11,12
/// A,0.051,0.049,...
/// ...
/// H,0.612,0.598,...
/// ```
///
/// The header record and the row-label column are discarded; what remains
/// must be exactly 8 records of 12 numbers.
pub fn load_raw_plate(
    path: &Path,
    pattern: &FilenamePattern,
    format: &RawFormat,
) -> Result<RawPlate> {
    let filename = file_name(path)?;
    let (date, plate_id) = pattern.parse_with_plate(&filename)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(format.has_header)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("{filename}: CSV row {row_no}"))?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        let skip = usize::from(format.label_column);
        let values = record
            .iter()
            .skip(skip)
            .enumerate()
            .map(|(col, tok)| {
                tok.parse::<f64>().with_context(|| {
                    format!("{filename}: row {row_no}, column {}: '{tok}' is not a number", col + 1)
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        if values.len() != PLATE_COLS {
            bail!(
                "{filename}: row {row_no} has {} values, expected {PLATE_COLS}",
                values.len()
            );
        }
        rows.push(values);
    }

    let grid = PlateGrid::from_rows(rows).with_context(|| format!("{filename}: bad grid shape"))?;
    Ok(RawPlate {
        filename,
        key: PlateKey { date, plate_id },
        grid,
    })
}

/// Load every raw grid of a directory. The first bad file aborts the load.
pub fn load_raw_directory(
    dir: &Path,
    pattern: &FilenamePattern,
    format: &RawFormat,
) -> Result<Vec<RawPlate>> {
    let plates = discover_csv_files(dir)?
        .iter()
        .map(|path| load_raw_plate(path, pattern, format))
        .collect::<Result<Vec<_>>>()?;
    info!("loaded {} raw plates from {}", plates.len(), dir.display());
    Ok(plates)
}

// ---------------------------------------------------------------------------
// Identifier sheets
// ---------------------------------------------------------------------------

/// Headered CSV, one row per well. The position, standard flag, known
/// concentration and plate id columns are required (names come from
/// [`IdentifierColumns`]); every other column is kept as typed metadata.
pub fn load_identifier_table(
    path: &Path,
    pattern: &FilenamePattern,
    columns: &IdentifierColumns,
) -> Result<IdentifierTable> {
    let filename = file_name(path)?;
    let date = pattern.parse(&filename)?.date;

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("{filename}: reading CSV headers"))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("{filename}: missing '{name}' column"))
    };
    let pos_idx = find(&columns.position)?;
    let std_idx = find(&columns.standard)?;
    let conc_idx = find(&columns.concentration)?;
    let plate_idx = find(&columns.plate_id)?;

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("{filename}: CSV row {row_no}"))?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        let field = |idx: usize| record.get(idx).unwrap_or("");

        let position = parse_position(field(pos_idx))
            .with_context(|| format!("{filename}: row {row_no}, '{}'", columns.position))?;
        let is_standard = parse_flag(field(std_idx))
            .with_context(|| format!("{filename}: row {row_no}, '{}'", columns.standard))?;
        let known_concentration = parse_optional_f64(field(conc_idx))
            .with_context(|| format!("{filename}: row {row_no}, '{}'", columns.concentration))?;
        let plate_id = field(plate_idx).to_string();

        let mut extra = BTreeMap::new();
        for (col_idx, value) in record.iter().enumerate() {
            if [pos_idx, std_idx, conc_idx, plate_idx].contains(&col_idx) {
                continue;
            }
            if let Some(name) = headers.get(col_idx) {
                extra.insert(name.clone(), CellValue::guess(value));
            }
        }

        rows.push(IdentifierRow {
            position,
            is_standard,
            known_concentration,
            plate_id,
            extra,
        });
    }

    debug!("{filename}: {} identifier rows", rows.len());
    Ok(IdentifierTable {
        filename,
        date,
        rows,
    })
}

/// Load every identifier sheet of a directory. The first bad file aborts.
pub fn load_identifier_directory(
    dir: &Path,
    pattern: &FilenamePattern,
    columns: &IdentifierColumns,
) -> Result<Vec<IdentifierTable>> {
    let tables = discover_csv_files(dir)?
        .iter()
        .map(|path| load_identifier_table(path, pattern, columns))
        .collect::<Result<Vec<_>>>()?;
    info!("loaded {} identifier tables from {}", tables.len(), dir.display());
    Ok(tables)
}

// -- field parsers --

/// Integer position; spreadsheet exports sometimes write `12.0`.
fn parse_position(s: &str) -> Result<u32> {
    match CellValue::guess(s) {
        CellValue::Integer(i) if i >= 0 => Ok(u32::try_from(i)?),
        CellValue::Float(f) if f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 => Ok(f as u32),
        _ => bail!("'{s}' is not a well position"),
    }
}

fn parse_flag(s: &str) -> Result<bool> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" | "t" | "yes" => Ok(true),
        "0" | "0.0" | "false" | "f" | "no" | "" | "na" => Ok(false),
        _ => bail!("'{s}' is not a 0/1 flag"),
    }
}

fn parse_optional_f64(s: &str) -> Result<Option<f64>> {
    if s.is_empty() || s.eq_ignore_ascii_case("na") {
        return Ok(None);
    }
    s.parse::<f64>()
        .map(Some)
        .with_context(|| format!("'{s}' is not a number"))
}
