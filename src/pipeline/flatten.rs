use crate::config::IdentifierColumns;
use crate::data::filter::{extra_columns, extra_value};
use crate::data::model::CellValue;
use crate::state::Batch;

use super::reshape::well_label;

pub const PREDICTED_COLUMN: &str = "predicted_concentration";
pub const STATUS_COLUMN: &str = "calibration_status";

// ---------------------------------------------------------------------------
// FlatTable – the tidy output
// ---------------------------------------------------------------------------

/// One long table, one row per well of every processed plate.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlatTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl FlatTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All cells of one column, top to bottom.
    #[cfg(test)]
    pub fn column(&self, name: &str) -> Option<Vec<&CellValue>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }
}

/// Expand every plate's rows into one table.
///
/// Columns: `filename, date, plate, position, well, absorbance`, the typed
/// identifier columns under their configured names, the sorted union of all
/// other identifier columns, then prediction and status. Plate-level values
/// repeat on each of the plate's rows; cells a plate lacks are `Null`.
/// Identifier columns whose name is already taken get an `id_` prefix.
pub fn flatten_batch(batch: &Batch, names: &IdentifierColumns) -> FlatTable {
    let mut columns: Vec<String> = ["filename", "date", "plate", "position", "well", "absorbance"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    columns.extend([
        names.standard.clone(),
        names.concentration.clone(),
        names.plate_id.clone(),
    ]);
    let reserved = [PREDICTED_COLUMN, STATUS_COLUMN];

    // (identifier column, output column)
    let mut extras: Vec<(String, String)> = Vec::new();
    for source in extra_columns(batch.plates.values().flat_map(|p| p.rows.iter())) {
        if source == names.well {
            continue;
        }
        let mut output = source.clone();
        while columns.contains(&output) || reserved.contains(&output.as_str()) {
            output = format!("id_{output}");
        }
        columns.push(output.clone());
        extras.push((source, output));
    }
    columns.extend(reserved.iter().map(|c| c.to_string()));

    let mut rows = Vec::with_capacity(batch.row_count());
    for plate in batch.plates.values() {
        let status = plate.status();
        for row in &plate.rows {
            let id = row.identifier.as_ref();
            let mut cells = vec![
                CellValue::String(plate.filename.clone()),
                CellValue::Date(plate.key.date),
                CellValue::String(plate.key.plate_id.clone()),
                CellValue::Integer(i64::from(row.reading.position)),
                well_label(row.reading.position).map_or(CellValue::Null, CellValue::String),
                CellValue::Float(row.reading.absorbance),
                id.map_or(CellValue::Null, |id| CellValue::Integer(i64::from(id.is_standard))),
                id.and_then(|id| id.known_concentration).into(),
                id.map_or(CellValue::Null, |id| CellValue::String(id.plate_id.clone())),
            ];
            cells.extend(extras.iter().map(|(source, _)| extra_value(row, source)));
            cells.push(row.predicted.into());
            cells.push(CellValue::String(status.clone()));
            rows.push(cells);
        }
    }

    FlatTable { columns, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{IdentifierRow, PlateGrid, PlateKey, SampleRow};
    use crate::error::CalibrationError;
    use crate::pipeline::reshape::flatten_grid;
    use crate::state::PlateRecord;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn plate(id: &str, extra: &[(&str, CellValue)], predicted: Option<f64>) -> PlateRecord {
        let rows = flatten_grid(&PlateGrid::filled(0.2))
            .into_iter()
            .map(|reading| SampleRow {
                reading,
                identifier: Some(IdentifierRow {
                    position: reading.position,
                    is_standard: reading.position == 1,
                    known_concentration: (reading.position == 1).then_some(2.0),
                    plate_id: id.to_string(),
                    extra: extra
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.clone()))
                        .collect::<BTreeMap<_, _>>(),
                }),
                predicted,
            })
            .collect();
        PlateRecord {
            key: PlateKey {
                date: NaiveDate::from_ymd_opt(2021, 6, 15).unwrap(),
                plate_id: id.to_string(),
            },
            filename: format!("2021-06-15_{id}.csv"),
            identifier_file: "2021-06-15_ids.csv".into(),
            grid: PlateGrid::filled(0.2),
            identifiers: Vec::new(),
            rows,
            unmatched_positions: Vec::new(),
            calibration: Err(CalibrationError::ZeroVariance),
        }
    }

    #[test]
    fn union_of_columns_with_null_fill() {
        let mut batch = Batch::default();
        batch.insert(plate("p1", &[("sample", CellValue::String("s".into()))], Some(1.5)));
        batch.insert(plate("p2", &[("dilution", CellValue::Integer(4))], None));

        let table = flatten_batch(&batch, &IdentifierColumns::default());
        assert_eq!(table.len(), 192);
        assert_eq!(
            table.columns,
            [
                "filename",
                "date",
                "plate",
                "position",
                "well",
                "absorbance",
                "std",
                "std_conc_NH4",
                "ammonium_id",
                "dilution",
                "sample",
                PREDICTED_COLUMN,
                STATUS_COLUMN,
            ]
        );
        assert!(table.rows.iter().all(|r| r.len() == table.columns.len()));

        let dilution = table.column("dilution").unwrap();
        assert!(dilution[..96].iter().all(|c| c.is_null()));
        assert!(dilution[96..].iter().all(|c| **c == CellValue::Integer(4)));

        let sample = table.column("sample").unwrap();
        assert!(sample[96..].iter().all(|c| c.is_null()));
    }

    #[test]
    fn plate_values_repeat_on_every_row() {
        let mut batch = Batch::default();
        batch.insert(plate("p1", &[], Some(1.5)));
        let table = flatten_batch(&batch, &IdentifierColumns::default());

        let filenames = table.column("filename").unwrap();
        assert!(filenames
            .iter()
            .all(|c| **c == CellValue::String("2021-06-15_p1.csv".into())));
        let wells = table.column("well").unwrap();
        assert_eq!(*wells[8], CellValue::String("A2".into()));
        let status = table.column(STATUS_COLUMN).unwrap();
        assert!(status[0].to_string().starts_with("calibration failed"));
        assert_eq!(*table.column(PREDICTED_COLUMN).unwrap()[0], CellValue::Float(1.5));
        assert_eq!(*table.column("std_conc_NH4").unwrap()[1], CellValue::Null);
    }

    #[test]
    fn identifier_columns_never_shadow_plate_columns() {
        let mut batch = Batch::default();
        batch.insert(plate(
            "p1",
            &[
                ("date", CellValue::String("2021-06-01".into())),
                ("plate", CellValue::String("other".into())),
                ("id_plate", CellValue::Integer(7)),
            ],
            None,
        ));
        let table = flatten_batch(&batch, &IdentifierColumns::default());

        for name in &table.columns {
            assert_eq!(table.columns.iter().filter(|c| *c == name).count(), 1, "{name}");
        }
        assert_eq!(
            *table.column("date").unwrap()[0],
            CellValue::Date(NaiveDate::from_ymd_opt(2021, 6, 15).unwrap())
        );
        assert_eq!(*table.column("plate").unwrap()[0], CellValue::String("p1".into()));
        assert_eq!(
            *table.column("id_date").unwrap()[0],
            CellValue::String("2021-06-01".into())
        );
        assert_eq!(*table.column("id_plate").unwrap()[0], CellValue::Integer(7));
        assert_eq!(
            *table.column("id_id_plate").unwrap()[0],
            CellValue::String("other".into())
        );
        assert_eq!(table.columns.last().map(String::as_str), Some(STATUS_COLUMN));
    }

    #[test]
    fn empty_batch_has_header_only() {
        let table = flatten_batch(&Batch::default(), &IdentifierColumns::default());
        assert!(table.is_empty());
        assert!(table.column_index(PREDICTED_COLUMN).is_some());
    }
}
