use std::collections::{BTreeMap, BTreeSet};

use super::model::{
    CellValue, IdentifierRow, IdentifierTable, PLATE_WELLS, PositionReading, SampleRow,
};
use crate::error::PlateError;
use crate::pipeline::reshape::{position_of, well_label};

// ---------------------------------------------------------------------------
// Plate selection
// ---------------------------------------------------------------------------

/// Identifier rows that belong to `plate_id`. One sheet may describe several
/// plates measured on the same day; only exact (trimmed) id matches pass.
pub fn rows_for_plate(table: &IdentifierTable, plate_id: &str) -> Vec<IdentifierRow> {
    let wanted = plate_id.trim();
    table
        .rows
        .iter()
        .filter(|row| row.plate_id.trim() == wanted)
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Position join
// ---------------------------------------------------------------------------

/// Result of joining one plate's readings to its identifier rows.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossMatch {
    pub rows: Vec<SampleRow>,
    /// Readings for which no identifier row exists.
    pub unmatched: Vec<u32>,
}

/// Left-join readings to identifier rows on position.
///
/// Fails when a position is duplicated or outside 1..=96, or when a `well`
/// column disagrees with the position numbering. Readings without an
/// identifier row are kept with `identifier: None`.
pub fn cross_match(
    readings: &[PositionReading],
    identifiers: Vec<IdentifierRow>,
    well_column: &str,
) -> Result<CrossMatch, PlateError> {
    let mut by_position: BTreeMap<u32, IdentifierRow> = BTreeMap::new();
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();

    for row in identifiers {
        if row.position == 0 || row.position as usize > PLATE_WELLS {
            return Err(PlateError::PositionOutOfRange(row.position));
        }
        check_well_label(&row, well_column)?;
        *counts.entry(row.position).or_default() += 1;
        by_position.insert(row.position, row);
    }
    if let Some((&position, &count)) = counts.iter().find(|(_, &c)| c > 1) {
        return Err(PlateError::DuplicatePosition { position, count });
    }

    let mut unmatched = Vec::new();
    let rows = readings
        .iter()
        .map(|reading| {
            let identifier = by_position.remove(&reading.position);
            if identifier.is_none() {
                unmatched.push(reading.position);
            }
            SampleRow {
                reading: *reading,
                identifier,
                predicted: None,
            }
        })
        .collect();

    Ok(CrossMatch { rows, unmatched })
}

fn check_well_label(row: &IdentifierRow, well_column: &str) -> Result<(), PlateError> {
    let Some(found) = row.extra.get(well_column) else {
        return Ok(());
    };
    if found.is_null() {
        return Ok(());
    }
    let found = found.to_string();
    if position_of(&found) == Some(row.position) {
        Ok(())
    } else {
        Err(PlateError::WellMismatch {
            position: row.position,
            expected: well_label(row.position).unwrap_or_default(),
            found,
        })
    }
}

/// Identifier column names present across a set of rows (excluding the
/// typed ones), sorted.
pub fn extra_columns<'a>(rows: impl IntoIterator<Item = &'a SampleRow>) -> Vec<String> {
    let mut names: BTreeSet<&'a str> = BTreeSet::new();
    for row in rows {
        if let Some(id) = &row.identifier {
            names.extend(id.extra.keys().map(String::as_str));
        }
    }
    names.into_iter().map(str::to_string).collect()
}

/// Look up an extra identifier cell; absent columns and rows give `Null`.
pub fn extra_value(row: &SampleRow, column: &str) -> CellValue {
    row.identifier
        .as_ref()
        .and_then(|id| id.extra.get(column))
        .cloned()
        .unwrap_or(CellValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::reshape::flatten_grid;
    use crate::data::model::PlateGrid;
    use chrono::NaiveDate;

    fn id_row(position: u32, plate: &str) -> IdentifierRow {
        IdentifierRow {
            position,
            is_standard: false,
            known_concentration: None,
            plate_id: plate.to_string(),
            extra: BTreeMap::new(),
        }
    }

    fn table(rows: Vec<IdentifierRow>) -> IdentifierTable {
        IdentifierTable {
            filename: "2021-06-15_ids.csv".into(),
            date: NaiveDate::from_ymd_opt(2021, 6, 15).unwrap(),
            rows,
        }
    }

    #[test]
    fn selects_rows_of_one_plate() {
        let t = table(vec![id_row(1, "p1"), id_row(1, "p2"), id_row(2, " p1 ")]);
        let rows = rows_for_plate(&t, "p1");
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.plate_id.trim() == "p1"));
        assert!(rows_for_plate(&t, "p3").is_empty());
    }

    #[test]
    fn joins_every_reading_once() {
        let readings = flatten_grid(&PlateGrid::filled(0.5));
        let ids: Vec<IdentifierRow> = (1..=96).map(|p| id_row(p, "p1")).collect();

        let matched = cross_match(&readings, ids, "well").unwrap();
        assert_eq!(matched.rows.len(), 96);
        assert!(matched.unmatched.is_empty());
        for row in &matched.rows {
            assert_eq!(row.identifier.as_ref().unwrap().position, row.reading.position);
        }
    }

    #[test]
    fn missing_identifier_rows_are_kept_as_absent() {
        let readings = flatten_grid(&PlateGrid::filled(0.5));
        let ids: Vec<IdentifierRow> = (1..=90).map(|p| id_row(p, "p1")).collect();

        let matched = cross_match(&readings, ids, "well").unwrap();
        assert_eq!(matched.rows.len(), 96);
        assert_eq!(matched.unmatched, (91..=96).collect::<Vec<u32>>());
        assert!(matched.rows[95].identifier.is_none());
    }

    #[test]
    fn duplicate_positions_are_rejected() {
        let readings = flatten_grid(&PlateGrid::filled(0.5));
        let ids = vec![id_row(4, "p1"), id_row(4, "p1"), id_row(5, "p1")];
        assert_eq!(
            cross_match(&readings, ids, "well").unwrap_err(),
            PlateError::DuplicatePosition { position: 4, count: 2 }
        );
    }

    #[test]
    fn out_of_range_positions_are_rejected() {
        let readings = flatten_grid(&PlateGrid::filled(0.5));
        assert_eq!(
            cross_match(&readings, vec![id_row(97, "p1")], "well").unwrap_err(),
            PlateError::PositionOutOfRange(97)
        );
    }

    #[test]
    fn well_labels_must_follow_column_major_positions() {
        let readings = flatten_grid(&PlateGrid::filled(0.5));

        let mut good = id_row(9, "p1");
        good.extra.insert("well".into(), CellValue::String("A2".into()));
        assert!(cross_match(&readings, vec![good], "well").is_ok());

        let mut padded = id_row(19, "p1");
        padded.extra.insert("well".into(), CellValue::String(" c03".into()));
        assert!(cross_match(&readings, vec![padded], "well").is_ok());

        let mut bad = id_row(2, "p1");
        bad.extra.insert("well".into(), CellValue::String("A2".into()));
        assert!(matches!(
            cross_match(&readings, vec![bad], "well"),
            Err(PlateError::WellMismatch { position: 2, .. })
        ));
    }

    #[test]
    fn extra_columns_are_a_sorted_union() {
        let mut a = id_row(1, "p1");
        a.extra.insert("sample".into(), CellValue::String("x".into()));
        let mut b = id_row(2, "p1");
        b.extra.insert("dilution".into(), CellValue::Integer(2));
        b.extra.insert("sample".into(), CellValue::String("y".into()));

        let rows: Vec<SampleRow> = [a, b]
            .into_iter()
            .map(|id| SampleRow {
                reading: PositionReading { position: id.position, absorbance: 0.1 },
                identifier: Some(id),
                predicted: None,
            })
            .collect();
        assert_eq!(extra_columns(&rows), ["dilution", "sample"]);
        assert_eq!(extra_value(&rows[0], "dilution"), CellValue::Null);
    }
}
