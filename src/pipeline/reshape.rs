use crate::data::model::{PLATE_COLS, PLATE_ROWS, PLATE_WELLS, PlateGrid, PositionReading};

// ---------------------------------------------------------------------------
// Grid → positions
// ---------------------------------------------------------------------------

/// Flatten a grid into 96 readings, column-major: A1=1, B1=2, ..., H1=8,
/// A2=9, ..., H12=96. Identifier sheets number their wells the same way.
pub fn flatten_grid(grid: &PlateGrid) -> Vec<PositionReading> {
    let mut readings = Vec::with_capacity(PLATE_WELLS);
    for col in 0..PLATE_COLS {
        for row in 0..PLATE_ROWS {
            readings.push(PositionReading {
                position: position_at(row, col),
                absorbance: grid.get(row, col),
            });
        }
    }
    readings
}

/// 1-based position of zero-based `(row, col)`.
pub fn position_at(row: usize, col: usize) -> u32 {
    (col * PLATE_ROWS + row + 1) as u32
}

/// Well label ("A1".."H12") of a position, `None` outside 1..=96.
pub fn well_label(position: u32) -> Option<String> {
    let idx = (position as usize).checked_sub(1)?;
    if idx >= PLATE_WELLS {
        return None;
    }
    let row = (b'A' + (idx % PLATE_ROWS) as u8) as char;
    let col = idx / PLATE_ROWS + 1;
    Some(format!("{row}{col}"))
}

/// Inverse of [`well_label`]; case-insensitive, tolerates `A01`.
pub fn position_of(well: &str) -> Option<u32> {
    let well = well.trim();
    let mut chars = well.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    if !('A'..='H').contains(&letter) {
        return None;
    }
    let col: usize = chars.as_str().parse().ok()?;
    if !(1..=PLATE_COLS).contains(&col) {
        return None;
    }
    let row = (letter as u8 - b'A') as usize;
    Some(position_at(row, col - 1))
}
