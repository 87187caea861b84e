use std::collections::BTreeMap;

use crate::data::model::{IdentifierRow, PlateGrid, PlateKey, SampleRow};
use crate::error::{CalibrationError, PlateFailure};
use crate::pipeline::calibrate::CalibrationModel;

// ---------------------------------------------------------------------------
// Per-plate record
// ---------------------------------------------------------------------------

/// Everything the pipeline knows about one plate.
#[derive(Debug, Clone)]
pub struct PlateRecord {
    pub key: PlateKey,
    /// Raw-measurement file.
    pub filename: String,
    /// Identifier file the plate was joined to.
    pub identifier_file: String,
    pub grid: PlateGrid,
    /// Identifier rows carrying this plate's id.
    pub identifiers: Vec<IdentifierRow>,
    /// Joined rows; predictions are filled in after calibration.
    pub rows: Vec<SampleRow>,
    /// Positions with no identifier row.
    pub unmatched_positions: Vec<u32>,
    pub calibration: Result<CalibrationModel, CalibrationError>,
}

impl PlateRecord {
    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_ok()
    }

    /// Text for the output's status column.
    pub fn status(&self) -> String {
        match &self.calibration {
            Ok(_) => "ok".to_string(),
            Err(e) => format!("calibration failed: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// The whole run: processed plates keyed by date and plate id, and the
/// plates that were dropped before calibration.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub plates: BTreeMap<PlateKey, PlateRecord>,
    pub failures: Vec<PlateFailure>,
    pub warnings: Vec<String>,
}

impl Batch {
    pub fn insert(&mut self, record: PlateRecord) {
        self.plates.insert(record.key.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.plates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plates.is_empty()
    }

    /// Plates whose calibration failed, with the reason.
    pub fn calibration_failures(&self) -> impl Iterator<Item = (&PlateKey, &CalibrationError)> {
        self.plates
            .iter()
            .filter_map(|(k, p)| p.calibration.as_ref().err().map(|e| (k, e)))
    }

    /// Number of problems a strict run refuses to accept.
    pub fn problem_count(&self) -> usize {
        self.failures.len() + self.calibration_failures().count()
    }

    pub fn row_count(&self) -> usize {
        self.plates.values().map(|p| p.rows.len()).sum()
    }
}
