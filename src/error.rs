use thiserror::Error;

use crate::data::model::PlateKey;

/// Input problems tied to one file or one plate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlateError {
    #[error("filename '{filename}' does not match pattern {pattern}")]
    FilenameMismatch { filename: String, pattern: String },

    #[error("filename '{filename}': cannot parse date '{raw}' with format {format}")]
    BadDate {
        filename: String,
        raw: String,
        format: String,
    },

    #[error("filename '{filename}': pattern has no 'plate' capture")]
    MissingPlateId { filename: String },

    #[error("position {position} appears {count} times in the identifier rows")]
    DuplicatePosition { position: u32, count: usize },

    #[error("position {0} is outside 1..=96")]
    PositionOutOfRange(u32),

    #[error("position {position} is labelled well '{found}' but should be '{expected}'")]
    WellMismatch {
        position: u32,
        expected: String,
        found: String,
    },
}

/// Why a plate could not be calibrated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("need at least {required} standards, found {found}")]
    InsufficientStandards { found: usize, required: usize },

    #[error("standard absorbances have zero variance")]
    ZeroVariance,

    #[error("fit produced non-finite coefficients")]
    NonFinite,
}

/// A plate dropped from the batch before calibration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlateFailure {
    #[error("{key} ({filename}): no identifier table for this date")]
    NoIdentifierTable { key: PlateKey, filename: String },

    #[error("{key} ({filename}): {} identifier tables share this date: {}", .candidates.len(), .candidates.join(", "))]
    AmbiguousIdentifierTables {
        key: PlateKey,
        filename: String,
        candidates: Vec<String>,
    },

    #[error("{key} ({filename}): no identifier rows carry plate id '{}'", .key.plate_id)]
    NoIdentifierRows { key: PlateKey, filename: String },

    #[error("{key}: {} raw files resolve to this plate: {}", .filenames.len(), .filenames.join(", "))]
    DuplicatePlate { key: PlateKey, filenames: Vec<String> },

    #[error("{key} ({filename}): {source}")]
    CrossMatch {
        key: PlateKey,
        filename: String,
        source: PlateError,
    },
}

impl PlateFailure {
    pub fn key(&self) -> &PlateKey {
        match self {
            PlateFailure::NoIdentifierTable { key, .. }
            | PlateFailure::AmbiguousIdentifierTables { key, .. }
            | PlateFailure::NoIdentifierRows { key, .. }
            | PlateFailure::DuplicatePlate { key, .. }
            | PlateFailure::CrossMatch { key, .. } => key,
        }
    }
}
