use crate::data::model::SampleRow;
use crate::error::CalibrationError;

use super::calibrate::CalibrationModel;

/// Apply a plate's curve to every row, standards included. A failed fit
/// leaves every prediction `None`; the failure itself stays on the plate
/// record for reporting.
pub fn predict(rows: &mut [SampleRow], model: &Result<CalibrationModel, CalibrationError>) {
    match model {
        Ok(model) => {
            for row in rows.iter_mut() {
                let absorbance = row.reading.absorbance;
                row.predicted = absorbance
                    .is_finite()
                    .then(|| model.predict(absorbance));
            }
        }
        Err(_) => {
            for row in rows.iter_mut() {
                row.predicted = None;
            }
        }
    }
}
