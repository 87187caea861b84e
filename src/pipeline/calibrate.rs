use serde::Serialize;

use crate::config::CalibrationConfig;
use crate::data::model::SampleRow;
use crate::error::CalibrationError;

// ---------------------------------------------------------------------------
// Calibration model
// ---------------------------------------------------------------------------

/// Ordinary least-squares fit of known concentration on absorbance,
/// `concentration = intercept + slope * absorbance`, with the usual
/// summary diagnostics. Statistics that need residual degrees of freedom
/// are `None` for a two-point fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationModel {
    pub slope: f64,
    pub intercept: f64,
    pub n_standards: usize,
    pub r_squared: Option<f64>,
    pub adj_r_squared: Option<f64>,
    pub residual_std_error: Option<f64>,
    pub slope_std_error: Option<f64>,
    pub intercept_std_error: Option<f64>,
    pub slope_t: Option<f64>,
    pub intercept_t: Option<f64>,
    pub residuals: ResidualSummary,
}

/// Five-number summary of the fit residuals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResidualSummary {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl CalibrationModel {
    pub fn predict(&self, absorbance: f64) -> f64 {
        self.intercept + self.slope * absorbance
    }
}

// ---------------------------------------------------------------------------
// Fitting
// ---------------------------------------------------------------------------

/// Standards of a plate as `(absorbance, known concentration)` points:
/// flagged rows with a known concentration and a finite absorbance.
pub fn standard_points(rows: &[SampleRow]) -> Vec<(f64, f64)> {
    rows.iter()
        .filter(|row| row.is_standard() && row.reading.absorbance.is_finite())
        .filter_map(|row| {
            row.known_concentration()
                .filter(|c| c.is_finite())
                .map(|c| (row.reading.absorbance, c))
        })
        .collect()
}

/// Fit the plate's calibration curve from its standard rows.
pub fn fit_calibration(
    rows: &[SampleRow],
    config: &CalibrationConfig,
) -> Result<CalibrationModel, CalibrationError> {
    fit_line(&standard_points(rows), config.min_standards)
}

/// OLS of `y` on `x` over `points`.
pub fn fit_line(
    points: &[(f64, f64)],
    min_points: usize,
) -> Result<CalibrationModel, CalibrationError> {
    let required = min_points.max(2);
    let n = points.len();
    if n < required {
        return Err(CalibrationError::InsufficientStandards { found: n, required });
    }

    let nf = n as f64;
    let x_mean = points.iter().map(|p| p.0).sum::<f64>() / nf;
    let y_mean = points.iter().map(|p| p.1).sum::<f64>() / nf;

    let sxx: f64 = points.iter().map(|p| (p.0 - x_mean).powi(2)).sum();
    let sxy: f64 = points.iter().map(|p| (p.0 - x_mean) * (p.1 - y_mean)).sum();
    let syy: f64 = points.iter().map(|p| (p.1 - y_mean).powi(2)).sum();

    // Identical absorbances leave rounding noise in sxx; scale the cut-off.
    let x_energy: f64 = points.iter().map(|p| p.0 * p.0).sum();
    if sxx <= f64::EPSILON * x_energy.max(f64::MIN_POSITIVE) {
        return Err(CalibrationError::ZeroVariance);
    }

    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;
    if !slope.is_finite() || !intercept.is_finite() {
        return Err(CalibrationError::NonFinite);
    }

    let residuals: Vec<f64> = points
        .iter()
        .map(|&(x, y)| y - (intercept + slope * x))
        .collect();
    let sse: f64 = residuals.iter().map(|e| e * e).sum();

    let r_squared = (syy > 0.0).then(|| (1.0 - sse / syy).clamp(0.0, 1.0));
    let df = n - 2;
    let (adj_r_squared, residual_std_error) = if df > 0 {
        let dff = df as f64;
        (
            r_squared.map(|r2| 1.0 - (1.0 - r2) * (nf - 1.0) / dff),
            Some((sse / dff).sqrt()),
        )
    } else {
        (None, None)
    };

    let slope_std_error = residual_std_error.map(|s| s / sxx.sqrt());
    let intercept_std_error =
        residual_std_error.map(|s| s * (1.0 / nf + x_mean * x_mean / sxx).sqrt());
    let t_value = |coef: f64, se: Option<f64>| se.filter(|se| *se > 0.0).map(|se| coef / se);

    Ok(CalibrationModel {
        slope,
        intercept,
        n_standards: n,
        r_squared,
        adj_r_squared,
        residual_std_error,
        slope_std_error,
        intercept_std_error,
        slope_t: t_value(slope, slope_std_error),
        intercept_t: t_value(intercept, intercept_std_error),
        residuals: summarize(&residuals),
    })
}

fn summarize(values: &[f64]) -> ResidualSummary {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    ResidualSummary {
        min: quantile(&sorted, 0.0),
        q1: quantile(&sorted, 0.25),
        median: quantile(&sorted, 0.5),
        q3: quantile(&sorted, 0.75),
        max: quantile(&sorted, 1.0),
    }
}

/// Linear-interpolation quantile of sorted, non-empty data.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}
