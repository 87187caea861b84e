use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Pipeline configuration
// ---------------------------------------------------------------------------

/// Everything a run needs. Every field has a default, so a TOML file only has
/// to name what differs from the lab's usual layout.
///
/// ```toml
/// strict = true
///
/// [raw_filename]
/// pattern = '^(?P<date>\d{8})_(?P<plate>NH4_\d+)\.csv$'
/// date_format = "%Y%m%d"
///
/// [columns]
/// concentration = "std_conc_NO3"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory of raw 8x12 absorbance grids.
    pub raw_dir: PathBuf,
    /// Directory of identifier sheets.
    pub id_dir: PathBuf,
    pub raw_filename: FilenameConfig,
    pub id_filename: FilenameConfig,
    pub raw_format: RawFormat,
    pub columns: IdentifierColumns,
    pub calibration: CalibrationConfig,
    /// Abort the run on any per-plate failure instead of reporting it.
    pub strict: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("raw"),
            id_dir: PathBuf::from("ids"),
            raw_filename: FilenameConfig {
                pattern: r"^(?P<date>\d{4}-\d{2}-\d{2})_(?P<plate>[^.]+)\.(?i:csv)$".to_string(),
                date_format: "%Y-%m-%d".to_string(),
            },
            id_filename: FilenameConfig {
                pattern: r"^(?P<date>\d{4}-\d{2}-\d{2})_[^.]*\.(?i:csv)$".to_string(),
                date_format: "%Y-%m-%d".to_string(),
            },
            raw_format: RawFormat::default(),
            columns: IdentifierColumns::default(),
            calibration: CalibrationConfig::default(),
            strict: false,
        }
    }
}

impl PipelineConfig {
    /// Read a TOML config file; missing keys fall back to defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: PipelineConfig = toml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.calibration.min_standards < 2 {
            bail!(
                "calibration.min_standards must be at least 2, got {}",
                self.calibration.min_standards
            );
        }
        if let Some(r2) = self.calibration.min_r_squared {
            if !(0.0..=1.0).contains(&r2) {
                bail!("calibration.min_r_squared must lie in [0, 1], got {r2}");
            }
        }
        Ok(())
    }
}

/// A filename regex with named groups `date` (required) and `plate`, plus the
/// chrono format the `date` capture is parsed with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilenameConfig {
    pub pattern: String,
    pub date_format: String,
}

/// Layout of a raw-measurement CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFormat {
    /// First record holds column names (`,1,2,...,12`) and is skipped.
    pub has_header: bool,
    /// First field of every record is a row label (`A`..`H`) and is dropped.
    pub label_column: bool,
}

impl Default for RawFormat {
    fn default() -> Self {
        Self {
            has_header: true,
            label_column: true,
        }
    }
}

/// Names of the identifier-sheet columns the pipeline interprets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierColumns {
    pub position: String,
    /// Standard flag, 0/1 or true/false.
    pub standard: String,
    /// Known concentration, present only on standards.
    pub concentration: String,
    pub plate_id: String,
    /// Optional well label (`A1`..`H12`); checked against the position.
    pub well: String,
}

impl Default for IdentifierColumns {
    fn default() -> Self {
        Self {
            position: "position".to_string(),
            standard: "std".to_string(),
            concentration: "std_conc_NH4".to_string(),
            plate_id: "ammonium_id".to_string(),
            well: "well".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub min_standards: usize,
    /// Fits below this R² are kept but warned about.
    pub min_r_squared: Option<f64>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_standards: 2,
            min_r_squared: Some(0.98),
        }
    }
}
