use anyhow::{Context, Result, bail};
use log::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::data::filename::FilenamePattern;
use crate::data::filter::{cross_match, rows_for_plate};
use crate::data::loader::{load_identifier_directory, load_raw_directory};
use crate::data::model::{IdentifierTable, RawPlate};
use crate::error::PlateFailure;
use crate::pipeline::calibrate::fit_calibration;
use crate::pipeline::flatten::{FlatTable, flatten_batch};
use crate::pipeline::join::join_by_date;
use crate::pipeline::predict::predict;
use crate::pipeline::reshape::flatten_grid;
use crate::state::{Batch, PlateRecord};

// ---------------------------------------------------------------------------
// Pipeline driver
// ---------------------------------------------------------------------------

/// What one run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub batch: Batch,
    pub table: FlatTable,
}

/// Runs the stages in order; each one is fully materialised before the next.
pub struct PlateApp<'c> {
    config: &'c PipelineConfig,
    raw_pattern: FilenamePattern,
    id_pattern: FilenamePattern,
}

impl<'c> PlateApp<'c> {
    pub fn new(config: &'c PipelineConfig) -> Result<Self> {
        config.validate()?;
        let raw_pattern = FilenamePattern::compile(&config.raw_filename)
            .context("raw filename pattern")?;
        if !raw_pattern.has_plate_group() {
            bail!(
                "raw filename pattern {} needs a (?P<plate>...) group",
                config.raw_filename.pattern
            );
        }
        let id_pattern = FilenamePattern::compile(&config.id_filename)
            .context("identifier filename pattern")?;
        Ok(Self {
            config,
            raw_pattern,
            id_pattern,
        })
    }

    /// Load both directories and process them.
    pub fn run(&self) -> Result<RunReport> {
        let raw = load_raw_directory(
            &self.config.raw_dir,
            &self.raw_pattern,
            &self.config.raw_format,
        )?;
        let tables = load_identifier_directory(
            &self.config.id_dir,
            &self.id_pattern,
            &self.config.columns,
        )?;
        self.process(&raw, &tables)
    }

    /// Everything after loading: join, reshape, cross-match, calibrate,
    /// predict, flatten.
    pub fn process(&self, raw: &[RawPlate], tables: &[IdentifierTable]) -> Result<RunReport> {
        let mut batch = Batch::default();

        let joined = join_by_date(raw, tables);
        batch.failures.extend(joined.failures);
        batch.warnings.extend(
            joined
                .unused_tables
                .iter()
                .map(|name| format!("identifier table {name} matches no raw plate")),
        );

        for (plate, table) in joined.matched {
            match self.build_record(plate, table) {
                Ok(record) => batch.insert(record),
                Err(failure) => {
                    warn!("{failure}");
                    batch.failures.push(failure);
                }
            }
        }

        for record in batch.plates.values() {
            if !record.unmatched_positions.is_empty() {
                let msg = format!(
                    "{}: {} wells have no identifier row",
                    record.key,
                    record.unmatched_positions.len()
                );
                warn!("{msg}");
                batch.warnings.push(msg);
            }
            match &record.calibration {
                Ok(model) => {
                    debug!(
                        "{}: {} identifier rows, slope {:.4}, intercept {:.4}, n={}",
                        record.key,
                        record.identifiers.len(),
                        model.slope,
                        model.intercept,
                        model.n_standards
                    );
                    let min_r_squared = self.config.calibration.min_r_squared;
                    if let (Some(r2), Some(min)) = (model.r_squared, min_r_squared) {
                        if r2 < min {
                            let msg =
                                format!("{}: calibration R² {r2:.4} below {min}", record.key);
                            warn!("{msg}");
                            batch.warnings.push(msg);
                        }
                    }
                }
                Err(e) => warn!("{}: calibration failed: {e}", record.key),
            }
        }

        if self.config.strict && batch.problem_count() > 0 {
            let mut lines: Vec<String> = batch.failures.iter().map(|f| f.to_string()).collect();
            lines.extend(
                batch
                    .calibration_failures()
                    .map(|(k, e)| format!("{k}: calibration failed: {e}")),
            );
            bail!(
                "strict mode: {} plate problem(s):\n  {}",
                lines.len(),
                lines.join("\n  ")
            );
        }

        let table = flatten_batch(&batch, &self.config.columns);
        info!(
            "{} plates processed ({} calibrated), {} dropped, {} output rows",
            batch.len(),
            batch.plates.values().filter(|p| p.is_calibrated()).count(),
            batch.failures.len(),
            table.len()
        );
        Ok(RunReport { batch, table })
    }

    fn build_record(
        &self,
        plate: &RawPlate,
        table: &IdentifierTable,
    ) -> Result<PlateRecord, PlateFailure> {
        let readings = flatten_grid(&plate.grid);

        let identifiers = rows_for_plate(table, &plate.key.plate_id);
        if identifiers.is_empty() {
            return Err(PlateFailure::NoIdentifierRows {
                key: plate.key.clone(),
                filename: plate.filename.clone(),
            });
        }

        let matched = cross_match(&readings, identifiers.clone(), &self.config.columns.well)
            .map_err(|source| PlateFailure::CrossMatch {
                key: plate.key.clone(),
                filename: plate.filename.clone(),
                source,
            })?;

        let mut rows = matched.rows;
        let calibration = fit_calibration(&rows, &self.config.calibration);
        predict(&mut rows, &calibration);

        Ok(PlateRecord {
            key: plate.key.clone(),
            filename: plate.filename.clone(),
            identifier_file: table.filename.clone(),
            grid: plate.grid.clone(),
            identifiers,
            rows,
            unmatched_positions: matched.unmatched,
            calibration,
        })
    }
}
