use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use regex::Regex;

use crate::config::FilenameConfig;
use crate::data::model::FileTag;
use crate::error::PlateError;

/// Compiled filename pattern. Replaces fixed character-range slicing: a name
/// that does not match is an error instead of a silently wrong date.
#[derive(Debug, Clone)]
pub struct FilenamePattern {
    regex: Regex,
    date_format: String,
}

impl FilenamePattern {
    pub fn compile(config: &FilenameConfig) -> Result<Self> {
        let regex = Regex::new(&config.pattern)
            .with_context(|| format!("compiling filename pattern {}", config.pattern))?;
        if !regex.capture_names().flatten().any(|n| n == "date") {
            bail!("filename pattern {} has no (?P<date>...) group", config.pattern);
        }
        Ok(Self {
            regex,
            date_format: config.date_format.clone(),
        })
    }

    pub fn has_plate_group(&self) -> bool {
        self.regex.capture_names().flatten().any(|n| n == "plate")
    }

    /// Extract date and (if captured) plate id from a bare filename.
    pub fn parse(&self, filename: &str) -> Result<FileTag, PlateError> {
        let caps = self
            .regex
            .captures(filename)
            .ok_or_else(|| PlateError::FilenameMismatch {
                filename: filename.to_string(),
                pattern: self.regex.as_str().to_string(),
            })?;

        // compile() guarantees the group exists; it can still be unmatched
        // inside an optional alternation.
        let raw_date = caps.name("date").map(|m| m.as_str()).unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date, &self.date_format).map_err(|_| {
            PlateError::BadDate {
                filename: filename.to_string(),
                raw: raw_date.to_string(),
                format: self.date_format.clone(),
            }
        })?;

        let plate_id = caps
            .name("plate")
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(FileTag { date, plate_id })
    }

    /// Like [`parse`](Self::parse) but the plate id is mandatory.
    pub fn parse_with_plate(&self, filename: &str) -> Result<(NaiveDate, String), PlateError> {
        let tag = self.parse(filename)?;
        let plate_id = tag.plate_id.ok_or_else(|| PlateError::MissingPlateId {
            filename: filename.to_string(),
        })?;
        Ok((tag.date, plate_id))
    }
}
