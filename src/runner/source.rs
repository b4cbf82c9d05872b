//! Measurement sources: where a firing's raw records come from.

use crate::error::{Result, SpeedgateError};
use crate::model::MeasurementRecord;
use crate::scheduler::Firing;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Yields the raw prober records of one firing.
pub trait MeasurementSource: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the records cannot be produced.
    fn collect(&self, firing: &Firing) -> Result<Vec<MeasurementRecord>>;
}

/// Serves previously captured records.
///
/// A record matches a firing when its `scenario_id` is absent or equal to
/// the firing's, and its `iteration` is absent or equal to the run number.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    records: Vec<MeasurementRecord>,
}

impl ReplaySource {
    #[must_use]
    pub const fn from_records(records: Vec<MeasurementRecord>) -> Self {
        Self { records }
    }

    /// Load a JSON array or a JSON Lines file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigNotFound` if the file is missing, or a parse error
    /// naming the offending line.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SpeedgateError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let mut reader = BufReader::new(File::open(path)?);
        let mut contents = String::new();
        reader.read_to_string(&mut contents)?;
        Self::parse(&contents)
    }

    /// Parse a JSON array (leading `[`) or JSON Lines.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unparsable line.
    pub fn parse(contents: &str) -> Result<Self> {
        if contents.trim_start().starts_with('[') {
            return Ok(Self::from_records(serde_json::from_str(contents)?));
        }

        let mut records = Vec::new();
        for (line_num, line) in contents.as_bytes().lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| {
                SpeedgateError::Config(format!(
                    "Invalid measurement at line {}: {e}",
                    line_num + 1
                ))
            })?;
            records.push(record);
        }
        Ok(Self::from_records(records))
    }

    #[must_use]
    pub fn records(&self) -> &[MeasurementRecord] {
        &self.records
    }

    /// Records for one scenario regardless of iteration.
    #[must_use]
    pub fn for_scenario(&self, scenario_id: &str) -> Vec<MeasurementRecord> {
        self.records
            .iter()
            .filter(|r| r.scenario_id.as_deref().is_none_or(|id| id == scenario_id))
            .cloned()
            .collect()
    }
}

impl MeasurementSource for ReplaySource {
    fn collect(&self, firing: &Firing) -> Result<Vec<MeasurementRecord>> {
        let records: Vec<MeasurementRecord> = self
            .records
            .iter()
            .filter(|r| {
                r.scenario_id
                    .as_deref()
                    .is_none_or(|id| id == firing.scenario_id())
                    && r.iteration.is_none_or(|it| it == firing.run_number)
            })
            .cloned()
            .collect();
        tracing::debug!(
            scenario_id = %firing.scenario_id(),
            run = firing.run_number,
            records = records.len(),
            "Replayed measurements"
        );
        Ok(records)
    }
}
