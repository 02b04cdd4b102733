//! Versioned calibration table.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::key::CalibrationKey;
use crate::document::{load_document, parse_document, DocumentFormat};
use crate::error::{EngineError, EngineResult};
use crate::model::{BaselineType, GcalConfig, SmartGcalType, TimeSpan, Wavelength};

/// Half-open wavelength range `[low, high)`; an absent `high` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WavelengthRange {
    pub low: Wavelength,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<Wavelength>,
}

impl WavelengthRange {
    pub fn new(low: Wavelength, high: Option<Wavelength>) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, w: Wavelength) -> bool {
        w >= self.low && self.high.map_or(true, |h| w < h)
    }

    pub fn is_empty(&self) -> bool {
        self.high.is_some_and(|h| h <= self.low)
    }

    pub fn overlaps(&self, other: &WavelengthRange) -> bool {
        let below = |r: &WavelengthRange, w: Wavelength| r.high.map_or(true, |h| w < h);
        below(self, other.low) && below(other, self.low)
    }
}

impl std::fmt::Display for WavelengthRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.high {
            Some(h) => write!(f, "[{}, {})", self.low, h),
            None => write!(f, "[{}, ∞)", self.low),
        }
    }
}

/// One calibration definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationRow {
    pub line_order: u32,
    pub key: CalibrationKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wavelength_range: Option<WavelengthRange>,
    pub gcal: GcalConfig,
    pub baseline: BaselineType,
    pub step_count: u32,
    pub exposure: TimeSpan,
}

impl CalibrationRow {
    /// Whether this row serves the requested calibration kind.
    pub fn serves(&self, kind: SmartGcalType) -> bool {
        match kind {
            SmartGcalType::Arc => self.gcal.lamp.is_arc(),
            SmartGcalType::Flat => !self.gcal.lamp.is_arc(),
            SmartGcalType::DayBaseline => self.baseline == BaselineType::Day,
            SmartGcalType::NightBaseline => self.baseline == BaselineType::Night,
        }
    }

    /// Same line, key, lamp kind and baseline: at most one such row may
    /// serve a given wavelength.
    pub(crate) fn competes_with(&self, other: &CalibrationRow) -> bool {
        self.line_order == other.line_order
            && self.key == other.key
            && self.gcal.lamp.is_arc() == other.gcal.lamp.is_arc()
            && self.baseline == other.baseline
    }

    fn range_overlaps(&self, other: &CalibrationRow) -> bool {
        match (&self.wavelength_range, &other.wavelength_range) {
            (Some(a), Some(b)) => a.overlaps(b),
            _ => true,
        }
    }
}

/// Calibration definitions for all instruments, with a version tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTable {
    version: String,
    rows: Vec<CalibrationRow>,
}

impl CalibrationTable {
    /// Build a table, rejecting inconsistent rows.
    pub fn new(version: impl Into<String>, rows: Vec<CalibrationRow>) -> EngineResult<Self> {
        let table = Self::unchecked(version, rows);
        table.validate()?;
        Ok(table)
    }

    /// Build a table without integrity checks.
    pub fn unchecked(version: impl Into<String>, rows: Vec<CalibrationRow>) -> Self {
        Self {
            version: version.into(),
            rows,
        }
    }

    pub fn empty() -> Self {
        Self::unchecked("empty", Vec::new())
    }

    pub fn parse(content: &str, format: DocumentFormat) -> EngineResult<Self> {
        let table: CalibrationTable = parse_document(content, format)?;
        table.validate()?;
        Ok(table)
    }

    pub fn load(path: &Path) -> EngineResult<Self> {
        let table: CalibrationTable = load_document(path)?;
        table.validate()?;
        info!(
            path = %path.display(),
            version = %table.version,
            rows = table.rows.len(),
            "Loaded calibration table"
        );
        Ok(table)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn rows(&self) -> &[CalibrationRow] {
        &self.rows
    }

    /// Check every row and every pair of competing rows.
    pub fn validate(&self) -> EngineResult<()> {
        for (idx, row) in self.rows.iter().enumerate() {
            if row.step_count == 0 {
                return Err(EngineError::DataIntegrity(format!(
                    "calibration row {} (line {}) has step_count 0",
                    idx, row.line_order
                )));
            }
            if let Some(range) = &row.wavelength_range {
                if range.is_empty() {
                    return Err(EngineError::DataIntegrity(format!(
                        "calibration row {} (line {}) has empty wavelength range {}",
                        idx, row.line_order, range
                    )));
                }
            }
        }

        for (i, a) in self.rows.iter().enumerate() {
            for (j, b) in self.rows.iter().enumerate().skip(i + 1) {
                if a.competes_with(b) && a.range_overlaps(b) {
                    return Err(EngineError::DataIntegrity(format!(
                        "calibration rows {} and {} overlap for {} line {}",
                        i,
                        j,
                        a.key.instrument(),
                        a.line_order
                    )));
                }
            }
        }

        Ok(())
    }
}
