//! Calibration lookup.
//!
//! Matching is the same for every instrument: exact discrete key, then
//! wavelength range, then grouping by line order. Each group expands into
//! `step_count` identical steps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::key::CalibrationKey;
use super::table::{CalibrationRow, CalibrationTable};
use crate::model::{BaselineType, GcalConfig, SmartGcalType, TimeSpan, Wavelength};

/// One resolved calibration step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationStep {
    pub line_order: u32,
    pub gcal: GcalConfig,
    pub baseline: BaselineType,
    pub exposure: TimeSpan,
}

/// No table row matched; carries the full query for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedCalibration {
    pub key: CalibrationKey,
    pub wavelength: Option<Wavelength>,
    pub kind: Option<SmartGcalType>,
}

impl std::fmt::Display for UnmatchedCalibration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let key = &self.key;
        write!(f, "no calibration definition for {}", key.instrument())?;
        if let Some(kind) = self.kind {
            write!(f, " {}", kind)?;
        }
        write!(
            f,
            ": grating={}, filter={}, fpu={}",
            key.grating().as_deref().unwrap_or("none"),
            key.filter().unwrap_or("none"),
            key.fpu().unwrap_or("none"),
        )?;
        match key.binning() {
            Some((x, y)) => write!(f, ", binning={}x{}", x, y)?,
            None => write!(f, ", binning=none")?,
        }
        match key.amp_gain() {
            Some(gain) => write!(f, ", gain={}", gain)?,
            None => write!(f, ", gain=none")?,
        }
        match self.wavelength {
            Some(w) => write!(f, ", wavelength={}", w),
            None => write!(f, ", wavelength=none"),
        }
    }
}

impl std::error::Error for UnmatchedCalibration {}

impl CalibrationTable {
    /// All calibration steps defined for `key` at `wavelength`, in line order.
    pub fn resolve(
        &self,
        key: &CalibrationKey,
        wavelength: Option<Wavelength>,
    ) -> Result<Vec<CalibrationStep>, UnmatchedCalibration> {
        self.select(key, wavelength, None)
    }

    /// Like [`resolve`](Self::resolve), restricted to one calibration kind.
    pub fn resolve_kind(
        &self,
        key: &CalibrationKey,
        wavelength: Option<Wavelength>,
        kind: SmartGcalType,
    ) -> Result<Vec<CalibrationStep>, UnmatchedCalibration> {
        self.select(key, wavelength, Some(kind))
    }

    fn select(
        &self,
        key: &CalibrationKey,
        wavelength: Option<Wavelength>,
        kind: Option<SmartGcalType>,
    ) -> Result<Vec<CalibrationStep>, UnmatchedCalibration> {
        let mut lines: BTreeMap<u32, Vec<&CalibrationRow>> = BTreeMap::new();
        for row in self.rows() {
            if &row.key != key {
                continue;
            }
            if kind.is_some_and(|k| !row.serves(k)) {
                continue;
            }
            let in_range = match (&row.wavelength_range, wavelength) {
                (None, _) => true,
                (Some(range), Some(w)) => range.contains(w),
                (Some(_), None) => false,
            };
            if in_range {
                lines.entry(row.line_order).or_default().push(row);
            }
        }

        if lines.is_empty() {
            debug!(instrument = %key.instrument(), ?wavelength, ?kind, "No calibration row matched");
            return Err(UnmatchedCalibration {
                key: key.clone(),
                wavelength,
                kind,
            });
        }

        let mut steps = Vec::new();
        for (line_order, rows) in lines {
            // One row per lamp kind and baseline; a line may mix them.
            let mut chosen: Vec<&CalibrationRow> = Vec::with_capacity(rows.len());
            for row in rows {
                if chosen.iter().any(|c| c.competes_with(row)) {
                    warn!(
                        version = %self.version(),
                        line_order,
                        "Several calibration rows match one line and lamp, using the first"
                    );
                    continue;
                }
                chosen.push(row);
            }
            for row in chosen {
                for _ in 0..row.step_count {
                    steps.push(CalibrationStep {
                        line_order,
                        gcal: row.gcal.clone(),
                        baseline: row.baseline,
                        exposure: row.exposure,
                    });
                }
            }
        }
        Ok(steps)
    }
}
