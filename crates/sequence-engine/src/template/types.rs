//! Sequence template documents.
//!
//! A template is the idealized sequence an observation would execute from
//! scratch: a finite acquisition prefix followed by a repeating
//! fine-adjustment atom, and a science cycle with periodic calibrations.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::document::{load_document, parse_document, DocumentFormat};
use crate::error::{EngineError, EngineResult};
use crate::model::{
    Breakpoint, InstrumentConfig, ObservationId, ObserveClass, ObservingMode, StepConfig,
    TelescopeConfig, TimeSpan,
};

/// Planned step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtoStep {
    pub instrument_config: InstrumentConfig,
    pub step_config: StepConfig,
    #[serde(default)]
    pub telescope_config: TelescopeConfig,
    pub observe_class: ObserveClass,
    #[serde(default)]
    pub breakpoint: Breakpoint,
}

/// Planned atom: steps meant to be executed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtoAtom {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub steps: Vec<ProtoStep>,
}

/// When a periodic calibration is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationTrigger {
    /// After this many science atoms since the last calibration.
    AfterAtoms(u32),
    /// After this much science exposure since the last calibration.
    AfterExposure(TimeSpan),
}

impl CalibrationTrigger {
    pub fn is_due(&self, atoms: u32, exposure: TimeSpan) -> bool {
        match *self {
            CalibrationTrigger::AfterAtoms(n) => atoms >= n,
            CalibrationTrigger::AfterExposure(t) => exposure >= t,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicCalibration {
    pub atom: ProtoAtom,
    pub trigger: CalibrationTrigger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionTemplate {
    #[serde(default)]
    pub prefix: Vec<ProtoAtom>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fine_adjustment: Option<ProtoAtom>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScienceTemplate {
    pub cycle: Vec<ProtoAtom>,
    /// Number of passes through the cycle; unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<u32>,
    #[serde(default)]
    pub calibrations: Vec<PeriodicCalibration>,
}

/// Templates for one observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationTemplates {
    pub observation_id: ObservationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ObservingMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquisition: Option<AcquisitionTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub science: Option<ScienceTemplate>,
}

impl ObservationTemplates {
    /// Observing mode, required for generation.
    pub fn require_mode(&self) -> EngineResult<ObservingMode> {
        self.mode.ok_or_else(|| {
            EngineError::Configuration(format!(
                "observation {} has no observing mode",
                self.observation_id
            ))
        })
    }

    /// Structural checks. Templates with no mode are accepted here and
    /// rejected when generation is requested.
    pub fn validate(&self) -> EngineResult<()> {
        let context = |what: &str| format!("observation {}: {}", self.observation_id, what);
        let instrument = self.mode.map(|m| m.instrument());
        let check_atom = |label: &str, atom: &ProtoAtom| -> EngineResult<()> {
            if atom.steps.is_empty() {
                return Err(EngineError::Configuration(context(&format!(
                    "{} atom has no steps",
                    label
                ))));
            }
            if let Some(instrument) = instrument {
                if let Some(step) = atom
                    .steps
                    .iter()
                    .find(|s| s.instrument_config.instrument != instrument)
                {
                    return Err(EngineError::Configuration(context(&format!(
                        "{} atom uses {} but the observing mode is for {}",
                        label, step.instrument_config.instrument, instrument
                    ))));
                }
            }
            Ok(())
        };

        if let Some(acq) = &self.acquisition {
            if acq.prefix.is_empty() && acq.fine_adjustment.is_none() {
                return Err(EngineError::Configuration(context(
                    "acquisition template is empty",
                )));
            }
            for atom in &acq.prefix {
                check_atom("acquisition", atom)?;
            }
            if let Some(atom) = &acq.fine_adjustment {
                check_atom("fine adjustment", atom)?;
            }
        }

        if let Some(sci) = &self.science {
            if sci.cycle.is_empty() {
                return Err(EngineError::Configuration(context("science cycle is empty")));
            }
            if sci.repeat == Some(0) {
                return Err(EngineError::Configuration(context(
                    "science repeat must be at least 1",
                )));
            }
            for atom in &sci.cycle {
                check_atom("science", atom)?;
            }
            for cal in &sci.calibrations {
                check_atom("calibration", &cal.atom)?;
                let zero = match cal.trigger {
                    CalibrationTrigger::AfterAtoms(n) => n == 0,
                    CalibrationTrigger::AfterExposure(t) => t.is_zero(),
                };
                if zero {
                    return Err(EngineError::Configuration(context(
                        "calibration trigger must be positive",
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Document holding the templates of many observations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSet {
    #[serde(default)]
    pub templates: Vec<ObservationTemplates>,
}

impl TemplateSet {
    pub fn parse(content: &str, format: DocumentFormat) -> EngineResult<Self> {
        let set: TemplateSet = parse_document(content, format)?;
        set.validate()?;
        Ok(set)
    }

    pub fn load(path: &Path) -> EngineResult<Self> {
        let set: TemplateSet = load_document(path)?;
        set.validate()?;
        Ok(set)
    }

    pub fn validate(&self) -> EngineResult<()> {
        let mut seen = HashSet::new();
        for t in &self.templates {
            if !seen.insert(t.observation_id) {
                return Err(EngineError::Configuration(format!(
                    "duplicate templates for observation {}",
                    t.observation_id
                )));
            }
            t.validate()?;
        }
        Ok(())
    }
}
