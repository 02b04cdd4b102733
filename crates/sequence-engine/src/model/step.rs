//! Step, telescope and calibration-unit configuration.

use serde::{Deserialize, Serialize};

use super::units::Offset;

/// Arc lamps of the calibration unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcLamp {
    ArArc,
    CuArArc,
    ThArArc,
    XeArc,
}

/// Continuum (flat-field) lamps of the calibration unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuumLamp {
    IrGreyBodyLow,
    IrGreyBodyHigh,
    QuartzHalogen5,
    QuartzHalogen100,
}

/// Lamp selection: either a set of arcs or a single continuum lamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GcalLamp {
    Arcs(Vec<ArcLamp>),
    Continuum(ContinuumLamp),
}

impl GcalLamp {
    /// Arc selection normalized to sorted, de-duplicated order so that
    /// equal lamp sets compare equal.
    pub fn arcs(lamps: impl IntoIterator<Item = ArcLamp>) -> Self {
        let mut v: Vec<ArcLamp> = lamps.into_iter().collect();
        v.sort();
        v.dedup();
        GcalLamp::Arcs(v)
    }

    pub fn is_arc(&self) -> bool {
        matches!(self, GcalLamp::Arcs(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GcalFilter {
    None,
    Gmos,
    Hros,
    Nir,
    Nd10,
    Nd20,
    Nd30,
    Nd40,
    Nd50,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GcalDiffuser {
    Ir,
    Visible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GcalShutter {
    Open,
    Closed,
}

/// Calibration unit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GcalConfig {
    pub lamp: GcalLamp,
    pub filter: GcalFilter,
    pub diffuser: GcalDiffuser,
    pub shutter: GcalShutter,
}

/// Kind of calibration requested by a template step whose lamp settings are
/// left to the calibration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmartGcalType {
    Arc,
    Flat,
    DayBaseline,
    NightBaseline,
}

impl std::fmt::Display for SmartGcalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SmartGcalType::Arc => "arc",
            SmartGcalType::Flat => "flat",
            SmartGcalType::DayBaseline => "day_baseline",
            SmartGcalType::NightBaseline => "night_baseline",
        };
        write!(f, "{}", s)
    }
}

/// When a calibration row may be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineType {
    Day,
    Night,
}

/// What a step does.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepConfig {
    Bias,
    Dark,
    Science,
    Gcal(GcalConfig),
    /// Template-only placeholder, resolved to `Gcal` through the calibration table.
    SmartGcal { kind: SmartGcalType },
}

impl StepConfig {
    pub fn is_smart_gcal(&self) -> bool {
        matches!(self, StepConfig::SmartGcal { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuideState {
    #[default]
    Enabled,
    Disabled,
}

/// Telescope configuration of a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TelescopeConfig {
    pub offset: Offset,
    #[serde(default)]
    pub guiding: GuideState,
}

impl TelescopeConfig {
    pub fn at(offset: Offset) -> Self {
        Self {
            offset,
            guiding: GuideState::Enabled,
        }
    }
}

/// Observe class, used for time accounting and calibration bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObserveClass {
    Science,
    ProgramCal,
    PartnerCal,
    Acquisition,
    AcquisitionCal,
    DayCal,
}

/// Coarse grouping of observe classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassCategory {
    Science,
    Calibration,
    Acquisition,
}

impl ObserveClass {
    pub fn category(&self) -> ClassCategory {
        match self {
            ObserveClass::Science => ClassCategory::Science,
            ObserveClass::Acquisition | ObserveClass::AcquisitionCal => ClassCategory::Acquisition,
            ObserveClass::ProgramCal | ObserveClass::PartnerCal | ObserveClass::DayCal => {
                ClassCategory::Calibration
            }
        }
    }

    pub fn for_baseline(baseline: BaselineType) -> Self {
        match baseline {
            BaselineType::Day => ObserveClass::DayCal,
            BaselineType::Night => ObserveClass::PartnerCal,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Breakpoint {
    Enabled,
    #[default]
    Disabled,
}

/// Sequence an atom belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceType {
    Acquisition,
    Science,
}

impl std::fmt::Display for SequenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequenceType::Acquisition => write!(f, "acquisition"),
            SequenceType::Science => write!(f, "science"),
        }
    }
}

/// Dataset quality assessment, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QaState {
    Pass,
    Usable,
    Fail,
}
