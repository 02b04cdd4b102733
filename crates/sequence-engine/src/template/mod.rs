//! Sequence templates and their sources.

mod source;
mod types;

pub use source::{StaticTemplateSource, TemplateSource};
pub use types::{
    AcquisitionTemplate, CalibrationTrigger, ObservationTemplates, PeriodicCalibration, ProtoAtom,
    ProtoStep, ScienceTemplate, TemplateSet,
};
