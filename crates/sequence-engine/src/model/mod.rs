//! Domain model: identifiers, configuration, events and records.

mod event;
mod ids;
mod instrument;
mod limit;
mod records;
mod step;
mod units;

pub use event::{
    AtomStage, DatasetStage, EventKey, EventKind, EventPayload, ExecutionEvent, NewEvent,
    SequenceCommand, StepStage, Subject,
};
pub use ids::{AtomId, DatasetId, EventId, ObservationId, StepId, VisitId};
pub use instrument::{
    AmpGain, GratingConfig, Instrument, InstrumentConfig, ObservingMode, Readout,
};
pub use limit::FutureLimit;
pub use records::{AtomRecord, DatasetRecord, StepRecord, VisitRecord};
pub use step::{
    ArcLamp, BaselineType, Breakpoint, ClassCategory, ContinuumLamp, GcalConfig, GcalDiffuser,
    GcalFilter, GcalLamp, GcalShutter, GuideState, ObserveClass, QaState, SequenceType,
    SmartGcalType, StepConfig, TelescopeConfig,
};
pub use units::{Angle, Offset, TimeSpan, Wavelength};
