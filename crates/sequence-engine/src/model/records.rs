//! Execution records: visits, atoms, steps and datasets.
//!
//! Records carry the immutable configuration of what was executed. Their
//! lifecycle lives in the event log.

use serde::{Deserialize, Serialize};

use super::ids::{AtomId, DatasetId, ObservationId, StepId, VisitId};
use super::instrument::{Instrument, InstrumentConfig};
use super::step::{Breakpoint, ObserveClass, QaState, SequenceType, StepConfig, TelescopeConfig};

/// A visit groups the atoms executed in one telescope session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub id: VisitId,
    pub observation_id: ObservationId,
    pub instrument: Instrument,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomRecord {
    pub id: AtomId,
    pub visit_id: VisitId,
    pub sequence_type: SequenceType,
    /// Steps in creation order.
    #[serde(default)]
    pub steps: Vec<StepId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub id: StepId,
    pub atom_id: AtomId,
    pub instrument_config: InstrumentConfig,
    pub step_config: StepConfig,
    #[serde(default)]
    pub telescope_config: TelescopeConfig,
    pub observe_class: ObserveClass,
    #[serde(default)]
    pub breakpoint: Breakpoint,
}

impl StepRecord {
    /// Configuration equality used when matching history against templates.
    pub fn same_config(
        &self,
        instrument: &InstrumentConfig,
        step: &StepConfig,
        telescope: &TelescopeConfig,
    ) -> bool {
        &self.instrument_config == instrument
            && &self.step_config == step
            && &self.telescope_config == telescope
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: DatasetId,
    pub step_id: StepId,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qa_state: Option<QaState>,
}
