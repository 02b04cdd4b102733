//! Immutable view of everything recorded for execution.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::load_document;
use crate::error::{EngineError, EngineResult};
use crate::model::{
    AtomId, AtomRecord, DatasetId, DatasetRecord, EventId, ExecutionEvent, ObservationId, StepId,
    StepRecord, Subject, VisitId, VisitRecord,
};

/// Records plus the event log. Every read operates on one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    /// Visits in creation order.
    #[serde(default)]
    pub visits: Vec<VisitRecord>,
    #[serde(default)]
    pub atoms: Vec<AtomRecord>,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
    #[serde(default)]
    pub datasets: Vec<DatasetRecord>,
    /// Events in append order.
    #[serde(default)]
    pub events: Vec<ExecutionEvent>,
    /// Latest acquisition reset per observation.
    #[serde(default)]
    pub acquisition_resets: BTreeMap<ObservationId, DateTime<Utc>>,
}

impl ExecutionSnapshot {
    /// Load and check a snapshot document (`.json`, `.yaml`, `.yml`).
    pub fn load(path: &Path) -> EngineResult<Self> {
        let snapshot: ExecutionSnapshot = load_document(path)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn visit(&self, id: VisitId) -> Option<&VisitRecord> {
        self.visits.iter().find(|v| v.id == id)
    }

    pub fn atom(&self, id: AtomId) -> Option<&AtomRecord> {
        self.atoms.iter().find(|a| a.id == id)
    }

    pub fn step(&self, id: StepId) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn dataset(&self, id: DatasetId) -> Option<&DatasetRecord> {
        self.datasets.iter().find(|d| d.id == id)
    }

    /// Visits of an observation in creation order.
    pub fn visits_for(&self, observation_id: ObservationId) -> impl Iterator<Item = &VisitRecord> {
        self.visits
            .iter()
            .filter(move |v| v.observation_id == observation_id)
    }

    /// Most recently created visit of an observation.
    pub fn latest_visit(&self, observation_id: ObservationId) -> Option<&VisitRecord> {
        self.visits_for(observation_id).last()
    }

    pub fn acquisition_reset(&self, observation_id: ObservationId) -> Option<DateTime<Utc>> {
        self.acquisition_resets.get(&observation_id).copied()
    }

    pub fn contains(&self, subject: Subject) -> bool {
        match subject {
            Subject::Visit(id) => self.visit(id).is_some(),
            Subject::Atom(id) => self.atom(id).is_some(),
            Subject::Step(id) => self.step(id).is_some(),
            Subject::Dataset(id) => self.dataset(id).is_some(),
        }
    }

    /// Next store-assigned event id.
    pub fn next_event_id(&self) -> EventId {
        EventId(self.events.iter().map(|e| e.id.0).max().unwrap_or(0) + 1)
    }

    /// Referential checks for documents loaded from outside the store.
    pub fn validate(&self) -> EngineResult<()> {
        let visits: HashSet<VisitId> = self.visits.iter().map(|v| v.id).collect();
        let mut atoms: HashMap<AtomId, &AtomRecord> = HashMap::new();
        for atom in &self.atoms {
            if !visits.contains(&atom.visit_id) {
                return Err(EngineError::DataIntegrity(format!(
                    "atom {} references unknown visit {}",
                    atom.id, atom.visit_id
                )));
            }
            atoms.insert(atom.id, atom);
        }

        let mut steps: HashSet<StepId> = HashSet::new();
        for step in &self.steps {
            let Some(atom) = atoms.get(&step.atom_id) else {
                return Err(EngineError::DataIntegrity(format!(
                    "step {} references unknown atom {}",
                    step.id, step.atom_id
                )));
            };
            if !atom.steps.contains(&step.id) {
                return Err(EngineError::DataIntegrity(format!(
                    "step {} is not listed by atom {}",
                    step.id, atom.id
                )));
            }
            if step.step_config.is_smart_gcal() {
                return Err(EngineError::DataIntegrity(format!(
                    "recorded step {} has an unresolved smart_gcal configuration",
                    step.id
                )));
            }
            steps.insert(step.id);
        }

        for dataset in &self.datasets {
            if !steps.contains(&dataset.step_id) {
                return Err(EngineError::DataIntegrity(format!(
                    "dataset {} references unknown step {}",
                    dataset.id, dataset.step_id
                )));
            }
        }

        let mut seen = HashSet::new();
        for event in &self.events {
            if !seen.insert(event.id) {
                return Err(EngineError::DataIntegrity(format!(
                    "duplicate event id {}",
                    event.id
                )));
            }
        }

        Ok(())
    }
}
