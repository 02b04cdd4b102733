//! In-memory, append-only event store.
//!
//! Readers take an `Arc<ExecutionSnapshot>` and only contend with writers
//! for the pointer swap. Writers are serialized by a separate mutex, build
//! the next snapshot from a copy and publish it in one step, so a
//! multi-event append is all-or-nothing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::model::{
    AtomRecord, DatasetId, DatasetRecord, ExecutionEvent, NewEvent, ObservationId, QaState,
    StepRecord, VisitRecord,
};
use crate::store::ExecutionSnapshot;

/// Concurrency-safe holder of the execution log.
#[derive(Debug, Default)]
pub struct EventStore {
    current: RwLock<Arc<ExecutionSnapshot>>,
    writer: Mutex<()>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot after checking its references.
    pub fn from_snapshot(snapshot: ExecutionSnapshot) -> EngineResult<Self> {
        snapshot.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
        })
    }

    /// Consistent view of everything recorded so far.
    pub async fn snapshot(&self) -> Arc<ExecutionSnapshot> {
        self.current.read().await.clone()
    }

    /// Apply `f` to a copy of the current snapshot and publish it on success.
    async fn modify<T>(
        &self,
        f: impl FnOnce(&mut ExecutionSnapshot) -> EngineResult<T>,
    ) -> EngineResult<T> {
        // Readers only wait on the swap below.
        let _writer = self.writer.lock().await;
        let mut next = ExecutionSnapshot::clone(&*self.snapshot().await);
        let out = f(&mut next)?;
        *self.current.write().await = Arc::new(next);
        Ok(out)
    }

    /// Register a visit. Re-recording an identical visit is a no-op.
    pub async fn record_visit(&self, visit: VisitRecord) -> EngineResult<()> {
        self.modify(|s| {
            if let Some(existing) = s.visit(visit.id) {
                return same_or_conflict(existing == &visit, "visit", visit.id);
            }
            info!(visit_id = %visit.id, observation_id = %visit.observation_id, "Recording visit");
            s.visits.push(visit);
            Ok(())
        })
        .await
    }

    /// Register an atom. Recording an existing id again is a no-op as long
    /// as the visit and sequence type agree.
    pub async fn record_atom(&self, atom: AtomRecord) -> EngineResult<()> {
        self.modify(|s| {
            if let Some(existing) = s.atom(atom.id) {
                let same =
                    existing.visit_id == atom.visit_id && existing.sequence_type == atom.sequence_type;
                return same_or_conflict(same, "atom", atom.id);
            }
            if s.visit(atom.visit_id).is_none() {
                return Err(EngineError::NotFound(format!("visit {}", atom.visit_id)));
            }
            if !atom.steps.is_empty() {
                return Err(EngineError::Validation(format!(
                    "atom {} must be recorded without steps",
                    atom.id
                )));
            }
            debug!(atom_id = %atom.id, visit_id = %atom.visit_id, sequence_type = %atom.sequence_type, "Recording atom");
            s.atoms.push(atom);
            Ok(())
        })
        .await
    }

    /// Register a step and append it to its atom.
    pub async fn record_step(&self, step: StepRecord) -> EngineResult<()> {
        self.modify(|s| {
            if let Some(existing) = s.step(step.id) {
                return same_or_conflict(existing == &step, "step", step.id);
            }
            if step.step_config.is_smart_gcal() {
                return Err(EngineError::Validation(format!(
                    "step {} has an unresolved smart_gcal configuration",
                    step.id
                )));
            }
            let atom = s
                .atoms
                .iter_mut()
                .find(|a| a.id == step.atom_id)
                .ok_or_else(|| EngineError::NotFound(format!("atom {}", step.atom_id)))?;
            atom.steps.push(step.id);
            debug!(step_id = %step.id, atom_id = %step.atom_id, "Recording step");
            s.steps.push(step);
            Ok(())
        })
        .await
    }

    pub async fn record_dataset(&self, dataset: DatasetRecord) -> EngineResult<()> {
        self.modify(|s| {
            if let Some(existing) = s.dataset(dataset.id) {
                return same_or_conflict(existing == &dataset, "dataset", dataset.id);
            }
            if s.step(dataset.step_id).is_none() {
                return Err(EngineError::NotFound(format!("step {}", dataset.step_id)));
            }
            debug!(dataset_id = %dataset.id, filename = %dataset.filename, "Recording dataset");
            s.datasets.push(dataset);
            Ok(())
        })
        .await
    }

    /// Append one event.
    pub async fn append(&self, event: NewEvent) -> EngineResult<ExecutionEvent> {
        let mut appended = self.append_all(vec![event]).await?;
        appended
            .pop()
            .ok_or_else(|| EngineError::DataIntegrity("append produced no event".to_string()))
    }

    /// Append several events atomically: readers see all of them or none.
    pub async fn append_all(&self, events: Vec<NewEvent>) -> EngineResult<Vec<ExecutionEvent>> {
        self.modify(|s| {
            let mut appended = Vec::with_capacity(events.len());
            for new in events {
                let subject = new.payload.subject();
                if !s.contains(subject) {
                    return Err(EngineError::NotFound(subject.to_string()));
                }
                let latest = s
                    .events
                    .iter()
                    .filter(|e| e.subject() == subject)
                    .map(|e| e.received_at)
                    .max();
                if let Some(latest) = latest {
                    if new.received_at < latest {
                        return Err(EngineError::Validation(format!(
                            "{} event at {} precedes the latest event at {}",
                            subject, new.received_at, latest
                        )));
                    }
                }
                let event = ExecutionEvent {
                    id: s.next_event_id(),
                    payload: new.payload,
                    received_at: new.received_at,
                };
                debug!(
                    event_id = %event.id,
                    subject = %subject,
                    stage = %event.payload.stage_name(),
                    "Appending event"
                );
                s.events.push(event.clone());
                appended.push(event);
            }
            Ok(appended)
        })
        .await
    }

    /// Update a dataset's QA state out-of-band.
    pub async fn set_dataset_qa(&self, id: DatasetId, qa: Option<QaState>) -> EngineResult<()> {
        self.modify(|s| {
            let dataset = s
                .datasets
                .iter_mut()
                .find(|d| d.id == id)
                .ok_or_else(|| EngineError::NotFound(format!("dataset {}", id)))?;
            dataset.qa_state = qa;
            Ok(())
        })
        .await
    }

    /// Rewind acquisition for an observation: atoms started before `at`
    /// no longer count.
    pub async fn reset_acquisition(
        &self,
        observation_id: ObservationId,
        at: DateTime<Utc>,
    ) -> EngineResult<()> {
        self.modify(|s| {
            info!(observation_id = %observation_id, at = %at, "Resetting acquisition");
            s.acquisition_resets.insert(observation_id, at);
            Ok(())
        })
        .await
    }
}

fn same_or_conflict(same: bool, kind: &str, id: impl std::fmt::Display) -> EngineResult<()> {
    if same {
        Ok(())
    } else {
        Err(EngineError::Validation(format!(
            "{} {} already recorded with a different configuration",
            kind, id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AtomId, AtomStage, Breakpoint, DatasetStage, Instrument, InstrumentConfig, ObserveClass,
        SequenceType, SmartGcalType, StepConfig, StepId, StepStage, TelescopeConfig, TimeSpan,
        VisitId,
    };
    use chrono::{Duration, TimeZone};
    use std::collections::HashSet;

    fn t(s: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::seconds(s)
    }

    async fn store_with_atom() -> (EventStore, AtomId) {
        let store = EventStore::new();
        let visit = VisitRecord {
            id: VisitId::new(),
            observation_id: ObservationId::new(),
            instrument: Instrument::GmosSouth,
        };
        let atom = AtomRecord {
            id: AtomId::new(),
            visit_id: visit.id,
            sequence_type: SequenceType::Science,
            steps: vec![],
        };
        let atom_id = atom.id;
        store.record_visit(visit).await.unwrap();
        store.record_atom(atom).await.unwrap();
        (store, atom_id)
    }

    fn step(atom_id: AtomId, config: StepConfig) -> StepRecord {
        StepRecord {
            id: StepId::new(),
            atom_id,
            instrument_config: InstrumentConfig {
                instrument: Instrument::GmosSouth,
                exposure: TimeSpan::from_secs(30),
                readout: None,
                grating: None,
                filter: None,
                fpu: None,
            },
            step_config: config,
            telescope_config: TelescopeConfig::default(),
            observe_class: ObserveClass::Science,
            breakpoint: Breakpoint::Disabled,
        }
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_ids() {
        let (store, atom_id) = store_with_atom().await;
        let a = store
            .append(NewEvent::atom(atom_id, AtomStage::StartAtom, t(0)))
            .await
            .unwrap();
        let b = store
            .append(NewEvent::atom(atom_id, AtomStage::EndAtom, t(0)))
            .await
            .unwrap();
        assert!(a.id < b.id);
        assert_eq!(store.snapshot().await.events.len(), 2);
    }

    #[tokio::test]
    async fn test_append_rejects_unknown_subject() {
        let store = EventStore::new();
        let err = store
            .append(NewEvent::atom(AtomId::new(), AtomStage::StartAtom, t(0)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_append_rejects_time_going_backwards() {
        let (store, atom_id) = store_with_atom().await;
        store
            .append(NewEvent::atom(atom_id, AtomStage::StartAtom, t(10)))
            .await
            .unwrap();
        let err = store
            .append(NewEvent::atom(atom_id, AtomStage::EndAtom, t(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_batch_append_is_atomic() {
        let (store, atom_id) = store_with_atom().await;
        let result = store
            .append_all(vec![
                NewEvent::atom(atom_id, AtomStage::StartAtom, t(0)),
                NewEvent::step(StepId::new(), StepStage::StartStep, t(1)),
            ])
            .await;
        assert!(result.is_err());
        assert!(store.snapshot().await.events.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_is_isolated_from_later_writes() {
        let (store, atom_id) = store_with_atom().await;
        let before = store.snapshot().await;
        store
            .append(NewEvent::atom(atom_id, AtomStage::StartAtom, t(0)))
            .await
            .unwrap();
        assert!(before.events.is_empty());
        assert_eq!(store.snapshot().await.events.len(), 1);
    }

    #[tokio::test]
    async fn test_record_atom_is_idempotent() {
        let (store, atom_id) = store_with_atom().await;
        let snapshot = store.snapshot().await;
        let atom = snapshot.atom(atom_id).unwrap().clone();
        store.record_atom(atom.clone()).await.unwrap();
        assert_eq!(store.snapshot().await.atoms.len(), 1);

        let conflicting = AtomRecord {
            sequence_type: SequenceType::Acquisition,
            ..atom
        };
        assert!(store.record_atom(conflicting).await.is_err());
    }

    #[tokio::test]
    async fn test_record_step_links_atom_and_rejects_smart_gcal() {
        let (store, atom_id) = store_with_atom().await;
        let science = step(atom_id, StepConfig::Science);
        let step_id = science.id;
        store.record_step(science).await.unwrap();
        assert_eq!(store.snapshot().await.atom(atom_id).unwrap().steps, vec![step_id]);

        let smart = step(
            atom_id,
            StepConfig::SmartGcal {
                kind: SmartGcalType::Flat,
            },
        );
        assert!(matches!(
            store.record_step(smart).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_dataset_qa_update() {
        let (store, atom_id) = store_with_atom().await;
        let science = step(atom_id, StepConfig::Science);
        let step_id = science.id;
        store.record_step(science).await.unwrap();
        let dataset = DatasetRecord {
            id: DatasetId::new(),
            step_id,
            filename: "S20240301S0001.fits".to_string(),
            qa_state: None,
        };
        let dataset_id = dataset.id;
        store.record_dataset(dataset).await.unwrap();
        store
            .append(NewEvent::dataset(dataset_id, DatasetStage::StartExpose, t(0)))
            .await
            .unwrap();
        store
            .set_dataset_qa(dataset_id, Some(QaState::Fail))
            .await
            .unwrap();
        assert_eq!(
            store.snapshot().await.dataset(dataset_id).unwrap().qa_state,
            Some(QaState::Fail)
        );
        assert!(store.set_dataset_qa(DatasetId::new(), None).await.is_err());
    }

    #[tokio::test]
    async fn test_reset_acquisition_overwrites() {
        let store = EventStore::new();
        let obs = ObservationId::new();
        store.reset_acquisition(obs, t(0)).await.unwrap();
        store.reset_acquisition(obs, t(60)).await.unwrap();
        assert_eq!(store.snapshot().await.acquisition_reset(obs), Some(t(60)));
    }

    #[tokio::test]
    async fn test_pending_writer_does_not_block_readers() {
        let (store, atom_id) = store_with_atom().await;
        let _writer = store.writer.lock().await;
        let snapshot = tokio::time::timeout(std::time::Duration::from_secs(1), store.snapshot())
            .await
            .expect("snapshot should not wait for the writer");
        assert!(snapshot.atom(atom_id).is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_are_serialized() {
        let (store, atom_id) = store_with_atom().await;
        let store = Arc::new(store);
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .append(NewEvent::atom(atom_id, AtomStage::StartAtom, t(0)))
                    .await
            }));
        }
        let mut ids = HashSet::new();
        for handle in handles {
            let event = handle.await.unwrap().unwrap();
            assert!(ids.insert(event.id));
        }
        assert_eq!(store.snapshot().await.events.len(), 16);
    }
}
