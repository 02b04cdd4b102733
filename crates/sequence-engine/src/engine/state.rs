//! Execution state resolution.
//!
//! State is never stored. It is derived from one ordered scan of the event
//! log: each event extends the span of its subject and of every ancestor
//! (dataset, step, atom, visit). A subject with a terminal event is
//! completed; an open subject is ongoing only while it is the most
//! recently started child of an ongoing parent, and abandoned otherwise.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{
    AtomId, AtomRecord, DatasetId, DatasetRecord, EventKey, ExecutionEvent, ObservationId,
    QaState, StepId, StepRecord, Subject, VisitId, VisitRecord,
};
use crate::store::ExecutionSnapshot;

/// Lifecycle state of a visit, atom, step or dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// No events yet.
    NotStarted,
    /// Started, not terminated, not superseded.
    Ongoing,
    /// Terminal event seen.
    Completed,
    /// Started, never terminated, superseded by a newer sibling.
    Abandoned,
}

impl ExecutionState {
    /// Completed or abandoned: the subject will see no further progress.
    pub fn is_closed(&self) -> bool {
        matches!(self, ExecutionState::Completed | ExecutionState::Abandoned)
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Ongoing => write!(f, "ongoing"),
            Self::Completed => write!(f, "completed"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Event extent of one subject, descendants included.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Span {
    pub first: EventKey,
    pub last: EventKey,
    pub terminal: bool,
}

/// Read-only index over a snapshot answering state queries.
pub struct ExecutionIndex<'a> {
    snapshot: &'a ExecutionSnapshot,
    visits: HashMap<VisitId, &'a VisitRecord>,
    atoms: HashMap<AtomId, &'a AtomRecord>,
    steps: HashMap<StepId, &'a StepRecord>,
    datasets: HashMap<DatasetId, &'a DatasetRecord>,
    datasets_by_step: HashMap<StepId, Vec<&'a DatasetRecord>>,
    spans: HashMap<Subject, Span>,
    latest_child: HashMap<Subject, (EventKey, Subject)>,
    latest_visit: HashMap<ObservationId, VisitId>,
}

impl<'a> ExecutionIndex<'a> {
    /// Index a snapshot. Events about unknown subjects are skipped.
    pub fn build(snapshot: &'a ExecutionSnapshot) -> Self {
        let start = Instant::now();

        let mut index = ExecutionIndex {
            snapshot,
            visits: snapshot.visits.iter().map(|v| (v.id, v)).collect(),
            atoms: snapshot.atoms.iter().map(|a| (a.id, a)).collect(),
            steps: snapshot.steps.iter().map(|s| (s.id, s)).collect(),
            datasets: snapshot.datasets.iter().map(|d| (d.id, d)).collect(),
            datasets_by_step: HashMap::new(),
            spans: HashMap::new(),
            latest_child: HashMap::new(),
            latest_visit: HashMap::new(),
        };
        for dataset in &snapshot.datasets {
            index
                .datasets_by_step
                .entry(dataset.step_id)
                .or_default()
                .push(dataset);
        }
        for visit in &snapshot.visits {
            index.latest_visit.insert(visit.observation_id, visit.id);
        }

        let mut events: Vec<&ExecutionEvent> = snapshot.events.iter().collect();
        events.sort_by_key(|e| e.order_key());

        let mut skipped = 0usize;
        for event in events {
            let subject = event.subject();
            if !index.knows(subject) {
                warn!(event_id = %event.id, subject = %subject, "Ignoring event for unknown subject");
                skipped += 1;
                continue;
            }
            let key = event.order_key();
            let terminal = event.payload.is_terminal();
            let mut current = Some(subject);
            while let Some(s) = current {
                let span = index.spans.entry(s).or_insert(Span {
                    first: key,
                    last: key,
                    terminal: false,
                });
                span.last = key;
                if s == subject && terminal {
                    span.terminal = true;
                }
                current = index.parent(s);
            }
        }

        let started: Vec<(Subject, EventKey)> =
            index.spans.iter().map(|(s, span)| (*s, span.first)).collect();
        for (subject, first) in started {
            if let Some(parent) = index.parent(subject) {
                let entry = index.latest_child.entry(parent).or_insert((first, subject));
                if first > entry.0 {
                    *entry = (first, subject);
                }
            }
        }

        let duration = start.elapsed();
        tracing::debug!(
            target: "sequence_engine.performance",
            phase = "state_index",
            event_count = snapshot.events.len(),
            skipped,
            subject_count = index.spans.len(),
            duration_us = duration.as_micros() as u64,
            "Execution state indexed"
        );

        index
    }

    pub fn snapshot(&self) -> &'a ExecutionSnapshot {
        self.snapshot
    }

    fn knows(&self, subject: Subject) -> bool {
        match subject {
            Subject::Visit(id) => self.visits.contains_key(&id),
            Subject::Atom(id) => self.atoms.contains_key(&id),
            Subject::Step(id) => self.steps.contains_key(&id),
            Subject::Dataset(id) => self.datasets.contains_key(&id),
        }
    }

    /// Enclosing subject; visits have none.
    pub fn parent(&self, subject: Subject) -> Option<Subject> {
        match subject {
            Subject::Visit(_) => None,
            Subject::Atom(id) => self.atoms.get(&id).map(|a| Subject::Visit(a.visit_id)),
            Subject::Step(id) => self.steps.get(&id).map(|s| Subject::Atom(s.atom_id)),
            Subject::Dataset(id) => self.datasets.get(&id).map(|d| Subject::Step(d.step_id)),
        }
    }

    pub(crate) fn span(&self, subject: Subject) -> Option<&Span> {
        self.spans.get(&subject)
    }

    /// Start key, if started.
    pub fn started_at(&self, subject: Subject) -> Option<EventKey> {
        self.spans.get(&subject).map(|s| s.first)
    }

    /// Derive the lifecycle state of a subject.
    pub fn state_of(&self, subject: Subject) -> ExecutionState {
        let Some(span) = self.spans.get(&subject) else {
            return ExecutionState::NotStarted;
        };
        if span.terminal {
            return ExecutionState::Completed;
        }

        // Visits have no terminal stage; only the newest visit of an
        // observation is open.
        if let Subject::Visit(id) = subject {
            let latest = self
                .visits
                .get(&id)
                .and_then(|v| self.latest_visit.get(&v.observation_id));
            return if latest == Some(&id) {
                ExecutionState::Ongoing
            } else {
                ExecutionState::Completed
            };
        }

        let Some(parent) = self.parent(subject) else {
            return ExecutionState::Abandoned;
        };
        let newest = self.latest_child.get(&parent).map(|(_, s)| *s) == Some(subject);
        if newest && self.state_of(parent) == ExecutionState::Ongoing {
            ExecutionState::Ongoing
        } else {
            ExecutionState::Abandoned
        }
    }

    /// Worst QA state among the step's datasets.
    pub fn step_qa(&self, step_id: StepId) -> Option<QaState> {
        self.datasets_by_step
            .get(&step_id)?
            .iter()
            .filter_map(|d| d.qa_state)
            .max()
    }

    /// Completed and no dataset failed QA.
    pub fn is_successful(&self, step_id: StepId) -> bool {
        self.state_of(Subject::Step(step_id)) == ExecutionState::Completed
            && self.step_qa(step_id) != Some(QaState::Fail)
    }

    pub fn visit(&self, id: VisitId) -> Option<&'a VisitRecord> {
        self.visits.get(&id).copied()
    }

    pub fn atom(&self, id: AtomId) -> Option<&'a AtomRecord> {
        self.atoms.get(&id).copied()
    }

    pub fn step(&self, id: StepId) -> Option<&'a StepRecord> {
        self.steps.get(&id).copied()
    }

    pub fn datasets_of(&self, step_id: StepId) -> &[&'a DatasetRecord] {
        self.datasets_by_step
            .get(&step_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Started atoms of a visit in start order.
    pub fn atoms_by_start(&self, visit_id: VisitId) -> Vec<&'a AtomRecord> {
        let mut atoms: Vec<(EventKey, &'a AtomRecord)> = self
            .snapshot
            .atoms
            .iter()
            .filter(|a| a.visit_id == visit_id)
            .filter_map(|a| self.started_at(Subject::Atom(a.id)).map(|k| (k, a)))
            .collect();
        atoms.sort_by_key(|(k, _)| *k);
        atoms.into_iter().map(|(_, a)| a).collect()
    }

    /// Started steps of an atom in start order.
    pub fn steps_by_start(&self, atom: &AtomRecord) -> Vec<&'a StepRecord> {
        let mut steps: Vec<(EventKey, &'a StepRecord)> = atom
            .steps
            .iter()
            .filter_map(|id| self.steps.get(id).copied())
            .filter_map(|s| self.started_at(Subject::Step(s.id)).map(|k| (k, s)))
            .collect();
        steps.sort_by_key(|(k, _)| *k);
        steps.into_iter().map(|(_, s)| s).collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{
        AtomStage, Breakpoint, DatasetStage, EventId, Instrument, InstrumentConfig, NewEvent,
        ObserveClass, SequenceType, StepConfig, StepStage, TelescopeConfig, TimeSpan,
    };
    use chrono::{DateTime, Duration, TimeZone, Utc};

    pub(crate) fn t(s: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 22, 0, 0).unwrap() + Duration::seconds(s)
    }

    /// Hand-built snapshot for resolver tests; events bypass store checks.
    #[derive(Default)]
    pub(crate) struct Log {
        pub snapshot: ExecutionSnapshot,
    }

    impl Log {
        pub fn visit(&mut self, observation_id: ObservationId) -> VisitId {
            let id = VisitId::new();
            self.snapshot.visits.push(VisitRecord {
                id,
                observation_id,
                instrument: Instrument::GmosNorth,
            });
            id
        }

        pub fn atom(&mut self, visit_id: VisitId) -> AtomId {
            let id = AtomId::new();
            self.snapshot.atoms.push(AtomRecord {
                id,
                visit_id,
                sequence_type: SequenceType::Science,
                steps: vec![],
            });
            id
        }

        pub fn step(&mut self, atom_id: AtomId) -> StepId {
            let id = StepId::new();
            if let Some(atom) = self.snapshot.atoms.iter_mut().find(|a| a.id == atom_id) {
                atom.steps.push(id);
            }
            self.snapshot.steps.push(StepRecord {
                id,
                atom_id,
                instrument_config: InstrumentConfig {
                    instrument: Instrument::GmosNorth,
                    exposure: TimeSpan::from_secs(60),
                    readout: None,
                    grating: None,
                    filter: None,
                    fpu: None,
                },
                step_config: StepConfig::Science,
                telescope_config: TelescopeConfig::default(),
                observe_class: ObserveClass::Science,
                breakpoint: Breakpoint::Disabled,
            });
            id
        }

        pub fn dataset(&mut self, step_id: StepId, qa: Option<QaState>) -> DatasetId {
            let id = DatasetId::new();
            self.snapshot.datasets.push(DatasetRecord {
                id,
                step_id,
                filename: format!("N20240501S{:04}.fits", self.snapshot.datasets.len() + 1),
                qa_state: qa,
            });
            id
        }

        pub fn push(&mut self, event: NewEvent) {
            let id = self.snapshot.next_event_id();
            self.snapshot.events.push(ExecutionEvent {
                id,
                payload: event.payload,
                received_at: event.received_at,
            });
        }

        pub fn push_with_id(&mut self, id: i64, event: NewEvent) {
            self.snapshot.events.push(ExecutionEvent {
                id: EventId(id),
                payload: event.payload,
                received_at: event.received_at,
            });
        }
    }

    #[test]
    fn test_not_started_without_events() {
        let mut log = Log::default();
        let v = log.visit(ObservationId::new());
        let a = log.atom(v);
        let index = ExecutionIndex::build(&log.snapshot);
        assert_eq!(index.state_of(Subject::Atom(a)), ExecutionState::NotStarted);
    }

    #[test]
    fn test_newer_atom_abandons_open_atom_and_its_step() {
        let mut log = Log::default();
        let v = log.visit(ObservationId::new());
        let a = log.atom(v);
        let a_step = log.step(a);
        let b = log.atom(v);
        log.push(NewEvent::atom(a, AtomStage::StartAtom, t(0)));
        log.push(NewEvent::step(a_step, StepStage::StartStep, t(1)));
        log.push(NewEvent::atom(b, AtomStage::StartAtom, t(10)));

        let index = ExecutionIndex::build(&log.snapshot);
        assert_eq!(index.state_of(Subject::Atom(a)), ExecutionState::Abandoned);
        assert_eq!(index.state_of(Subject::Step(a_step)), ExecutionState::Abandoned);
        assert_eq!(index.state_of(Subject::Atom(b)), ExecutionState::Ongoing);
    }

    #[test]
    fn test_terminal_event_completes_regardless_of_later_siblings() {
        let mut log = Log::default();
        let v = log.visit(ObservationId::new());
        let a = log.atom(v);
        let b = log.atom(v);
        log.push(NewEvent::atom(a, AtomStage::StartAtom, t(0)));
        log.push(NewEvent::atom(a, AtomStage::EndAtom, t(5)));
        log.push(NewEvent::atom(b, AtomStage::StartAtom, t(10)));
        log.push(NewEvent::atom(b, AtomStage::EndAtom, t(20)));

        let index = ExecutionIndex::build(&log.snapshot);
        assert_eq!(index.state_of(Subject::Atom(a)), ExecutionState::Completed);
        assert_eq!(index.state_of(Subject::Atom(b)), ExecutionState::Completed);
    }

    #[test]
    fn test_one_ongoing_step_per_atom() {
        let mut log = Log::default();
        let v = log.visit(ObservationId::new());
        let a = log.atom(v);
        let s1 = log.step(a);
        let s2 = log.step(a);
        let s3 = log.step(a);
        log.push(NewEvent::atom(a, AtomStage::StartAtom, t(0)));
        log.push(NewEvent::step(s1, StepStage::StartStep, t(1)));
        log.push(NewEvent::step(s1, StepStage::EndStep, t(2)));
        log.push(NewEvent::step(s2, StepStage::StartStep, t(3)));
        log.push(NewEvent::step(s3, StepStage::StartStep, t(4)));

        let index = ExecutionIndex::build(&log.snapshot);
        assert_eq!(index.state_of(Subject::Step(s1)), ExecutionState::Completed);
        assert_eq!(index.state_of(Subject::Step(s2)), ExecutionState::Abandoned);
        assert_eq!(index.state_of(Subject::Step(s3)), ExecutionState::Ongoing);
    }

    #[test]
    fn test_identical_timestamps_resolved_by_event_id() {
        let mut log = Log::default();
        let v = log.visit(ObservationId::new());
        let a = log.atom(v);
        let b = log.atom(v);
        // Appended out of id order; ordering must follow ids.
        log.push_with_id(2, NewEvent::atom(a, AtomStage::StartAtom, t(0)));
        log.push_with_id(1, NewEvent::atom(b, AtomStage::StartAtom, t(0)));

        let index = ExecutionIndex::build(&log.snapshot);
        assert_eq!(index.state_of(Subject::Atom(a)), ExecutionState::Ongoing);
        assert_eq!(index.state_of(Subject::Atom(b)), ExecutionState::Abandoned);
    }

    #[test]
    fn test_dataset_events_start_their_step() {
        let mut log = Log::default();
        let v = log.visit(ObservationId::new());
        let a = log.atom(v);
        let s = log.step(a);
        let d = log.dataset(s, None);
        log.push(NewEvent::dataset(d, DatasetStage::StartExpose, t(0)));

        let index = ExecutionIndex::build(&log.snapshot);
        assert_eq!(index.state_of(Subject::Step(s)), ExecutionState::Ongoing);
        assert_eq!(index.state_of(Subject::Dataset(d)), ExecutionState::Ongoing);
        assert_eq!(index.state_of(Subject::Visit(v)), ExecutionState::Ongoing);
    }

    #[test]
    fn test_new_visit_closes_previous_one() {
        let obs = ObservationId::new();
        let mut log = Log::default();
        let v1 = log.visit(obs);
        let a = log.atom(v1);
        log.push(NewEvent::atom(a, AtomStage::StartAtom, t(0)));
        let v2 = log.visit(obs);
        let b = log.atom(v2);
        log.push(NewEvent::atom(b, AtomStage::StartAtom, t(100)));

        let index = ExecutionIndex::build(&log.snapshot);
        assert_eq!(index.state_of(Subject::Visit(v1)), ExecutionState::Completed);
        assert_eq!(index.state_of(Subject::Atom(a)), ExecutionState::Abandoned);
        assert_eq!(index.state_of(Subject::Atom(b)), ExecutionState::Ongoing);
    }

    #[test]
    fn test_failed_qa_is_not_successful() {
        let mut log = Log::default();
        let v = log.visit(ObservationId::new());
        let a = log.atom(v);
        let s = log.step(a);
        log.dataset(s, Some(QaState::Pass));
        log.dataset(s, Some(QaState::Fail));
        log.push(NewEvent::step(s, StepStage::StartStep, t(0)));
        log.push(NewEvent::step(s, StepStage::EndStep, t(30)));

        let index = ExecutionIndex::build(&log.snapshot);
        assert_eq!(index.state_of(Subject::Step(s)), ExecutionState::Completed);
        assert_eq!(index.step_qa(s), Some(QaState::Fail));
        assert!(!index.is_successful(s));
    }

    #[test]
    fn test_unknown_subject_events_are_ignored() {
        let mut log = Log::default();
        let v = log.visit(ObservationId::new());
        let a = log.atom(v);
        log.push(NewEvent::atom(AtomId::new(), AtomStage::StartAtom, t(0)));
        let index = ExecutionIndex::build(&log.snapshot);
        assert_eq!(index.state_of(Subject::Atom(a)), ExecutionState::NotStarted);
    }

    #[test]
    fn test_steps_by_start_follow_events_not_creation() {
        let mut log = Log::default();
        let v = log.visit(ObservationId::new());
        let a = log.atom(v);
        let s1 = log.step(a);
        let s2 = log.step(a);
        let _never = log.step(a);
        log.push(NewEvent::step(s2, StepStage::StartStep, t(0)));
        log.push(NewEvent::step(s1, StepStage::StartStep, t(5)));

        let index = ExecutionIndex::build(&log.snapshot);
        let atom = index.atom(a).unwrap();
        let order: Vec<StepId> = index.steps_by_start(atom).iter().map(|s| s.id).collect();
        assert_eq!(order, vec![s2, s1]);
    }
}
