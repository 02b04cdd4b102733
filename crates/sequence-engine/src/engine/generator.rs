//! Sequence generation.
//!
//! Recorded history is replayed against the template cursor; whatever the
//! history does not account for is what remains to execute. Generation is
//! a pure function of the snapshot, the templates and the calibration
//! table, so repeated calls on an unchanged log return identical results,
//! ids included.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::cursor::{AcquisitionCursor, ResolvedAtom, ScienceCursor, SequenceCursor, SlotKind};
use super::state::{ExecutionIndex, ExecutionState};
use crate::calibration::CalibrationTable;
use crate::error::EngineResult;
use crate::model::{
    AtomId, AtomRecord, Breakpoint, FutureLimit, InstrumentConfig, ObservationId, ObserveClass,
    SequenceType, StepConfig, StepId, Subject, TelescopeConfig, TimeSpan, VisitId,
};
use crate::store::ExecutionSnapshot;
use crate::template::{ObservationTemplates, ProtoStep};

/// Namespace of generated atom ids.
const GENERATED_ID_NAMESPACE: Uuid = Uuid::from_u128(0x5e9c_7a1e_0b5d_4f2a_9a61_2c3e_8d4b_7f10);

/// Step the caller should execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedStep {
    pub id: StepId,
    pub instrument_config: InstrumentConfig,
    pub step_config: StepConfig,
    pub telescope_config: TelescopeConfig,
    pub observe_class: ObserveClass,
    pub breakpoint: Breakpoint,
}

/// Atom the caller should execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedAtom {
    pub id: AtomId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub sequence_type: SequenceType,
    pub steps: Vec<GeneratedStep>,
}

impl GeneratedAtom {
    /// Science exposure the atom plans to collect.
    pub fn planned_exposure(&self) -> TimeSpan {
        self.steps
            .iter()
            .filter(|s| s.observe_class == ObserveClass::Science)
            .map(|s| s.instrument_config.exposure)
            .sum()
    }
}

/// What remains of one sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSequence {
    pub next_atom: GeneratedAtom,
    pub possible_future: Vec<GeneratedAtom>,
    /// More atoms exist beyond `possible_future`.
    pub has_more: bool,
}

/// Remaining acquisition and science for an observation. A section is
/// absent when it has no template or nothing left to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub observation_id: ObservationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquisition: Option<ExecutionSequence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub science: Option<ExecutionSequence>,
}

/// Progress inside the atom currently being executed.
#[derive(Debug, Clone)]
struct PartialAtom {
    atom_id: AtomId,
    matched: usize,
    exposure: TimeSpan,
    /// Steps already started in this atom; their ids are never reissued.
    started: Vec<StepId>,
}

/// Where replaying history left the cursor.
#[derive(Debug, Clone, Default)]
struct Replay {
    partial: Option<PartialAtom>,
    /// Recorded attempts at the current template atom that did not satisfy it.
    retries: usize,
}

/// Sequence generator bound to a calibration table.
#[derive(Debug, Clone, Copy)]
pub struct SequenceGenerator<'t> {
    table: &'t CalibrationTable,
}

impl<'t> SequenceGenerator<'t> {
    pub fn new(table: &'t CalibrationTable) -> Self {
        Self { table }
    }

    /// Compute what remains to execute for the observation.
    pub fn generate(
        &self,
        snapshot: &ExecutionSnapshot,
        templates: &ObservationTemplates,
        limit: FutureLimit,
    ) -> EngineResult<ExecutionConfig> {
        let mode = templates.require_mode()?;
        let observation_id = templates.observation_id;
        let index = ExecutionIndex::build(snapshot);
        let latest_visit = snapshot.latest_visit(observation_id).map(|v| v.id);

        debug!(
            observation_id = %observation_id,
            mode = ?mode,
            latest_visit = ?latest_visit,
            future_limit = limit.get(),
            "Generating sequence"
        );

        let acquisition = match &templates.acquisition {
            Some(template) => {
                let reset = snapshot.acquisition_reset(observation_id);
                let seed = acquisition_seed(observation_id, latest_visit, reset);
                let mut cursor = AcquisitionCursor::new(template, self.table, seed)?;
                let history = acquisition_history(&index, latest_visit, reset);
                let replayed = replay(&index, &mut cursor, &history, latest_visit);
                project(&mut cursor, replayed, limit, SequenceType::Acquisition)
            }
            None => None,
        };

        let science = match &templates.science {
            Some(template) => {
                let seed = format!("{}/science", observation_id);
                let mut cursor = ScienceCursor::new(template, self.table, seed)?;
                let history = science_history(&index, observation_id);
                let replayed = replay(&index, &mut cursor, &history, latest_visit);
                project(&mut cursor, replayed, limit, SequenceType::Science)
            }
            None => None,
        };

        Ok(ExecutionConfig {
            observation_id,
            acquisition,
            science,
        })
    }
}

fn acquisition_seed(
    observation_id: ObservationId,
    visit: Option<VisitId>,
    reset: Option<DateTime<Utc>>,
) -> String {
    let visit = visit.map(|v| v.to_string()).unwrap_or_default();
    let reset = reset.map(|r| r.to_rfc3339()).unwrap_or_default();
    format!("{}/acquisition/{}/{}", observation_id, visit, reset)
}

/// Acquisition atoms of the latest visit started after the latest reset.
fn acquisition_history<'a>(
    index: &ExecutionIndex<'a>,
    latest_visit: Option<VisitId>,
    reset: Option<DateTime<Utc>>,
) -> Vec<&'a AtomRecord> {
    let Some(visit) = latest_visit else {
        return Vec::new();
    };
    index
        .atoms_by_start(visit)
        .into_iter()
        .filter(|a| a.sequence_type == SequenceType::Acquisition)
        .filter(|a| match (reset, index.started_at(Subject::Atom(a.id))) {
            (Some(reset), Some(start)) => start.received_at > reset,
            _ => true,
        })
        .collect()
}

/// Science atoms of every visit, visits in creation order.
fn science_history<'a>(
    index: &ExecutionIndex<'a>,
    observation_id: ObservationId,
) -> Vec<&'a AtomRecord> {
    index
        .snapshot()
        .visits_for(observation_id)
        .flat_map(|v| index.atoms_by_start(v.id))
        .filter(|a| a.sequence_type == SequenceType::Science)
        .collect()
}

/// Advance the cursor over recorded history. Abandoned atoms never
/// satisfy the template; they only count as failed attempts.
fn replay(
    index: &ExecutionIndex<'_>,
    cursor: &mut dyn SequenceCursor,
    history: &[&AtomRecord],
    latest_visit: Option<VisitId>,
) -> Replay {
    let mut replayed = Replay::default();
    for atom in history {
        let Some(slot) = cursor.current() else {
            debug!(atom_id = %atom.id, "Template exhausted, ignoring remaining history");
            break;
        };
        if index.state_of(Subject::Atom(atom.id)) == ExecutionState::Abandoned {
            debug!(atom_id = %atom.id, "Abandoned atom does not satisfy template");
            replayed.partial = None;
            replayed.retries += 1;
            continue;
        }

        let started = index.steps_by_start(atom);
        let mut matched = 0usize;
        let mut exposure = TimeSpan::ZERO;
        for step in started.iter().copied() {
            let Some(expected) = slot.atom.steps.get(matched) else {
                break;
            };
            if !index.is_successful(step.id) {
                continue;
            }
            if step.same_config(
                &expected.instrument_config,
                &expected.step_config,
                &expected.telescope_config,
            ) {
                if step.observe_class == ObserveClass::Science {
                    exposure += index.step_duration(step.id);
                }
                matched += 1;
            }
        }

        let total = slot.atom.steps.len();
        let kind = slot.kind;
        if matched == total {
            debug!(atom_id = %atom.id, kind = ?kind, %exposure, "Recorded atom matches template");
            cursor.advance(exposure);
            replayed = Replay::default();
        } else if matched > 0
            && Some(atom.visit_id) == latest_visit
            && index.state_of(Subject::Atom(atom.id)) == ExecutionState::Ongoing
        {
            debug!(atom_id = %atom.id, matched, total, "Atom partially executed");
            replayed.partial = Some(PartialAtom {
                atom_id: atom.id,
                matched,
                exposure,
                started: started.iter().map(|s| s.id).collect(),
            });
        } else {
            debug!(atom_id = %atom.id, matched, total, "Recorded atom does not satisfy template");
            replayed.partial = None;
            replayed.retries += 1;
        }
    }
    replayed
}

/// Materialize `next_atom` and up to `limit` further atoms. A template
/// atom reissued after failed attempts gets a fresh id.
fn project(
    cursor: &mut dyn SequenceCursor,
    replayed: Replay,
    limit: FutureLimit,
    sequence_type: SequenceType,
) -> Option<ExecutionSequence> {
    let next_atom = {
        let slot = cursor.current()?;
        let (atom, exposure) = match replayed.partial {
            Some(p) => {
                let rest = &slot.atom.steps[p.matched..];
                let atom = build_atom(p.atom_id, slot.atom, p.matched, sequence_type, &p.started);
                (atom, p.exposure + ResolvedAtom::planned_exposure(rest))
            }
            None => {
                let seed = match replayed.retries {
                    0 => slot.seed.clone(),
                    n => format!("{}/retry/{}", slot.seed, n),
                };
                let id = generated_atom_id(&seed);
                let atom = build_atom(id, slot.atom, 0, sequence_type, &[]);
                (atom, ResolvedAtom::planned_exposure(&slot.atom.steps))
            }
        };
        if slot.kind == SlotKind::Calibration {
            debug!(atom_id = %atom.id, "Next atom is a periodic calibration");
        }
        cursor.advance(exposure);
        atom
    };

    let mut possible_future = Vec::with_capacity(limit.get());
    while possible_future.len() < limit.get() {
        let Some(slot) = cursor.current() else {
            break;
        };
        let id = generated_atom_id(&slot.seed);
        let atom = build_atom(id, slot.atom, 0, sequence_type, &[]);
        let exposure = ResolvedAtom::planned_exposure(&slot.atom.steps);
        cursor.advance(exposure);
        possible_future.push(atom);
    }

    Some(ExecutionSequence {
        next_atom,
        possible_future,
        has_more: cursor.current().is_some(),
    })
}

fn generated_atom_id(seed: &str) -> AtomId {
    AtomId::from(Uuid::new_v5(&GENERATED_ID_NAMESPACE, seed.as_bytes()))
}

/// Steps from `skip` onwards, with ids derived from the atom id so that a
/// recorded atom keeps the step ids it was generated with. Ids in `started`
/// belong to steps already executed and are replaced by fresh ones.
fn build_atom(
    id: AtomId,
    atom: &ResolvedAtom,
    skip: usize,
    sequence_type: SequenceType,
    started: &[StepId],
) -> GeneratedAtom {
    let steps = atom
        .steps
        .iter()
        .enumerate()
        .skip(skip)
        .map(|(i, step)| generated_step(generated_step_id(id, i, started), step))
        .collect();
    GeneratedAtom {
        id,
        description: atom.description.clone(),
        sequence_type,
        steps,
    }
}

/// `step/{index}` unless that id already ran, then `step/{index}/{n}`
/// for the first unused attempt `n`.
fn generated_step_id(atom_id: AtomId, index: usize, started: &[StepId]) -> StepId {
    let derive = |name: String| StepId::from(Uuid::new_v5(atom_id.as_uuid(), name.as_bytes()));
    let mut id = derive(format!("step/{}", index));
    let mut attempt = 1usize;
    while started.contains(&id) {
        id = derive(format!("step/{}/{}", index, attempt));
        attempt += 1;
    }
    id
}

fn generated_step(id: StepId, step: &ProtoStep) -> GeneratedStep {
    GeneratedStep {
        id,
        instrument_config: step.instrument_config.clone(),
        step_config: step.step_config.clone(),
        telescope_config: step.telescope_config,
        observe_class: step.observe_class,
        breakpoint: step.breakpoint,
    }
}
