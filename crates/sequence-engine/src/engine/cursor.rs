//! Cursors over conceptually infinite template sequences.
//!
//! A cursor yields the template atom at its position and moves past it.
//! Nothing is materialized beyond what the caller asks for.

use crate::calibration::{CalibrationKey, CalibrationTable};
use crate::error::EngineResult;
use crate::model::{ObserveClass, StepConfig, TimeSpan};
use crate::template::{
    AcquisitionTemplate, CalibrationTrigger, ProtoAtom, ProtoStep, ScienceTemplate,
};

/// Template atom with every calibration placeholder replaced by concrete
/// calibration unit settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedAtom {
    pub description: Option<String>,
    pub steps: Vec<ProtoStep>,
}

impl ResolvedAtom {
    pub fn resolve(atom: &ProtoAtom, table: &CalibrationTable) -> EngineResult<Self> {
        let mut steps = Vec::with_capacity(atom.steps.len());
        for step in &atom.steps {
            match step.step_config {
                StepConfig::SmartGcal { kind } => {
                    let key = CalibrationKey::from_config(&step.instrument_config)?;
                    let resolved =
                        table.resolve_kind(&key, step.instrument_config.wavelength(), kind)?;
                    steps.extend(resolved.into_iter().map(|cal| ProtoStep {
                        instrument_config: step.instrument_config.with_exposure(cal.exposure),
                        step_config: StepConfig::Gcal(cal.gcal),
                        telescope_config: step.telescope_config,
                        observe_class: ObserveClass::for_baseline(cal.baseline),
                        breakpoint: step.breakpoint,
                    }));
                }
                _ => steps.push(step.clone()),
            }
        }
        Ok(Self {
            description: atom.description.clone(),
            steps,
        })
    }

    /// Planned science exposure of the given steps.
    pub fn planned_exposure(steps: &[ProtoStep]) -> TimeSpan {
        steps
            .iter()
            .filter(|s| s.observe_class == ObserveClass::Science)
            .map(|s| s.instrument_config.exposure)
            .sum()
    }
}

/// Role of the atom at the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotKind {
    Acquisition,
    FineAdjustment,
    Science,
    Calibration,
}

/// Atom at the cursor together with the seed its ids derive from.
#[derive(Debug, Clone)]
pub(crate) struct Slot<'c> {
    pub atom: &'c ResolvedAtom,
    pub kind: SlotKind,
    pub seed: String,
}

pub(crate) trait SequenceCursor {
    /// Atom at the cursor, `None` once the template is exhausted.
    fn current(&self) -> Option<Slot<'_>>;

    /// Move past the current atom, crediting `exposure` of science time.
    fn advance(&mut self, exposure: TimeSpan);
}

/// Acquisition: a finite prefix, then the fine-adjustment atom forever.
#[derive(Debug)]
pub(crate) struct AcquisitionCursor {
    prefix: Vec<ResolvedAtom>,
    fine_adjustment: Option<ResolvedAtom>,
    position: usize,
    seed: String,
}

impl AcquisitionCursor {
    pub fn new(
        template: &AcquisitionTemplate,
        table: &CalibrationTable,
        seed: String,
    ) -> EngineResult<Self> {
        Ok(Self {
            prefix: template
                .prefix
                .iter()
                .map(|a| ResolvedAtom::resolve(a, table))
                .collect::<EngineResult<_>>()?,
            fine_adjustment: template
                .fine_adjustment
                .as_ref()
                .map(|a| ResolvedAtom::resolve(a, table))
                .transpose()?,
            position: 0,
            seed,
        })
    }
}

impl SequenceCursor for AcquisitionCursor {
    fn current(&self) -> Option<Slot<'_>> {
        let seed = format!("{}/{}", self.seed, self.position);
        match self.prefix.get(self.position) {
            Some(atom) => Some(Slot {
                atom,
                kind: SlotKind::Acquisition,
                seed,
            }),
            None => self.fine_adjustment.as_ref().map(|atom| Slot {
                atom,
                kind: SlotKind::FineAdjustment,
                seed,
            }),
        }
    }

    fn advance(&mut self, _exposure: TimeSpan) {
        self.position += 1;
    }
}

/// Science: the cycle repeated `repeat` times (or forever) with periodic
/// calibrations inserted when their trigger is due.
#[derive(Debug)]
pub(crate) struct ScienceCursor {
    cycle: Vec<ResolvedAtom>,
    repeat: Option<u32>,
    calibrations: Vec<(ResolvedAtom, CalibrationTrigger)>,
    position: usize,
    calibrations_done: usize,
    since_atoms: u32,
    since_exposure: TimeSpan,
    seed: String,
}

impl ScienceCursor {
    pub fn new(
        template: &ScienceTemplate,
        table: &CalibrationTable,
        seed: String,
    ) -> EngineResult<Self> {
        Ok(Self {
            cycle: template
                .cycle
                .iter()
                .map(|a| ResolvedAtom::resolve(a, table))
                .collect::<EngineResult<_>>()?,
            repeat: template.repeat,
            calibrations: template
                .calibrations
                .iter()
                .map(|c| Ok((ResolvedAtom::resolve(&c.atom, table)?, c.trigger)))
                .collect::<EngineResult<_>>()?,
            position: 0,
            calibrations_done: 0,
            since_atoms: 0,
            since_exposure: TimeSpan::ZERO,
            seed,
        })
    }

    fn due_calibration(&self) -> Option<usize> {
        self.calibrations
            .iter()
            .position(|(_, trigger)| trigger.is_due(self.since_atoms, self.since_exposure))
    }

    fn bound_reached(&self) -> bool {
        match self.repeat {
            Some(r) => self.position >= self.cycle.len().saturating_mul(r as usize),
            None => self.cycle.is_empty(),
        }
    }
}

impl SequenceCursor for ScienceCursor {
    fn current(&self) -> Option<Slot<'_>> {
        if let Some(i) = self.due_calibration() {
            return Some(Slot {
                atom: &self.calibrations[i].0,
                kind: SlotKind::Calibration,
                seed: format!("{}/calibration/{}", self.seed, self.calibrations_done),
            });
        }
        if self.bound_reached() {
            return None;
        }
        Some(Slot {
            atom: &self.cycle[self.position % self.cycle.len()],
            kind: SlotKind::Science,
            seed: format!("{}/science/{}", self.seed, self.position),
        })
    }

    fn advance(&mut self, exposure: TimeSpan) {
        if self.due_calibration().is_some() {
            self.calibrations_done += 1;
            self.since_atoms = 0;
            self.since_exposure = TimeSpan::ZERO;
        } else if !self.bound_reached() {
            self.position += 1;
            self.since_atoms = self.since_atoms.saturating_add(1);
            self.since_exposure += exposure;
        }
    }
}
