//! Interval and raw time accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::ExecutionIndex;
use crate::model::{ClassCategory, StepId, Subject, TimeSpan, VisitId};

/// Closed time interval of a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration: TimeSpan,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            duration: TimeSpan::between(start, end),
        }
    }
}

/// Raw per-visit durations of closed steps by observe class category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitSummary {
    pub visit_id: VisitId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<Interval>,
    pub science: TimeSpan,
    pub calibration: TimeSpan,
    pub acquisition: TimeSpan,
    pub closed_steps: usize,
}

impl ExecutionIndex<'_> {
    /// Interval spanned by the subject's events; `None` until it is closed.
    pub fn interval_of(&self, subject: Subject) -> Option<Interval> {
        if !self.state_of(subject).is_closed() {
            return None;
        }
        self.span(subject)
            .map(|span| Interval::new(span.first.received_at, span.last.received_at))
    }

    /// Time spent on a step, zero while it is open.
    pub fn step_duration(&self, step: StepId) -> TimeSpan {
        self.interval_of(Subject::Step(step))
            .map(|i| i.duration)
            .unwrap_or(TimeSpan::ZERO)
    }

    pub fn visit_summary(&self, visit_id: VisitId) -> VisitSummary {
        let mut summary = VisitSummary {
            visit_id,
            interval: self.interval_of(Subject::Visit(visit_id)),
            science: TimeSpan::ZERO,
            calibration: TimeSpan::ZERO,
            acquisition: TimeSpan::ZERO,
            closed_steps: 0,
        };
        for atom in self.snapshot().atoms.iter().filter(|a| a.visit_id == visit_id) {
            for step_id in &atom.steps {
                let Some(step) = self.step(*step_id) else {
                    continue;
                };
                let Some(interval) = self.interval_of(Subject::Step(step.id)) else {
                    continue;
                };
                summary.closed_steps += 1;
                match step.observe_class.category() {
                    ClassCategory::Science => summary.science += interval.duration,
                    ClassCategory::Calibration => summary.calibration += interval.duration,
                    ClassCategory::Acquisition => summary.acquisition += interval.duration,
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::tests::{t, Log};
    use crate::model::{AtomStage, DatasetStage, NewEvent, ObservationId, ObserveClass, StepStage};

    #[test]
    fn test_no_interval_while_ongoing() {
        let mut log = Log::default();
        let v = log.visit(ObservationId::new());
        let a = log.atom(v);
        let s = log.step(a);
        log.push(NewEvent::atom(a, AtomStage::StartAtom, t(0)));
        log.push(NewEvent::step(s, StepStage::StartStep, t(1)));

        let index = ExecutionIndex::build(&log.snapshot);
        assert!(index.interval_of(Subject::Atom(a)).is_none());
        assert!(index.interval_of(Subject::Step(s)).is_none());
        assert_eq!(index.step_duration(s), TimeSpan::ZERO);
    }

    #[test]
    fn test_interval_covers_descendant_events() {
        let mut log = Log::default();
        let v = log.visit(ObservationId::new());
        let a = log.atom(v);
        let s = log.step(a);
        let d = log.dataset(s, None);
        log.push(NewEvent::step(s, StepStage::StartStep, t(0)));
        log.push(NewEvent::dataset(d, DatasetStage::StartExpose, t(2)));
        log.push(NewEvent::dataset(d, DatasetStage::EndWrite, t(40)));
        log.push(NewEvent::step(s, StepStage::EndStep, t(42)));

        let index = ExecutionIndex::build(&log.snapshot);
        let interval = index.interval_of(Subject::Step(s)).unwrap();
        assert_eq!(interval.start, t(0));
        assert_eq!(interval.end, t(42));
        assert_eq!(interval.duration, TimeSpan::from_secs(42));
        assert_eq!(
            index.interval_of(Subject::Dataset(d)).unwrap().duration,
            TimeSpan::from_secs(38)
        );
    }

    #[test]
    fn test_abandoned_subject_has_interval() {
        let mut log = Log::default();
        let v = log.visit(ObservationId::new());
        let a = log.atom(v);
        let b = log.atom(v);
        log.push(NewEvent::atom(a, AtomStage::StartAtom, t(0)));
        log.push(NewEvent::atom(a, AtomStage::StartAtom, t(7)));
        log.push(NewEvent::atom(b, AtomStage::StartAtom, t(10)));

        let index = ExecutionIndex::build(&log.snapshot);
        let interval = index.interval_of(Subject::Atom(a)).unwrap();
        assert_eq!(interval.duration, TimeSpan::from_secs(7));
    }

    #[test]
    fn test_visit_summary_by_category() {
        let mut log = Log::default();
        let v = log.visit(ObservationId::new());
        let a = log.atom(v);
        let sci = log.step(a);
        let flat = log.step(a);
        let open = log.step(a);
        if let Some(step) = log.snapshot.steps.iter_mut().find(|s| s.id == flat) {
            step.observe_class = ObserveClass::PartnerCal;
        }
        log.push(NewEvent::step(sci, StepStage::StartStep, t(0)));
        log.push(NewEvent::step(sci, StepStage::EndStep, t(60)));
        log.push(NewEvent::step(flat, StepStage::StartStep, t(61)));
        log.push(NewEvent::step(flat, StepStage::EndStep, t(66)));
        log.push(NewEvent::step(open, StepStage::StartStep, t(70)));

        let index = ExecutionIndex::build(&log.snapshot);
        let summary = index.visit_summary(v);
        assert_eq!(summary.science, TimeSpan::from_secs(60));
        assert_eq!(summary.calibration, TimeSpan::from_secs(5));
        assert_eq!(summary.acquisition, TimeSpan::ZERO);
        assert_eq!(summary.closed_steps, 2);
        assert!(summary.interval.is_none());
    }
}
