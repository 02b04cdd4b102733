//! Execution event model.
//!
//! All execution state is derived from these events. Events are immutable
//! once appended and totally ordered by `(received_at, id)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AtomId, DatasetId, EventId, StepId, VisitId};

/// Commands issued to the sequence as a whole.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SequenceCommand {
    Start,
    Pause,
    Continue,
    Stop,
    Abort,
    Slew,
}

/// Atom lifecycle stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AtomStage {
    StartAtom,
    EndAtom,
}

/// Step lifecycle stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStage {
    StartStep,
    StartConfigure,
    EndConfigure,
    StartObserve,
    EndObserve,
    Abort,
    Continue,
    Pause,
    Stop,
    EndStep,
}

/// Dataset lifecycle stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DatasetStage {
    StartExpose,
    EndExpose,
    StartReadout,
    EndReadout,
    StartWrite,
    EndWrite,
}

impl std::fmt::Display for SequenceCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SequenceCommand::Start => "start",
            SequenceCommand::Pause => "pause",
            SequenceCommand::Continue => "continue",
            SequenceCommand::Stop => "stop",
            SequenceCommand::Abort => "abort",
            SequenceCommand::Slew => "slew",
        };
        write!(f, "{}", s)
    }
}

impl std::fmt::Display for AtomStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AtomStage::StartAtom => "start_atom",
            AtomStage::EndAtom => "end_atom",
        };
        write!(f, "{}", s)
    }
}

impl std::fmt::Display for StepStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepStage::StartStep => "start_step",
            StepStage::StartConfigure => "start_configure",
            StepStage::EndConfigure => "end_configure",
            StepStage::StartObserve => "start_observe",
            StepStage::EndObserve => "end_observe",
            StepStage::Abort => "abort",
            StepStage::Continue => "continue",
            StepStage::Pause => "pause",
            StepStage::Stop => "stop",
            StepStage::EndStep => "end_step",
        };
        write!(f, "{}", s)
    }
}

impl std::fmt::Display for DatasetStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DatasetStage::StartExpose => "start_expose",
            DatasetStage::EndExpose => "end_expose",
            DatasetStage::StartReadout => "start_readout",
            DatasetStage::EndReadout => "end_readout",
            DatasetStage::StartWrite => "start_write",
            DatasetStage::EndWrite => "end_write",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for AtomStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "start_atom" => Ok(AtomStage::StartAtom),
            "end_atom" => Ok(AtomStage::EndAtom),
            other => Err(format!("unknown atom stage: {other}")),
        }
    }
}

impl std::str::FromStr for StepStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "start_step" => Ok(StepStage::StartStep),
            "start_configure" => Ok(StepStage::StartConfigure),
            "end_configure" => Ok(StepStage::EndConfigure),
            "start_observe" => Ok(StepStage::StartObserve),
            "end_observe" => Ok(StepStage::EndObserve),
            "abort" => Ok(StepStage::Abort),
            "continue" => Ok(StepStage::Continue),
            "pause" => Ok(StepStage::Pause),
            "stop" => Ok(StepStage::Stop),
            "end_step" => Ok(StepStage::EndStep),
            other => Err(format!("unknown step stage: {other}")),
        }
    }
}

impl std::str::FromStr for DatasetStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "start_expose" => Ok(DatasetStage::StartExpose),
            "end_expose" => Ok(DatasetStage::EndExpose),
            "start_readout" => Ok(DatasetStage::StartReadout),
            "end_readout" => Ok(DatasetStage::EndReadout),
            "start_write" => Ok(DatasetStage::StartWrite),
            "end_write" => Ok(DatasetStage::EndWrite),
            other => Err(format!("unknown dataset stage: {other}")),
        }
    }
}

/// Event kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SequenceCommand,
    AtomStage,
    StepStage,
    DatasetStage,
}

/// The subject an event is about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Subject {
    Visit(VisitId),
    Atom(AtomId),
    Step(StepId),
    Dataset(DatasetId),
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subject::Visit(id) => write!(f, "visit {id}"),
            Subject::Atom(id) => write!(f, "atom {id}"),
            Subject::Step(id) => write!(f, "step {id}"),
            Subject::Dataset(id) => write!(f, "dataset {id}"),
        }
    }
}

/// What happened: subject plus stage, one variant per event kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    SequenceCommand {
        visit_id: VisitId,
        command: SequenceCommand,
    },
    AtomStage {
        atom_id: AtomId,
        stage: AtomStage,
    },
    StepStage {
        step_id: StepId,
        stage: StepStage,
    },
    DatasetStage {
        dataset_id: DatasetId,
        stage: DatasetStage,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::SequenceCommand { .. } => EventKind::SequenceCommand,
            EventPayload::AtomStage { .. } => EventKind::AtomStage,
            EventPayload::StepStage { .. } => EventKind::StepStage,
            EventPayload::DatasetStage { .. } => EventKind::DatasetStage,
        }
    }

    pub fn subject(&self) -> Subject {
        match *self {
            EventPayload::SequenceCommand { visit_id, .. } => Subject::Visit(visit_id),
            EventPayload::AtomStage { atom_id, .. } => Subject::Atom(atom_id),
            EventPayload::StepStage { step_id, .. } => Subject::Step(step_id),
            EventPayload::DatasetStage { dataset_id, .. } => Subject::Dataset(dataset_id),
        }
    }

    /// Wire name of the stage or command.
    pub fn stage_name(&self) -> String {
        match self {
            EventPayload::SequenceCommand { command, .. } => command.to_string(),
            EventPayload::AtomStage { stage, .. } => stage.to_string(),
            EventPayload::StepStage { stage, .. } => stage.to_string(),
            EventPayload::DatasetStage { stage, .. } => stage.to_string(),
        }
    }

    /// Whether this event closes its subject for good.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventPayload::AtomStage {
                stage: AtomStage::EndAtom,
                ..
            } | EventPayload::StepStage {
                stage: StepStage::EndStep,
                ..
            } | EventPayload::DatasetStage {
                stage: DatasetStage::EndWrite,
                ..
            }
        )
    }
}

/// Stored execution event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionEvent {
    /// Store-assigned identifier; ordering tiebreak.
    pub id: EventId,

    /// What happened.
    #[serde(flatten)]
    pub payload: EventPayload,

    /// When the event was received.
    pub received_at: DateTime<Utc>,
}

impl ExecutionEvent {
    /// Total order key.
    pub fn order_key(&self) -> EventKey {
        EventKey {
            received_at: self.received_at,
            id: self.id,
        }
    }

    pub fn subject(&self) -> Subject {
        self.payload.subject()
    }
}

/// Position of an event in the total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub received_at: DateTime<Utc>,
    pub id: EventId,
}

/// Request to append a new event; the store assigns the id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewEvent {
    #[serde(flatten)]
    pub payload: EventPayload,
    pub received_at: DateTime<Utc>,
}

impl NewEvent {
    pub fn atom(atom_id: AtomId, stage: AtomStage, received_at: DateTime<Utc>) -> Self {
        Self {
            payload: EventPayload::AtomStage { atom_id, stage },
            received_at,
        }
    }

    pub fn step(step_id: StepId, stage: StepStage, received_at: DateTime<Utc>) -> Self {
        Self {
            payload: EventPayload::StepStage { step_id, stage },
            received_at,
        }
    }

    pub fn dataset(dataset_id: DatasetId, stage: DatasetStage, received_at: DateTime<Utc>) -> Self {
        Self {
            payload: EventPayload::DatasetStage { dataset_id, stage },
            received_at,
        }
    }

    pub fn sequence(visit_id: VisitId, command: SequenceCommand, received_at: DateTime<Utc>) -> Self {
        Self {
            payload: EventPayload::SequenceCommand { visit_id, command },
            received_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display_round_trip() {
        for stage in [StepStage::StartStep, StepStage::EndObserve, StepStage::EndStep] {
            assert_eq!(stage.to_string().parse::<StepStage>(), Ok(stage));
        }
        assert_eq!("END_ATOM".parse::<AtomStage>(), Ok(AtomStage::EndAtom));
        assert!("end_everything".parse::<DatasetStage>().is_err());
    }

    #[test]
    fn test_terminal_stages() {
        let atom = AtomId::new();
        let step = StepId::new();
        assert!(EventPayload::AtomStage {
            atom_id: atom,
            stage: AtomStage::EndAtom
        }
        .is_terminal());
        assert!(!EventPayload::StepStage {
            step_id: step,
            stage: StepStage::Stop
        }
        .is_terminal());
        assert!(EventPayload::DatasetStage {
            dataset_id: DatasetId::new(),
            stage: DatasetStage::EndWrite
        }
        .is_terminal());
    }

    #[test]
    fn test_event_serializes_flat() {
        let step_id = StepId::new();
        let event = ExecutionEvent {
            id: EventId(7),
            payload: EventPayload::StepStage {
                step_id,
                stage: StepStage::EndStep,
            },
            received_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "step_stage");
        assert_eq!(json["stage"], "end_step");
        assert_eq!(json["id"], 7);
        let back: ExecutionEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.subject(), Subject::Step(step_id));
        assert_eq!(back.payload.kind(), EventKind::StepStage);
    }
}
