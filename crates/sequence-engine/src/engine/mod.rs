//! Execution state, time accounting and sequence generation.
//!
//! Everything here is a pure computation over one [`ExecutionSnapshot`](crate::store::ExecutionSnapshot).

mod cursor;
mod generator;
mod interval;
mod state;

pub use generator::{
    ExecutionConfig, ExecutionSequence, GeneratedAtom, GeneratedStep, SequenceGenerator,
};
pub use interval::{Interval, VisitSummary};
pub use state::{ExecutionIndex, ExecutionState};
