//! Service layer.

pub mod sequence;

pub use sequence::{SequenceService, SubjectStatus};
