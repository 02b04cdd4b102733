//! Execution log storage.

mod event_store;
mod snapshot;

pub use event_store::EventStore;
pub use snapshot::ExecutionSnapshot;
