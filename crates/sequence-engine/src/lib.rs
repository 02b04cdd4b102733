//! Observation Sequence Execution Engine
//!
//! This crate records the execution of an observing sequence and derives
//! everything else from that record:
//!
//! - **Event Log**: Append-only, timestamped execution events for visits, atoms, steps and datasets
//! - **State Resolution**: Not started / ongoing / completed / abandoned, with intervals and QA
//! - **Time Accounting**: Raw per-visit durations by observe class category
//! - **Calibration Lookup**: Versioned table mapping instrument configuration and wavelength to calibration settings
//! - **Sequence Generation**: The next atom and a bounded lookahead of what remains
//!
//! ## Architecture
//!
//! State is event sourced: nothing stores "current state". The
//! [`store::EventStore`] hands out immutable snapshots, and the resolver and
//! generator in [`engine`] are pure functions of one snapshot, the
//! observation's templates and the calibration table.
//!
//! ## Modules
//!
//! - [`calibration`]: Calibration table and lookup
//! - [`config`]: Configuration loading from environment variables
//! - [`engine`]: State resolver, interval accounting and sequence generator
//! - [`error`]: Error types
//! - [`model`]: Identifiers, instrument and step configuration, events and records
//! - [`services`]: Async facade used by callers
//! - [`store`]: Event log storage
//! - [`template`]: Sequence templates and template sources
//!
//! ## Example
//!
//! ```ignore
//! use std::path::Path;
//! use std::sync::Arc;
//! use sequence_engine::{
//!     CalibrationTable, EngineConfig, EventStore, SequenceService, StaticTemplateSource,
//!     TemplateSet,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EngineConfig::from_env()?;
//!     let table = CalibrationTable::load(Path::new("smart_gcal.yaml"))?;
//!     let templates = StaticTemplateSource::new(TemplateSet::load(Path::new("templates.yaml"))?)?;
//!     let service = SequenceService::new(
//!         Arc::new(EventStore::new()),
//!         Arc::new(templates),
//!         Arc::new(table),
//!         config,
//!     );
//!     let sequence = service.generate(observation_id, Some(10)).await?;
//!     Ok(())
//! }
//! ```

pub mod calibration;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod model;
pub mod result_ext;
pub mod services;
pub mod store;
pub mod template;

pub use calibration::{CalibrationTable, UnmatchedCalibration};
pub use config::EngineConfig;
pub use engine::{ExecutionConfig, ExecutionState, SequenceGenerator};
pub use error::{EngineError, EngineResult};
pub use result_ext::ResultExt;
pub use services::SequenceService;
pub use store::{EventStore, ExecutionSnapshot};
pub use template::{StaticTemplateSource, TemplateSet, TemplateSource};
