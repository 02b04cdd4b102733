//! Sequence service.
//!
//! Entry point for callers: validates requests, reads one consistent
//! snapshot and runs the pure resolver and generator over it.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::calibration::CalibrationTable;
use crate::config::EngineConfig;
use crate::engine::{
    ExecutionConfig, ExecutionIndex, ExecutionState, Interval, SequenceGenerator, VisitSummary,
};
use crate::error::{EngineError, EngineResult};
use crate::model::{ObservationId, QaState, Subject, VisitId};
use crate::result_ext::ResultExt;
use crate::store::EventStore;
use crate::template::TemplateSource;

/// State report for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectStatus {
    pub subject: Subject,
    pub state: ExecutionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<Interval>,
    /// Worst dataset QA, steps only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qa_state: Option<QaState>,
    /// Completed without failed QA, steps only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub successful: Option<bool>,
}

/// Sequence generation and state queries over an event store.
#[derive(Clone)]
pub struct SequenceService {
    store: Arc<EventStore>,
    templates: Arc<dyn TemplateSource>,
    table: Arc<CalibrationTable>,
    config: EngineConfig,
}

impl SequenceService {
    pub fn new(
        store: Arc<EventStore>,
        templates: Arc<dyn TemplateSource>,
        table: Arc<CalibrationTable>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            templates,
            table,
            config,
        }
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn table(&self) -> &CalibrationTable {
        &self.table
    }

    /// Remaining acquisition and science for an observation.
    ///
    /// `future_limit` falls back to the configured default and is checked
    /// before anything is read.
    pub async fn generate(
        &self,
        observation_id: ObservationId,
        future_limit: Option<i64>,
    ) -> EngineResult<ExecutionConfig> {
        let limit = self.config.future_limit(future_limit)?;
        let start = Instant::now();

        let snapshot = self.store.snapshot().await;
        let templates = self
            .templates
            .templates(observation_id)
            .await
            .log_failure(format!("fetching templates for {}", observation_id))?
            .ok_or_else(|| EngineError::NotFound(format!("observation {}", observation_id)))?;

        let config = SequenceGenerator::new(&self.table)
            .generate(&snapshot, &templates, limit)
            .log_failure(format!("generating sequence for {}", observation_id))?;

        let duration = start.elapsed();
        let atom_count = [&config.acquisition, &config.science]
            .iter()
            .filter_map(|s| s.as_ref())
            .map(|s| 1 + s.possible_future.len())
            .sum::<usize>();

        info!(
            target: "sequence_engine.performance",
            observation_id = %observation_id,
            phase = "sequence_generation",
            event_count = snapshot.events.len(),
            atom_count,
            future_limit = limit.get(),
            duration_ms = duration.as_millis() as u64,
            "Sequence generated"
        );

        if duration.as_millis() > u128::from(self.config.slow_generation_ms) {
            tracing::warn!(
                target: "sequence_engine.performance",
                observation_id = %observation_id,
                event_count = snapshot.events.len(),
                duration_ms = duration.as_millis() as u64,
                threshold_ms = self.config.slow_generation_ms,
                "Slow sequence generation detected"
            );
        }

        Ok(config)
    }

    /// State, interval and QA of one subject.
    pub async fn status(&self, subject: Subject) -> EngineResult<SubjectStatus> {
        let snapshot = self.store.snapshot().await;
        if !snapshot.contains(subject) {
            return Err(EngineError::NotFound(subject.to_string()));
        }
        let index = ExecutionIndex::build(&snapshot);
        let (qa_state, successful) = match subject {
            Subject::Step(id) => (index.step_qa(id), Some(index.is_successful(id))),
            _ => (None, None),
        };
        Ok(SubjectStatus {
            subject,
            state: index.state_of(subject),
            interval: index.interval_of(subject),
            qa_state,
            successful,
        })
    }

    /// Raw time accounting for a visit.
    pub async fn visit_summary(&self, visit_id: VisitId) -> EngineResult<VisitSummary> {
        let snapshot = self.store.snapshot().await;
        if snapshot.visit(visit_id).is_none() {
            return Err(EngineError::NotFound(format!("visit {}", visit_id)));
        }
        Ok(ExecutionIndex::build(&snapshot).visit_summary(visit_id))
    }
}

impl std::fmt::Debug for SequenceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceService")
            .field("table_version", &self.table.version())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AtomId, AtomRecord, AtomStage, Breakpoint, Instrument, InstrumentConfig, NewEvent,
        ObserveClass, ObservingMode, SequenceType, StepConfig, TelescopeConfig, TimeSpan,
        VisitRecord,
    };
    use crate::template::{
        ObservationTemplates, ProtoAtom, ProtoStep, ScienceTemplate, StaticTemplateSource,
        TemplateSet,
    };
    use chrono::{Duration, TimeZone, Utc};

    fn science_step() -> ProtoStep {
        ProtoStep {
            instrument_config: InstrumentConfig {
                instrument: Instrument::Flamingos2,
                exposure: TimeSpan::from_secs(60),
                readout: None,
                grating: None,
                filter: Some("JH".to_string()),
                fpu: Some("LongSlit_2".to_string()),
            },
            step_config: StepConfig::Science,
            telescope_config: TelescopeConfig::default(),
            observe_class: ObserveClass::Science,
            breakpoint: Breakpoint::Disabled,
        }
    }

    fn service(observation_id: ObservationId) -> SequenceService {
        let set = TemplateSet {
            templates: vec![ObservationTemplates {
                observation_id,
                mode: Some(ObservingMode::Flamingos2LongSlit),
                acquisition: None,
                science: Some(ScienceTemplate {
                    cycle: vec![ProtoAtom {
                        description: None,
                        steps: vec![science_step()],
                    }],
                    repeat: None,
                    calibrations: vec![],
                }),
            }],
        };
        SequenceService::new(
            Arc::new(EventStore::new()),
            Arc::new(StaticTemplateSource::new(set).unwrap()),
            Arc::new(CalibrationTable::empty()),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_future_limit_validated_before_work() {
        let service = service(ObservationId::new());
        // Unknown observation would be NotFound; the limit check comes first.
        let err = service
            .generate(ObservationId::new(), Some(101))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        let err = service
            .generate(ObservationId::new(), Some(-1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_generate_uses_default_limit() {
        let obs = ObservationId::new();
        let config = service(obs).generate(obs, None).await.unwrap();
        let science = config.science.unwrap();
        assert_eq!(science.possible_future.len(), 25);
        assert!(science.has_more);
        assert!(config.acquisition.is_none());
    }

    #[tokio::test]
    async fn test_unknown_observation_is_not_found() {
        let err = service(ObservationId::new())
            .generate(ObservationId::new(), Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_status_and_summary() {
        let obs = ObservationId::new();
        let service = service(obs);
        let store = service.store().clone();
        let visit = VisitRecord {
            id: VisitId::new(),
            observation_id: obs,
            instrument: Instrument::Flamingos2,
        };
        let atom_id = AtomId::new();
        store.record_visit(visit.clone()).await.unwrap();
        store
            .record_atom(AtomRecord {
                id: atom_id,
                visit_id: visit.id,
                sequence_type: SequenceType::Science,
                steps: vec![],
            })
            .await
            .unwrap();
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 3, 0, 0).unwrap();
        store
            .append(NewEvent::atom(atom_id, AtomStage::StartAtom, t0))
            .await
            .unwrap();

        let status = service.status(Subject::Atom(atom_id)).await.unwrap();
        assert_eq!(status.state, ExecutionState::Ongoing);
        assert!(status.interval.is_none());
        assert!(status.successful.is_none());

        store
            .append(NewEvent::atom(
                atom_id,
                AtomStage::EndAtom,
                t0 + Duration::seconds(90),
            ))
            .await
            .unwrap();
        let status = service.status(Subject::Atom(atom_id)).await.unwrap();
        assert_eq!(status.state, ExecutionState::Completed);
        assert_eq!(status.interval.unwrap().duration, TimeSpan::from_secs(90));

        let summary = service.visit_summary(visit.id).await.unwrap();
        assert_eq!(summary.closed_steps, 0);

        assert!(matches!(
            service.status(Subject::Step(crate::model::StepId::new())).await,
            Err(EngineError::NotFound(_))
        ));
    }
}
