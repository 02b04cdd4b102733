//! Input documents and their fallbacks.
//!
//! Every path can be given on the command line or through the engine
//! configuration (`SEQEXEC_*`). The execution log may also be missing, in
//! which case an empty log is used.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use sequence_engine::document::{load_document, render_document, DocumentFormat};
use sequence_engine::model::{
    AtomRecord, DatasetRecord, NewEvent, ObservationId, StepRecord, VisitRecord,
};
use sequence_engine::{CalibrationTable, EngineConfig, EventStore, ExecutionSnapshot, TemplateSet};

/// Paths shared by most commands.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct InputPaths {
    /// Execution log snapshot (JSON or YAML)
    #[arg(long = "log", value_name = "PATH")]
    pub execution_log: Option<PathBuf>,

    /// Sequence templates (JSON or YAML)
    #[arg(long, value_name = "PATH")]
    pub templates: Option<PathBuf>,

    /// Calibration table (JSON or YAML)
    #[arg(long, value_name = "PATH")]
    pub table: Option<PathBuf>,
}

impl InputPaths {
    /// Fill unset paths from the engine configuration.
    pub fn with_defaults(mut self, config: &EngineConfig) -> Self {
        self.execution_log = self.execution_log.or_else(|| config.execution_log.clone());
        self.templates = self.templates.or_else(|| config.templates.clone());
        self.table = self.table.or_else(|| config.calibration_table.clone());
        self
    }

    pub fn snapshot(&self) -> Result<ExecutionSnapshot> {
        match &self.execution_log {
            Some(path) if path.exists() => ExecutionSnapshot::load(path)
                .with_context(|| format!("Failed to load execution log {}", path.display())),
            Some(path) => {
                tracing::info!(path = %path.display(), "Execution log not found, starting empty");
                Ok(ExecutionSnapshot::default())
            }
            None => Ok(ExecutionSnapshot::default()),
        }
    }

    pub fn store(&self) -> Result<EventStore> {
        EventStore::from_snapshot(self.snapshot()?).context("Execution log is inconsistent")
    }

    pub fn templates(&self) -> Result<TemplateSet> {
        let path = self
            .templates
            .as_deref()
            .context("No templates given (use --templates or SEQEXEC_TEMPLATES)")?;
        TemplateSet::load(path)
            .with_context(|| format!("Failed to load templates {}", path.display()))
    }

    /// The calibration table, or an empty one when none is configured.
    pub fn table(&self) -> Result<CalibrationTable> {
        match &self.table {
            Some(path) => CalibrationTable::load(path)
                .with_context(|| format!("Failed to load calibration table {}", path.display())),
            None => {
                tracing::warn!("No calibration table configured, smart calibrations will fail");
                Ok(CalibrationTable::empty())
            }
        }
    }

    pub fn require_log(&self) -> Result<&Path> {
        self.execution_log
            .as_deref()
            .context("No execution log given (use --log or SEQEXEC_EXECUTION_LOG)")
    }
}

/// Records and events to add to an execution log, applied in field order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recording {
    #[serde(default)]
    pub visits: Vec<VisitRecord>,
    #[serde(default)]
    pub atoms: Vec<AtomRecord>,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
    #[serde(default)]
    pub datasets: Vec<DatasetRecord>,
    #[serde(default)]
    pub events: Vec<NewEvent>,
    #[serde(default)]
    pub acquisition_resets: Vec<AcquisitionReset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionReset {
    pub observation_id: ObservationId,
    pub at: chrono::DateTime<chrono::Utc>,
}

impl Recording {
    pub fn load(path: &Path) -> Result<Self> {
        load_document(path).with_context(|| format!("Failed to load recording {}", path.display()))
    }

    /// Apply to the store, stopping at the first rejected entry.
    pub async fn apply(self, store: &EventStore) -> Result<usize> {
        let mut applied = 0;
        for visit in self.visits {
            store.record_visit(visit).await?;
            applied += 1;
        }
        for atom in self.atoms {
            // Steps are attached by `record_step`.
            store.record_atom(AtomRecord { steps: Vec::new(), ..atom }).await?;
            applied += 1;
        }
        for step in self.steps {
            store.record_step(step).await?;
            applied += 1;
        }
        for dataset in self.datasets {
            store.record_dataset(dataset).await?;
            applied += 1;
        }
        applied += store.append_all(self.events).await?.len();
        for reset in self.acquisition_resets {
            store
                .reset_acquisition(reset.observation_id, reset.at)
                .await?;
            applied += 1;
        }
        Ok(applied)
    }
}

/// Write a snapshot next to `path` and move it into place.
pub fn save_snapshot(path: &Path, snapshot: &ExecutionSnapshot) -> Result<()> {
    let rendered = render_document(snapshot, DocumentFormat::from_path(path))?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, rendered)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sequence_engine::model::{AtomStage, Instrument, SequenceType, VisitId};

    fn recording(obs: ObservationId) -> Recording {
        let visit = VisitRecord {
            id: VisitId::new(),
            observation_id: obs,
            instrument: Instrument::GmosNorth,
        };
        let atom = AtomRecord {
            id: sequence_engine::model::AtomId::new(),
            visit_id: visit.id,
            sequence_type: SequenceType::Acquisition,
            steps: vec![],
        };
        let at = chrono::DateTime::parse_from_rfc3339("2024-05-01T22:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        Recording {
            events: vec![NewEvent::atom(atom.id, AtomStage::StartAtom, at)],
            visits: vec![visit],
            atoms: vec![atom],
            ..Recording::default()
        }
    }

    #[tokio::test]
    async fn test_recording_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log.json");
        let paths = InputPaths {
            execution_log: Some(log.clone()),
            ..InputPaths::default()
        };

        let store = paths.store().unwrap();
        let applied = recording(ObservationId::new()).apply(&store).await.unwrap();
        assert_eq!(applied, 3);
        save_snapshot(&log, &*store.snapshot().await).unwrap();

        let reloaded = paths.snapshot().unwrap();
        assert_eq!(reloaded.visits.len(), 1);
        assert_eq!(reloaded.events.len(), 1);
        assert!(!log.with_extension("tmp").exists());
    }

    #[test]
    fn test_missing_templates_path_is_reported() {
        let err = InputPaths::default().templates().unwrap_err();
        assert!(err.to_string().contains("--templates"));
    }

    #[test]
    fn test_config_fallbacks() {
        let config = EngineConfig {
            templates: Some(PathBuf::from("t.yaml")),
            ..EngineConfig::default()
        };
        let paths = InputPaths {
            table: Some(PathBuf::from("cli.yaml")),
            ..InputPaths::default()
        }
        .with_defaults(&config);
        assert_eq!(paths.templates, Some(PathBuf::from("t.yaml")));
        assert_eq!(paths.table, Some(PathBuf::from("cli.yaml")));
        assert!(paths.execution_log.is_none());
    }
}
