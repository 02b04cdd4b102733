//! Sequence Engine CLI
//!
//! Works on execution log snapshots stored as JSON or YAML documents:
//! records visits, atoms, steps and events, reports execution state and
//! generates what remains of an observation's sequence.

mod inputs;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inputs::{save_snapshot, InputPaths, Recording};
use sequence_engine::calibration::CalibrationKey;
use sequence_engine::document::{load_document, render_document, DocumentFormat};
use sequence_engine::model::{
    AtomId, DatasetId, InstrumentConfig, ObservationId, SmartGcalType, StepId, Subject, VisitId,
};
use sequence_engine::{EngineConfig, EngineError, SequenceService, StaticTemplateSource};

#[derive(Parser)]
#[command(name = "seqctl")]
#[command(version, about = "Observation sequence engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "yaml")]
    output: OutputFormat,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the remaining acquisition and science sequences
    Generate {
        /// Observation id
        #[arg(value_name = "OBSERVATION")]
        observation: ObservationId,

        /// Atoms to list after the next one (0-100)
        #[arg(short = 'n', long, allow_negative_numbers = true)]
        future_limit: Option<i64>,

        #[command(flatten)]
        paths: InputPaths,
    },

    /// Show the execution state of a visit, atom, step or dataset
    State {
        #[arg(value_enum)]
        kind: SubjectKind,

        /// Subject id
        id: String,

        #[command(flatten)]
        paths: InputPaths,
    },

    /// Raw time accounting of a visit
    Summary {
        /// Visit id
        visit: VisitId,

        #[command(flatten)]
        paths: InputPaths,
    },

    /// Look up calibration steps for an instrument configuration
    Lookup {
        /// Instrument configuration document (JSON or YAML)
        #[arg(long, value_name = "PATH")]
        config: PathBuf,

        /// Restrict to one calibration kind
        #[arg(long, value_enum)]
        kind: Option<CalibrationKind>,

        #[command(flatten)]
        paths: InputPaths,
    },

    /// Add records and events to the execution log
    Record {
        /// Recording document (JSON or YAML)
        #[arg(value_name = "PATH")]
        recording: PathBuf,

        #[command(flatten)]
        paths: InputPaths,
    },

    /// Check the execution log, templates and calibration table
    Validate {
        #[command(flatten)]
        paths: InputPaths,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

impl From<OutputFormat> for DocumentFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => DocumentFormat::Json,
            OutputFormat::Yaml => DocumentFormat::Yaml,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SubjectKind {
    Visit,
    Atom,
    Step,
    Dataset,
}

impl SubjectKind {
    fn subject(self, id: &str) -> Result<Subject> {
        let parsed = match self {
            SubjectKind::Visit => id.parse::<VisitId>().map(Subject::Visit),
            SubjectKind::Atom => id.parse::<AtomId>().map(Subject::Atom),
            SubjectKind::Step => id.parse::<StepId>().map(Subject::Step),
            SubjectKind::Dataset => id.parse::<DatasetId>().map(Subject::Dataset),
        };
        let subject = parsed.map_err(|e| {
            EngineError::Validation(format!("invalid {:?} id '{}': {}", self, id, e))
        })?;
        Ok(subject)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CalibrationKind {
    Arc,
    Flat,
    DayBaseline,
    NightBaseline,
}

impl From<CalibrationKind> for SmartGcalType {
    fn from(kind: CalibrationKind) -> Self {
        match kind {
            CalibrationKind::Arc => SmartGcalType::Arc,
            CalibrationKind::Flat => SmartGcalType::Flat,
            CalibrationKind::DayBaseline => SmartGcalType::DayBaseline,
            CalibrationKind::NightBaseline => SmartGcalType::NightBaseline,
        }
    }
}

/// Initialize tracing/logging.
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,sequence_engine=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    let rendered = render_document(value, format.into())?;
    println!("{}", rendered.trim_end());
    Ok(())
}

#[derive(Serialize)]
struct ValidationReport {
    execution_log: Option<String>,
    templates: Option<String>,
    calibration_table: Option<String>,
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = EngineConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Failed to load engine config, using defaults: {e}");
        EngineConfig::default()
    });
    init_tracing(cli.log_json || config.log_json);

    if let Err(e) = run(cli, config).await {
        eprintln!("Error: {e:#}");
        // Bad requests and inputs exit with 2, engine failures with 1.
        let user_error = e
            .downcast_ref::<EngineError>()
            .is_some_and(EngineError::is_user_error);
        std::process::exit(if user_error { 2 } else { 1 });
    }
}

async fn run(cli: Cli, config: EngineConfig) -> Result<()> {
    config.validate()?;

    match cli.command {
        Commands::Generate {
            observation,
            future_limit,
            paths,
        } => {
            let paths = paths.with_defaults(&config);
            let service = SequenceService::new(
                Arc::new(paths.store()?),
                Arc::new(StaticTemplateSource::new(paths.templates()?)?),
                Arc::new(paths.table()?),
                config,
            );
            let sequence = service.generate(observation, future_limit).await?;
            print(&sequence, cli.output)?;
        }
        Commands::State { kind, id, paths } => {
            let subject = kind.subject(&id)?;
            let service = offline_service(paths.with_defaults(&config), config)?;
            print(&service.status(subject).await?, cli.output)?;
        }
        Commands::Summary { visit, paths } => {
            let service = offline_service(paths.with_defaults(&config), config)?;
            print(&service.visit_summary(visit).await?, cli.output)?;
        }
        Commands::Lookup {
            config: config_path,
            kind,
            paths,
        } => {
            let paths = paths.with_defaults(&config);
            let instrument_config: InstrumentConfig = load_document(&config_path)
                .with_context(|| format!("Failed to load {}", config_path.display()))?;
            let table = paths.table()?;
            let key = CalibrationKey::from_config(&instrument_config)?;
            let wavelength = instrument_config.wavelength();
            let steps = match kind {
                Some(kind) => table.resolve_kind(&key, wavelength, kind.into()),
                None => table.resolve(&key, wavelength),
            }
            .map_err(EngineError::from)?;
            print(&steps, cli.output)?;
        }
        Commands::Record { recording, paths } => {
            let paths = paths.with_defaults(&config);
            let log = paths.require_log()?.to_path_buf();
            let store = paths.store()?;
            let applied = Recording::load(&recording)?.apply(&store).await?;
            save_snapshot(&log, &*store.snapshot().await)?;
            tracing::info!(applied, log = %log.display(), "Recording applied");
            println!("Applied {} entries to {}", applied, log.display());
        }
        Commands::Validate { paths } => {
            let paths = paths.with_defaults(&config);
            let mut report = ValidationReport {
                execution_log: None,
                templates: None,
                calibration_table: None,
            };
            if paths.execution_log.is_some() {
                let snapshot = paths.snapshot()?;
                snapshot.validate()?;
                report.execution_log = Some(format!(
                    "{} visits, {} atoms, {} steps, {} events",
                    snapshot.visits.len(),
                    snapshot.atoms.len(),
                    snapshot.steps.len(),
                    snapshot.events.len()
                ));
            }
            if paths.templates.is_some() {
                let set = paths.templates()?;
                report.templates = Some(format!("{} observations", set.templates.len()));
            }
            if paths.table.is_some() {
                let table = paths.table()?;
                report.calibration_table =
                    Some(format!("version {}, {} rows", table.version(), table.rows().len()));
            }
            print(&report, cli.output)?;
        }
    }

    Ok(())
}

/// Service for read-only queries that need neither templates nor a table.
fn offline_service(paths: InputPaths, config: EngineConfig) -> Result<SequenceService> {
    Ok(SequenceService::new(
        Arc::new(paths.store()?),
        Arc::new(StaticTemplateSource::default()),
        Arc::new(sequence_engine::CalibrationTable::empty()),
        config,
    ))
}
