//! Error types for the sequence engine.
//!
//! Every failure is surfaced as a typed [`EngineError`]. "Nothing to show"
//! situations (no interval yet, exhausted sequence) are modelled with
//! `Option` instead and never reach this module.

use thiserror::Error;

use crate::calibration::UnmatchedCalibration;

/// Engine-level errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Bad input parameters, rejected before any computation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The observation lacks a usable instrument mode or template.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No calibration table row matched the requested configuration.
    #[error("Calibration lookup error: {0}")]
    CalibrationLookup(Box<UnmatchedCalibration>),

    /// Upstream service (exposure time calculator) failure, passed through.
    #[error("Remote service error: {0}")]
    RemoteService(String),

    /// Inconsistent reference data, detected at load time.
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// Referenced subject does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Parse error (YAML, JSON, etc.)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error while reading documents
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment configuration error
    #[error("Environment configuration error: {0}")]
    Config(#[from] envy::Error),
}

impl EngineError {
    /// Whether the error is caused by the request or its inputs rather than
    /// by the engine or its collaborators.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_)
                | EngineError::Configuration(_)
                | EngineError::CalibrationLookup(_)
                | EngineError::NotFound(_)
        )
    }
}

impl From<UnmatchedCalibration> for EngineError {
    fn from(err: UnmatchedCalibration) -> Self {
        EngineError::CalibrationLookup(Box::new(err))
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        EngineError::Parse(err.to_string())
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::RemoteService(err.to_string())
    }
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;
