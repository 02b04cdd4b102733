//! Engine configuration.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{EngineError, EngineResult};
use crate::model::FutureLimit;

/// Engine configuration loaded from environment variables.
///
/// Environment variables are prefixed with `SEQEXEC_`:
/// - `SEQEXEC_DEFAULT_FUTURE_LIMIT`: lookahead used when a request gives none (default: 25)
/// - `SEQEXEC_SLOW_GENERATION_MS`: generation time above which a warning is logged (default: 100)
/// - `SEQEXEC_CALIBRATION_TABLE`: path of the calibration table document (optional)
/// - `SEQEXEC_TEMPLATES`: path of the sequence template document (optional)
/// - `SEQEXEC_EXECUTION_LOG`: path of the execution log snapshot (optional)
/// - `SEQEXEC_LOG_JSON`: emit JSON log lines (default: false)
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Lookahead used when the caller does not provide one.
    #[serde(default = "default_future_limit")]
    pub default_future_limit: i64,

    /// Generation slower than this is reported at `warn`.
    #[serde(default = "default_slow_generation_ms")]
    pub slow_generation_ms: u64,

    /// Calibration table document.
    #[serde(default)]
    pub calibration_table: Option<PathBuf>,

    /// Sequence template document.
    #[serde(default)]
    pub templates: Option<PathBuf>,

    /// Execution log snapshot document.
    #[serde(default)]
    pub execution_log: Option<PathBuf>,

    /// Emit JSON log lines.
    #[serde(default)]
    pub log_json: bool,
}

fn default_future_limit() -> i64 {
    25
}

fn default_slow_generation_ms() -> u64 {
    100
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables are prefixed with `SEQEXEC_`.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("SEQEXEC_").from_env::<EngineConfig>()
    }

    /// Check values that `envy` cannot constrain on its own.
    pub fn validate(&self) -> EngineResult<()> {
        FutureLimit::try_from(self.default_future_limit).map_err(|e| {
            EngineError::Validation(format!("SEQEXEC_DEFAULT_FUTURE_LIMIT: {e}"))
        })?;
        Ok(())
    }

    /// The lookahead to use for a request, falling back to the default.
    pub fn future_limit(&self, requested: Option<i64>) -> EngineResult<FutureLimit> {
        FutureLimit::try_from(requested.unwrap_or(self.default_future_limit))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_future_limit: default_future_limit(),
            slow_generation_ms: default_slow_generation_ms(),
            calibration_table: None,
            templates: None,
            execution_log: None,
            log_json: false,
        }
    }
}
