//! JSON / YAML document loading.
//!
//! Snapshots, calibration tables and template sets are all plain serde
//! documents; the format is picked from the file extension.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{EngineError, EngineResult};

/// Supported document encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    /// `.json` is JSON; `.yaml`, `.yml` and anything else is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => DocumentFormat::Json,
            _ => DocumentFormat::Yaml,
        }
    }
}

/// Parse a document from a string.
pub fn parse_document<T: DeserializeOwned>(content: &str, format: DocumentFormat) -> EngineResult<T> {
    match format {
        DocumentFormat::Json => {
            serde_json::from_str(content).map_err(|e| EngineError::Parse(e.to_string()))
        }
        DocumentFormat::Yaml => Ok(serde_yaml::from_str(content)?),
    }
}

/// Read and parse a document from disk.
pub fn load_document<T: DeserializeOwned>(path: &Path) -> EngineResult<T> {
    let content = std::fs::read_to_string(path)?;
    parse_document(&content, DocumentFormat::from_path(path)).map_err(|e| match e {
        EngineError::Parse(msg) => EngineError::Parse(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Render a value in the given format.
pub fn render_document<T: Serialize>(value: &T, format: DocumentFormat) -> EngineResult<String> {
    match format {
        DocumentFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        DocumentFormat::Yaml => Ok(serde_yaml::to_string(value)?),
    }
}
