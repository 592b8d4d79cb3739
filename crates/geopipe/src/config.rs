//! Configuration document types.
//!
//! A job document has two ordered lists: `operations` (transform steps) and
//! `outputs` (artifacts to produce). Each entry is a descriptor with a
//! mandatory `type` tag; the remaining keys are operator- or
//! generator-specific and are captured raw here, then parsed into the
//! implementation's own typed config when the registry constructs it.
//! Descriptors are parsed once at build time and immutable afterwards.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProcessingError, Result};

/// Raw descriptor parameters (everything except the `type` tag).
pub type Params = serde_json::Map<String, Value>;

/// Top-level job document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobConfig {
    /// Transform steps, applied in order.
    #[serde(default)]
    pub operations: Vec<OperationSpec>,

    /// Artifacts to produce from the transformed dataset.
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
}

impl JobConfig {
    /// Load a job document from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse a job document from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// One transform step: a `type` tag plus operator-specific parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSpec {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(flatten)]
    pub params: Params,
}

/// One artifact: a `type` tag, a destination path, and generator-specific
/// rendering parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSpec {
    #[serde(rename = "type")]
    pub kind: String,

    /// Destination file; parent directories are created on demand.
    pub path: PathBuf,

    #[serde(flatten)]
    pub params: Params,
}

/// Parse raw descriptor parameters into a typed config.
pub fn parse_params<T: DeserializeOwned>(kind: &str, params: &Params) -> Result<T> {
    serde_json::from_value(Value::Object(params.clone()))
        .map_err(|e| ProcessingError::InvalidConfig(format!("'{kind}' descriptor: {e}")))
}
