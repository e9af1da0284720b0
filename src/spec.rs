//! Unified API specification consumed by the generation pipeline.
//!
//! Documents with an `openapi` or `swagger` key are normalized into the
//! unified shape (title, version, ordered endpoints). Anything else must
//! already be unified.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const METHODS: [&str; 8] = [
    "get", "post", "put", "delete", "patch", "options", "head", "trace",
];

#[derive(Debug, Error)]
pub enum SpecIngestionError {
    #[error("specification file '{0}' not found")]
    NotFound(PathBuf),

    #[error("unsupported specification format '{0}' (expected .json, .yaml or .yml)")]
    UnsupportedFormat(String),

    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("specification is not in unified form: {0}")]
    Shape(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub path: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedSpec {
    pub title: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

fn default_version() -> String {
    "unknown".to_string()
}

impl UnifiedSpec {
    pub fn new(title: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            version: version.into(),
            endpoints: Vec::new(),
        }
    }

    pub fn with_endpoint(mut self, method: &str, path: &str) -> Self {
        self.endpoints.push(Endpoint {
            path: path.to_string(),
            method: method.to_uppercase(),
            description: None,
        });
        self
    }

    /// Load a spec file (.json, .yaml, .yml) and normalize it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SpecIngestionError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SpecIngestionError::NotFound(path.to_path_buf()));
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let content = fs::read_to_string(path).map_err(|source| SpecIngestionError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let document: Value = match ext.as_str() {
            "json" => serde_json::from_str(&content).map_err(|e| SpecIngestionError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?,
            "yaml" | "yml" => {
                serde_yaml::from_str(&content).map_err(|e| SpecIngestionError::Parse {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?
            }
            other => return Err(SpecIngestionError::UnsupportedFormat(other.to_string())),
        };

        debug!("Loaded specification document from {}", path.display());
        Self::from_document(document)
    }

    /// Normalize a parsed document into a `UnifiedSpec`.
    pub fn from_document(document: Value) -> Result<Self, SpecIngestionError> {
        if document.get("openapi").is_some() || document.get("swagger").is_some() {
            return Ok(Self::from_openapi(&document));
        }

        serde_json::from_value(document).map_err(|e| SpecIngestionError::Shape(e.to_string()))
    }

    fn from_openapi(document: &Value) -> Self {
        let info = document.get("info");
        let title = info
            .and_then(|i| i.get("title"))
            .and_then(Value::as_str)
            .unwrap_or("Untitled API")
            .to_string();
        let version = info
            .and_then(|i| i.get("version"))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(default_version);

        let mut endpoints = Vec::new();
        if let Some(Value::Object(paths)) = document.get("paths") {
            for (path, item) in paths {
                let Value::Object(operations) = item else {
                    continue;
                };
                for (method, operation) in operations {
                    if !METHODS.contains(&method.to_ascii_lowercase().as_str()) {
                        continue;
                    }
                    let description = operation
                        .get("summary")
                        .or_else(|| operation.get("description"))
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    endpoints.push(Endpoint {
                        path: path.clone(),
                        method: method.to_uppercase(),
                        description,
                    });
                }
            }
        }

        Self {
            title,
            version,
            endpoints,
        }
    }
}
