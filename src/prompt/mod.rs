//! Prompt templates: versioned lookup and rendering.

pub mod composer;
pub mod registry;

pub use composer::PromptComposer;
pub use registry::{TemplateEntry, TemplateRegistry, TemplateVersion};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template base directory '{0}' not found")]
    MissingBaseDir(PathBuf),

    #[error("error reading template '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template '{category}/{name}' ({version}) not found")]
    NotFound {
        category: String,
        name: String,
        version: TemplateVersion,
    },

    #[error("version must be an integer or 'latest', got '{0}'")]
    InvalidVersion(String),

    #[error("failed to render template: {0}")]
    Render(#[source] minijinja::Error),

    #[error(transparent)]
    Pattern(#[from] regex::Error),
}
