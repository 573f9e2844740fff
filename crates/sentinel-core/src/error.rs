//! Error types for Sentinel content deployment.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("deployment failed: {0}")]
    DeploymentFailed(String),
}

/// Errors raised while reading or pre-processing a template file.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("template root in {0} is not a JSON object")]
    NotAnObject(PathBuf),

    #[error("invalid parameters section: {0}")]
    InvalidParameters(String),
}

pub type Result<T> = std::result::Result<T, Error>;
