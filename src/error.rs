use std::path::PathBuf;
use thiserror::Error;

use crate::symbolic::ParseError;

/// Observability analysis error types
#[derive(Error, Debug)]
pub enum NoaError {
    #[error("Expression parse error in '{text}': {source}")]
    Parse {
        text: String,
        #[source]
        source: ParseError,
    },

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Unknown option value: {0}")]
    UnknownOption(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Configuration source must be a JSON object: {0}")]
    ConfigFormat(PathBuf),

    #[error("Analysis has not been run yet")]
    NotAnalyzed,
}

/// Result type for analysis operations
pub type NoaResult<T> = Result<T, NoaError>;

impl NoaError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        NoaError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        NoaError::Json {
            path: path.into(),
            source,
        }
    }
}
