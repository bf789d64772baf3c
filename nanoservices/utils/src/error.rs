use std::fmt::Display;

use arrow::error::ArrowError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Extraction Error: {0}")]
    Extraction(String),

    #[error("Transformation Error: {0}")]
    Transformation(String),

    #[error("Materialization Error at {location}: {reason}")]
    Materialization { location: String, reason: String },

    #[error("Materialization Not Found: {0}")]
    MaterializationNotFound(String),

    #[error("Load Error for {target}: {reason}")]
    Load { target: String, reason: String },

    #[error("Arrow Error: {0}")]
    ArrowDataError(#[from] ArrowError),

    #[error("Io Error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failure classification reported per asset in a run outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ExtractionError,
    TransformationError,
    MaterializationError,
    MaterializationNotFoundError,
    LoadError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ExtractionError => "ExtractionError",
            ErrorKind::TransformationError => "TransformationError",
            ErrorKind::MaterializationError => "MaterializationError",
            ErrorKind::MaterializationNotFoundError => "MaterializationNotFoundError",
            ErrorKind::LoadError => "LoadError",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn extraction(cause: impl Display) -> Self {
        Error::Extraction(cause.to_string())
    }

    pub fn transformation(cause: impl Display) -> Self {
        Error::Transformation(cause.to_string())
    }

    pub fn materialization(location: impl Into<String>, cause: impl Display) -> Self {
        Error::Materialization { location: location.into(), reason: cause.to_string() }
    }

    pub fn load(target: impl Into<String>, cause: impl Display) -> Self {
        Error::Load { target: target.into(), reason: cause.to_string() }
    }

    /// Arrow errors surface from table manipulation, io errors from storage.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Extraction(_) => ErrorKind::ExtractionError,
            Error::Transformation(_) | Error::ArrowDataError(_) => ErrorKind::TransformationError,
            Error::Materialization { .. } | Error::IoError(_) => ErrorKind::MaterializationError,
            Error::MaterializationNotFound(_) => ErrorKind::MaterializationNotFoundError,
            Error::Load { .. } => ErrorKind::LoadError,
        }
    }

    /// Reclassify a generic (arrow / io) error under the kind of the phase it
    /// surfaced in. Already classified errors keep their kind.
    pub fn within(self, kind: ErrorKind, context: &str) -> Self {
        match self {
            Error::ArrowDataError(_) | Error::IoError(_) => {
                let cause = self.to_string();
                match kind {
                    ErrorKind::ExtractionError => Error::Extraction(cause),
                    ErrorKind::TransformationError => Error::Transformation(cause),
                    ErrorKind::MaterializationError => Error::materialization(context, cause),
                    ErrorKind::MaterializationNotFoundError => {
                        Error::MaterializationNotFound(context.to_string())
                    }
                    ErrorKind::LoadError => Error::load(context, cause),
                }
            }
            other => other,
        }
    }
}
