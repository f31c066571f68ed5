//! Pipeline error types

use itl_core::ItlError;
use thiserror::Error;

use crate::run::SyncStep;

/// Errors raised by the bulk pipeline and the image store
#[derive(Error, Debug)]
pub enum SyncError {
    /// Malformed JSON or archive, missing or duplicated manifest
    #[error("Invalid payload: {0}")]
    Structural(String),

    /// Well-formed input that cannot be applied (count mismatch, bad target id)
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error(transparent)]
    Store(#[from] ItlError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure after mutations began; `step` is the last completed step
    #[error("Run interrupted after step {step}: {source}")]
    Interrupted {
        step: SyncStep,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural(message.into())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    /// The underlying error, looking through `Interrupted`
    pub fn root(&self) -> &SyncError {
        match self {
            Self::Interrupted { source, .. } => source.root(),
            other => other,
        }
    }

    /// Last completed step, if the run got past validation
    pub fn step(&self) -> Option<SyncStep> {
        match self {
            Self::Interrupted { step, .. } => Some(*step),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Structural(format!("Malformed JSON: {err}"))
    }
}

impl From<zip::result::ZipError> for SyncError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Self::Io(e),
            other => Self::Structural(format!("Malformed archive: {other}")),
        }
    }
}
