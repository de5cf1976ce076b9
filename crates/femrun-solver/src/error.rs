//! Error types for femrun-solver

use femrun_io::IoError;
use femrun_model::{BackendKind, ModelError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stage::Stage;

pub type Result<T> = std::result::Result<T, RunError>;

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error("machine has already been started")]
    AlreadyStarted,

    #[error("join called before start")]
    JoinBeforeStart,

    #[error("stage {stage} is not declared by the {backend} backend")]
    StageNotDeclared { stage: Stage, backend: BackendKind },

    #[error("missing artifact {name}: {reason}")]
    MissingArtifact { name: String, reason: String },

    #[error("{program} failed: {reason}")]
    SolverProcess { program: String, reason: String },

    #[error("run was cancelled")]
    Cancelled,

    #[error("worker thread panicked: {0}")]
    WorkerPanicked(String),

    #[error("invalid runner configuration: {0}")]
    InvalidConfig(String),
}

/// Copyable classification of a [`RunError`] for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    IncompleteModel,
    UnsupportedOption,
    ReferenceResolution,
    InvalidModel,
    Io,
    OutsideJobDirectory,
    DirectoryClaimed,
    PartialWrite,
    AlreadyStarted,
    JoinBeforeStart,
    StageNotDeclared,
    MissingArtifact,
    SolverProcess,
    Cancelled,
    WorkerPanicked,
    InvalidConfig,
}

impl RunError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunError::Model(err) => match err {
                ModelError::IncompleteModel { .. } => ErrorKind::IncompleteModel,
                ModelError::UnsupportedOption { .. } => ErrorKind::UnsupportedOption,
                ModelError::ReferenceResolution { .. } => ErrorKind::ReferenceResolution,
                _ => ErrorKind::InvalidModel,
            },
            RunError::Io(err) => match err {
                IoError::OutsideJobDirectory { .. } => ErrorKind::OutsideJobDirectory,
                IoError::DirectoryClaimed { .. } => ErrorKind::DirectoryClaimed,
                IoError::PartialWrite { .. } => ErrorKind::PartialWrite,
                IoError::Io(_) | IoError::Json(_) => ErrorKind::Io,
            },
            RunError::AlreadyStarted => ErrorKind::AlreadyStarted,
            RunError::JoinBeforeStart => ErrorKind::JoinBeforeStart,
            RunError::StageNotDeclared { .. } => ErrorKind::StageNotDeclared,
            RunError::MissingArtifact { .. } => ErrorKind::MissingArtifact,
            RunError::SolverProcess { .. } => ErrorKind::SolverProcess,
            RunError::Cancelled => ErrorKind::Cancelled,
            RunError::WorkerPanicked(_) => ErrorKind::WorkerPanicked,
            RunError::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }

    pub(crate) fn missing(name: impl Into<String>, reason: impl Into<String>) -> Self {
        RunError::MissingArtifact {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for RunError {
    fn from(err: std::io::Error) -> Self {
        RunError::Io(IoError::Io(err))
    }
}
