//! Error types for femrun-io

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IoError>;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path '{path}' escapes the job directory")]
    OutsideJobDirectory { path: String },

    #[error("job directory {} is already claimed by another run", path.display())]
    DirectoryClaimed { path: PathBuf },

    #[error("partial write ({reason}): expected {expected:?}, present {present:?}")]
    PartialWrite {
        expected: Vec<String>,
        present: Vec<String>,
        reason: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
