//! Capability interface shared by the solver backends.

use femrun_io::JobDirectory;
use femrun_model::{BackendKind, Snapshot};
use serde::{Deserialize, Serialize};

use crate::config::RunnerConfig;
use crate::error::Result;
use crate::machine::CancelToken;
use crate::stage::Stage;

/// Everything a stage action may read. The job directory is the only place
/// it may write.
pub struct StageContext<'a> {
    pub snapshot: &'a Snapshot,
    pub job_dir: &'a JobDirectory,
    pub config: &'a RunnerConfig,
    pub cancel: &'a CancelToken,
}

/// Node with the largest displacement magnitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakDisplacement {
    pub node: u32,
    /// Magnitude in mesh units (mm)
    pub magnitude: f64,
}

/// What a RESULTS stage found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    /// Result files read or collected, relative to the job directory
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_displacement: Option<PeakDisplacement>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutput {
    /// Files the stage wrote, relative to the job directory
    pub files: Vec<String>,
    pub results: Option<ResultSummary>,
}

impl StageOutput {
    pub fn files(files: Vec<String>) -> Self {
        Self {
            files,
            results: None,
        }
    }
}

/// A solver program and its file conventions.
pub trait SolverBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Stages this backend implements, in execution order.
    fn declared_stages(&self) -> &[Stage];

    /// Perform `stage`. Writers must be deterministic for a given snapshot.
    fn write_stage(&self, stage: Stage, ctx: &StageContext<'_>) -> Result<StageOutput>;
}
