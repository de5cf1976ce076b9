//! Parallel runs of one analysis into several job directories.

use std::path::PathBuf;

use femrun_model::{Analysis, BackendKind};
use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::RunnerConfig;
use crate::error::Result;
use crate::machine::{RunMachine, RunReport};
use crate::stage::Stage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub backend: BackendKind,
    pub job_dir: PathBuf,
    /// Last declared stage when omitted
    #[serde(default)]
    pub target: Option<Stage>,
}

impl BatchRequest {
    pub fn new(backend: BackendKind, job_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            job_dir: job_dir.into(),
            target: None,
        }
    }

    pub fn with_target(mut self, target: Stage) -> Self {
        self.target = Some(target);
        self
    }
}

/// Run every request on the rayon pool. Results keep the request order; a
/// request that cannot even construct its machine (for example because two
/// requests name the same directory) yields its error in place.
pub fn run_batch(
    analysis: &Analysis,
    requests: &[BatchRequest],
    config: &RunnerConfig,
) -> Vec<Result<RunReport>> {
    info!("batch of {} run(s)", requests.len());
    requests
        .par_iter()
        .map(|request| {
            let mut machine = RunMachine::new(analysis, request.backend, &request.job_dir)?
                .with_config(config.clone());
            if let Some(target) = request.target {
                machine.set_target(target)?;
            }
            machine.start()?;
            machine.join()
        })
        .collect()
}
