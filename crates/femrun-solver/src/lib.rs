//! Staged solver runs over the CalculiX and Elmer backends.
//!
//! This crate provides:
//! - **Stages**: PREPARE, CHECK, RUN and RESULTS with per-stage status
//! - **Backends**: deck and script writers plus process drivers for CalculiX
//!   and Elmer behind the [`SolverBackend`] trait
//! - **Run machine**: a worker thread per run with `start`/`join`,
//!   cancellation and a serializable [`RunReport`]
//! - **Batch runs**: several job directories in parallel on rayon
//! - **Runner configuration**: external program names and limits
//!
//! ```no_run
//! use femrun_model::{Analysis, BackendKind};
//! use femrun_solver::{RunMachine, Stage};
//!
//! # fn main() -> femrun_solver::Result<()> {
//! let analysis = Analysis::from_json(&std::fs::read_to_string("box.json")?)?;
//! let mut machine = RunMachine::new(&analysis, BackendKind::Calculix, "jobs/box")?;
//! machine.set_target(Stage::Prepare)?;
//! machine.start()?;
//! let report = machine.join()?;
//! println!("{:?}", report.state);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod batch;
pub mod config;
pub mod error;
pub mod format;
pub mod machine;
pub mod process;
pub mod stage;

pub use backend::{
    CalculixBackend, ElmerBackend, PeakDisplacement, ResultSummary, SolverBackend, StageContext,
    StageOutput, backend_for,
};
pub use batch::{BatchRequest, run_batch};
pub use config::RunnerConfig;
pub use error::{ErrorKind, Result, RunError};
pub use machine::{CancelToken, Failure, RunMachine, RunReport, StageRecord};
pub use stage::{MachineState, Stage, StageStatus};
