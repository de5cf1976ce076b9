//! The run machine.
//!
//! A [`RunMachine`] binds one analysis snapshot, one backend and one claimed
//! job directory. `start` hands the work to a worker thread which executes
//! the backend's declared stages in order up to the target; `join` waits for
//! it and returns the [`RunReport`]. Status is shared with the worker through
//! a mutex so `state` and `stage_status` can be polled while it runs.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use femrun_io::JobDirectory;
use femrun_model::{Analysis, BackendKind, Snapshot};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::backend::{ResultSummary, SolverBackend, StageContext, backend_for};
use crate::config::RunnerConfig;
use crate::error::{ErrorKind, Result, RunError};
use crate::stage::{MachineState, Stage, StageStatus};

/// Cooperative cancellation flag shared between a caller and a worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
    /// Files the stage wrote, relative to the job directory
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of one run. Holds no timestamps, so two runs of the same
/// analysis into equivalent directories report the same thing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub analysis: String,
    pub backend: BackendKind,
    pub job_dir: PathBuf,
    pub target: Stage,
    pub state: MachineState,
    pub stages: Vec<StageRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultSummary>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.state == MachineState::Completed
    }

    pub fn status(&self, stage: Stage) -> Option<StageStatus> {
        self.stages.iter().find(|r| r.stage == stage).map(|r| r.status)
    }
}

#[derive(Debug)]
struct Progress {
    state: MachineState,
    stages: Vec<StageRecord>,
    failure: Option<Failure>,
    results: Option<ResultSummary>,
}

impl Progress {
    fn new(stages: &[Stage]) -> Self {
        Self {
            state: MachineState::Idle,
            stages: stages
                .iter()
                .map(|&stage| StageRecord {
                    stage,
                    status: StageStatus::Pending,
                    files: Vec::new(),
                })
                .collect(),
            failure: None,
            results: None,
        }
    }

    fn set_status(&mut self, stage: Stage, status: StageStatus) {
        if let Some(record) = self.stages.iter_mut().find(|r| r.stage == stage) {
            record.status = status;
        }
    }

    fn skip_pending(&mut self) {
        for record in &mut self.stages {
            if record.status == StageStatus::Pending {
                record.status = StageStatus::Skipped;
            }
        }
    }

    fn fail(&mut self, stage: Stage, err: &RunError) {
        self.set_status(stage, StageStatus::Failed);
        self.skip_pending();
        self.state = MachineState::Failed;
        self.failure = Some(Failure {
            stage,
            kind: err.kind(),
            message: err.to_string(),
        });
    }
}

pub struct RunMachine {
    backend: Arc<dyn SolverBackend>,
    snapshot: Arc<Snapshot>,
    /// Held until `start` moves it into the worker
    job_dir: Option<JobDirectory>,
    job_path: PathBuf,
    config: RunnerConfig,
    target: Stage,
    progress: Arc<Mutex<Progress>>,
    cancel: CancelToken,
    handle: Option<JoinHandle<Option<RunError>>>,
    started: bool,
    outcome: Option<(RunReport, Option<RunError>)>,
}

impl RunMachine {
    /// Capture `analysis` and claim `job_dir` for a run with the built-in
    /// backend of `kind`. Nothing is written yet.
    pub fn new(analysis: &Analysis, kind: BackendKind, job_dir: impl AsRef<Path>) -> Result<Self> {
        Self::with_backend(analysis, backend_for(kind), job_dir)
    }

    pub fn with_backend(
        analysis: &Analysis,
        backend: Box<dyn SolverBackend>,
        job_dir: impl AsRef<Path>,
    ) -> Result<Self> {
        let snapshot = Snapshot::capture(analysis)?;
        let job_dir = JobDirectory::claim(job_dir)?;
        let backend: Arc<dyn SolverBackend> = Arc::from(backend);
        let stages = backend.declared_stages();
        let target = stages
            .last()
            .copied()
            .ok_or_else(|| RunError::InvalidConfig(format!("{} backend declares no stages", backend.kind())))?;
        let progress = Progress::new(stages);

        Ok(Self {
            job_path: job_dir.path().to_path_buf(),
            job_dir: Some(job_dir),
            snapshot: Arc::new(snapshot),
            config: RunnerConfig::default(),
            target,
            progress: Arc::new(Mutex::new(progress)),
            cancel: CancelToken::new(),
            handle: None,
            started: false,
            outcome: None,
            backend,
        })
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn set_target(&mut self, stage: Stage) -> Result<()> {
        if self.started {
            return Err(RunError::AlreadyStarted);
        }
        if !self.backend.declared_stages().contains(&stage) {
            return Err(RunError::StageNotDeclared {
                stage,
                backend: self.backend.kind(),
            });
        }
        self.target = stage;
        Ok(())
    }

    pub fn target(&self) -> Stage {
        self.target
    }

    pub fn backend(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn job_dir(&self) -> &Path {
        &self.job_path
    }

    pub fn state(&self) -> MachineState {
        self.progress.lock().state
    }

    /// `None` for a stage the backend does not declare.
    pub fn stage_status(&self, stage: Stage) -> Option<StageStatus> {
        self.progress
            .lock()
            .stages
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| r.status)
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// The error that ended a joined run, if it failed.
    pub fn error(&self) -> Option<&RunError> {
        self.outcome.as_ref().and_then(|(_, err)| err.as_ref())
    }

    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(RunError::AlreadyStarted);
        }
        let job_dir = self.job_dir.take().ok_or(RunError::AlreadyStarted)?;
        let worker = Worker {
            backend: Arc::clone(&self.backend),
            snapshot: Arc::clone(&self.snapshot),
            config: self.config.clone(),
            target: self.target,
            progress: Arc::clone(&self.progress),
            cancel: self.cancel.clone(),
        };

        let handle = thread::Builder::new()
            .name(format!("femrun-{}", self.backend.kind()))
            .spawn(move || worker.execute(job_dir))?;
        self.handle = Some(handle);
        self.started = true;
        Ok(())
    }

    /// Wait for the worker and return the report. Later calls return the
    /// same report without waiting.
    pub fn join(&mut self) -> Result<RunReport> {
        if let Some((report, _)) = &self.outcome {
            return Ok(report.clone());
        }
        let handle = self.handle.take().ok_or(RunError::JoinBeforeStart)?;
        let error = match handle.join() {
            Ok(error) => error,
            Err(payload) => {
                let err = RunError::WorkerPanicked(panic_message(payload.as_ref()));
                let mut progress = self.progress.lock();
                let stage = progress
                    .stages
                    .iter()
                    .find(|r| r.status == StageStatus::Running)
                    .map_or(self.target, |r| r.stage);
                progress.fail(stage, &err);
                Some(err)
            }
        };
        let report = self.report();
        self.outcome = Some((report.clone(), error));
        Ok(report)
    }

    fn report(&self) -> RunReport {
        let progress = self.progress.lock();
        RunReport {
            analysis: self.snapshot.analysis.clone(),
            backend: self.backend.kind(),
            job_dir: self.job_path.clone(),
            target: self.target,
            state: progress.state,
            stages: progress.stages.clone(),
            failure: progress.failure.clone(),
            results: progress.results.clone(),
        }
    }
}

struct Worker {
    backend: Arc<dyn SolverBackend>,
    snapshot: Arc<Snapshot>,
    config: RunnerConfig,
    target: Stage,
    progress: Arc<Mutex<Progress>>,
    cancel: CancelToken,
}

impl Worker {
    /// Runs on the worker thread. The job directory claim is released when
    /// `job_dir` drops at the end.
    fn execute(self, job_dir: JobDirectory) -> Option<RunError> {
        let kind = self.backend.kind();
        let ctx = StageContext {
            snapshot: &self.snapshot,
            job_dir: &job_dir,
            config: &self.config,
            cancel: &self.cancel,
        };

        for &stage in self.backend.declared_stages() {
            if stage > self.target {
                break;
            }
            let outcome = if self.cancel.is_cancelled() {
                Err(RunError::Cancelled)
            } else {
                {
                    let mut progress = self.progress.lock();
                    progress.state = stage.active_state();
                    progress.set_status(stage, StageStatus::Running);
                }
                info!("[{}] {} started", kind, stage);
                self.backend.write_stage(stage, &ctx)
            };

            match outcome {
                Ok(output) => {
                    let mut progress = self.progress.lock();
                    progress.state = stage.done_state();
                    if let Some(record) = progress.stages.iter_mut().find(|r| r.stage == stage) {
                        record.status = StageStatus::Done;
                        record.files = output.files;
                    }
                    if output.results.is_some() {
                        progress.results = output.results;
                    }
                    info!("[{}] {} done", kind, stage);
                }
                Err(err) => {
                    warn!("[{}] {} failed: {}", kind, stage, err);
                    self.progress.lock().fail(stage, &err);
                    return Some(err);
                }
            }
        }

        let mut progress = self.progress.lock();
        progress.skip_pending();
        progress.state = MachineState::Completed;
        debug!("[{}] completed in {}", kind, job_dir.path().display());
        None
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StageOutput;
    use femrun_io::{Artifact, is_claimed};

    /// Records the stages it is asked to run and fails or panics on request.
    struct Scripted {
        calls: Arc<Mutex<Vec<Stage>>>,
        fail_at: Option<Stage>,
        panic_at: Option<Stage>,
    }

    impl Scripted {
        fn new(calls: &Arc<Mutex<Vec<Stage>>>) -> Self {
            Self {
                calls: Arc::clone(calls),
                fail_at: None,
                panic_at: None,
            }
        }
    }

    impl SolverBackend for Scripted {
        fn kind(&self) -> BackendKind {
            BackendKind::Calculix
        }

        fn declared_stages(&self) -> &[Stage] {
            &[Stage::Prepare, Stage::Run, Stage::Results]
        }

        fn write_stage(&self, stage: Stage, ctx: &StageContext<'_>) -> Result<StageOutput> {
            self.calls.lock().push(stage);
            if self.panic_at == Some(stage) {
                panic!("scripted panic in {stage}");
            }
            if self.fail_at == Some(stage) {
                return Err(RunError::missing("input.txt", "scripted failure"));
            }
            let name = format!("{stage}.txt");
            ctx.job_dir.write_all(&[Artifact::new(name.clone(), stage.as_str())])?;
            Ok(StageOutput::files(vec![name]))
        }
    }

    fn machine(backend: Scripted, dir: &Path) -> RunMachine {
        RunMachine::with_backend(&Analysis::new("Analysis"), Box::new(backend), dir).expect("machine")
    }

    #[test]
    fn runs_declared_stages_up_to_target() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut machine = machine(Scripted::new(&calls), &tmp.path().join("job"));
        assert_eq!(machine.target(), Stage::Results);
        machine.set_target(Stage::Run).expect("target");
        machine.start().expect("start");
        let report = machine.join().expect("join");

        assert_eq!(*calls.lock(), vec![Stage::Prepare, Stage::Run]);
        assert_eq!(report.state, MachineState::Completed);
        assert_eq!(report.status(Stage::Results), Some(StageStatus::Skipped));
        assert_eq!(machine.stage_status(Stage::Check), None);
        assert_eq!(report.stages[0].files, vec!["prepare.txt"]);
        assert!(machine.error().is_none());
    }

    #[test]
    fn failure_skips_later_stages() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut backend = Scripted::new(&calls);
        backend.fail_at = Some(Stage::Run);
        let mut machine = machine(backend, &tmp.path().join("job"));
        machine.start().expect("start");
        let report = machine.join().expect("join");

        assert_eq!(report.state, MachineState::Failed);
        assert_eq!(report.status(Stage::Prepare), Some(StageStatus::Done));
        assert_eq!(report.status(Stage::Run), Some(StageStatus::Failed));
        assert_eq!(report.status(Stage::Results), Some(StageStatus::Skipped));
        let failure = report.failure.as_ref().expect("failure");
        assert_eq!(failure.stage, Stage::Run);
        assert_eq!(failure.kind, ErrorKind::MissingArtifact);
        assert!(matches!(machine.error(), Some(RunError::MissingArtifact { .. })));
        assert_eq!(*calls.lock(), vec![Stage::Prepare, Stage::Run]);
    }

    #[test]
    fn worker_panic_is_reported() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut backend = Scripted::new(&calls);
        backend.panic_at = Some(Stage::Prepare);
        let mut machine = machine(backend, &tmp.path().join("job"));
        machine.start().expect("start");
        let report = machine.join().expect("join");
        assert_eq!(report.state, MachineState::Failed);
        assert_eq!(report.failure.expect("failure").kind, ErrorKind::WorkerPanicked);
        assert!(!is_claimed(tmp.path().join("job")));
    }

    #[test]
    fn lifecycle_misuse_is_rejected() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("job");
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut machine = machine(Scripted::new(&calls), &dir);

        assert!(matches!(machine.join(), Err(RunError::JoinBeforeStart)));
        assert!(!dir.exists());
        assert!(matches!(
            machine.set_target(Stage::Check),
            Err(RunError::StageNotDeclared { .. })
        ));

        machine.start().expect("start");
        assert!(matches!(machine.start(), Err(RunError::AlreadyStarted)));
        assert!(matches!(
            machine.set_target(Stage::Prepare),
            Err(RunError::AlreadyStarted)
        ));
        let first = machine.join().expect("join");
        let second = machine.join().expect("join again");
        assert_eq!(first, second);
        assert_eq!(calls.lock().len(), 3);
    }

    #[test]
    fn cancelled_before_start_runs_nothing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut machine = machine(Scripted::new(&calls), &tmp.path().join("job"));
        machine.cancel_token().cancel();
        machine.start().expect("start");
        let report = machine.join().expect("join");
        assert!(calls.lock().is_empty());
        assert_eq!(report.failure.as_ref().expect("failure").kind, ErrorKind::Cancelled);
        assert_eq!(report.status(Stage::Prepare), Some(StageStatus::Failed));
    }

    #[test]
    fn claim_lasts_until_the_run_ends() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("job");
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut first = machine(Scripted::new(&calls), &dir);
        let second = RunMachine::with_backend(
            &Analysis::new("Analysis"),
            Box::new(Scripted::new(&calls)),
            &dir,
        );
        assert!(matches!(second, Err(RunError::Io(_))));

        first.start().expect("start");
        first.join().expect("join");
        assert!(!is_claimed(&dir));
    }
}
