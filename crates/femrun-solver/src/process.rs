//! External program execution inside a job directory.

use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use femrun_io::JobDirectory;
use log::{debug, info};

use crate::config::RunnerConfig;
use crate::error::{Result, RunError};
use crate::machine::CancelToken;

/// Log file for `program`: `<program name>.log` inside the job directory.
pub fn log_name(program: &str) -> String {
    let stem = Path::new(program)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string());
    format!("{stem}.log")
}

/// Run `program args..` with the job directory as working directory and both
/// output streams captured into its log file. A non-zero exit, a program that
/// cannot be started and a timeout are all `SolverProcess`; cancellation
/// kills the child and yields `Cancelled`.
pub fn run_program(
    job_dir: &JobDirectory,
    program: &str,
    args: &[&str],
    config: &RunnerConfig,
    cancel: &CancelToken,
) -> Result<()> {
    job_dir.ensure_created()?;
    let log = log_name(program);
    let stdout = job_dir.create_file(&log)?;
    let stderr = stdout.try_clone()?;

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(job_dir.path())
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr));
    if config.threads > 0 {
        command.env("OMP_NUM_THREADS", config.threads.to_string());
    }

    info!("running {} {} in {}", program, args.join(" "), job_dir.path().display());
    let mut child = command.spawn().map_err(|e| RunError::SolverProcess {
        program: program.to_string(),
        reason: format!("cannot start: {e}"),
    })?;

    let start = Instant::now();
    let poll = Duration::from_millis(config.poll_interval_ms.max(1));
    let timeout = (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs));

    loop {
        if let Some(status) = child.try_wait()? {
            debug!("{} exited with {} after {:?}", program, status, start.elapsed());
            if status.success() {
                return Ok(());
            }
            return Err(RunError::SolverProcess {
                program: program.to_string(),
                reason: format!("exited with {status}, see {log}"),
            });
        }
        if cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(RunError::Cancelled);
        }
        if let Some(limit) = timeout
            && start.elapsed() > limit
        {
            let _ = child.kill();
            let _ = child.wait();
            return Err(RunError::SolverProcess {
                program: program.to_string(),
                reason: format!("timed out after {} s", limit.as_secs()),
            });
        }
        thread::sleep(poll);
    }
}
