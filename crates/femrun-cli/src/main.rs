use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use env_logger::{Builder, Target};
use femrun_io::{VariancePolicy, compare_files, compare_trees, save_json};
use femrun_model::{Analysis, BackendKind};
use femrun_solver::{RunMachine, RunReport, RunnerConfig, Stage};
use log::{LevelFilter, error, info};

#[derive(Parser)]
#[command(name = "femrun", version, about = "Prepare, run and compare FEM solver jobs")]
struct Cli {
    /// Log level (error, warn, info, debug, trace); falls back to RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Runner configuration JSON; FEMRUN_* environment variables otherwise
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the solver input files only
    Prepare(JobArgs),
    /// Run the stages up to --target (default: all declared stages)
    Run {
        #[command(flatten)]
        job: JobArgs,
        #[arg(long)]
        target: Option<Stage>,
    },
    /// Compare generated files (or directories) with reference ones
    Compare { expected: PathBuf, actual: PathBuf },
}

#[derive(Args)]
struct JobArgs {
    /// Analysis model document (JSON)
    #[arg(long)]
    model: PathBuf,
    #[arg(long)]
    backend: BackendKind,
    /// Job directory
    #[arg(long)]
    dir: PathBuf,
    /// Write the run report as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

fn init_logging(level: Option<&str>) {
    let level = level
        .and_then(|l| l.parse::<LevelFilter>().ok())
        .or_else(|| std::env::var("RUST_LOG").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(LevelFilter::Info);

    Builder::new()
        .filter_level(level)
        .target(Target::Stderr)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:5} {}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

fn load_config(path: Option<&Path>) -> Result<RunnerConfig, String> {
    let config = match path {
        Some(path) => RunnerConfig::from_file(path),
        None => RunnerConfig::from_env(),
    };
    config.map_err(|err| format!("configuration: {err}"))
}

fn load_model(path: &Path) -> Result<Analysis, String> {
    let text = std::fs::read_to_string(path).map_err(|err| format!("{}: {err}", path.display()))?;
    Analysis::from_json(&text).map_err(|err| format!("{}: {err}", path.display()))
}

fn print_report(report: &RunReport) {
    println!("analysis: {}", report.analysis);
    println!("backend: {}", report.backend);
    println!("job_dir: {}", report.job_dir.display());
    println!("state: {:?}", report.state);
    for record in &report.stages {
        if record.files.is_empty() {
            println!("  {:<8} {:?}", record.stage, record.status);
        } else {
            println!("  {:<8} {:?} [{}]", record.stage, record.status, record.files.join(", "));
        }
    }
    if let Some(results) = &report.results {
        println!("results: {}", results.files.join(", "));
        if let Some(peak) = &results.peak_displacement {
            println!("peak_displacement: {:e} at node {}", peak.magnitude, peak.node);
        }
    }
    if let Some(failure) = &report.failure {
        println!("failure: {} ({:?}): {}", failure.stage, failure.kind, failure.message);
    }
}

fn run_job(job: &JobArgs, target: Option<Stage>, config: RunnerConfig) -> Result<RunReport, String> {
    let analysis = load_model(&job.model)?;
    let mut machine = RunMachine::new(&analysis, job.backend, &job.dir)
        .map_err(|err| err.to_string())?
        .with_config(config);
    if let Some(target) = target {
        machine.set_target(target).map_err(|err| err.to_string())?;
    }
    info!(
        "{} run of '{}' in {} up to {}",
        job.backend,
        analysis.name(),
        machine.job_dir().display(),
        machine.target()
    );
    machine.start().map_err(|err| err.to_string())?;
    let report = machine.join().map_err(|err| err.to_string())?;

    if let Some(path) = &job.report {
        save_json(path, &report).map_err(|err| format!("{}: {err}", path.display()))?;
    }
    Ok(report)
}

fn compare(expected: &Path, actual: &Path) -> Result<bool, String> {
    let diff = if expected.is_dir() {
        compare_trees(expected, actual)
    } else {
        compare_files(expected, actual, VariancePolicy::for_path(expected))
    }
    .map_err(|err| err.to_string())?;

    match diff {
        Some(diff) => {
            print!("{diff}");
            Ok(false)
        }
        None => Ok(true),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let outcome = match &cli.command {
        Command::Prepare(job) => load_config(cli.config.as_deref())
            .and_then(|config| run_job(job, Some(Stage::Prepare), config))
            .map(|report| {
                print_report(&report);
                report.succeeded()
            }),
        Command::Run { job, target } => load_config(cli.config.as_deref())
            .and_then(|config| run_job(job, *target, config))
            .map(|report| {
                print_report(&report);
                report.succeeded()
            }),
        Command::Compare { expected, actual } => compare(expected, actual),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            error!("{err}");
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_backend_and_target_names() {
        let cli = Cli::try_parse_from([
            "femrun", "run", "--model", "box.json", "--backend", "ccx", "--dir", "job", "--target", "check",
        ])
        .expect("parse");
        match cli.command {
            Command::Run { job, target } => {
                assert_eq!(job.backend, BackendKind::Calculix);
                assert_eq!(target, Some(Stage::Check));
                assert!(job.report.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let parsed = Cli::try_parse_from(["femrun", "prepare", "--model", "m.json", "--backend", "abaqus", "--dir", "d"]);
        assert!(parsed.is_err());
    }
}
