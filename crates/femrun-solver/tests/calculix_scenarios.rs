//! CalculiX deck generation on the box model, checked against golden files
//! and re-read through the deck parser.

mod common;

use common::{calculix_analysis, fixture_path};
use femrun_inp::Deck;
use femrun_io::{VariancePolicy, compare_files};
use femrun_model::{BackendKind, Snapshot};
use femrun_solver::backend::calculix::{StepSettings, write_deck};
use femrun_solver::{ErrorKind, MachineState, RunMachine, RunnerConfig, Stage, StageStatus};

fn prepare(analysis: &femrun_model::Analysis, dir: &std::path::Path) -> femrun_solver::RunReport {
    let mut machine = RunMachine::new(analysis, BackendKind::Calculix, dir).expect("machine");
    machine.set_target(Stage::Prepare).expect("target");
    machine.start().expect("start");
    machine.join().expect("join")
}

#[test]
fn static_box_matches_golden_deck() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path().join("ccx");
    let report = prepare(&calculix_analysis(), &dir);

    assert_eq!(report.state, MachineState::Completed);
    assert_eq!(report.stages[0].files, vec!["Mesh.inp"]);
    let diff = compare_files(
        fixture_path("calculix/cube_static.inp"),
        dir.join("Mesh.inp"),
        VariancePolicy::CalculixInput,
    )
    .expect("compare");
    assert_eq!(diff, None, "deck differs from golden file:\n{}", diff.as_deref().unwrap_or(""));
}

#[test]
fn model_document_loads_the_same_analysis() {
    let text = std::fs::read_to_string(fixture_path("models/box_calculix.json")).expect("read model");
    let loaded = femrun_model::Analysis::from_json(&text).expect("parse model");
    assert_eq!(loaded, calculix_analysis());
}

#[test]
fn deck_round_trips_through_the_parser() {
    let snapshot = Snapshot::capture(&calculix_analysis()).expect("snapshot");
    let settings = StepSettings::bind(&snapshot, "test").expect("settings");
    let text = write_deck(&snapshot, &settings).expect("deck");
    let deck = Deck::parse_str(&text).expect("parse");

    let nset = deck
        .cards_named("NSET")
        .find(|c| c.parameter("NSET") == Some("FemConstraintFixed"))
        .expect("fixed node set");
    let fixed: Vec<&str> = nset.rows().into_iter().map(|row| row[0]).collect();
    assert_eq!(fixed, vec!["1", "4", "5", "8"]);

    let boundary = deck.find("BOUNDARY").expect("boundary");
    assert_eq!(boundary.rows().len(), 3);

    let cload = deck.find("CLOAD").expect("cload");
    let mut total = [0.0; 3];
    for (i, row) in cload.rows().iter().enumerate() {
        let dof: usize = row[1].parse().expect("dof");
        total[dof - 1] += cload.number(i, 2).expect("value");
    }
    assert_eq!(total, [0.0, 0.0, -40000.0]);

    let dload = deck.find("DLOAD").expect("dload");
    assert_eq!(dload.rows(), vec![vec!["1", "P4", "1000.0"]]);

    let material = deck.find("MATERIAL").expect("material");
    assert_eq!(material.parameter("NAME"), Some("MechanicalMaterial"));
    assert!(deck.has("STATIC"));
    assert!(!deck.has("FREQUENCY"));
}

#[test]
fn reversed_pressure_flips_the_dload_sign() {
    let mut analysis = calculix_analysis();
    analysis.remove("FemConstraintPressure").expect("remove pressure");
    analysis
        .add_constraint(femrun_model::Constraint::pressure(
            "FemConstraintPressure",
            vec![femrun_model::GeometryRef::new("Box", "Face2")],
            1000.0,
            true,
        ))
        .expect("reversed pressure");

    let snapshot = Snapshot::capture(&analysis).expect("snapshot");
    let settings = StepSettings::bind(&snapshot, "test").expect("settings");
    let deck = Deck::parse_str(&write_deck(&snapshot, &settings).expect("deck")).expect("parse");

    let dload = deck.find("DLOAD").expect("dload");
    assert_eq!(dload.rows(), vec![vec!["1", "P4", "-1000.0"]]);
    assert_eq!(dload.number(0, 2).expect("value"), -1000.0);
}

#[test]
fn eigenmode_settings_do_not_change_a_static_step() {
    // Eigenmode count and bounds only matter for frequency analyses.
    let mut analysis = calculix_analysis();
    let solver = analysis
        .solver_mut(BackendKind::Calculix)
        .expect("calculix solver");
    solver.set("EigenmodesCount", 10_i64);
    solver.set("EigenmodeLowLimit", 0.0);
    solver.set("EigenmodeHighLimit", 1.0e6);
    solver.set("ThermoMechSteadyState", false);

    let snapshot = Snapshot::capture(&analysis).expect("snapshot");
    let settings = StepSettings::bind(&snapshot, "test").expect("settings");
    let text = write_deck(&snapshot, &settings).expect("deck");
    assert!(text.contains("*STEP\n*STATIC\n"));
    assert!(!text.contains("*FREQUENCY"));
    assert!(!text.contains("STEADY STATE"));

    let solver = analysis
        .solver_mut(BackendKind::Calculix)
        .expect("calculix solver");
    solver.set("AnalysisType", "frequency");
    let snapshot = Snapshot::capture(&analysis).expect("snapshot");
    let settings = StepSettings::bind(&snapshot, "test").expect("settings");
    let text = write_deck(&snapshot, &settings).expect("deck");
    assert!(text.contains("*FREQUENCY\n10, 0.0, 1000000.0\n"));
}

#[test]
fn check_accepts_a_prepared_deck() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path().join("ccx");
    let mut machine = RunMachine::new(&calculix_analysis(), BackendKind::Calculix, &dir).expect("machine");
    machine.set_target(Stage::Check).expect("target");
    machine.start().expect("start");
    let report = machine.join().expect("join");
    assert_eq!(report.state, MachineState::Completed);
    assert_eq!(report.status(Stage::Check), Some(StageStatus::Done));
    assert_eq!(report.status(Stage::Run), Some(StageStatus::Skipped));
}

#[test]
fn check_without_fixed_constraint_is_incomplete() {
    let mut analysis = calculix_analysis();
    analysis.remove("FemConstraintFixed").expect("remove");
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut machine = RunMachine::new(&analysis, BackendKind::Calculix, tmp.path().join("ccx")).expect("machine");
    machine.set_target(Stage::Check).expect("target");
    machine.start().expect("start");
    let report = machine.join().expect("join");
    let failure = report.failure.as_ref().expect("failure");
    assert_eq!(failure.stage, Stage::Check);
    assert_eq!(failure.kind, ErrorKind::IncompleteModel);
    assert_eq!(report.status(Stage::Prepare), Some(StageStatus::Done));
}

#[test]
fn unknown_solver_option_fails_prepare() {
    let mut analysis = calculix_analysis();
    analysis
        .solver_mut(BackendKind::Calculix)
        .expect("calculix solver")
        .set("BeamShellResultOutput3D", true);
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path().join("ccx");
    let report = prepare(&analysis, &dir);
    assert_eq!(report.state, MachineState::Failed);
    assert_eq!(report.failure.expect("failure").kind, ErrorKind::UnsupportedOption);
    assert!(!dir.exists());
}

#[test]
fn missing_solver_program_fails_run() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path().join("ccx");
    let config = RunnerConfig {
        ccx: "femrun-no-such-ccx".to_string(),
        ..RunnerConfig::default()
    };
    let mut machine = RunMachine::new(&calculix_analysis(), BackendKind::Calculix, &dir)
        .expect("machine")
        .with_config(config);
    machine.start().expect("start");
    let report = machine.join().expect("join");
    let failure = report.failure.as_ref().expect("failure");
    assert_eq!(failure.stage, Stage::Run);
    assert_eq!(failure.kind, ErrorKind::SolverProcess);
    assert_eq!(report.status(Stage::Results), Some(StageStatus::Skipped));
}

#[cfg(unix)]
#[test]
fn full_run_reads_displacements() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path().join("ccx");
    std::fs::create_dir_all(&dir).expect("mkdir");
    std::fs::write(
        dir.join("Mesh.frd"),
        " -4  DISP        4    1\n -1         7 3.00000E-03 4.00000E-03 0.00000E+00\n -3\n 9999\n",
    )
    .expect("frd");

    let config = RunnerConfig {
        ccx: "true".to_string(),
        ..RunnerConfig::default()
    };
    let mut machine = RunMachine::new(&calculix_analysis(), BackendKind::Calculix, &dir)
        .expect("machine")
        .with_config(config);
    machine.start().expect("start");
    let report = machine.join().expect("join");

    assert_eq!(report.state, MachineState::Completed, "{:?}", report.failure);
    assert_eq!(report.stages[2].files, vec!["true.log"]);
    let results = report.results.expect("results");
    assert_eq!(results.files, vec!["Mesh.frd"]);
    let peak = results.peak_displacement.expect("peak");
    assert_eq!(peak.node, 7);
    assert!((peak.magnitude - 5.0e-3).abs() < 1e-12);
}

#[cfg(unix)]
#[test]
fn failing_solver_is_reported() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = RunnerConfig {
        ccx: "false".to_string(),
        ..RunnerConfig::default()
    };
    let mut machine = RunMachine::new(&calculix_analysis(), BackendKind::Calculix, tmp.path().join("ccx"))
        .expect("machine")
        .with_config(config);
    machine.start().expect("start");
    machine.join().expect("join");
    assert_eq!(machine.state(), MachineState::Failed);
    assert!(matches!(
        machine.error(),
        Some(femrun_solver::RunError::SolverProcess { .. })
    ));
}
