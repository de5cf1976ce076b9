//! Elmer backend.
//!
//! PREPARE writes three files: `ELMERSOLVER_STARTINFO` naming the solver
//! input, the solver input `case.sif` (SI units, mesh coordinates scaled
//! from mm) and `group_mesh.geo`, a Gmsh script that meshes the shape's
//! BREP export into physical groups ElmerGrid can convert.

use std::collections::{BTreeMap, BTreeSet};

use femrun_io::Artifact;
use femrun_model::{
    BackendKind, BoundOptions, Constraint, ConstraintKind, DefaultValue, Dimension, EquationKind,
    GmshParameters, MaterialProperty, ModelError, OptionSpec, OptionType, Shape, Snapshot,
    bind_options, numbered_element, parse_quantity,
};
use log::{debug, info};

use super::traits::{ResultSummary, SolverBackend, StageContext, StageOutput};
use crate::error::{Result, RunError};
use crate::format::real;
use crate::process::{log_name, run_program};
use crate::stage::Stage;

const PREPARE: &str = "elmer prepare";
const CHECK: &str = "elmer check";

pub const STARTINFO: &str = "ELMERSOLVER_STARTINFO";
pub const CASE_FILE: &str = "case.sif";
pub const GEO_FILE: &str = "group_mesh.geo";
pub const UNV_FILE: &str = "group_mesh.unv";
const RESULT_NAME: &str = "case";

pub const SOLVER_OPTIONS: &[OptionSpec] = &[
    OptionSpec::new(
        "SimulationType",
        OptionType::Choice(&["Steady state", "Transient"]),
        DefaultValue::Text("Steady state"),
    ),
    OptionSpec::new("SteadyStateMaxIterations", OptionType::Int, DefaultValue::Int(1)),
    OptionSpec::new("SteadyStateMinIterations", OptionType::Int, DefaultValue::Int(0)),
    OptionSpec::new("OutputIntervals", OptionType::Int, DefaultValue::Int(1)),
    OptionSpec::new("TimestepSize", OptionType::Float, DefaultValue::Float(0.1)),
    OptionSpec::new("TimestepIntervals", OptionType::Int, DefaultValue::Int(100)),
];

pub const ELASTICITY_OPTIONS: &[OptionSpec] = &[
    OptionSpec::new(
        "LinearSolverType",
        OptionType::Choice(&["Iterative", "Direct"]),
        DefaultValue::Text("Iterative"),
    ),
    OptionSpec::new(
        "LinearIterativeMethod",
        OptionType::Choice(&["BiCGStab", "BiCGStabl", "CG", "GCR", "GMRES"]),
        DefaultValue::Text("BiCGStab"),
    ),
    OptionSpec::new(
        "LinearDirectMethod",
        OptionType::Choice(&["Banded", "umfpack"]),
        DefaultValue::Text("Banded"),
    ),
    OptionSpec::new("LinearIterations", OptionType::Int, DefaultValue::Int(500)),
    OptionSpec::new("LinearTolerance", OptionType::Float, DefaultValue::Float(1.0e-8)),
    OptionSpec::new(
        "LinearPreconditioning",
        OptionType::Choice(&["None", "Diagonal", "ILU0", "ILU1", "ILU2", "ILU3", "ILU4"]),
        DefaultValue::Text("ILU0"),
    ),
    OptionSpec::new("SteadyStateTolerance", OptionType::Float, DefaultValue::Float(1.0e-5)),
    OptionSpec::new("Stabilize", OptionType::Bool, DefaultValue::Bool(true)),
    OptionSpec::new("Bubbles", OptionType::Bool, DefaultValue::Bool(false)),
    OptionSpec::new("CalculateStresses", OptionType::Bool, DefaultValue::Bool(false)),
    OptionSpec::new("EigenAnalysis", OptionType::Bool, DefaultValue::Bool(false)),
    OptionSpec::new("EigenSystemValues", OptionType::Int, DefaultValue::Int(5)),
];

pub struct ElmerBackend;

impl SolverBackend for ElmerBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Elmer
    }

    fn declared_stages(&self) -> &[Stage] {
        &Stage::ALL
    }

    fn write_stage(&self, stage: Stage, ctx: &StageContext<'_>) -> Result<StageOutput> {
        match stage {
            Stage::Prepare => prepare(ctx),
            Stage::Check => check(ctx),
            Stage::Run => run(ctx),
            Stage::Results => results(ctx),
        }
    }
}

fn prepare(ctx: &StageContext<'_>) -> Result<StageOutput> {
    let artifacts = write_files(ctx.snapshot)?;
    ctx.job_dir.write_all(&artifacts)?;
    let names: Vec<String> = artifacts.into_iter().map(|a| a.name).collect();
    info!("[elmer] wrote {}", names.join(", "));
    Ok(StageOutput::files(names))
}

/// Render the three PREPARE files without touching the filesystem.
pub fn write_files(snapshot: &Snapshot) -> Result<Vec<Artifact>> {
    let mesh = snapshot.require_mesh(PREPARE)?;
    let params = mesh
        .gmsh_parameters()
        .ok_or_else(|| ModelError::incomplete(format!("a Gmsh mesh ({} is supplied)", mesh.name), PREPARE))?;
    let shape = snapshot.require_shape(PREPARE)?;
    let boundaries = boundary_faces(snapshot)?;

    let sif = write_sif(snapshot, &boundaries)?;
    let geo = write_geo(shape, params, &boundaries)?;
    Ok(vec![
        Artifact::new(STARTINFO, CASE_FILE),
        Artifact::new(CASE_FILE, sif),
        Artifact::new(GEO_FILE, geo),
    ])
}

fn check(ctx: &StageContext<'_>) -> Result<StageOutput> {
    let snapshot = ctx.snapshot;
    snapshot.require_shape(CHECK)?;
    snapshot.require_material(CHECK)?;
    let solver = snapshot
        .solver(BackendKind::Elmer)
        .ok_or_else(|| ModelError::incomplete("Elmer solver configuration", CHECK))?;
    if solver.equations.is_empty() {
        return Err(ModelError::incomplete(format!("an equation on {}", solver.name), CHECK).into());
    }
    for name in [STARTINFO, CASE_FILE, GEO_FILE] {
        if !ctx.job_dir.exists(name) {
            return Err(RunError::missing(name, "not prepared"));
        }
        if ctx.job_dir.read(name)?.iter().all(u8::is_ascii_whitespace) {
            return Err(RunError::missing(name, "file is empty"));
        }
    }
    Ok(StageOutput::default())
}

fn run(ctx: &StageContext<'_>) -> Result<StageOutput> {
    let shape = ctx.snapshot.require_shape("elmer run")?;
    let brep = shape.brep_file_name();
    if !ctx.job_dir.exists(&brep) {
        return Err(RunError::missing(brep, "geometry export is not in the job directory"));
    }
    let config = ctx.config;

    for stale in result_files(ctx)? {
        debug!("[elmer] removing result {} of an earlier run", stale);
        ctx.job_dir.remove_file(&stale)?;
    }
    run_program(ctx.job_dir, &config.gmsh, &["-", GEO_FILE], config, ctx.cancel)?;
    run_program(
        ctx.job_dir,
        &config.elmer_grid,
        &["8", "2", UNV_FILE, "-out", "."],
        config,
        ctx.cancel,
    )?;
    run_program(ctx.job_dir, &config.elmer_solver, &[], config, ctx.cancel)?;

    Ok(StageOutput::files(vec![
        log_name(&config.gmsh),
        log_name(&config.elmer_grid),
        log_name(&config.elmer_solver),
    ]))
}

/// `case*.vtu` files currently in the job directory.
fn result_files(ctx: &StageContext<'_>) -> Result<Vec<String>> {
    Ok(ctx
        .job_dir
        .list_files()?
        .into_iter()
        .filter(|name| name.starts_with(RESULT_NAME) && name.ends_with(".vtu"))
        .collect())
}

fn results(ctx: &StageContext<'_>) -> Result<StageOutput> {
    let files = result_files(ctx)?;
    if files.is_empty() {
        return Err(RunError::missing(
            format!("{RESULT_NAME}.vtu"),
            "solver produced no result file",
        ));
    }
    info!("[elmer] {} result file(s)", files.len());
    Ok(StageOutput {
        files: Vec::new(),
        results: Some(ResultSummary {
            files,
            peak_displacement: None,
        }),
    })
}

/// Constraints grouped by the shape face they act on, ordered by face
/// number. Position in this map is the Elmer boundary index.
type Boundaries<'a> = BTreeMap<u32, (String, Vec<&'a Constraint>)>;

fn boundary_faces(snapshot: &Snapshot) -> Result<Boundaries<'_>> {
    let mut boundaries = Boundaries::new();
    for constraint in &snapshot.constraints {
        for reference in &constraint.references {
            let number = match numbered_element(&reference.element) {
                Some(("Face", number)) => number,
                _ => {
                    return Err(ModelError::unresolved(
                        &constraint.name,
                        reference.id(),
                        "boundary must be a numbered face",
                    )
                    .into());
                }
            };
            let entry = boundaries
                .entry(number)
                .or_insert_with(|| (reference.element.clone(), Vec::new()));
            if !entry.1.iter().any(|c| c.name == constraint.name) {
                entry.1.push(constraint);
            }
        }
    }
    Ok(boundaries)
}

/// Value of one solver input keyword.
#[derive(Debug, Clone, PartialEq)]
enum SifValue {
    Integer(i64),
    Real(f64),
    /// Arrays are always written with their size: `Key(n) = Integer ..`
    Integers(Vec<i64>),
    Reals(Vec<f64>),
    Logical(bool),
    Text(String),
    /// Shared library and entry point of a solver procedure
    File(&'static str, &'static str),
}

impl SifValue {
    fn text(v: impl Into<String>) -> Self {
        SifValue::Text(v.into())
    }

    fn render(&self, key: &str) -> String {
        match self {
            SifValue::Integer(v) => format!("{key} = Integer {v}"),
            SifValue::Real(v) => format!("{key} = Real {}", real(*v)),
            SifValue::Integers(values) => {
                let values: Vec<String> = values.iter().map(i64::to_string).collect();
                format!("{key}({}) = Integer {}", values.len(), values.join(" "))
            }
            SifValue::Reals(values) => {
                let values: Vec<String> = values.iter().map(|v| real(*v)).collect();
                format!("{key}({}) = Real {}", values.len(), values.join(" "))
            }
            SifValue::Logical(v) => {
                format!("{key} = Logical {}", if *v { "True" } else { "False" })
            }
            SifValue::Text(v) => format!("{key} = String \"{v}\""),
            SifValue::File(library, procedure) => {
                format!("{key} = File \"{library}\" \"{procedure}\"")
            }
        }
    }
}

/// A `<Name> ... End` block. Keys are written in sorted order.
struct Section {
    title: String,
    entries: BTreeMap<String, SifValue>,
}

impl Section {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            entries: BTreeMap::new(),
        }
    }

    fn set(&mut self, key: impl Into<String>, value: SifValue) -> &mut Self {
        self.entries.insert(key.into(), value);
        self
    }

    fn render(&self, out: &mut String) {
        out.push_str(&self.title);
        out.push('\n');
        for (key, value) in &self.entries {
            out.push_str("  ");
            out.push_str(&value.render(key));
            out.push('\n');
        }
        out.push_str("End\n\n");
    }
}

fn write_sif(snapshot: &Snapshot, boundaries: &Boundaries<'_>) -> Result<String> {
    let solver = snapshot
        .solver(BackendKind::Elmer)
        .ok_or_else(|| ModelError::incomplete("Elmer solver configuration", PREPARE))?;
    if solver.equations.is_empty() {
        return Err(ModelError::incomplete(format!("an equation on {}", solver.name), PREPARE).into());
    }
    let options = bind_options(&solver.name, &solver.options, SOLVER_OPTIONS)?;
    let shape = snapshot.require_shape(PREPARE)?;

    let material = snapshot.require_material(PREPARE)?;
    let youngs = material.require(MaterialProperty::YoungsModulus, PREPARE)?;
    let poisson = material.require(MaterialProperty::PoissonRatio, PREPARE)?;
    let density = material.require(MaterialProperty::Density, PREPARE)?;
    let expansion = material.require(MaterialProperty::ThermalExpansionCoefficient, PREPARE)?;

    let mut sections = Vec::new();

    let mut simulation = Section::new("Simulation");
    simulation
        .set("Coordinate Mapping", SifValue::Integers(vec![1, 2, 3]))
        .set("Coordinate Scaling", SifValue::Real(0.001))
        .set("Coordinate System", SifValue::text("Cartesian 3D"))
        .set("Output Intervals", SifValue::Integer(options.int("OutputIntervals")))
        .set("Simulation Type", SifValue::text(options.text("SimulationType")))
        .set(
            "Steady State Max Iterations",
            SifValue::Integer(options.int("SteadyStateMaxIterations")),
        )
        .set(
            "Steady State Min Iterations",
            SifValue::Integer(options.int("SteadyStateMinIterations")),
        )
        .set("Use Mesh Names", SifValue::Logical(true));
    if options.text("SimulationType") == "Transient" {
        simulation
            .set("BDF Order", SifValue::Integer(1))
            .set("Timestep Intervals", SifValue::Integer(options.int("TimestepIntervals")))
            .set("Timestep Sizes", SifValue::Real(options.float("TimestepSize")))
            .set("Timestepping Method", SifValue::text("BDF"));
    }
    sections.push(simulation);

    let mut constants = Section::new("Constants");
    constants
        .set("Gravity", SifValue::Reals(vec![0.0, -1.0, 0.0, 9.82]))
        .set("Stefan Boltzmann", SifValue::Real(5.67e-8));
    sections.push(constants);

    if shape.solids.is_empty() {
        return Err(ModelError::incomplete(format!("a solid in {}", shape.name), PREPARE).into());
    }
    for (index, solid) in shape.solids.iter().enumerate() {
        let mut body = Section::new(format!("Body {}", index + 1));
        body.set("Target Bodies", SifValue::Integers(vec![index as i64 + 1]))
            .set("Equation", SifValue::Integer(1))
            .set("Material", SifValue::Integer(1))
            .set("Name", SifValue::text(solid));
        sections.push(body);
    }

    let mut material_section = Section::new("Material 1");
    material_section
        .set("Density", SifValue::Real(density))
        .set("Heat expansion Coefficient", SifValue::Real(expansion))
        .set("Name", SifValue::text(&material.card_name))
        .set("Poisson ratio", SifValue::Real(poisson))
        .set("Youngs Modulus", SifValue::Real(youngs));
    sections.push(material_section);

    let mut equation_solvers = Vec::new();
    for equation in &solver.equations {
        let bound = bind_options(&equation.name, &equation.options, ELASTICITY_OPTIONS)?;
        let index = equation_solvers.len() + 1;
        let mut section = Section::new(format!("Solver {index}"));
        match equation.kind {
            EquationKind::Elasticity => elasticity_solver(&mut section, &bound),
        }
        equation_solvers.push(section);
    }
    let active: Vec<i64> = (1..=equation_solvers.len() as i64).collect();

    let mut equation = Section::new("Equation 1");
    equation.set("Active Solvers", SifValue::Integers(active));
    sections.push(equation);
    sections.extend(equation_solvers);

    let mut output = Section::new(format!("Solver {}", solver.equations.len() + 1));
    output
        .set("Equation", SifValue::text("ResultOutput"))
        .set("Exec Solver", SifValue::text("After simulation"))
        .set("Output File Name", SifValue::text(RESULT_NAME))
        .set("Procedure", SifValue::File("ResultOutputSolve", "ResultOutputSolver"))
        .set("Vtu Format", SifValue::Logical(true));
    sections.push(output);

    for (index, (face, constraints)) in boundaries.values().enumerate() {
        let mut section = Section::new(format!("Boundary Condition {}", index + 1));
        section
            .set("Target Boundaries", SifValue::Integers(vec![index as i64 + 1]))
            .set("Name", SifValue::text(face));
        for constraint in constraints {
            boundary_values(&mut section, snapshot, constraint)?;
        }
        sections.push(section);
    }

    let mut out = String::new();
    out.push_str("Header\n");
    out.push_str("  CHECK KEYWORDS \"Warn\"\n");
    out.push_str("  Mesh DB \".\" \".\"\n");
    out.push_str("End\n\n");
    for section in &sections {
        section.render(&mut out);
    }
    Ok(out)
}

fn elasticity_solver(section: &mut Section, options: &BoundOptions) {
    section
        .set("Bubbles in Global System", SifValue::Logical(options.bool("Bubbles")))
        .set("Calculate Stresses", SifValue::Logical(options.bool("CalculateStresses")))
        .set("Displace mesh", SifValue::Logical(false))
        .set("Eigen Analysis", SifValue::Logical(options.bool("EigenAnalysis")))
        .set("Equation", SifValue::text("Stress Solver"))
        .set("Exec Solver", SifValue::text("Always"))
        .set("Linear System Abort Not Converged", SifValue::Logical(false))
        .set(
            "Linear System Convergence Tolerance",
            SifValue::Real(options.float("LinearTolerance")),
        )
        .set("Linear System Max Iterations", SifValue::Integer(options.int("LinearIterations")))
        .set("Linear System Precondition Recompute", SifValue::Integer(1))
        .set(
            "Linear System Preconditioning",
            SifValue::text(options.text("LinearPreconditioning")),
        )
        .set("Linear System Residual Output", SifValue::Integer(1))
        .set("Linear System Solver", SifValue::text(options.text("LinearSolverType")))
        .set("Optimize Bandwidth", SifValue::Logical(true))
        .set("Procedure", SifValue::File("StressSolve", "StressSolver"))
        .set("Stabilize", SifValue::Logical(options.bool("Stabilize")))
        .set(
            "Steady State Convergence Tolerance",
            SifValue::Real(options.float("SteadyStateTolerance")),
        )
        .set("Variable", SifValue::text("Displacement"))
        .set("Variable DOFs", SifValue::Integer(3));
    if options.text("LinearSolverType") == "Direct" {
        section.set(
            "Linear System Direct Method",
            SifValue::text(options.text("LinearDirectMethod")),
        );
    } else {
        section.set(
            "Linear System Iterative Method",
            SifValue::text(options.text("LinearIterativeMethod")),
        );
    }
    if options.bool("EigenAnalysis") {
        section.set(
            "Eigen System Values",
            SifValue::Integer(options.int("EigenSystemValues")),
        );
    }
}

fn boundary_values(section: &mut Section, snapshot: &Snapshot, constraint: &Constraint) -> Result<()> {
    match &constraint.kind {
        ConstraintKind::Fixed => {
            for i in 1..=3 {
                section.set(format!("Displacement {i}"), SifValue::Real(0.0));
            }
        }
        ConstraintKind::Force {
            magnitude,
            direction,
            reversed,
        } => {
            let unit = snapshot.direction(&constraint.name, direction)?;
            let sign = if *reversed { -1.0 } else { 1.0 };
            for i in 1..=3 {
                section
                    .set(format!("Force {i}"), SifValue::Real(magnitude * unit[i - 1] * sign))
                    .set(format!("Force {i} Normalize by Area"), SifValue::Logical(true));
            }
        }
        ConstraintKind::Pressure { magnitude, reversed } => {
            // MPa to Pa; a pressure pushes against the outward normal.
            let pascal = magnitude * 1.0e6;
            let value = if *reversed { pascal } else { -pascal };
            section.set("Normal Force", SifValue::Real(value));
        }
    }
    Ok(())
}

fn write_geo(shape: &Shape, params: &GmshParameters, boundaries: &Boundaries<'_>) -> Result<String> {
    let length_min = parse_quantity("CharacteristicLengthMin", &params.characteristic_length_min, Dimension::Length)?;
    let length_max = parse_quantity("CharacteristicLengthMax", &params.characteristic_length_max, Dimension::Length)?;

    let mut solids = BTreeSet::new();
    for solid in &shape.solids {
        match numbered_element(solid) {
            Some(("Solid", number)) => {
                solids.insert((number, solid.as_str()));
            }
            _ => {
                return Err(ModelError::unresolved(
                    shape.name.as_str(),
                    solid.as_str(),
                    "volume must be a numbered solid",
                )
                .into());
            }
        }
    }

    let mut lines = vec![
        "// geo file for meshing with Gmsh, written by femrun".to_string(),
        "// open brep geometry".to_string(),
        format!("Merge \"{}\";", shape.brep_file_name()),
        String::new(),
        "// physical groups".to_string(),
    ];
    for (number, (face, _)) in boundaries {
        lines.push(format!("Physical Surface(\"{face}\") = {{{number}}};"));
    }
    for (number, solid) in &solids {
        lines.push(format!("Physical Volume(\"{solid}\") = {{{number}}};"));
    }

    let max = if length_max > 0.0 {
        real(length_max)
    } else {
        "1e+22".to_string()
    };
    let optimize = u8::from(params.optimize);
    lines.extend([
        String::new(),
        "// characteristic length".to_string(),
        format!("Mesh.CharacteristicLengthMax = {max};"),
        format!("Mesh.CharacteristicLengthMin = {};", real(length_min)),
        "Mesh.MshFileVersion = 2.2;".to_string(),
        String::new(),
        "// optimization".to_string(),
        format!("Mesh.Optimize = {optimize};"),
        format!("Mesh.OptimizeNetgen = {optimize};"),
        format!("Mesh.HighOrderOptimize = {optimize};"),
        format!("Mesh.ElementOrder = {};", params.element_order),
        "Mesh.SecondOrderLinear = 0;".to_string(),
        String::new(),
        "// 2D algorithm (1=MeshAdapt, 2=Automatic, 5=Delaunay, 6=Frontal)".to_string(),
        format!("Mesh.Algorithm = {};", params.algorithm_2d),
        "// 3D algorithm (1=Delaunay, 4=Frontal, 10=HXT)".to_string(),
        format!("Mesh.Algorithm3D = {};", params.algorithm_3d),
        String::new(),
        "// meshing".to_string(),
        format!("Geometry.Tolerance = {:e};", params.geometry_tolerance),
        "Mesh  3;".to_string(),
        "Coherence Mesh;".to_string(),
        String::new(),
        "// save as universal file for ElmerGrid".to_string(),
        "Mesh.Format = 2;".to_string(),
        format!("Save \"{UNV_FILE}\";"),
    ]);

    let mut out = lines.join("\n");
    out.push('\n');
    Ok(out)
}
