//! CalculiX backend.
//!
//! PREPARE writes a single keyword deck named after the mesh (`Mesh.inp`).
//! Units follow the usual CalculiX mm/N/t/s system: coordinates in mm,
//! stiffness in MPa, density in t/mm^3, forces in N.

use std::collections::{BTreeMap, BTreeSet};

use femrun_inp::Deck;
use femrun_io::{Artifact, Displacements};
use femrun_model::{
    BackendKind, BoundOptions, ConstraintKind, DefaultValue, ElementFace, MaterialProperty,
    ModelError, OptionSpec, OptionType, Snapshot, bind_options,
};
use log::{debug, info};

use super::traits::{PeakDisplacement, ResultSummary, SolverBackend, StageContext, StageOutput};
use crate::error::{Result, RunError};
use crate::format::{exp, real};
use crate::process::{log_name, run_program};
use crate::stage::Stage;

const PREPARE: &str = "calculix prepare";
const CHECK: &str = "calculix check";
const SEPARATOR: &str = "***********************************************************";
const ELSET_MATERIAL: &str = "SolidMaterialSolid";
/// CalculiX reads at most 16 entries per data line.
const ENTRIES_PER_LINE: usize = 16;

pub const OPTIONS: &[OptionSpec] = &[
    OptionSpec::new(
        "AnalysisType",
        OptionType::Choice(&["static", "frequency", "thermomech", "check"]),
        DefaultValue::Text("static"),
    ),
    OptionSpec::new(
        "GeometricalNonlinearity",
        OptionType::Choice(&["linear", "nonlinear"]),
        DefaultValue::Text("linear"),
    ),
    OptionSpec::new("ThermoMechSteadyState", OptionType::Bool, DefaultValue::Bool(false)),
    OptionSpec::new(
        "MatrixSolverType",
        OptionType::Choice(&["default", "spooles", "iterativescaling", "iterativecholesky"]),
        DefaultValue::Text("default"),
    ),
    OptionSpec::new(
        "IterationsControlParameterTimeUse",
        OptionType::Bool,
        DefaultValue::Bool(false),
    ),
    OptionSpec::new("IterationsMaximum", OptionType::Int, DefaultValue::Int(2000)),
    OptionSpec::new(
        "IterationsControlParameterIter",
        OptionType::Text,
        DefaultValue::Text("4,8,9,16,10,4,0,5,0,0"),
    ),
    OptionSpec::new(
        "IterationsControlParameterCutb",
        OptionType::Text,
        DefaultValue::Text("0.25,0.5,0.75,0.85,0.0,0.0,1.5,0.0"),
    ),
    OptionSpec::new("TimeInitialStep", OptionType::Float, DefaultValue::Float(1.0)),
    OptionSpec::new("TimeEnd", OptionType::Float, DefaultValue::Float(1.0)),
    OptionSpec::new("EigenmodesCount", OptionType::Int, DefaultValue::Int(10)),
    OptionSpec::new("EigenmodeLowLimit", OptionType::Float, DefaultValue::Float(0.0)),
    OptionSpec::new("EigenmodeHighLimit", OptionType::Float, DefaultValue::Float(1000000.0)),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisType {
    Static,
    Frequency,
    ThermoMech,
    /// Model check only, no solution
    Check,
}

/// Step-level settings read from the bound solver options.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSettings {
    pub analysis: AnalysisType,
    pub nonlinear: bool,
    pub steady_state: bool,
    /// `SOLVER=` value, `None` for the CalculiX default
    pub matrix_solver: Option<&'static str>,
    pub time_use: bool,
    pub max_increments: i64,
    pub controls_iter: String,
    pub controls_cutb: String,
    pub initial_step: f64,
    pub end_time: f64,
    pub eigenmodes: i64,
    pub eigen_low: f64,
    pub eigen_high: f64,
}

impl StepSettings {
    pub fn from_options(options: &BoundOptions) -> Self {
        let analysis = match options.text("AnalysisType") {
            "frequency" => AnalysisType::Frequency,
            "thermomech" => AnalysisType::ThermoMech,
            "check" => AnalysisType::Check,
            _ => AnalysisType::Static,
        };
        let matrix_solver = match options.text("MatrixSolverType") {
            "spooles" => Some("SPOOLES"),
            "iterativescaling" => Some("ITERATIVE SCALING"),
            "iterativecholesky" => Some("ITERATIVE CHOLESKY"),
            _ => None,
        };
        Self {
            analysis,
            nonlinear: options.text("GeometricalNonlinearity") == "nonlinear",
            steady_state: options.bool("ThermoMechSteadyState"),
            matrix_solver,
            time_use: options.bool("IterationsControlParameterTimeUse"),
            max_increments: options.int("IterationsMaximum"),
            controls_iter: options.text("IterationsControlParameterIter").to_string(),
            controls_cutb: options.text("IterationsControlParameterCutb").to_string(),
            initial_step: options.float("TimeInitialStep"),
            end_time: options.float("TimeEnd"),
            eigenmodes: options.int("EigenmodesCount"),
            eigen_low: options.float("EigenmodeLowLimit"),
            eigen_high: options.float("EigenmodeHighLimit"),
        }
    }

    /// Bind the CalculiX solver configuration of `snapshot`.
    pub fn bind(snapshot: &Snapshot, required_by: &str) -> Result<Self> {
        let config = snapshot
            .solver(BackendKind::Calculix)
            .ok_or_else(|| ModelError::incomplete("CalculiX solver configuration", required_by))?;
        let options = bind_options(&config.name, &config.options, OPTIONS)?;
        Ok(Self::from_options(&options))
    }
}

pub struct CalculixBackend;

impl SolverBackend for CalculixBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Calculix
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

/// Name of the deck PREPARE writes for `snapshot`.
pub fn deck_name(snapshot: &Snapshot, required_by: &str) -> Result<String> {
    Ok(format!("{}.inp", snapshot.require_mesh(required_by)?.name))
}

fn prepare(ctx: &StageContext<'_>) -> Result<StageOutput> {
    let settings = StepSettings::bind(ctx.snapshot, PREPARE)?;
    let name = deck_name(ctx.snapshot, PREPARE)?;
    let text = write_deck(ctx.snapshot, &settings)?;
    ctx.job_dir.write_all(&[Artifact::new(name.clone(), text)])?;
    info!("[calculix] wrote {}", name);
    Ok(StageOutput::files(vec![name]))
}

fn check(ctx: &StageContext<'_>) -> Result<StageOutput> {
    let snapshot = ctx.snapshot;
    let settings = StepSettings::bind(snapshot, CHECK)?;
    snapshot.require_mesh_tables(CHECK)?;
    snapshot.require_material(CHECK)?;
    if settings.analysis != AnalysisType::Check && snapshot.fixed().next().is_none() {
        return Err(ModelError::incomplete("a fixed constraint", CHECK).into());
    }

    let name = deck_name(snapshot, CHECK)?;
    if !ctx.job_dir.exists(&name) {
        return Err(RunError::missing(name, "not prepared"));
    }
    let text = ctx.job_dir.read_to_string(&name)?;
    if text.trim().is_empty() {
        return Err(RunError::missing(name, "deck is empty"));
    }
    let deck = Deck::parse_str(&text).map_err(|e| RunError::missing(name.clone(), e.to_string()))?;
    for keyword in ["NODE", "ELEMENT", "STEP", "END STEP"] {
        if !deck.has(keyword) {
            return Err(RunError::missing(name.clone(), format!("deck has no *{keyword} card")));
        }
    }
    debug!("[calculix] {} has {} cards", name, deck.cards.len());
    Ok(StageOutput::default())
}

fn run(ctx: &StageContext<'_>) -> Result<StageOutput> {
    let mesh = ctx.snapshot.require_mesh("calculix run")?;
    let program = ctx.config.ccx.as_str();
    run_program(ctx.job_dir, program, &["-i", &mesh.name], ctx.config, ctx.cancel)?;
    Ok(StageOutput::files(vec![log_name(program)]))
}

fn results(ctx: &StageContext<'_>) -> Result<StageOutput> {
    let mesh = ctx.snapshot.require_mesh("calculix results")?;
    let name = format!("{}.frd", mesh.name);
    if !ctx.job_dir.exists(&name) {
        return Err(RunError::missing(name, "solver produced no result file"));
    }
    let displacements = Displacements::from_file(ctx.job_dir.resolve(&name)?)?;
    let peak = displacements
        .max_magnitude()
        .map(|(node, magnitude)| PeakDisplacement { node, magnitude });
    if let Some(peak) = &peak {
        info!("[calculix] peak displacement {:e} mm at node {}", peak.magnitude, peak.node);
    }
    Ok(StageOutput {
        files: Vec::new(),
        results: Some(ResultSummary {
            files: vec![name],
            peak_displacement: peak,
        }),
    })
}

#[derive(Default)]
struct DeckText(String);

impl DeckText {
    fn line(&mut self, text: impl AsRef<str>) {
        self.0.push_str(text.as_ref());
        self.0.push('\n');
    }

    fn section(&mut self, title: &str) {
        self.line(SEPARATOR);
        self.line(format!("** {title}"));
    }
}

/// Render the complete deck. Pure: the same snapshot gives the same text.
pub fn write_deck(snapshot: &Snapshot, settings: &StepSettings) -> Result<String> {
    let mesh_object = snapshot.require_mesh(PREPARE)?;
    let mesh = snapshot.require_mesh_tables(PREPARE)?;
    let material = snapshot.require_material(PREPARE)?;
    let youngs = material.require(MaterialProperty::YoungsModulus, PREPARE)?;
    let poisson = material.require(MaterialProperty::PoissonRatio, PREPARE)?;
    let density = match settings.analysis {
        AnalysisType::Frequency => Some(material.require(MaterialProperty::Density, PREPARE)?),
        _ => material.get(MaterialProperty::Density),
    };
    let thermal = match settings.analysis {
        AnalysisType::ThermoMech => Some((
            material.require(MaterialProperty::ThermalConductivity, PREPARE)?,
            material.require(MaterialProperty::ThermalExpansionCoefficient, PREPARE)?,
            material.require(MaterialProperty::SpecificHeat, PREPARE)?,
        )),
        _ => None,
    };

    let mut deck = DeckText::default();
    deck.line("** written by femrun CalculiX input writer");

    deck.section("Nodes");
    deck.line("*Node, NSET=Nall");
    for node in mesh.nodes() {
        deck.line(format!(
            "{}, {}, {}, {}",
            node.id,
            exp(node.x, 13, true),
            exp(node.y, 13, true),
            exp(node.z, 13, true)
        ));
    }

    deck.section("Volume elements");
    for element_type in mesh.element_types() {
        deck.line(format!(
            "*Element, TYPE={}, ELSET=Evolumes",
            element_type.calculix_name()
        ));
        for element in mesh.elements().filter(|e| e.element_type == element_type) {
            let entries: Vec<String> = std::iter::once(element.id)
                .chain(element.nodes.iter().copied())
                .map(|id| id.to_string())
                .collect();
            let chunks: Vec<&[String]> = entries.chunks(ENTRIES_PER_LINE).collect();
            for (i, chunk) in chunks.iter().enumerate() {
                let continued = if i + 1 < chunks.len() { "," } else { "" };
                deck.line(format!("{}{continued}", chunk.join(", ")));
            }
        }
    }

    deck.section("Element sets for materials and sections");
    deck.line("*ELSET, ELSET=Eall");
    deck.line("Evolumes");
    deck.line(format!("*ELSET, ELSET={ELSET_MATERIAL}"));
    deck.line("Evolumes");

    let fixed: Vec<_> = snapshot.fixed().collect();
    if !fixed.is_empty() {
        deck.section("Node sets for fixed constraints");
        for constraint in &fixed {
            let mut nodes = BTreeSet::new();
            for reference in &constraint.references {
                nodes.extend(snapshot.nodes_on_face(&constraint.name, reference)?);
            }
            deck.line(format!("** {}", constraint.name));
            deck.line(format!("*NSET, NSET={}", constraint.name));
            for node in nodes {
                deck.line(format!("{node},"));
            }
        }
    }

    deck.section("Materials");
    deck.line("** see information about units at file end");
    deck.line(format!("** material name: {}", material.card_name));
    deck.line(format!("*MATERIAL, NAME={}", material.object_name));
    deck.line("*ELASTIC");
    deck.line(format!("{:.0}, {:.3}", youngs / 1.0e6, poisson));
    if let Some(density) = density {
        deck.line("*DENSITY");
        deck.line(exp(density * 1.0e-12, 3, false));
    }
    if let Some((conductivity, expansion, specific_heat)) = thermal {
        deck.line("*CONDUCTIVITY");
        deck.line(format!("{conductivity:.3}"));
        deck.line("*EXPANSION");
        deck.line(exp(expansion, 3, false));
        deck.line("*SPECIFIC HEAT");
        deck.line(exp(specific_heat * 1.0e6, 3, false));
    }

    deck.section("Sections");
    deck.line(format!(
        "*SOLID SECTION, ELSET={ELSET_MATERIAL}, MATERIAL={}",
        material.object_name
    ));

    write_step(&mut deck, settings);

    if !fixed.is_empty() {
        deck.section("Fixed constraints");
        for constraint in &fixed {
            deck.line(format!("** {}", constraint.name));
            deck.line("*BOUNDARY");
            for dof in 1..=3 {
                deck.line(format!("{},{dof}", constraint.name));
            }
        }
    }

    write_forces(&mut deck, snapshot)?;
    write_pressures(&mut deck, snapshot)?;

    deck.section("Outputs --> frd file");
    deck.line("*NODE FILE");
    deck.line(if settings.analysis == AnalysisType::ThermoMech {
        "U, NT"
    } else {
        "U"
    });
    deck.line("*EL FILE");
    deck.line("S, E");
    deck.line("** outputs --> dat file");
    deck.line("*NODE PRINT, NSET=Nall");
    deck.line("U");
    deck.line("*EL PRINT, ELSET=Eall");
    deck.line("S");
    deck.line(SEPARATOR);
    deck.line("*END STEP");

    deck.section("CalculiX input file");
    deck.line(format!(
        "**   written by    --> femrun {}",
        env!("CARGO_PKG_VERSION")
    ));
    deck.line(format!("**   file name     --> {}.inp", mesh_object.name));
    deck.line(format!("**   analysis name --> {}", snapshot.analysis));
    deck.line("**");
    deck.line("**   Units");
    deck.line("**");
    deck.line("**   Geometry (mesh data)        --> mm");
    deck.line("**   Materials (Young's modulus) --> N/mm2 = MPa");
    deck.line("**   Loads (nodal loads)         --> N");
    deck.line("**");
    Ok(deck.0)
}

fn write_step(deck: &mut DeckText, settings: &StepSettings) {
    deck.section("Step");
    let mut step = String::from("*STEP");
    if settings.nonlinear {
        step.push_str(", NLGEOM");
    }
    if settings.analysis == AnalysisType::ThermoMech {
        step.push_str(&format!(", INC={}", settings.max_increments));
    }
    deck.line(step);

    let solver = settings
        .matrix_solver
        .map(|s| format!(", SOLVER={s}"))
        .unwrap_or_default();
    match settings.analysis {
        AnalysisType::Static => {
            deck.line(format!("*STATIC{solver}"));
            if settings.time_use {
                deck.line(format!(
                    "{},{}",
                    real(settings.initial_step),
                    real(settings.end_time)
                ));
            }
        }
        AnalysisType::Frequency => {
            deck.line(format!("*FREQUENCY{solver}"));
            deck.line(format!(
                "{}, {}, {}",
                settings.eigenmodes,
                real(settings.eigen_low),
                real(settings.eigen_high)
            ));
        }
        AnalysisType::ThermoMech => {
            let steady = if settings.steady_state { ", STEADY STATE" } else { "" };
            deck.line(format!("*COUPLED TEMPERATURE-DISPLACEMENT{solver}{steady}"));
            if settings.time_use {
                deck.line(format!(
                    "{},{}",
                    real(settings.initial_step),
                    real(settings.end_time)
                ));
            }
        }
        AnalysisType::Check => deck.line("*NO ANALYSIS"),
    }

    if settings.time_use && settings.analysis != AnalysisType::Check {
        deck.line("*CONTROLS, PARAMETERS=TIME INCREMENTATION");
        deck.line(&settings.controls_iter);
        deck.line(&settings.controls_cutb);
    }
}

fn write_forces(deck: &mut DeckText, snapshot: &Snapshot) -> Result<()> {
    let mut header_written = false;
    for constraint in &snapshot.constraints {
        let ConstraintKind::Force {
            magnitude,
            direction,
            reversed,
        } = &constraint.kind
        else {
            continue;
        };
        if !header_written {
            deck.section("Node loads (forces)");
            header_written = true;
        }

        let mut faces: BTreeMap<(u32, u8), ElementFace> = BTreeMap::new();
        for reference in &constraint.references {
            for face in snapshot.element_faces_on(&constraint.name, reference)? {
                faces.insert((face.element, face.face), face);
            }
        }
        let faces: Vec<ElementFace> = faces.into_values().collect();
        let mesh = snapshot.require_mesh_tables(&constraint.name)?;
        let shares = mesh.surface_load_shares(&faces);
        let unit = snapshot.direction(&constraint.name, direction)?;
        let sign = if *reversed { -1.0 } else { 1.0 };

        deck.line(format!("** {}", constraint.name));
        let shapes: Vec<String> = constraint.references.iter().map(|r| r.id()).collect();
        deck.line(format!("** node loads on shape: {}", shapes.join(", ")));
        deck.line("*CLOAD");
        for (node, share) in shares {
            for dof in 1..=3 {
                let value = magnitude * share * unit[dof - 1] * sign;
                deck.line(format!("{node},{dof},{}", exp(value, 13, true)));
            }
        }
    }
    Ok(())
}

fn write_pressures(deck: &mut DeckText, snapshot: &Snapshot) -> Result<()> {
    let mut header_written = false;
    for constraint in &snapshot.constraints {
        let ConstraintKind::Pressure { magnitude, reversed } = &constraint.kind else {
            continue;
        };
        if !header_written {
            deck.section("Element + CalculiX face + load in [MPa]");
            header_written = true;
        }
        let value = if *reversed { -magnitude } else { *magnitude };
        deck.line(format!("** {}", constraint.name));
        deck.line("*DLOAD");
        for reference in &constraint.references {
            deck.line(format!("** face load on shape: {}", reference.id()));
            let mut faces = snapshot.element_faces_on(&constraint.name, reference)?;
            faces.sort_by_key(|f| (f.element, f.face));
            for face in faces {
                deck.line(format!("{},P{},{}", face.element, face.face, real(value)));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use femrun_model::{OptionValue, SolverConfig};
    use std::collections::BTreeMap;

    fn bound(pairs: &[(&str, OptionValue)]) -> StepSettings {
        let options: BTreeMap<String, OptionValue> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        let options = bind_options("SolverCalculiX", &options, OPTIONS).expect("options bind");
        StepSettings::from_options(&options)
    }

    fn step_text(settings: &StepSettings) -> String {
        let mut deck = DeckText::default();
        write_step(&mut deck, settings);
        deck.0
    }

    #[test]
    fn static_linear_step_is_plain() {
        let text = step_text(&bound(&[]));
        assert!(text.ends_with("*STEP\n*STATIC\n"));
    }

    #[test]
    fn frequency_step_lists_mode_bounds() {
        let text = step_text(&bound(&[
            ("AnalysisType", "frequency".into()),
            ("MatrixSolverType", "spooles".into()),
            ("EigenmodesCount", 12_i64.into()),
        ]));
        assert!(text.contains("*FREQUENCY, SOLVER=SPOOLES\n12, 0.0, 1000000.0\n"));
    }

    #[test]
    fn thermomech_step_carries_increments_and_controls() {
        let text = step_text(&bound(&[
            ("AnalysisType", "thermomech".into()),
            ("GeometricalNonlinearity", "nonlinear".into()),
            ("ThermoMechSteadyState", true.into()),
            ("IterationsControlParameterTimeUse", true.into()),
            ("TimeEnd", 2_i64.into()),
        ]));
        assert!(text.contains("*STEP, NLGEOM, INC=2000\n"));
        assert!(text.contains("*COUPLED TEMPERATURE-DISPLACEMENT, STEADY STATE\n1.0,2.0\n"));
        assert!(text.contains("*CONTROLS, PARAMETERS=TIME INCREMENTATION\n4,8,9,16,10,4,0,5,0,0\n"));
    }

    #[test]
    fn check_analysis_writes_no_analysis() {
        let text = step_text(&bound(&[("AnalysisType", "check".into())]));
        assert!(text.ends_with("*NO ANALYSIS\n"));
    }

    #[test]
    fn unknown_solver_option_is_unsupported() {
        let config = SolverConfig::new("SolverCalculiX", BackendKind::Calculix)
            .with("OutputFrequency", 1_i64);
        let err = bind_options(&config.name, &config.options, OPTIONS).unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedOption { .. }));
    }
}
