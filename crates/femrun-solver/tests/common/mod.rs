//! Shared box models for the integration suites.

#![allow(dead_code)]

use std::path::PathBuf;

use femrun_model::{
    Analysis, BackendKind, Constraint, Element, ElementType, Equation, GeometryRef,
    GmshParameters, MaterialObject, Mesh, MeshObject, Node, Shape, SolverConfig,
};

pub fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("../../tests/fixtures");
    path.push(name);
    path
}

/// One C3D8 element filling the 10 mm box.
pub fn cube_mesh() -> Mesh {
    let s = 10.0;
    let nodes = vec![
        Node::new(1, 0.0, 0.0, 0.0),
        Node::new(2, s, 0.0, 0.0),
        Node::new(3, s, s, 0.0),
        Node::new(4, 0.0, s, 0.0),
        Node::new(5, 0.0, 0.0, s),
        Node::new(6, s, 0.0, s),
        Node::new(7, s, s, s),
        Node::new(8, 0.0, s, s),
    ];
    let elements = vec![Element::new(1, ElementType::C3D8, (1..=8).collect())];
    Mesh::from_tables(nodes, elements).expect("valid cube mesh")
}

pub fn steel() -> MaterialObject {
    MaterialObject::new("MechanicalMaterial")
        .with("Name", "Steel-Generic")
        .with("YoungsModulus", "200000 MPa")
        .with("PoissonRatio", "0.30")
        .with("Density", "7900 kg/m^3")
}

/// Box with Face1 fixed, a reversed 40 kN force on Face6 along Edge5 and
/// 1000 MPa on Face2. No mesh, no solver.
pub fn box_analysis() -> Analysis {
    let mut analysis = Analysis::new("Analysis");
    analysis
        .add_shape(Shape::cuboid("Box", [10.0, 10.0, 10.0]))
        .expect("shape");
    analysis.set_material(steel()).expect("material");
    analysis
        .add_constraint(Constraint::fixed(
            "FemConstraintFixed",
            vec![GeometryRef::new("Box", "Face1")],
        ))
        .expect("fixed");
    analysis
        .add_constraint(Constraint::force(
            "FemConstraintForce",
            vec![GeometryRef::new("Box", "Face6")],
            40000.0,
            GeometryRef::new("Box", "Edge5"),
            true,
        ))
        .expect("force");
    analysis
        .add_constraint(Constraint::pressure(
            "FemConstraintPressure",
            vec![GeometryRef::new("Box", "Face2")],
            1000.0,
            false,
        ))
        .expect("pressure");
    analysis
}

pub fn calculix_solver() -> SolverConfig {
    SolverConfig::new("SolverCalculiX", BackendKind::Calculix)
        .with("AnalysisType", "static")
        .with("GeometricalNonlinearity", "linear")
        .with("ThermoMechSteadyState", false)
        .with("MatrixSolverType", "default")
        .with("IterationsControlParameterTimeUse", false)
        .with("EigenmodesCount", 10_i64)
        .with("EigenmodeHighLimit", 1.0e6)
        .with("EigenmodeLowLimit", 0.0)
}

/// Static linear CalculiX analysis on the supplied cube mesh.
pub fn calculix_analysis() -> Analysis {
    let mut analysis = box_analysis();
    analysis
        .replace_mesh(MeshObject::supplied("Mesh", "Box", cube_mesh()))
        .expect("mesh");
    analysis.add_solver(calculix_solver()).expect("solver");
    analysis
}

/// Elmer elasticity on a Gmsh mesh with a 9 mm minimum element size.
pub fn elmer_analysis() -> Analysis {
    let mut analysis = box_analysis();
    let mut material = steel();
    material.set("ThermalExpansionCoefficient", "0 um/m/K");
    analysis.set_material(material).expect("material");
    let params = GmshParameters {
        characteristic_length_min: "9 mm".to_string(),
        ..GmshParameters::default()
    };
    analysis
        .replace_mesh(MeshObject::gmsh("Gmsh", "Box", params))
        .expect("mesh");
    analysis
        .add_solver(
            SolverConfig::new("SolverElmer", BackendKind::Elmer)
                .with_equation(Equation::elasticity("Elasticity")),
        )
        .expect("solver");
    analysis
}
