//! Host-side analysis model and its immutable run-time snapshot.
//!
//! This crate provides:
//! - **Analysis**: the mutable container a host edits (shapes, material,
//!   constraints, mesh, per-backend solver settings)
//! - **Snapshot**: a normalized, self-contained copy handed to a run
//! - **Units**: quantity strings normalized to SI or millimetres
//! - **Mesh**: validated node/element tables and face lookup
//! - **Solver options**: per-backend option binding with defaults

pub mod analysis;
pub mod constraint;
pub mod error;
pub mod geometry;
pub mod material;
pub mod mesh;
pub mod snapshot;
pub mod solver;
pub mod units;

pub use analysis::{Analysis, Member};
pub use constraint::{Constraint, ConstraintKind};
pub use error::{ModelError, Result};
pub use geometry::{Edge, Face, GeometryRef, Shape, numbered_element};
pub use material::{Material, MaterialObject, MaterialProperty};
pub use mesh::{
    Element, ElementFace, ElementType, FaceShape, GmshParameters, Mesh, MeshKind, MeshObject, Node,
};
pub use snapshot::Snapshot;
pub use solver::{
    BackendKind, BoundOptions, DefaultValue, Equation, EquationKind, OptionSpec, OptionType,
    OptionValue, SolverConfig, bind_options,
};
pub use units::{Dimension, parse_quantity};
