//! Immutable capture of an [`Analysis`], taken once before a run starts.
//!
//! The snapshot owns copies of everything the writers read, so the host may
//! keep editing its analysis while a worker thread prepares files from it.
//! Capturing normalizes material quantities and checks that every constraint
//! reference lives on the shape the mesh discretizes.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::Vector3;

use crate::analysis::Analysis;
use crate::constraint::{Constraint, ConstraintKind};
use crate::error::{ModelError, Result};
use crate::geometry::{Face, GeometryRef, Shape};
use crate::material::Material;
use crate::mesh::{ElementFace, Mesh, MeshObject};
use crate::solver::{BackendKind, SolverConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub analysis: String,
    /// The shape every reference resolves against
    pub shape: Option<Shape>,
    pub material: Option<Material>,
    pub constraints: Vec<Constraint>,
    pub mesh: Option<MeshObject>,
    pub solvers: BTreeMap<BackendKind, SolverConfig>,
}

impl Snapshot {
    pub fn capture(analysis: &Analysis) -> Result<Self> {
        let material = analysis.material().map(Material::from_object).transpose()?;

        let base_name = analysis
            .mesh()
            .map(|m| m.shape.clone())
            .or_else(|| {
                analysis
                    .constraints()
                    .iter()
                    .flat_map(Constraint::all_references)
                    .map(|r| r.shape.clone())
                    .next()
            });

        let shape = match &base_name {
            Some(name) => Some(analysis.shape(name).cloned().ok_or_else(|| {
                let owner = analysis.mesh().map_or("analysis", |m| m.name.as_str());
                ModelError::unresolved(owner, name.as_str(), "shape is not part of the analysis")
            })?),
            None => None,
        };

        for constraint in analysis.constraints() {
            if constraint.references.is_empty() {
                return Err(ModelError::unresolved(
                    &constraint.name,
                    "",
                    "constraint has no references",
                ));
            }
            for reference in constraint.all_references() {
                check_reference(constraint, reference, shape.as_ref())?;
            }
        }

        let mut solvers = BTreeMap::new();
        for solver in analysis.solvers() {
            if let Some(existing) = solvers.insert(solver.backend(), solver.clone()) {
                return Err(ModelError::DuplicateMember(format!(
                    "backend {} is configured by both '{}' and '{}'",
                    solver.backend(),
                    existing.name,
                    solver.name
                )));
            }
        }

        Ok(Self {
            analysis: analysis.name().to_string(),
            shape,
            material,
            constraints: analysis.constraints().to_vec(),
            mesh: analysis.mesh().cloned(),
            solvers,
        })
    }

    pub fn solver(&self, backend: BackendKind) -> Option<&SolverConfig> {
        self.solvers.get(&backend)
    }

    pub fn require_material(&self, required_by: &str) -> Result<&Material> {
        self.material
            .as_ref()
            .ok_or_else(|| ModelError::incomplete("material", required_by))
    }

    pub fn require_mesh(&self, required_by: &str) -> Result<&MeshObject> {
        self.mesh
            .as_ref()
            .ok_or_else(|| ModelError::incomplete("mesh", required_by))
    }

    pub fn require_mesh_tables(&self, required_by: &str) -> Result<&Mesh> {
        let object = self.require_mesh(required_by)?;
        object
            .mesh
            .as_ref()
            .ok_or_else(|| ModelError::incomplete(format!("node and element tables of {}", object.name), required_by))
    }

    pub fn require_shape(&self, required_by: &str) -> Result<&Shape> {
        self.shape
            .as_ref()
            .ok_or_else(|| ModelError::incomplete("geometry", required_by))
    }

    pub fn fixed(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints
            .iter()
            .filter(|c| matches!(c.kind, ConstraintKind::Fixed))
    }

    pub fn face(&self, constraint: &str, reference: &GeometryRef) -> Result<&Face> {
        self.shape
            .as_ref()
            .and_then(|s| s.face(&reference.element))
            .ok_or_else(|| ModelError::unresolved(constraint, reference.id(), "not a face of the shape"))
    }

    /// Mesh nodes lying on the referenced face.
    pub fn nodes_on_face(&self, constraint: &str, reference: &GeometryRef) -> Result<BTreeSet<u32>> {
        let mesh = self.require_mesh_tables(constraint)?;
        let face = self.face(constraint, reference)?;
        let tolerance = self.shape.as_ref().map_or(1.0e-6, |s| s.tolerance);
        let nodes = mesh.nodes_where(|p| face.contains(p, tolerance));
        if nodes.is_empty() {
            return Err(ModelError::unresolved(
                constraint,
                reference.id(),
                "face touches no mesh nodes",
            ));
        }
        Ok(nodes)
    }

    /// Element faces covering the referenced face.
    pub fn element_faces_on(&self, constraint: &str, reference: &GeometryRef) -> Result<Vec<ElementFace>> {
        let region = self.nodes_on_face(constraint, reference)?;
        let mesh = self.require_mesh_tables(constraint)?;
        let faces = mesh.faces_within(&region);
        if faces.is_empty() {
            return Err(ModelError::unresolved(
                constraint,
                reference.id(),
                "face covers no element faces",
            ));
        }
        Ok(faces)
    }

    /// Unit direction read off an edge, or off a face normal.
    pub fn direction(&self, constraint: &str, reference: &GeometryRef) -> Result<Vector3<f64>> {
        let shape = self.require_shape(constraint)?;
        let direction = match shape.edge(&reference.element) {
            Some(edge) => edge.direction(),
            None => shape
                .face(&reference.element)
                .and_then(|f| Vector3::from(f.normal).try_normalize(f64::EPSILON)),
        };
        direction.ok_or_else(|| {
            ModelError::unresolved(constraint, reference.id(), "no usable direction")
        })
    }
}

fn check_reference(constraint: &Constraint, reference: &GeometryRef, shape: Option<&Shape>) -> Result<()> {
    let unresolved = |reason: &str| ModelError::unresolved(&constraint.name, reference.id(), reason);
    let Some(shape) = shape else {
        return Err(unresolved("no base shape"));
    };
    if reference.shape != shape.name {
        return Err(unresolved(&format!(
            "belongs to {} but the mesh is on {}",
            reference.shape, shape.name
        )));
    }
    let is_direction = matches!(&constraint.kind, ConstraintKind::Force { direction, .. } if direction == reference);
    let known = shape.face(&reference.element).is_some()
        || (is_direction && shape.edge(&reference.element).is_some());
    if !known {
        return Err(unresolved("no such element on the shape"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{MaterialObject, MaterialProperty};
    use crate::mesh::{Element, ElementType, Node};

    fn cube_mesh() -> Mesh {
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
        Mesh::from_tables(nodes, vec![Element::new(1, ElementType::C3D8, (1..=8).collect())]).unwrap()
    }

    fn analysis() -> Analysis {
        let mut analysis = Analysis::new("Analysis");
        analysis.add_shape(Shape::cuboid("Box", [10.0, 10.0, 10.0])).unwrap();
        analysis.add_shape(Shape::cuboid("Other", [1.0, 1.0, 1.0])).unwrap();
        analysis
            .set_material(
                MaterialObject::new("MechanicalMaterial")
                    .with("YoungsModulus", "210 GPa")
                    .with("PoissonRatio", "0.3"),
            )
            .unwrap();
        analysis
            .replace_mesh(MeshObject::supplied("Mesh", "Box", cube_mesh()))
            .unwrap();
        analysis
            .add_constraint(Constraint::fixed("Fix", vec![GeometryRef::new("Box", "Face1")]))
            .unwrap();
        analysis
            .add_constraint(Constraint::force(
                "Load",
                vec![GeometryRef::new("Box", "Face6")],
                100.0,
                GeometryRef::new("Box", "Edge5"),
                false,
            ))
            .unwrap();
        analysis
    }

    #[test]
    fn capture_copies_and_normalizes() {
        let mut analysis = analysis();
        let snapshot = Snapshot::capture(&analysis).unwrap();
        analysis.remove("Fix").unwrap();
        assert_eq!(snapshot.constraints.len(), 2);
        assert_eq!(snapshot.shape.as_ref().unwrap().name, "Box");
        let material = snapshot.require_material("test").unwrap();
        assert_eq!(material.get(MaterialProperty::YoungsModulus), Some(2.1e11));
    }

    #[test]
    fn resolves_face_nodes_and_direction() {
        let snapshot = Snapshot::capture(&analysis()).unwrap();
        let face1 = GeometryRef::new("Box", "Face1");
        let nodes = snapshot.nodes_on_face("Fix", &face1).unwrap();
        assert_eq!(nodes.into_iter().collect::<Vec<_>>(), vec![1, 4, 5, 8]);
        let faces = snapshot.element_faces_on("Fix", &face1).unwrap();
        assert_eq!(faces[0].face, 6);
        let dir = snapshot
            .direction("Load", &GeometryRef::new("Box", "Edge5"))
            .unwrap();
        assert_eq!(dir, Vector3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn reference_on_another_shape_is_rejected() {
        let mut analysis = analysis();
        analysis
            .add_constraint(Constraint::fixed("Stray", vec![GeometryRef::new("Other", "Face1")]))
            .unwrap();
        let err = Snapshot::capture(&analysis).unwrap_err();
        assert!(matches!(err, ModelError::ReferenceResolution { ref constraint, .. } if constraint == "Stray"));
    }

    #[test]
    fn unknown_face_is_rejected() {
        let mut analysis = analysis();
        analysis
            .add_constraint(Constraint::fixed("Bad", vec![GeometryRef::new("Box", "Face9")]))
            .unwrap();
        assert!(Snapshot::capture(&analysis).is_err());
    }

    #[test]
    fn missing_entities_surface_as_incomplete_model() {
        let mut analysis = Analysis::new("Empty");
        analysis.add_shape(Shape::cuboid("Box", [1.0, 1.0, 1.0])).unwrap();
        let snapshot = Snapshot::capture(&analysis).unwrap();
        assert!(matches!(
            snapshot.require_mesh_tables("calculix prepare"),
            Err(ModelError::IncompleteModel { .. })
        ));
        assert!(snapshot.require_material("calculix prepare").is_err());
    }

    #[test]
    fn two_configs_for_one_backend_are_rejected() {
        // Deserializing directly skips the checks `Analysis::from_json` makes.
        let text = r#"{"name":"A","shapes":[],"constraints":[],"solvers":[
            {"name":"First","backend":"calculix"},
            {"name":"Second","backend":"calculix"}]}"#;
        let analysis: Analysis = serde_json::from_str(text).unwrap();
        assert_eq!(analysis.solvers().len(), 2);

        let err = Snapshot::capture(&analysis).unwrap_err();
        assert!(matches!(err, ModelError::DuplicateMember(ref message)
            if message.contains("'First'") && message.contains("'Second'")));
    }
}
