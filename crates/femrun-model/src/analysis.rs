//! The analysis container: everything one simulation needs, owned by the
//! caller and passed explicitly to whatever runs it.

use serde::{Deserialize, Serialize};

use crate::constraint::Constraint;
use crate::error::{ModelError, Result};
use crate::geometry::Shape;
use crate::material::MaterialObject;
use crate::mesh::{Mesh, MeshObject};
use crate::solver::{BackendKind, SolverConfig};

/// A child entity of an analysis, as returned by [`Analysis::remove`].
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Material(MaterialObject),
    Constraint(Constraint),
    Mesh(MeshObject),
    Solver(SolverConfig),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Analysis {
    name: String,
    #[serde(default)]
    shapes: Vec<Shape>,
    #[serde(default)]
    material: Option<MaterialObject>,
    #[serde(default)]
    constraints: Vec<Constraint>,
    #[serde(default)]
    mesh: Option<MeshObject>,
    #[serde(default)]
    solvers: Vec<SolverConfig>,
}

impl Analysis {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Read an analysis document and check its naming invariants.
    pub fn from_json(text: &str) -> Result<Self> {
        let parsed: Analysis = serde_json::from_str(text)?;
        let mut analysis = Analysis::new(parsed.name);
        for shape in parsed.shapes {
            analysis.add_shape(shape)?;
        }
        if let Some(material) = parsed.material {
            analysis.set_material(material)?;
        }
        for constraint in parsed.constraints {
            analysis.add_constraint(constraint)?;
        }
        if let Some(mesh) = parsed.mesh {
            analysis.replace_mesh(mesh)?;
        }
        for solver in parsed.solvers {
            analysis.add_solver(solver)?;
        }
        Ok(analysis)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn shape(&self, name: &str) -> Option<&Shape> {
        self.shapes.iter().find(|s| s.name == name)
    }

    pub fn material(&self) -> Option<&MaterialObject> {
        self.material.as_ref()
    }

    pub fn material_mut(&mut self) -> Option<&mut MaterialObject> {
        self.material.as_mut()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn mesh(&self) -> Option<&MeshObject> {
        self.mesh.as_ref()
    }

    pub fn solvers(&self) -> &[SolverConfig] {
        &self.solvers
    }

    pub fn solver(&self, backend: BackendKind) -> Option<&SolverConfig> {
        self.solvers.iter().find(|s| s.backend() == backend)
    }

    pub fn solver_mut(&mut self, backend: BackendKind) -> Option<&mut SolverConfig> {
        self.solvers.iter_mut().find(|s| s.backend() == backend)
    }

    /// Names of all child entities, in insertion order per kind.
    pub fn member_names(&self) -> Vec<&str> {
        self.material
            .iter()
            .map(|m| m.name.as_str())
            .chain(self.constraints.iter().map(|c| c.name.as_str()))
            .chain(self.mesh.iter().map(|m| m.name.as_str()))
            .chain(self.solvers.iter().map(|s| s.name.as_str()))
            .collect()
    }

    fn ensure_free(&self, name: &str) -> Result<()> {
        if self.member_names().contains(&name) {
            return Err(ModelError::DuplicateMember(format!(
                "'{name}' already exists in analysis {}",
                self.name
            )));
        }
        Ok(())
    }

    /// Shapes live beside the members; their names only need to be unique
    /// among shapes.
    pub fn add_shape(&mut self, shape: Shape) -> Result<()> {
        if self.shape(&shape.name).is_some() {
            return Err(ModelError::DuplicateMember(format!("shape '{}'", shape.name)));
        }
        self.shapes.push(shape);
        Ok(())
    }

    /// Attach the material, handing back the one it replaces.
    pub fn set_material(&mut self, material: MaterialObject) -> Result<Option<MaterialObject>> {
        let previous = self.material.take();
        if let Err(err) = self.ensure_free(&material.name) {
            self.material = previous;
            return Err(err);
        }
        self.material = Some(material);
        Ok(previous)
    }

    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<()> {
        self.ensure_free(&constraint.name)?;
        self.constraints.push(constraint);
        Ok(())
    }

    /// Install `mesh`, handing back the mesh it replaces.
    pub fn replace_mesh(&mut self, mesh: MeshObject) -> Result<Option<MeshObject>> {
        let previous = self.mesh.take();
        if let Err(err) = self.ensure_free(&mesh.name) {
            self.mesh = previous;
            return Err(err);
        }
        self.mesh = Some(mesh);
        Ok(previous)
    }

    /// At most one solver configuration per backend.
    pub fn add_solver(&mut self, solver: SolverConfig) -> Result<()> {
        if let Some(existing) = self.solver(solver.backend()) {
            return Err(ModelError::DuplicateMember(format!(
                "backend {} is already configured by '{}'",
                solver.backend(), existing.name
            )));
        }
        self.ensure_free(&solver.name)?;
        self.solvers.push(solver);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Member> {
        if self.material.as_ref().is_some_and(|m| m.name == name) {
            return self
                .material
                .take()
                .map(Member::Material)
                .ok_or_else(|| ModelError::UnknownMember(name.to_string()));
        }
        if let Some(index) = self.constraints.iter().position(|c| c.name == name) {
            return Ok(Member::Constraint(self.constraints.remove(index)));
        }
        if self.mesh.as_ref().is_some_and(|m| m.name == name) {
            return self
                .mesh
                .take()
                .map(Member::Mesh)
                .ok_or_else(|| ModelError::UnknownMember(name.to_string()));
        }
        if let Some(index) = self.solvers.iter().position(|s| s.name == name) {
            return Ok(Member::Solver(self.solvers.remove(index)));
        }
        Err(ModelError::UnknownMember(name.to_string()))
    }

    /// Convenience for callers that hold a bare mesh value.
    pub fn supplied_mesh(&self) -> Option<&Mesh> {
        self.mesh.as_ref().and_then(|m| m.mesh.as_ref())
    }
}
