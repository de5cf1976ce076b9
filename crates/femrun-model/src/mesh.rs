//! Mesh tables: nodes, volume elements and their faces.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// A node in the finite element mesh
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Node {
    pub fn new(id: u32, x: f64, y: f64, z: f64) -> Self {
        Self { id, x, y, z }
    }

    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }
}

/// Volume element types, named as CalculiX names them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementType {
    /// 4-node tetrahedron
    C3D4,
    /// 10-node tetrahedron
    C3D10,
    /// 8-node brick
    C3D8,
    /// 20-node brick
    C3D20,
}

/// Shape of one element face, which decides how a surface load spreads
/// over its nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceShape {
    Tri3,
    Tri6,
    Quad4,
    Quad8,
}

// Local node indices (0-based) of each face, CalculiX face order S1..Sn.
// Corner nodes first, then midside nodes.
const HEX_FACES: [[usize; 8]; 6] = [
    [0, 1, 2, 3, 8, 9, 10, 11],
    [4, 7, 6, 5, 15, 14, 13, 12],
    [0, 4, 5, 1, 16, 12, 17, 8],
    [1, 5, 6, 2, 17, 13, 18, 9],
    [2, 6, 7, 3, 18, 14, 19, 10],
    [3, 7, 4, 0, 19, 15, 16, 11],
];

const TET_FACES: [[usize; 6]; 4] = [
    [0, 1, 2, 4, 5, 6],
    [0, 3, 1, 7, 8, 4],
    [1, 3, 2, 8, 9, 5],
    [2, 3, 0, 9, 7, 6],
];

impl ElementType {
    pub fn num_nodes(&self) -> usize {
        match self {
            ElementType::C3D4 => 4,
            ElementType::C3D10 => 10,
            ElementType::C3D8 => 8,
            ElementType::C3D20 => 20,
        }
    }

    pub fn calculix_name(&self) -> &'static str {
        match self {
            ElementType::C3D4 => "C3D4",
            ElementType::C3D10 => "C3D10",
            ElementType::C3D8 => "C3D8",
            ElementType::C3D20 => "C3D20",
        }
    }

    pub fn from_calculix_type(type_str: &str) -> Option<Self> {
        match type_str.to_ascii_uppercase().as_str() {
            "C3D4" => Some(ElementType::C3D4),
            "C3D10" | "C3D10T" => Some(ElementType::C3D10),
            "C3D8" | "C3D8R" | "C3D8I" => Some(ElementType::C3D8),
            "C3D20" | "C3D20R" => Some(ElementType::C3D20),
            _ => None,
        }
    }

    pub fn face_shape(&self) -> FaceShape {
        match self {
            ElementType::C3D4 => FaceShape::Tri3,
            ElementType::C3D10 => FaceShape::Tri6,
            ElementType::C3D8 => FaceShape::Quad4,
            ElementType::C3D20 => FaceShape::Quad8,
        }
    }

    /// Local node indices of every face, in CalculiX face order.
    pub fn faces(&self) -> Vec<Vec<usize>> {
        let per_face = match self.face_shape() {
            FaceShape::Tri3 => 3,
            FaceShape::Tri6 => 6,
            FaceShape::Quad4 => 4,
            FaceShape::Quad8 => 8,
        };
        match self {
            ElementType::C3D4 | ElementType::C3D10 => TET_FACES
                .iter()
                .map(|face| face[..per_face].to_vec())
                .collect(),
            ElementType::C3D8 | ElementType::C3D20 => HEX_FACES
                .iter()
                .map(|face| face[..per_face].to_vec())
                .collect(),
        }
    }
}

impl FaceShape {
    fn corners(&self) -> usize {
        match self {
            FaceShape::Tri3 | FaceShape::Tri6 => 3,
            FaceShape::Quad4 | FaceShape::Quad8 => 4,
        }
    }

    /// Consistent nodal shares of a uniform unit surface load, corners first.
    fn node_shares(&self) -> &'static [f64] {
        const THIRD: f64 = 1.0 / 3.0;
        const TWELFTH: f64 = 1.0 / 12.0;
        match self {
            FaceShape::Tri3 => &[THIRD, THIRD, THIRD],
            FaceShape::Tri6 => &[0.0, 0.0, 0.0, THIRD, THIRD, THIRD],
            FaceShape::Quad4 => &[0.25, 0.25, 0.25, 0.25],
            FaceShape::Quad8 => &[
                -TWELFTH, -TWELFTH, -TWELFTH, -TWELFTH, THIRD, THIRD, THIRD, THIRD,
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: u32,
    #[serde(rename = "type")]
    pub element_type: ElementType,
    pub nodes: Vec<u32>,
}

impl Element {
    pub fn new(id: u32, element_type: ElementType, nodes: Vec<u32>) -> Self {
        Self {
            id,
            element_type,
            nodes,
        }
    }
}

/// One face of one element, addressed the way CalculiX addresses it
/// (`P<face>` in a `*DLOAD` line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementFace {
    pub element: u32,
    /// 1-based face number
    pub face: u8,
    pub shape: FaceShape,
    /// Global node ids, corners first
    pub nodes: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MeshTables {
    nodes: Vec<Node>,
    elements: Vec<Element>,
}

/// Validated mesh. Ids are unique and every element only references
/// existing nodes; iteration order is by id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "MeshTables", into = "MeshTables")]
pub struct Mesh {
    nodes: BTreeMap<u32, Node>,
    elements: BTreeMap<u32, Element>,
}

impl TryFrom<MeshTables> for Mesh {
    type Error = ModelError;

    fn try_from(tables: MeshTables) -> Result<Self> {
        Mesh::from_tables(tables.nodes, tables.elements)
    }
}

impl From<Mesh> for MeshTables {
    fn from(mesh: Mesh) -> Self {
        MeshTables {
            nodes: mesh.nodes.into_values().collect(),
            elements: mesh.elements.into_values().collect(),
        }
    }
}

impl Mesh {
    pub fn from_tables(nodes: Vec<Node>, elements: Vec<Element>) -> Result<Self> {
        let mut node_map = BTreeMap::new();
        for node in nodes {
            if node_map.insert(node.id, node).is_some() {
                return Err(ModelError::InvalidMesh(format!("duplicate node id {}", node.id)));
            }
        }

        let mut element_map = BTreeMap::new();
        for element in elements {
            let expected = element.element_type.num_nodes();
            if element.nodes.len() != expected {
                return Err(ModelError::InvalidMesh(format!(
                    "element {} of type {:?} has {} nodes but expected {}",
                    element.id,
                    element.element_type,
                    element.nodes.len(),
                    expected
                )));
            }
            if let Some(missing) = element.nodes.iter().find(|id| !node_map.contains_key(*id)) {
                return Err(ModelError::InvalidMesh(format!(
                    "element {} references missing node {}",
                    element.id, missing
                )));
            }
            let id = element.id;
            if element_map.insert(id, element).is_some() {
                return Err(ModelError::InvalidMesh(format!("duplicate element id {id}")));
            }
        }

        Ok(Self {
            nodes: node_map,
            elements: element_map,
        })
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    pub fn node(&self, id: u32) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    /// Element types present, sorted.
    pub fn element_types(&self) -> BTreeSet<ElementType> {
        self.elements.values().map(|e| e.element_type).collect()
    }

    /// Ids of nodes that satisfy `predicate`.
    pub fn nodes_where(&self, predicate: impl Fn(&Vector3<f64>) -> bool) -> BTreeSet<u32> {
        self.nodes
            .values()
            .filter(|n| predicate(&n.position()))
            .map(|n| n.id)
            .collect()
    }

    /// Element faces whose nodes all belong to `region`.
    pub fn faces_within(&self, region: &BTreeSet<u32>) -> Vec<ElementFace> {
        let mut found = Vec::new();
        for element in self.elements.values() {
            let shape = element.element_type.face_shape();
            for (index, local) in element.element_type.faces().iter().enumerate() {
                let nodes: Vec<u32> = local.iter().map(|&i| element.nodes[i]).collect();
                if nodes.iter().all(|id| region.contains(id)) {
                    found.push(ElementFace {
                        element: element.id,
                        face: (index + 1) as u8,
                        shape,
                        nodes,
                    });
                }
            }
        }
        found
    }

    /// Area of an element face from its corner nodes.
    pub fn face_area(&self, face: &ElementFace) -> f64 {
        let corner = |i: usize| {
            self.nodes
                .get(&face.nodes[i])
                .map(Node::position)
                .unwrap_or_else(Vector3::zeros)
        };
        let triangle = |a: Vector3<f64>, b: Vector3<f64>, c: Vector3<f64>| {
            0.5 * (b - a).cross(&(c - a)).norm()
        };
        match face.shape.corners() {
            3 => triangle(corner(0), corner(1), corner(2)),
            _ => triangle(corner(0), corner(1), corner(2)) + triangle(corner(0), corner(2), corner(3)),
        }
    }

    /// Fraction of a uniform surface load carried by each node of `faces`.
    /// The fractions sum to one; an empty or zero-area set yields an empty map.
    pub fn surface_load_shares(&self, faces: &[ElementFace]) -> BTreeMap<u32, f64> {
        let mut shares = BTreeMap::<u32, f64>::new();
        let mut total_area = 0.0;
        for face in faces {
            let area = self.face_area(face);
            total_area += area;
            for (node, share) in face.nodes.iter().zip(face.shape.node_shares()) {
                *shares.entry(*node).or_insert(0.0) += share * area;
            }
        }
        if total_area <= 0.0 {
            return BTreeMap::new();
        }
        for value in shares.values_mut() {
            *value /= total_area;
        }
        shares
    }
}

/// How a mesh object gets its tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MeshKind {
    /// Tables supplied directly by the host
    Supplied,
    /// Generated by Gmsh from the shape's BREP export
    Gmsh(GmshParameters),
}

fn default_max_length() -> String {
    "0 mm".to_string()
}

fn default_order() -> u8 {
    2
}

fn default_algorithm_2d() -> u8 {
    2
}

fn default_algorithm_3d() -> u8 {
    1
}

fn default_geometry_tolerance() -> f64 {
    1.0e-6
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmshParameters {
    /// Quantity string, a zero length leaves the minimum to Gmsh
    #[serde(default = "default_max_length")]
    pub characteristic_length_min: String,
    /// Quantity string, zero means unbounded
    #[serde(default = "default_max_length")]
    pub characteristic_length_max: String,
    #[serde(default = "default_order")]
    pub element_order: u8,
    #[serde(default = "default_algorithm_2d")]
    pub algorithm_2d: u8,
    #[serde(default = "default_algorithm_3d")]
    pub algorithm_3d: u8,
    #[serde(default)]
    pub optimize: bool,
    #[serde(default = "default_geometry_tolerance")]
    pub geometry_tolerance: f64,
}

impl Default for GmshParameters {
    fn default() -> Self {
        Self {
            characteristic_length_min: default_max_length(),
            characteristic_length_max: default_max_length(),
            element_order: default_order(),
            algorithm_2d: default_algorithm_2d(),
            algorithm_3d: default_algorithm_3d(),
            optimize: false,
            geometry_tolerance: default_geometry_tolerance(),
        }
    }
}

/// A named mesh bound to a shape. The tables are a value: cloning the object
/// into another analysis copies them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshObject {
    pub name: String,
    /// Name of the shape the mesh discretizes
    pub shape: String,
    pub kind: MeshKind,
    #[serde(default)]
    pub mesh: Option<Mesh>,
}

impl MeshObject {
    pub fn supplied(name: impl Into<String>, shape: impl Into<String>, mesh: Mesh) -> Self {
        Self {
            name: name.into(),
            shape: shape.into(),
            kind: MeshKind::Supplied,
            mesh: Some(mesh),
        }
    }

    pub fn gmsh(name: impl Into<String>, shape: impl Into<String>, params: GmshParameters) -> Self {
        Self {
            name: name.into(),
            shape: shape.into(),
            kind: MeshKind::Gmsh(params),
            mesh: None,
        }
    }

    pub fn with_mesh(mut self, mesh: Mesh) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn gmsh_parameters(&self) -> Option<&GmshParameters> {
        match &self.kind {
            MeshKind::Gmsh(params) => Some(params),
            MeshKind::Supplied => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_cube(size: f64) -> Mesh {
        let s = size;
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
        Mesh::from_tables(nodes, elements).unwrap()
    }

    #[test]
    fn rejects_dangling_node_reference() {
        let nodes = vec![Node::new(1, 0.0, 0.0, 0.0)];
        let elements = vec![Element::new(1, ElementType::C3D4, vec![1, 2, 3, 4])];
        let err = Mesh::from_tables(nodes, elements).unwrap_err();
        assert!(err.to_string().contains("missing node 2"));
    }

    #[test]
    fn rejects_duplicate_ids_and_wrong_arity() {
        let nodes = vec![Node::new(1, 0.0, 0.0, 0.0), Node::new(1, 1.0, 0.0, 0.0)];
        assert!(Mesh::from_tables(nodes, Vec::new()).is_err());

        let nodes = (1..=4).map(|i| Node::new(i, i as f64, 0.0, 0.0)).collect();
        let elements = vec![Element::new(1, ElementType::C3D8, vec![1, 2, 3, 4])];
        let err = Mesh::from_tables(nodes, elements).unwrap_err();
        assert!(err.to_string().contains("expected 8"));
    }

    #[test]
    fn finds_the_face_at_x_max() {
        let mesh = unit_cube(10.0);
        let region = mesh.nodes_where(|p| (p.x - 10.0).abs() < 1e-9);
        assert_eq!(region.iter().copied().collect::<Vec<_>>(), vec![2, 3, 6, 7]);
        let faces = mesh.faces_within(&region);
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].face, 4);
        assert_eq!(mesh.face_area(&faces[0]), 100.0);
    }

    #[test]
    fn quad_face_load_is_split_evenly() {
        let mesh = unit_cube(10.0);
        let region = mesh.nodes_where(|p| (p.z - 10.0).abs() < 1e-9);
        let faces = mesh.faces_within(&region);
        assert_eq!(faces[0].face, 2);
        let shares = mesh.surface_load_shares(&faces);
        assert_eq!(shares.len(), 4);
        assert!(shares.values().all(|s| *s == 0.25));
    }

    #[test]
    fn tet10_midside_nodes_take_the_load() {
        let nodes = vec![
            Node::new(1, 0.0, 0.0, 0.0),
            Node::new(2, 2.0, 0.0, 0.0),
            Node::new(3, 0.0, 2.0, 0.0),
            Node::new(4, 0.0, 0.0, 2.0),
            Node::new(5, 1.0, 0.0, 0.0),
            Node::new(6, 1.0, 1.0, 0.0),
            Node::new(7, 0.0, 1.0, 0.0),
            Node::new(8, 0.0, 0.0, 1.0),
            Node::new(9, 1.0, 0.0, 1.0),
            Node::new(10, 0.0, 1.0, 1.0),
        ];
        let mesh = Mesh::from_tables(
            nodes,
            vec![Element::new(1, ElementType::C3D10, (1..=10).collect())],
        )
        .unwrap();
        let region = mesh.nodes_where(|p| p.z.abs() < 1e-9);
        let faces = mesh.faces_within(&region);
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].face, 1);
        let shares = mesh.surface_load_shares(&faces);
        assert_eq!(shares[&1], 0.0);
        let total: f64 = shares.values().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn json_tables_are_validated() {
        let json = r#"{"nodes":[{"id":1,"x":0.0,"y":0.0,"z":0.0}],
                       "elements":[{"id":1,"type":"C3D4","nodes":[1,1,1,9]}]}"#;
        assert!(serde_json::from_str::<Mesh>(json).is_err());
    }

    #[test]
    fn gmsh_parameters_fill_defaults() {
        let json = r#"{"name":"MeshGmsh","shape":"Box","kind":{"type":"Gmsh","element_order":1}}"#;
        let object: MeshObject = serde_json::from_str(json).unwrap();
        let params = object.gmsh_parameters().unwrap();
        assert_eq!(params.element_order, 1);
        assert_eq!(params.algorithm_3d, 1);
        assert_eq!(params.characteristic_length_max, "0 mm");
        assert!(object.mesh.is_none());
    }
}
