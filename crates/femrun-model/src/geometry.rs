//! Geometry as seen through the host's CAD boundary.
//!
//! The geometry kernel itself is external. What arrives here are named
//! planar faces, straight edges and solids of a shape, enough to locate mesh
//! nodes on a face and to read a direction off an edge.

use std::fmt;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

fn default_tolerance() -> f64 {
    1.0e-6
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub name: String,
    #[serde(default)]
    pub solids: Vec<String>,
    #[serde(default)]
    pub faces: Vec<Face>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Distance below which a node counts as lying on a face [mm]
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// BREP export of the shape, relative to the job directory
    #[serde(default)]
    pub brep_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub name: String,
    pub origin: [f64; 3],
    pub normal: [f64; 3],
    /// Axis-aligned bounds `[min, max]` of the face
    #[serde(default)]
    pub bounds: Option<[[f64; 3]; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub name: String,
    pub start: [f64; 3],
    pub end: [f64; 3],
}

impl Shape {
    /// Axis-aligned box at the origin with the face and edge numbering of a
    /// CAD box primitive: Face1/Face2 at x=0/x=l, Face3/Face4 at y=0/y=w,
    /// Face5/Face6 at z=0/z=h.
    pub fn cuboid(name: impl Into<String>, [l, w, h]: [f64; 3]) -> Self {
        let face = |name: &str, origin: [f64; 3], normal: [f64; 3], max: [f64; 3]| Face {
            name: name.to_string(),
            origin,
            normal,
            bounds: Some([origin, max]),
        };
        let edge = |name: &str, start: [f64; 3], end: [f64; 3]| Edge {
            name: name.to_string(),
            start,
            end,
        };

        Self {
            name: name.into(),
            solids: vec!["Solid1".to_string()],
            faces: vec![
                face("Face1", [0.0, 0.0, 0.0], [-1.0, 0.0, 0.0], [0.0, w, h]),
                face("Face2", [l, 0.0, 0.0], [1.0, 0.0, 0.0], [l, w, h]),
                face("Face3", [0.0, 0.0, 0.0], [0.0, -1.0, 0.0], [l, 0.0, h]),
                face("Face4", [0.0, w, 0.0], [0.0, 1.0, 0.0], [l, w, h]),
                face("Face5", [0.0, 0.0, 0.0], [0.0, 0.0, -1.0], [l, w, 0.0]),
                face("Face6", [0.0, 0.0, h], [0.0, 0.0, 1.0], [l, w, h]),
            ],
            edges: vec![
                edge("Edge1", [0.0, 0.0, 0.0], [0.0, 0.0, h]),
                edge("Edge2", [0.0, 0.0, h], [0.0, w, h]),
                edge("Edge3", [0.0, w, 0.0], [0.0, w, h]),
                edge("Edge4", [0.0, 0.0, 0.0], [0.0, w, 0.0]),
                edge("Edge5", [l, 0.0, 0.0], [l, 0.0, h]),
                edge("Edge6", [l, 0.0, h], [l, w, h]),
                edge("Edge7", [l, w, 0.0], [l, w, h]),
                edge("Edge8", [l, 0.0, 0.0], [l, w, 0.0]),
                edge("Edge9", [0.0, 0.0, 0.0], [l, 0.0, 0.0]),
                edge("Edge10", [0.0, 0.0, h], [l, 0.0, h]),
                edge("Edge11", [0.0, w, 0.0], [l, w, 0.0]),
                edge("Edge12", [0.0, w, h], [l, w, h]),
            ],
            tolerance: default_tolerance(),
            brep_file: None,
        }
    }

    pub fn face(&self, name: &str) -> Option<&Face> {
        self.faces.iter().find(|f| f.name == name)
    }

    pub fn edge(&self, name: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.name == name)
    }

    pub fn has_solid(&self, name: &str) -> bool {
        self.solids.iter().any(|s| s == name)
    }

    /// Name of the BREP file a mesher should read.
    pub fn brep_file_name(&self) -> String {
        self.brep_file
            .clone()
            .unwrap_or_else(|| format!("{}_Geometry.brep", self.name))
    }
}

impl Face {
    pub fn contains(&self, point: &Vector3<f64>, tolerance: f64) -> bool {
        let normal = Vector3::from(self.normal);
        let Some(unit) = normal.try_normalize(f64::EPSILON) else {
            return false;
        };
        let offset = point - Vector3::from(self.origin);
        if unit.dot(&offset).abs() > tolerance {
            return false;
        }
        match self.bounds {
            Some([min, max]) => (0..3).all(|axis| {
                point[axis] >= min[axis] - tolerance && point[axis] <= max[axis] + tolerance
            }),
            None => true,
        }
    }
}

impl Edge {
    /// Unit vector from start to end, `None` for a degenerate edge.
    pub fn direction(&self) -> Option<Vector3<f64>> {
        (Vector3::from(self.end) - Vector3::from(self.start)).try_normalize(f64::EPSILON)
    }
}

/// Reference to one sub-element of a shape, written `"Box:Face1"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GeometryRef {
    pub shape: String,
    pub element: String,
}

impl GeometryRef {
    pub fn new(shape: impl Into<String>, element: impl Into<String>) -> Self {
        Self {
            shape: shape.into(),
            element: element.into(),
        }
    }

    /// Stable identifier used once the model has been snapshotted.
    pub fn id(&self) -> String {
        format!("{}:{}", self.shape, self.element)
    }
}

impl fmt::Display for GeometryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.shape, self.element)
    }
}

impl TryFrom<String> for GeometryRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.split_once(':') {
            Some((shape, element)) if !shape.is_empty() && !element.is_empty() => {
                Ok(GeometryRef::new(shape, element))
            }
            _ => Err(format!("geometry reference '{value}' is not of the form Shape:Element")),
        }
    }
}

impl From<GeometryRef> for String {
    fn from(value: GeometryRef) -> Self {
        value.id()
    }
}

/// Sub-element kind and number as encoded in names like `Face6` or `Solid1`.
pub fn numbered_element(name: &str) -> Option<(&str, u32)> {
    let split = name.find(|c: char| c.is_ascii_digit())?;
    let (kind, number) = name.split_at(split);
    if kind.is_empty() {
        return None;
    }
    number.parse().ok().map(|n| (kind, n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cuboid_faces_follow_box_numbering() {
        let shape = Shape::cuboid("Box", [10.0, 10.0, 10.0]);
        let face2 = shape.face("Face2").unwrap();
        assert!(face2.contains(&Vector3::new(10.0, 5.0, 5.0), shape.tolerance));
        assert!(!face2.contains(&Vector3::new(0.0, 5.0, 5.0), shape.tolerance));
        let face6 = shape.face("Face6").unwrap();
        assert!(face6.contains(&Vector3::new(0.0, 10.0, 10.0), shape.tolerance));
    }

    #[test]
    fn bounds_limit_the_plane() {
        let shape = Shape::cuboid("Box", [10.0, 10.0, 10.0]);
        let face1 = shape.face("Face1").unwrap();
        assert!(!face1.contains(&Vector3::new(0.0, 20.0, 5.0), shape.tolerance));
    }

    #[test]
    fn edge5_points_along_z() {
        let shape = Shape::cuboid("Box", [10.0, 10.0, 10.0]);
        let dir = shape.edge("Edge5").unwrap().direction().unwrap();
        assert_eq!(dir, Vector3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn geometry_ref_round_trips_through_json() {
        let r = GeometryRef::new("Box", "Face6");
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, "\"Box:Face6\"");
        let back: GeometryRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
        assert!(serde_json::from_str::<GeometryRef>("\"Face6\"").is_err());
    }

    #[test]
    fn numbered_element_splits_kind_and_index() {
        assert_eq!(numbered_element("Face12"), Some(("Face", 12)));
        assert_eq!(numbered_element("Solid1"), Some(("Solid", 1)));
        assert_eq!(numbered_element("Top"), None);
        assert_eq!(numbered_element("12"), None);
    }
}
