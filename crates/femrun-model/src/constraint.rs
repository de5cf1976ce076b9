//! Boundary conditions attached to geometry.

use serde::{Deserialize, Serialize};

use crate::geometry::GeometryRef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    pub references: Vec<GeometryRef>,
    #[serde(flatten)]
    pub kind: ConstraintKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConstraintKind {
    /// All translations held at zero
    Fixed,
    /// Total force [N] spread over the referenced faces
    Force {
        magnitude: f64,
        /// Edge whose direction the force follows
        direction: GeometryRef,
        #[serde(default)]
        reversed: bool,
    },
    /// Surface pressure [MPa], pushing into the faces unless reversed
    Pressure {
        magnitude: f64,
        #[serde(default)]
        reversed: bool,
    },
}

impl Constraint {
    pub fn fixed(name: impl Into<String>, references: Vec<GeometryRef>) -> Self {
        Self {
            name: name.into(),
            references,
            kind: ConstraintKind::Fixed,
        }
    }

    pub fn force(
        name: impl Into<String>,
        references: Vec<GeometryRef>,
        magnitude: f64,
        direction: GeometryRef,
        reversed: bool,
    ) -> Self {
        Self {
            name: name.into(),
            references,
            kind: ConstraintKind::Force {
                magnitude,
                direction,
                reversed,
            },
        }
    }

    pub fn pressure(
        name: impl Into<String>,
        references: Vec<GeometryRef>,
        magnitude: f64,
        reversed: bool,
    ) -> Self {
        Self {
            name: name.into(),
            references,
            kind: ConstraintKind::Pressure {
                magnitude,
                reversed,
            },
        }
    }

    /// Every geometry reference, the force direction edge included.
    pub fn all_references(&self) -> impl Iterator<Item = &GeometryRef> {
        let direction = match &self.kind {
            ConstraintKind::Force { direction, .. } => Some(direction),
            _ => None,
        };
        self.references.iter().chain(direction)
    }
}
