//! Material property bags and their normalized form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::units::{Dimension, parse_quantity};

/// Material as the host stores it: an object name plus a bag of quantity
/// strings (`"YoungsModulus" -> "200000 MPa"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialObject {
    pub name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl MaterialObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MaterialProperty {
    YoungsModulus,
    PoissonRatio,
    Density,
    ThermalExpansionCoefficient,
    ThermalConductivity,
    SpecificHeat,
}

impl MaterialProperty {
    pub const ALL: [MaterialProperty; 6] = [
        MaterialProperty::YoungsModulus,
        MaterialProperty::PoissonRatio,
        MaterialProperty::Density,
        MaterialProperty::ThermalExpansionCoefficient,
        MaterialProperty::ThermalConductivity,
        MaterialProperty::SpecificHeat,
    ];

    /// Key in the host's property bag.
    pub fn key(&self) -> &'static str {
        match self {
            MaterialProperty::YoungsModulus => "YoungsModulus",
            MaterialProperty::PoissonRatio => "PoissonRatio",
            MaterialProperty::Density => "Density",
            MaterialProperty::ThermalExpansionCoefficient => "ThermalExpansionCoefficient",
            MaterialProperty::ThermalConductivity => "ThermalConductivity",
            MaterialProperty::SpecificHeat => "SpecificHeat",
        }
    }

    fn dimension(&self) -> Dimension {
        match self {
            MaterialProperty::YoungsModulus => Dimension::Pressure,
            MaterialProperty::PoissonRatio => Dimension::Dimensionless,
            MaterialProperty::Density => Dimension::Density,
            MaterialProperty::ThermalExpansionCoefficient => Dimension::ThermalExpansion,
            MaterialProperty::ThermalConductivity => Dimension::ThermalConductivity,
            MaterialProperty::SpecificHeat => Dimension::SpecificHeat,
        }
    }
}

/// Normalized material, every value in SI base units.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Name of the host object, used for card and set names
    pub object_name: String,
    /// Human-readable material name (`Name` in the bag)
    pub card_name: String,
    values: BTreeMap<MaterialProperty, f64>,
}

impl Material {
    pub fn from_object(object: &MaterialObject) -> Result<Self> {
        let mut values = BTreeMap::new();
        for property in MaterialProperty::ALL {
            if let Some(text) = object.properties.get(property.key()) {
                let value = parse_quantity(property.key(), text, property.dimension())?;
                values.insert(property, value);
            }
        }
        let card_name = object
            .properties
            .get("Name")
            .cloned()
            .unwrap_or_else(|| object.name.clone());

        Ok(Self {
            object_name: object.name.clone(),
            card_name,
            values,
        })
    }

    pub fn get(&self, property: MaterialProperty) -> Option<f64> {
        self.values.get(&property).copied()
    }

    /// Value of `property`, or `IncompleteModel` naming what needed it.
    pub fn require(&self, property: MaterialProperty, required_by: &str) -> Result<f64> {
        self.get(property).ok_or_else(|| {
            ModelError::incomplete(
                format!("material property {} of {}", property.key(), self.object_name),
                required_by,
            )
        })
    }
}
