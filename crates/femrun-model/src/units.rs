//! Quantity strings such as `"200000 MPa"` or `"7900 kg/m^3"`.
//!
//! Values are normalized to one canonical unit per dimension: SI for
//! material properties, millimetres for lengths (the mesh unit).

use crate::error::{ModelError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    /// Canonical unit: Pa
    Pressure,
    /// Canonical unit: kg/m^3
    Density,
    /// Canonical unit: 1/K
    ThermalExpansion,
    /// Canonical unit: W/m/K
    ThermalConductivity,
    /// Canonical unit: J/kg/K
    SpecificHeat,
    /// Canonical unit: mm
    Length,
    Dimensionless,
}

impl Dimension {
    fn factor(self, unit: &str) -> Option<f64> {
        let factor = match (self, unit) {
            (Dimension::Pressure, "Pa" | "N/m^2") => 1.0,
            (Dimension::Pressure, "kPa") => 1.0e3,
            (Dimension::Pressure, "MPa" | "N/mm^2") => 1.0e6,
            (Dimension::Pressure, "GPa") => 1.0e9,

            (Dimension::Density, "kg/m^3") => 1.0,
            (Dimension::Density, "g/cm^3" | "t/m^3") => 1.0e3,
            (Dimension::Density, "kg/mm^3") => 1.0e9,
            (Dimension::Density, "t/mm^3") => 1.0e12,

            (Dimension::ThermalExpansion, "1/K" | "m/m/K" | "mm/mm/K") => 1.0,
            (Dimension::ThermalExpansion, "um/m/K") => 1.0e-6,

            (Dimension::ThermalConductivity, "W/m/K" | "W/(m*K)") => 1.0,
            (Dimension::ThermalConductivity, "W/mm/K") => 1.0e3,

            (Dimension::SpecificHeat, "J/kg/K" | "J/(kg*K)") => 1.0,
            (Dimension::SpecificHeat, "kJ/kg/K") => 1.0e3,

            (Dimension::Length, "mm") => 1.0,
            (Dimension::Length, "cm") => 10.0,
            (Dimension::Length, "m") => 1.0e3,
            (Dimension::Length, "um") => 1.0e-3,

            (Dimension::Dimensionless, "") => 1.0,
            _ => return None,
        };
        Some(factor)
    }
}

/// Parse `text` and convert it to the canonical unit of `dimension`.
///
/// Bare numbers are only accepted for dimensionless quantities.
pub fn parse_quantity(property: &str, text: &str, dimension: Dimension) -> Result<f64> {
    let invalid = |reason: &str| ModelError::InvalidQuantity {
        property: property.to_string(),
        text: text.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = text.trim();
    let split = numeric_prefix_len(trimmed);
    if split == 0 {
        return Err(invalid("no leading number"));
    }
    let value: f64 = trimmed[..split]
        .parse()
        .map_err(|_| invalid("malformed number"))?;
    let unit = normalize_unit(&trimmed[split..]);

    let factor = dimension.factor(&unit).ok_or_else(|| {
        if unit.is_empty() {
            invalid("missing unit")
        } else {
            invalid(&format!("unit '{unit}' is not a {dimension:?} unit"))
        }
    })?;
    Ok(value * factor)
}

fn numeric_prefix_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut i = 0usize;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
        i += 1;
    }
    // Exponent only when a digit follows, so "5 eV"-like units are not eaten.
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }
    if text[..i].chars().any(|c| c.is_ascii_digit()) {
        i
    } else {
        0
    }
}

fn normalize_unit(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .replace('²', "^2")
        .replace('³', "^3")
        .replace('µ', "u")
        .replace('μ', "u")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pressure_in_mpa_becomes_pascal() {
        let v = parse_quantity("YoungsModulus", "200000 MPa", Dimension::Pressure).unwrap();
        assert_eq!(v, 2.0e11);
    }

    #[test]
    fn micro_strain_per_kelvin() {
        let v = parse_quantity("ThermalExpansionCoefficient", "12 um/m/K", Dimension::ThermalExpansion)
            .unwrap();
        assert!((v - 12.0e-6).abs() < 1e-18);
        let zero = parse_quantity("ThermalExpansionCoefficient", "0 µm/m/K", Dimension::ThermalExpansion)
            .unwrap();
        assert_eq!(zero, 0.0);
    }

    #[test]
    fn density_and_length() {
        assert_eq!(
            parse_quantity("Density", "7900 kg/m^3", Dimension::Density).unwrap(),
            7900.0
        );
        assert_eq!(
            parse_quantity("CharacteristicLengthMin", "9 mm", Dimension::Length).unwrap(),
            9.0
        );
        assert_eq!(
            parse_quantity("CharacteristicLengthMax", "2 m", Dimension::Length).unwrap(),
            2000.0
        );
    }

    #[test]
    fn exponent_and_no_space() {
        assert_eq!(
            parse_quantity("YoungsModulus", "2.1e5MPa", Dimension::Pressure).unwrap(),
            2.1e11
        );
        assert_eq!(
            parse_quantity("PoissonRatio", "0.30", Dimension::Dimensionless).unwrap(),
            0.3
        );
    }

    #[test]
    fn rejects_missing_or_foreign_units() {
        let err = parse_quantity("YoungsModulus", "200000", Dimension::Pressure).unwrap_err();
        assert!(err.to_string().contains("missing unit"));
        let err = parse_quantity("Density", "7900 MPa", Dimension::Density).unwrap_err();
        assert!(matches!(err, ModelError::InvalidQuantity { .. }));
        assert!(parse_quantity("Density", "heavy", Dimension::Density).is_err());
    }
}
