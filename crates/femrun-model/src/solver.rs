//! Per-backend solver settings and their binding against an option schema.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Solver programs the framework can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// CalculiX, a direct-stiffness structural solver
    Calculix,
    /// Elmer, a multiphysics solver
    Elmer,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Calculix, BackendKind::Elmer];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Calculix => "calculix",
            BackendKind::Elmer => "elmer",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "calculix" | "ccx" => Ok(BackendKind::Calculix),
            "elmer" => Ok(BackendKind::Elmer),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Float(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Text(v.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EquationKind {
    Elasticity,
}

impl EquationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquationKind::Elasticity => "Elasticity",
        }
    }
}

/// A physics equation attached to a multiphysics solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equation {
    pub name: String,
    pub kind: EquationKind,
    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,
}

impl Equation {
    pub fn elasticity(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EquationKind::Elasticity,
            options: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub name: String,
    /// Fixed at construction; an analysis indexes its solvers by it
    backend: BackendKind,
    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,
    #[serde(default)]
    pub equations: Vec<Equation>,
}

impl SolverConfig {
    pub fn new(name: impl Into<String>, backend: BackendKind) -> Self {
        Self {
            name: name.into(),
            backend,
            options: BTreeMap::new(),
            equations: Vec::new(),
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) {
        self.options.insert(key.into(), value.into());
    }

    pub fn with_equation(mut self, equation: Equation) -> Self {
        self.equations.push(equation);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptionType {
    Bool,
    Int,
    /// Integers are accepted and widened
    Float,
    Text,
    Choice(&'static [&'static str]),
}

/// One recognized option and the value used when the config omits it.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionSpec {
    pub name: &'static str,
    pub ty: OptionType,
    pub default: DefaultValue,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(&'static str),
}

impl OptionSpec {
    pub const fn new(name: &'static str, ty: OptionType, default: DefaultValue) -> Self {
        Self { name, ty, default }
    }
}

/// Options checked against a schema, with defaults filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundOptions {
    owner: String,
    values: BTreeMap<&'static str, OptionValue>,
}

/// Check `options` against `schema`. Unknown names, wrong types and values
/// outside a choice list are all `UnsupportedOption`.
pub fn bind_options(
    owner: &str,
    options: &BTreeMap<String, OptionValue>,
    schema: &[OptionSpec],
) -> Result<BoundOptions> {
    let unsupported = |option: &str, reason: String| ModelError::UnsupportedOption {
        owner: owner.to_string(),
        option: option.to_string(),
        reason,
    };

    for name in options.keys() {
        if !schema.iter().any(|spec| spec.name == name.as_str()) {
            return Err(unsupported(name, "not recognized".to_string()));
        }
    }

    let mut values = BTreeMap::new();
    for spec in schema {
        let value = match options.get(spec.name) {
            None => match spec.default {
                DefaultValue::Bool(v) => OptionValue::Bool(v),
                DefaultValue::Int(v) => OptionValue::Int(v),
                DefaultValue::Float(v) => OptionValue::Float(v),
                DefaultValue::Text(v) => OptionValue::Text(v.to_string()),
            },
            Some(given) => match (spec.ty, given) {
                (OptionType::Bool, OptionValue::Bool(_))
                | (OptionType::Int, OptionValue::Int(_))
                | (OptionType::Float, OptionValue::Float(_))
                | (OptionType::Text, OptionValue::Text(_)) => given.clone(),
                (OptionType::Float, OptionValue::Int(v)) => OptionValue::Float(*v as f64),
                (OptionType::Choice(choices), OptionValue::Text(v)) => {
                    if !choices.contains(&v.as_str()) {
                        return Err(unsupported(
                            spec.name,
                            format!("'{v}' is not one of {}", choices.join(", ")),
                        ));
                    }
                    given.clone()
                }
                (ty, other) => {
                    return Err(unsupported(
                        spec.name,
                        format!("expected {ty:?}, got {other:?}"),
                    ));
                }
            },
        };
        values.insert(spec.name, value);
    }

    Ok(BoundOptions {
        owner: owner.to_string(),
        values,
    })
}

impl BoundOptions {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    // Getters fall back to neutral values; after binding every schema entry
    // is present with the declared type.
    pub fn bool(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(OptionValue::Bool(true)))
    }

    pub fn int(&self, name: &str) -> i64 {
        match self.values.get(name) {
            Some(OptionValue::Int(v)) => *v,
            _ => 0,
        }
    }

    pub fn float(&self, name: &str) -> f64 {
        match self.values.get(name) {
            Some(OptionValue::Float(v)) => *v,
            Some(OptionValue::Int(v)) => *v as f64,
            _ => 0.0,
        }
    }

    pub fn text(&self, name: &str) -> &str {
        match self.values.get(name) {
            Some(OptionValue::Text(v)) => v,
            _ => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &[OptionSpec] = &[
        OptionSpec::new(
            "AnalysisType",
            OptionType::Choice(&["static", "frequency"]),
            DefaultValue::Text("static"),
        ),
        OptionSpec::new("EigenmodesCount", OptionType::Int, DefaultValue::Int(10)),
        OptionSpec::new("EigenmodeHighLimit", OptionType::Float, DefaultValue::Float(1.0e6)),
        OptionSpec::new("ThermoMechSteadyState", OptionType::Bool, DefaultValue::Bool(false)),
    ];

    #[test]
    fn fills_defaults_and_widens_integers() {
        let config = SolverConfig::new("SolverCalculiX", BackendKind::Calculix)
            .with("EigenmodeHighLimit", 500_i64);
        let bound = bind_options("calculix", &config.options, SCHEMA).unwrap();
        assert_eq!(bound.text("AnalysisType"), "static");
        assert_eq!(bound.int("EigenmodesCount"), 10);
        assert_eq!(bound.float("EigenmodeHighLimit"), 500.0);
        assert!(!bound.bool("ThermoMechSteadyState"));
    }

    #[test]
    fn unknown_option_is_rejected() {
        let config = SolverConfig::new("SolverCalculiX", BackendKind::Calculix)
            .with("BeamShellResultOutput3D", true);
        let err = bind_options("calculix", &config.options, SCHEMA).unwrap_err();
        assert_eq!(
            err,
            ModelError::UnsupportedOption {
                owner: "calculix".to_string(),
                option: "BeamShellResultOutput3D".to_string(),
                reason: "not recognized".to_string(),
            }
        );
    }

    #[test]
    fn wrong_type_and_bad_choice_are_rejected() {
        let config = SolverConfig::new("S", BackendKind::Calculix).with("EigenmodesCount", "ten");
        assert!(bind_options("calculix", &config.options, SCHEMA).is_err());
        let config = SolverConfig::new("S", BackendKind::Calculix).with("AnalysisType", "buckle");
        let err = bind_options("calculix", &config.options, SCHEMA).unwrap_err();
        assert!(err.to_string().contains("not one of static, frequency"));
    }

    #[test]
    fn untagged_values_from_json() {
        let json = r#"{"name":"S","backend":"calculix","options":
            {"EigenmodesCount":10,"EigenmodeHighLimit":1000000.0,"ThermoMechSteadyState":false,"AnalysisType":"static"}}"#;
        let config: SolverConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.options["EigenmodesCount"], OptionValue::Int(10));
        assert_eq!(config.options["EigenmodeHighLimit"], OptionValue::Float(1.0e6));
        assert_eq!(config.options["ThermoMechSteadyState"], OptionValue::Bool(false));
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!("ccx".parse::<BackendKind>(), Ok(BackendKind::Calculix));
        assert_eq!("Elmer".parse::<BackendKind>(), Ok(BackendKind::Elmer));
        assert!("z88".parse::<BackendKind>().is_err());
    }
}
