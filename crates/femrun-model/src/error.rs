//! Error types for femrun-model

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("incomplete model: {entity} is required by {required_by}")]
    IncompleteModel { entity: String, required_by: String },

    #[error("unsupported option '{option}' for {owner}: {reason}")]
    UnsupportedOption {
        owner: String,
        option: String,
        reason: String,
    },

    #[error("cannot resolve reference '{reference}' of {constraint}: {reason}")]
    ReferenceResolution {
        constraint: String,
        reference: String,
        reason: String,
    },

    #[error("invalid quantity '{text}' for {property}: {reason}")]
    InvalidQuantity {
        property: String,
        text: String,
        reason: String,
    },

    #[error("invalid mesh: {0}")]
    InvalidMesh(String),

    #[error("duplicate member: {0}")]
    DuplicateMember(String),

    #[error("no member named '{0}'")]
    UnknownMember(String),

    #[error("invalid model document: {0}")]
    Document(String),
}

impl ModelError {
    pub fn incomplete(entity: impl Into<String>, required_by: impl Into<String>) -> Self {
        ModelError::IncompleteModel {
            entity: entity.into(),
            required_by: required_by.into(),
        }
    }

    pub fn unresolved(
        constraint: impl Into<String>,
        reference: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ModelError::ReferenceResolution {
            constraint: constraint.into(),
            reference: reference.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Document(err.to_string())
    }
}
