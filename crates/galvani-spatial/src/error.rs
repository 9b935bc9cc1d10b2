//! Spatial method errors

use thiserror::Error;

/// Spatial method result type
pub type Result<T> = std::result::Result<T, SpatialError>;

/// Spatial method errors
#[derive(Debug, Error)]
pub enum SpatialError {
    #[error("no spatial method registered for domain '{domain}'")]
    MissingSpatialMethod { domain: String },

    #[error("'{operation}' is undefined for an expression with no domain")]
    UndefinedOnScalarDomain { operation: String },

    #[error("cannot concatenate zero expressions")]
    EmptyConcatenation,

    #[error(transparent)]
    Mesh(#[from] galvani_mesh::MeshError),
}
