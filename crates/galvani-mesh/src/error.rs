//! Mesh errors

use thiserror::Error;

/// Mesh result type
pub type Result<T> = std::result::Result<T, MeshError>;

/// Mesh errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshError {
    #[error("no submesh for domain '{domain}'")]
    UnknownDomain { domain: String },

    #[error("submeshes are not contiguous: '{left}' ends at {left_edge} but '{right}' starts at {right_edge}")]
    NonContiguous {
        left: String,
        right: String,
        left_edge: f64,
        right_edge: f64,
    },

    #[error("invalid submesh: {message}")]
    InvalidSubMesh { message: String },

    #[error("cannot combine an empty list of domains")]
    EmptyCombination,
}
