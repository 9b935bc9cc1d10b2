//! Model and discretisation errors

use thiserror::Error;

/// Discretisation result type
pub type Result<T> = std::result::Result<T, DiscretisationError>;

/// Errors raised while checking a symbolic model
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("equation for '{variable}' has domain {found:?}, expected {expected:?} or none")]
    DomainMismatch {
        variable: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("'{variable}' already has a defining equation")]
    DuplicateVariable { variable: String },

    #[error("model is underdetermined: no equation defines {variables:?}")]
    Underdetermined { variables: Vec<String> },

    #[error("model is overdetermined: {variables:?} {reason}")]
    Overdetermined {
        variables: Vec<String>,
        reason: String,
    },

    #[error("no initial condition for '{variable}'")]
    MissingInitialCondition { variable: String },

    #[error("no boundary conditions for '{variable}' in equation '{equation}'")]
    MissingBoundaryCondition { variable: String, equation: String },
}

/// Errors raised while discretising a model
#[derive(Debug, Error)]
pub enum DiscretisationError {
    #[error("no state slice for variable '{name}'")]
    UnknownVariable { name: String },

    #[error("'{operation}' applied to an expression with no domain")]
    UnsupportedSymbol { operation: String },

    #[error("initial conditions do not cover the unknowns: missing {missing:?}, extra {extra:?}")]
    IncompleteInitialConditions {
        missing: Vec<String>,
        extra: Vec<String>,
    },

    #[error("equation for '{variable}' has {equation} rows but its initial condition has {initial_condition}")]
    ShapeMismatch {
        variable: String,
        equation: usize,
        initial_condition: usize,
    },

    #[error("model equations have {equations} rows but initial conditions have {initial_conditions}")]
    ConcatenatedShapeMismatch {
        equations: usize,
        initial_conditions: usize,
    },

    #[error("variable expression '{variable}' has {expression} rows but its state slice has {slice}")]
    VariableShapeMismatch {
        variable: String,
        expression: usize,
        slice: usize,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Spatial(#[from] galvani_spatial::SpatialError),

    #[error(transparent)]
    Mesh(#[from] galvani_mesh::MeshError),

    #[error(transparent)]
    Eval(#[from] galvani_expr::EvalError),
}
