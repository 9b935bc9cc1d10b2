//! Evaluation errors

use thiserror::Error;

/// Expression result type
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors raised while numerically evaluating an expression tree
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("state vector '{name}' evaluated without a state vector y")]
    MissingState { name: String },

    #[error("state slice {start}..{stop} out of bounds for state of length {len}")]
    StateSliceOutOfBounds {
        start: usize,
        stop: usize,
        len: usize,
    },

    #[error("'{name}' has no numeric value before discretisation")]
    NotDiscretised { name: String },

    #[error("shape mismatch in '{operation}': {left:?} vs {right:?}")]
    ShapeMismatch {
        operation: String,
        left: (usize, usize),
        right: (usize, usize),
    },
}
