//! Galvani expression trees
//!
//! Symbolic expressions for PDAE models: immutable tree nodes with
//! structural identity, operator builders, and numeric evaluation of
//! discretised trees.

pub mod error;
pub mod evaluate;
pub mod operators;
pub mod symbol;

pub use error::{EvalError, Result};
pub use operators::*;
pub use symbol::{BinaryOp, EvalFn, Kind, Side, Symbol, SymbolId, UnaryOp};
