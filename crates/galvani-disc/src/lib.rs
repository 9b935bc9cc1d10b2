//! Galvani discretisation
//!
//! Turns symbolic PDAE models into systems of ordinary differential and
//! algebraic equations over a mesh.

pub mod discretisation;
pub mod error;
pub mod model;

pub use discretisation::Discretisation;
pub use error::{DiscretisationError, ModelError, Result};
pub use model::Model;
