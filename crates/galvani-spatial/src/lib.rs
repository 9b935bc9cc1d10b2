//! Galvani spatial methods
//!
//! Translates symbolic spatial operators into matrix-vector expressions
//! over a mesh. Methods are registered per domain and dispatched on the
//! domain of the operator's child.

pub mod error;
pub mod finite_element;
pub mod finite_volume;
pub mod method;

pub use error::{Result, SpatialError};
pub use finite_element::FiniteElement;
pub use finite_volume::FiniteVolume;
pub use method::{
    is_particle_domain, BcKind, BoundaryConditions, SpatialMethod, SpatialMethods, VariableBcs,
    MACROSCALE, MACROSCALE_DOMAINS, PARTICLE_DOMAINS,
};
