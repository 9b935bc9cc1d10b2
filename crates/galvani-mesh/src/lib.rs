//! Galvani meshes
//!
//! One-dimensional cell-centred submeshes and the per-domain mesh
//! collection used by the spatial methods.

pub mod error;
pub mod mesh;
pub mod submesh;

pub use error::{MeshError, Result};
pub use mesh::Mesh;
pub use submesh::SubMesh;
