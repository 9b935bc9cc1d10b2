//! Integration test harness for Galvani.
//!
//! This crate provides utilities for end-to-end testing of the full
//! discretisation pipeline: build a model, mesh it, discretise, evaluate.

use std::sync::Arc;

use galvani_disc::Discretisation;
use galvani_mesh::{Mesh, SubMesh};
use galvani_spatial::{FiniteVolume, SpatialMethods, MACROSCALE, MACROSCALE_DOMAINS};
use ndarray::Array2;

/// The three electrode-scale domains as owned strings, in spatial order
pub fn whole_cell() -> Vec<String> {
    MACROSCALE_DOMAINS.iter().map(|d| d.to_string()).collect()
}

/// The 10/5/10 whole-cell mesh with uniform 0.04 spacing throughout
pub fn whole_cell_mesh() -> Mesh {
    let mut mesh = Mesh::new();
    mesh.insert(
        "negative electrode",
        SubMesh::uniform(0.0, 0.4, 10).expect("valid submesh"),
    );
    mesh.insert(
        "separator",
        SubMesh::uniform(0.4, 0.6, 5).expect("valid submesh"),
    );
    mesh.insert(
        "positive electrode",
        SubMesh::uniform(0.6, 1.0, 10).expect("valid submesh"),
    );
    mesh
}

/// A finite-volume engine over the whole-cell mesh, with particle
/// domains added when `particle_npts` is nonzero
pub fn whole_cell_engine(particle_npts: usize) -> Discretisation {
    let mut mesh = whole_cell_mesh();
    if particle_npts > 0 {
        for d in ["negative particle", "positive particle"] {
            mesh.insert(d, SubMesh::uniform(0.0, 1.0, particle_npts).expect("valid submesh"));
        }
    }
    let mut methods = SpatialMethods::new();
    let fv = Arc::new(FiniteVolume::new(mesh.clone()));
    methods.insert(MACROSCALE, fv.clone());
    if particle_npts > 0 {
        methods.insert("negative particle", fv.clone());
        methods.insert("positive particle", fv);
    }
    Discretisation::new(mesh, methods)
}

/// Column vector from a slice
pub fn column(values: &[f64]) -> Array2<f64> {
    Array2::from_shape_vec((values.len(), 1), values.to_vec()).expect("column shape")
}

/// All node positions of the combined whole-cell mesh
pub fn whole_cell_nodes() -> Vec<f64> {
    whole_cell_mesh()
        .combine_submeshes(&whole_cell())
        .expect("contiguous mesh")
        .nodes()
        .to_vec()
}
