//! Cell-centred one-dimensional submeshes

use ndarray::Array1;

use crate::error::{MeshError, Result};

/// A one-dimensional cell-centred mesh over a single subdomain
///
/// `npts` cells are bounded by `npts + 1` edges; nodes sit at cell
/// midpoints. `d_nodes` holds node-to-node spacings (`npts - 1` entries)
/// and `d_edges` cell widths (`npts` entries).
#[derive(Debug, Clone, PartialEq)]
pub struct SubMesh {
    nodes: Array1<f64>,
    edges: Array1<f64>,
    d_nodes: Array1<f64>,
    d_edges: Array1<f64>,
}

impl SubMesh {
    /// Build a submesh from an increasing edge vector
    pub fn from_edges(edges: Array1<f64>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(MeshError::InvalidSubMesh {
                message: format!("need at least 2 edges, got {}", edges.len()),
            });
        }
        for i in 0..edges.len() - 1 {
            if edges[i + 1] <= edges[i] {
                return Err(MeshError::InvalidSubMesh {
                    message: format!(
                        "edges must be strictly increasing, found {} then {}",
                        edges[i],
                        edges[i + 1]
                    ),
                });
            }
        }
        let npts = edges.len() - 1;
        let nodes = Array1::from_iter((0..npts).map(|i| 0.5 * (edges[i] + edges[i + 1])));
        let d_nodes = Array1::from_iter((0..npts.saturating_sub(1)).map(|i| nodes[i + 1] - nodes[i]));
        let d_edges = Array1::from_iter((0..npts).map(|i| edges[i + 1] - edges[i]));
        Ok(SubMesh {
            nodes,
            edges,
            d_nodes,
            d_edges,
        })
    }

    /// Build a uniform submesh of `npts` cells on `[min, max]`
    pub fn uniform(min: f64, max: f64, npts: usize) -> Result<Self> {
        if npts == 0 {
            return Err(MeshError::InvalidSubMesh {
                message: "need at least one cell".into(),
            });
        }
        if max <= min {
            return Err(MeshError::InvalidSubMesh {
                message: format!("empty interval [{min}, {max}]"),
            });
        }
        let h = (max - min) / npts as f64;
        let edges = Array1::from_iter((0..=npts).map(|i| min + h * i as f64));
        SubMesh::from_edges(edges)
    }

    pub fn npts(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &Array1<f64> {
        &self.nodes
    }

    pub fn edges(&self) -> &Array1<f64> {
        &self.edges
    }

    pub fn d_nodes(&self) -> &Array1<f64> {
        &self.d_nodes
    }

    pub fn d_edges(&self) -> &Array1<f64> {
        &self.d_edges
    }

    pub fn min(&self) -> f64 {
        self.edges[0]
    }

    pub fn max(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }
}
