//! Collections of submeshes keyed by domain name

use indexmap::IndexMap;
use ndarray::Array1;

use crate::error::{MeshError, Result};
use crate::submesh::SubMesh;

/// Relative tolerance for edge continuity between adjacent submeshes
const CONTIGUITY_RTOL: f64 = 1e-10;

/// All submeshes of a problem, keyed by domain name
///
/// Insertion order is preserved, so domains iterate in the order they
/// were registered.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    submeshes: IndexMap<String, SubMesh>,
}

impl Mesh {
    pub fn new() -> Self {
        Mesh::default()
    }

    pub fn insert(&mut self, domain: impl Into<String>, submesh: SubMesh) {
        self.submeshes.insert(domain.into(), submesh);
    }

    pub fn get(&self, domain: &str) -> Result<&SubMesh> {
        self.submeshes
            .get(domain)
            .ok_or_else(|| MeshError::UnknownDomain {
                domain: domain.to_string(),
            })
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.submeshes.contains_key(domain)
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.submeshes.keys().map(String::as_str)
    }

    /// Merge the submeshes of adjacent domains into a single submesh
    ///
    /// The domains must appear in spatial order and their edges must be
    /// contiguous: each domain starts where the previous one ends.
    pub fn combine_submeshes(&self, domains: &[String]) -> Result<SubMesh> {
        let first = domains.first().ok_or(MeshError::EmptyCombination)?;
        if domains.len() == 1 {
            return Ok(self.get(first)?.clone());
        }
        let mut edges: Vec<f64> = self.get(first)?.edges().to_vec();
        for pair in domains.windows(2) {
            let sub = self.get(&pair[1])?;
            let left_edge = *edges.last().unwrap_or(&0.0);
            let right_edge = sub.edges()[0];
            let scale = left_edge.abs().max(right_edge.abs()).max(1.0);
            if (left_edge - right_edge).abs() > CONTIGUITY_RTOL * scale {
                return Err(MeshError::NonContiguous {
                    left: pair[0].clone(),
                    right: pair[1].clone(),
                    left_edge,
                    right_edge,
                });
            }
            edges.extend(sub.edges().iter().skip(1).copied());
        }
        SubMesh::from_edges(Array1::from_vec(edges))
    }
}
