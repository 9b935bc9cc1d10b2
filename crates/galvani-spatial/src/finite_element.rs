//! Vertex-centred linear finite elements
//!
//! Unknowns live at the `n + 1` element vertices, which coincide with
//! the mesh edges; derived fluxes are constant on each of the `n`
//! elements. The divergence is the lumped weak form: boundary terms
//! supply Neumann fluxes, and rows belonging to Dirichlet vertices are
//! zeroed along with their mass entries since those values are
//! constrained rather than evolved.

use sprs::{CsMat, TriMat};
use tracing::trace;

use galvani_expr::Symbol;
use galvani_mesh::{Mesh, SubMesh};

use crate::error::{Result, SpatialError};
use crate::method::{BcKind, BoundaryConditions, SpatialMethod, VariableBcs};

/// Linear finite elements with a lumped mass matrix
#[derive(Clone)]
pub struct FiniteElement {
    mesh: Mesh,
}

impl FiniteElement {
    pub fn new(mesh: Mesh) -> Self {
        FiniteElement { mesh }
    }

    /// Lumped mass of each vertex: half the width of each adjacent element
    fn lumped_masses(submesh: &SubMesh) -> Vec<f64> {
        let w = submesh.d_edges();
        let n = submesh.npts();
        let mut masses = Vec::with_capacity(n + 1);
        masses.push(0.5 * w[0]);
        for i in 1..n {
            masses.push(0.5 * (w[i - 1] + w[i]));
        }
        masses.push(0.5 * w[n - 1]);
        masses
    }

    fn side_kinds(child: &Symbol, bcs: &BoundaryConditions) -> Option<VariableBcs> {
        child
            .pre_order()
            .into_iter()
            .find_map(|s| bcs.get(&s.id()))
            .cloned()
    }
}

impl SpatialMethod for FiniteElement {
    fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    fn broadcast_npts(&self, domain: &str) -> Result<usize> {
        Ok(self.mesh.get(domain)?.npts() + 1)
    }

    fn spatial_variable(&self, symbol: &Symbol) -> Result<Symbol> {
        let submesh = self.mesh.combine_submeshes(symbol.domain())?;
        Ok(Symbol::vector(submesh.edges().clone()).with_domain(symbol.domain().to_vec()))
    }

    /// Element gradient: the difference of a vertex pair over the
    /// element width
    fn gradient(
        &self,
        child: &Symbol,
        disc_child: Symbol,
        _bcs: &BoundaryConditions,
    ) -> Result<Symbol> {
        let domain = child.domain();
        if domain.is_empty() {
            return Err(SpatialError::UndefinedOnScalarDomain {
                operation: "gradient".into(),
            });
        }
        let submesh = self.mesh.combine_submeshes(domain)?;
        let n = submesh.npts();
        let mut tri = TriMat::new((n, n + 1));
        for (i, w) in submesh.d_edges().iter().enumerate() {
            tri.add_triplet(i, i, -1.0 / w);
            tri.add_triplet(i, i + 1, 1.0 / w);
        }
        Ok(Symbol::matmul(Symbol::matrix(tri.to_csr()), disc_child)
            .with_domain(domain.to_vec()))
    }

    /// Lumped weak-form divergence at the vertices
    fn divergence(
        &self,
        child: &Symbol,
        disc_child: Symbol,
        bcs: &BoundaryConditions,
    ) -> Result<Symbol> {
        let domain = child.domain();
        if domain.is_empty() {
            return Err(SpatialError::UndefinedOnScalarDomain {
                operation: "divergence".into(),
            });
        }
        let submesh = self.mesh.combine_submeshes(domain)?;
        let n = submesh.npts();
        let masses = Self::lumped_masses(&submesh);

        let side_kinds = Self::side_kinds(child, bcs);
        let stack_left = matches!(&side_kinds, Some(bc) if bc.left.1 == BcKind::Neumann);
        let stack_right = matches!(&side_kinds, Some(bc) if bc.right.1 == BcKind::Neumann);
        trace!(?domain, n, stack_left, stack_right, "building weak divergence");

        let mut parts = vec![disc_child];
        if let Some(bc) = &side_kinds {
            if stack_left {
                parts.insert(0, bc.left.0.clone());
            }
            if stack_right {
                parts.push(bc.right.0.clone());
            }
        }
        let flux = if parts.len() == 1 {
            parts.remove(0)
        } else {
            Symbol::stack(parts)
        };

        // bidiagonal over the stacked flux vector; rows at boundaries
        // without a Neumann flux stay zero
        let cols = n + stack_left as usize + stack_right as usize;
        let shift = if stack_left { 0 } else { 1 };
        let mut tri = TriMat::new((n + 1, cols));
        for (i, m) in masses.iter().enumerate() {
            if (i == 0 && !stack_left) || (i == n && !stack_right) {
                continue;
            }
            tri.add_triplet(i, i - shift, -1.0 / m);
            tri.add_triplet(i, i + 1 - shift, 1.0 / m);
        }
        Ok(Symbol::matmul(Symbol::matrix(tri.to_csr()), flux).with_domain(domain.to_vec()))
    }

    /// Trapezoid rule over the vertices
    fn integral(&self, child: &Symbol, disc_child: Symbol) -> Result<Symbol> {
        let domain = child.domain();
        if domain.is_empty() {
            return Err(SpatialError::UndefinedOnScalarDomain {
                operation: "integral".into(),
            });
        }
        let submesh = self.mesh.combine_submeshes(domain)?;
        let masses = Self::lumped_masses(&submesh);
        let mut tri = TriMat::new((1, masses.len()));
        for (i, m) in masses.iter().enumerate() {
            tri.add_triplet(0, i, *m);
        }
        Ok(Symbol::matmul(Symbol::matrix(tri.to_csr()), disc_child).with_domain(Vec::new()))
    }

    /// Cumulative trapezoid rule from the left boundary vertex
    fn indefinite_integral(&self, child: &Symbol, disc_child: Symbol) -> Result<Symbol> {
        let domain = child.domain();
        if domain.is_empty() {
            return Err(SpatialError::UndefinedOnScalarDomain {
                operation: "indefinite integral".into(),
            });
        }
        let submesh = self.mesh.combine_submeshes(domain)?;
        let n = submesh.npts();
        let mut tri = TriMat::new((n + 1, n + 1));
        for i in 1..=n {
            for e in 0..i {
                let half = 0.5 * submesh.d_edges()[e];
                tri.add_triplet(i, e, half);
                tri.add_triplet(i, e + 1, half);
            }
        }
        Ok(Symbol::matmul(Symbol::matrix(tri.to_csr()), disc_child)
            .with_domain(domain.to_vec()))
    }

    /// Lumped mass with Dirichlet vertex entries zeroed
    fn mass_matrix(&self, variable: &Symbol, bcs: &BoundaryConditions) -> Result<CsMat<f64>> {
        let submesh = self.mesh.combine_submeshes(variable.domain())?;
        let n = submesh.npts();
        let mut masses = Self::lumped_masses(&submesh);
        if let Some(bc) = bcs.get(&variable.id()) {
            if bc.left.1 == BcKind::Dirichlet {
                masses[0] = 0.0;
            }
            if bc.right.1 == BcKind::Dirichlet {
                masses[n] = 0.0;
            }
        }
        let mut tri = TriMat::new((n + 1, n + 1));
        for (i, m) in masses.iter().enumerate() {
            if *m != 0.0 {
                tri.add_triplet(i, i, *m);
            }
        }
        Ok(tri.to_csr())
    }
}
