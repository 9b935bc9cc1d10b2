//! Cell-centred finite volumes
//!
//! Unknowns live at cell centres (nodes) and fluxes at cell faces
//! (edges). The gradient maps node values to face values and the
//! divergence maps face values back onto nodes. Dirichlet conditions
//! enter through ghost nodes mirrored across the boundary face; Neumann
//! conditions are stacked onto the flux vector before the divergence.

use sprs::{CsMat, TriMat};
use tracing::trace;

use galvani_expr::{Side, Symbol};
use galvani_mesh::{Mesh, SubMesh};

use crate::error::{Result, SpatialError};
use crate::method::{
    is_particle_domain, selection_row, BcKind, BoundaryConditions, SpatialMethod,
};

/// Finite-volume discretisation on a cell-centred mesh
#[derive(Clone)]
pub struct FiniteVolume {
    mesh: Mesh,
}

impl FiniteVolume {
    pub fn new(mesh: Mesh) -> Self {
        FiniteVolume { mesh }
    }

    /// Face-difference matrix over `submesh`
    ///
    /// Maps node values to interior-face values by differencing adjacent
    /// nodes and dividing by the node spacing. A ghost node on either
    /// side extends the matrix by one row and column, with the ghost
    /// spacing taken as twice the node-to-face distance.
    fn gradient_matrix(submesh: &SubMesh, ghost_left: bool, ghost_right: bool) -> CsMat<f64> {
        let n = submesh.npts();
        let mut spacings = Vec::with_capacity(n + 1);
        if ghost_left {
            spacings.push(2.0 * (submesh.nodes()[0] - submesh.edges()[0]));
        }
        spacings.extend(submesh.d_nodes().iter().copied());
        if ghost_right {
            let last_edge = submesh.edges()[submesh.edges().len() - 1];
            spacings.push(2.0 * (last_edge - submesh.nodes()[n - 1]));
        }
        let cols = n + ghost_left as usize + ghost_right as usize;
        let mut tri = TriMat::new((spacings.len(), cols));
        for (i, d) in spacings.iter().enumerate() {
            tri.add_triplet(i, i, -1.0 / d);
            tri.add_triplet(i, i + 1, 1.0 / d);
        }
        tri.to_csr()
    }

    /// Face-to-node difference matrix over `submesh`
    ///
    /// Maps `n + 1` face values to node values by differencing the faces
    /// of each cell and dividing by the cell width.
    fn divergence_matrix(submesh: &SubMesh) -> CsMat<f64> {
        let n = submesh.npts();
        let mut tri = TriMat::new((n, n + 1));
        for (i, w) in submesh.d_edges().iter().enumerate() {
            tri.add_triplet(i, i, -1.0 / w);
            tri.add_triplet(i, i + 1, 1.0 / w);
        }
        tri.to_csr()
    }

    /// Boundary conditions attached to any node of `child`'s tree
    fn find_bcs<'a>(
        child: &Symbol,
        bcs: &'a BoundaryConditions,
    ) -> Option<&'a crate::method::VariableBcs> {
        child.pre_order().into_iter().find_map(|s| bcs.get(&s.id()))
    }
}

impl SpatialMethod for FiniteVolume {
    fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    fn broadcast_npts(&self, domain: &str) -> Result<usize> {
        Ok(self.mesh.get(domain)?.npts())
    }

    fn spatial_variable(&self, symbol: &Symbol) -> Result<Symbol> {
        let submesh = self.mesh.combine_submeshes(symbol.domain())?;
        Ok(Symbol::vector(submesh.nodes().clone()).with_domain(symbol.domain().to_vec()))
    }

    fn gradient(
        &self,
        child: &Symbol,
        disc_child: Symbol,
        bcs: &BoundaryConditions,
    ) -> Result<Symbol> {
        let domain = child.domain();
        if domain.is_empty() {
            return Err(SpatialError::UndefinedOnScalarDomain {
                operation: "gradient".into(),
            });
        }
        let submesh = self.mesh.combine_submeshes(domain)?;
        let n = submesh.npts();

        // Dirichlet conditions become ghost nodes mirrored across the
        // boundary: u_ghost = 2 a - u_boundary_node
        let mut ghost_left = false;
        let mut ghost_right = false;
        let mut parts = vec![disc_child.clone()];
        if let Some(bc) = bcs.get(&child.id()) {
            if bc.left.1 == BcKind::Dirichlet {
                let first = Symbol::matmul(
                    Symbol::matrix(selection_row(n, 0)),
                    disc_child.clone(),
                );
                parts.insert(0, bc.left.0.clone() * 2.0 - first);
                ghost_left = true;
            }
            if bc.right.1 == BcKind::Dirichlet {
                let last = Symbol::matmul(
                    Symbol::matrix(selection_row(n, n - 1)),
                    disc_child,
                );
                parts.push(bc.right.0.clone() * 2.0 - last);
                ghost_right = true;
            }
        }
        trace!(?domain, n, ghost_left, ghost_right, "building gradient");
        let extended = if parts.len() == 1 {
            parts.remove(0)
        } else {
            Symbol::stack(parts)
        };
        let matrix = Self::gradient_matrix(&submesh, ghost_left, ghost_right);
        Ok(Symbol::matmul(Symbol::matrix(matrix), extended).with_domain(domain.to_vec()))
    }

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

        // Neumann conditions supply the missing boundary-face fluxes
        let mut parts = vec![disc_child];
        if let Some(bc) = Self::find_bcs(child, bcs) {
            if bc.left.1 == BcKind::Neumann {
                parts.insert(0, bc.left.0.clone());
            }
            if bc.right.1 == BcKind::Neumann {
                parts.push(bc.right.0.clone());
            }
        }
        let flux = if parts.len() == 1 {
            parts.remove(0)
        } else {
            Symbol::stack(parts)
        };
        let matrix = Symbol::matrix(Self::divergence_matrix(&submesh));

        let out = if is_particle_domain(domain) {
            // spherical coordinates: div N = (1/r^2) d(r^2 N)/dr
            let r = Symbol::vector(submesh.nodes().clone());
            let r_edges = Symbol::vector(submesh.edges().clone());
            (1.0 / r.pow(2.0)) * Symbol::matmul(matrix, r_edges.pow(2.0) * flux)
        } else {
            Symbol::matmul(matrix, flux)
        };
        Ok(out.with_domain(domain.to_vec()))
    }

    fn integral(&self, child: &Symbol, disc_child: Symbol) -> Result<Symbol> {
        let domain = child.domain();
        if domain.is_empty() {
            return Err(SpatialError::UndefinedOnScalarDomain {
                operation: "integral".into(),
            });
        }
        let submesh = self.mesh.combine_submeshes(domain)?;
        let n = submesh.npts();
        let mut tri = TriMat::new((1, n));
        for (i, w) in submesh.d_edges().iter().enumerate() {
            tri.add_triplet(0, i, *w);
        }
        Ok(Symbol::matmul(Symbol::matrix(tri.to_csr()), disc_child).with_domain(Vec::new()))
    }

    fn indefinite_integral(&self, child: &Symbol, disc_child: Symbol) -> Result<Symbol> {
        let domain = child.domain();
        if domain.is_empty() {
            return Err(SpatialError::UndefinedOnScalarDomain {
                operation: "indefinite integral".into(),
            });
        }
        let submesh = self.mesh.combine_submeshes(domain)?;
        let n = submesh.npts();
        // cumulative cell widths up to each node: full widths of the
        // cells to the left, half the width of the cell itself
        let mut tri = TriMat::new((n, n));
        for i in 0..n {
            for j in 0..i {
                tri.add_triplet(i, j, submesh.d_edges()[j]);
            }
            tri.add_triplet(i, i, 0.5 * submesh.d_edges()[i]);
        }
        Ok(Symbol::matmul(Symbol::matrix(tri.to_csr()), disc_child)
            .with_domain(domain.to_vec()))
    }

    /// Linear extrapolation from the two nodes nearest the boundary
    fn boundary_value_or_flux(
        &self,
        side: Side,
        child: &Symbol,
        disc_child: Symbol,
    ) -> Result<Symbol> {
        let domain = child.domain();
        if domain.is_empty() {
            return Err(SpatialError::UndefinedOnScalarDomain {
                operation: format!("boundary value ({side})"),
            });
        }
        let n = self.total_npts(domain)?;
        if n < 2 {
            let sel = selection_row(n, 0);
            return Ok(Symbol::matmul(Symbol::matrix(sel), disc_child).with_domain(Vec::new()));
        }
        let mut tri = TriMat::new((1, n));
        match side {
            Side::Left => {
                tri.add_triplet(0, 0, 1.5);
                tri.add_triplet(0, 1, -0.5);
            }
            Side::Right => {
                tri.add_triplet(0, n - 2, -0.5);
                tri.add_triplet(0, n - 1, 1.5);
            }
        }
        Ok(Symbol::matmul(Symbol::matrix(tri.to_csr()), disc_child).with_domain(Vec::new()))
    }
}
