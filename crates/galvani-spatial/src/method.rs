//! The spatial method interface and the per-domain registry

use std::sync::Arc;

use indexmap::IndexMap;
use ndarray::Array1;
use sprs::{CsMat, TriMat};
use tracing::debug;

use galvani_expr::{edge_average, BinaryOp, Side, Symbol, SymbolId};
use galvani_mesh::Mesh;

use crate::error::{Result, SpatialError};

/// Alias registered on behalf of the three electrode-scale domains
pub const MACROSCALE: &str = "macroscale";

/// The electrode-scale domains, in spatial order
pub const MACROSCALE_DOMAINS: [&str; 3] =
    ["negative electrode", "separator", "positive electrode"];

/// Domains whose divergence carries the spherical correction
pub const PARTICLE_DOMAINS: [&str; 2] = ["negative particle", "positive particle"];

/// Kind of a boundary condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BcKind {
    /// Fixed value at the boundary
    Dirichlet,
    /// Fixed flux through the boundary
    Neumann,
}

/// Boundary conditions of one variable, one per side
#[derive(Debug, Clone)]
pub struct VariableBcs {
    pub left: (Symbol, BcKind),
    pub right: (Symbol, BcKind),
}

/// Boundary conditions keyed by the structural id of the variable they
/// constrain
pub type BoundaryConditions = IndexMap<SymbolId, VariableBcs>;

/// A one-row matrix selecting entry `col` of an `n`-vector
pub(crate) fn selection_row(n: usize, col: usize) -> CsMat<f64> {
    let mut tri = TriMat::new((1, n));
    tri.add_triplet(0, col, 1.0);
    tri.to_csr()
}

/// Discretises the spatial operators over one family of domains
///
/// Implementations translate symbolic operator nodes into matrix-vector
/// expressions over the mesh. Default methods cover the behaviour shared
/// by all methods: broadcasting by a vector of ones, point-selection
/// boundary values, identity mass matrices, operand averaging in binary
/// operators, and subdomain concatenation by selection matrices.
pub trait SpatialMethod: Send + Sync {
    fn mesh(&self) -> &Mesh;

    /// Number of discrete unknowns a variable carries on `domain`
    fn broadcast_npts(&self, domain: &str) -> Result<usize>;

    /// Positions the method resolves a spatial variable to
    fn spatial_variable(&self, symbol: &Symbol) -> Result<Symbol>;

    fn gradient(
        &self,
        child: &Symbol,
        disc_child: Symbol,
        bcs: &BoundaryConditions,
    ) -> Result<Symbol>;

    fn divergence(
        &self,
        child: &Symbol,
        disc_child: Symbol,
        bcs: &BoundaryConditions,
    ) -> Result<Symbol>;

    /// Definite integral of `child` over its whole domain
    fn integral(&self, child: &Symbol, disc_child: Symbol) -> Result<Symbol>;

    /// Cumulative integral of `child` from the left edge of its domain
    fn indefinite_integral(&self, child: &Symbol, disc_child: Symbol) -> Result<Symbol>;

    /// Total number of unknowns across a multi-domain expression
    fn total_npts(&self, domain: &[String]) -> Result<usize> {
        domain.iter().map(|d| self.broadcast_npts(d)).sum()
    }

    /// Tile an already-discretised point value over `domain`
    ///
    /// Tiling multiplies by a vector of ones, so a symbol that already
    /// lives on `domain` passes through unchanged.
    fn broadcast(&self, symbol: Symbol, domain: &[String]) -> Result<Symbol> {
        if symbol.domain() == domain {
            return Ok(symbol);
        }
        let n = self.total_npts(domain)?;
        debug!(n, ?domain, "broadcasting to domain");
        let ones = Symbol::vector(Array1::ones(n)).with_domain(domain.to_vec());
        Ok((symbol * ones).with_domain(domain.to_vec()))
    }

    /// Value (or flux) of `child` at one boundary of its domain
    ///
    /// The default selects the discrete unknown nearest the boundary.
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
        let col = match side {
            Side::Left => 0,
            Side::Right => n - 1,
        };
        let sel = Symbol::matrix(selection_row(n, col));
        Ok(Symbol::matmul(sel, disc_child).with_domain(Vec::new()))
    }

    /// Mass matrix block of one variable
    fn mass_matrix(&self, variable: &Symbol, _bcs: &BoundaryConditions) -> Result<CsMat<f64>> {
        let n = self.total_npts(variable.domain())?;
        Ok(CsMat::eye(n))
    }

    /// Rebuild a binary node from discretised operands
    ///
    /// When exactly one operand holds edge values (it contains a gradient
    /// that no divergence has consumed), the other is averaged from nodes
    /// onto edges so the elementwise operation is shape-consistent.
    fn process_binary(
        &self,
        op: BinaryOp,
        left: &Symbol,
        right: &Symbol,
        disc_left: Symbol,
        disc_right: Symbol,
    ) -> Result<Symbol> {
        let (disc_left, disc_right) = match (
            left.has_gradient_and_not_divergence(),
            right.has_gradient_and_not_divergence(),
        ) {
            (true, false) => (disc_left, edge_average(disc_right)),
            (false, true) => (edge_average(disc_left), disc_right),
            _ => (disc_left, disc_right),
        };
        Ok(Symbol::binary(op, disc_left, disc_right))
    }

    /// Concatenate discretised expressions over adjacent subdomains
    ///
    /// Each child is lifted into the combined vector by a selection
    /// matrix and the lifted terms are summed.
    fn domain_concatenation(&self, children: Vec<Symbol>) -> Result<Symbol> {
        let full_domain: Vec<String> = children
            .iter()
            .flat_map(|c| c.domain().iter().cloned())
            .collect();
        let sizes: Vec<usize> = children
            .iter()
            .map(|c| self.total_npts(c.domain()))
            .collect::<Result<_>>()?;
        let total: usize = sizes.iter().sum();
        let mut offset = 0;
        let mut terms = Vec::with_capacity(children.len());
        for (child, n) in children.into_iter().zip(sizes) {
            let mut tri = TriMat::new((total, n));
            for k in 0..n {
                tri.add_triplet(offset + k, k, 1.0);
            }
            terms.push(Symbol::matmul(Symbol::matrix(tri.to_csr()), child));
            offset += n;
        }
        let mut terms = terms.into_iter();
        let first = terms.next().ok_or(SpatialError::EmptyConcatenation)?;
        let sum = terms.fold(first, |acc, term| acc + term);
        Ok(sum.with_domain(full_domain))
    }
}

/// Spatial methods keyed by domain name
///
/// Registering under [`MACROSCALE`] assigns the method to all three
/// electrode-scale domains at once.
#[derive(Clone, Default)]
pub struct SpatialMethods {
    methods: IndexMap<String, Arc<dyn SpatialMethod>>,
}

impl SpatialMethods {
    pub fn new() -> Self {
        SpatialMethods::default()
    }

    pub fn insert(&mut self, domain: impl Into<String>, method: Arc<dyn SpatialMethod>) {
        let domain = domain.into();
        if domain == MACROSCALE {
            for d in MACROSCALE_DOMAINS {
                self.methods.insert(d.to_string(), method.clone());
            }
        } else {
            self.methods.insert(domain, method);
        }
    }

    pub fn get(&self, domain: &str) -> Result<&Arc<dyn SpatialMethod>> {
        self.methods
            .get(domain)
            .ok_or_else(|| SpatialError::MissingSpatialMethod {
                domain: domain.to_string(),
            })
    }

    /// Method responsible for a (possibly multi-domain) expression,
    /// dispatched on its first domain
    pub fn for_domains(&self, domain: &[String]) -> Result<&Arc<dyn SpatialMethod>> {
        let first = domain
            .first()
            .ok_or_else(|| SpatialError::UndefinedOnScalarDomain {
                operation: "spatial method dispatch".into(),
            })?;
        self.get(first)
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

/// Whether a domain list starts in a particle domain
pub fn is_particle_domain(domain: &[String]) -> bool {
    matches!(
        domain.first().map(String::as_str),
        Some(d) if PARTICLE_DOMAINS.contains(&d)
    )
}
