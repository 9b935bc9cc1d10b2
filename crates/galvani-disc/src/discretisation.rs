//! The discretisation engine
//!
//! Walks a well-posed symbolic [`Model`], assigns each variable a slice
//! of the global state vector, and rewrites every expression into a
//! matrix-vector form that evaluates numerically. The result is a new
//! model whose equations, initial conditions and mass matrix are ready
//! for a time stepper.

use std::ops::Range;

use indexmap::IndexMap;
use ndarray::Array2;
use sprs::{CsMat, TriMat};
use tracing::{debug, info, trace};

use galvani_expr::{Kind, Symbol, SymbolId, UnaryOp};
use galvani_mesh::Mesh;
use galvani_spatial::{BoundaryConditions, SpatialMethods, VariableBcs};

use crate::error::{DiscretisationError, Result};
use crate::model::Model;

/// Discretises symbolic models over a mesh
///
/// The engine itself is cheap to build; state slices and processed
/// boundary conditions are filled in by [`Discretisation::process_model`]
/// and reused by every expression it rewrites.
pub struct Discretisation {
    mesh: Mesh,
    spatial_methods: SpatialMethods,
    y_slices: IndexMap<SymbolId, Range<usize>>,
    slice_names: IndexMap<SymbolId, String>,
    bcs: BoundaryConditions,
}

/// The variables a state-slice key stands for, in order
fn unpack_key(key: &Symbol) -> Vec<&Symbol> {
    match key.kind() {
        Kind::Concatenation => key.children().iter().collect(),
        _ => vec![key],
    }
}

fn block_diag(blocks: &[CsMat<f64>]) -> CsMat<f64> {
    let rows = blocks.iter().map(CsMat::rows).sum();
    let cols = blocks.iter().map(CsMat::cols).sum();
    let mut tri = TriMat::new((rows, cols));
    let mut row_offset = 0;
    let mut col_offset = 0;
    for block in blocks {
        for (&value, (r, c)) in block.iter() {
            tri.add_triplet(row_offset + r, col_offset + c, value);
        }
        row_offset += block.rows();
        col_offset += block.cols();
    }
    tri.to_csr()
}

/// Whether an expression is a point value tiled by a vector of ones
fn is_broadcast_by_ones(symbol: &Symbol) -> bool {
    if let Kind::Binary(galvani_expr::BinaryOp::Mul) = symbol.kind() {
        if let Kind::Vector { entries } = symbol.right().kind() {
            return entries.iter().all(|v| *v == 1.0);
        }
    }
    false
}

/// Whether an expression lifts a subvector with a selection matrix (one
/// unit entry per column)
fn is_selection_lift(symbol: &Symbol) -> bool {
    if let Kind::Binary(galvani_expr::BinaryOp::MatMul) = symbol.kind() {
        if let Kind::Matrix { entries } = symbol.left().kind() {
            return entries.nnz() == entries.cols()
                && entries.iter().all(|(&v, _)| v == 1.0);
        }
    }
    false
}

/// Whether an expression is a subdomain concatenation, a sum of
/// selection-matrix lifts
fn is_concatenation_form(symbol: &Symbol) -> bool {
    match symbol.kind() {
        Kind::Binary(galvani_expr::BinaryOp::Add) => {
            is_concatenation_form(symbol.left()) && is_concatenation_form(symbol.right())
        }
        _ => is_selection_lift(symbol),
    }
}

impl Discretisation {
    pub fn new(mesh: Mesh, spatial_methods: SpatialMethods) -> Self {
        Discretisation {
            mesh,
            spatial_methods,
            y_slices: IndexMap::new(),
            slice_names: IndexMap::new(),
            bcs: BoundaryConditions::new(),
        }
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn y_slices(&self) -> &IndexMap<SymbolId, Range<usize>> {
        &self.y_slices
    }

    pub fn bcs(&self) -> &BoundaryConditions {
        &self.bcs
    }

    /// Discretise `model` into a new model, leaving the input untouched
    pub fn process_model(&mut self, model: &Model) -> Result<Model> {
        info!(model = %model.name, "discretising model");
        model.check_well_posedness()?;

        let variables: Vec<Symbol> = model
            .rhs()
            .keys()
            .chain(model.algebraic().keys())
            .cloned()
            .collect();
        self.set_variable_slices(&variables)?;
        self.bcs = self.process_boundary_conditions(model)?;

        let initial_conditions = self.process_dict(model.initial_conditions())?;
        let y0 = self
            .concatenate_in_order(&initial_conditions, true)?
            .evaluate(0.0, None)?;
        debug!(rows = y0.nrows(), "initial conditions concatenated");

        let rhs = self.process_dict(model.rhs())?;
        let algebraic = self.process_dict(model.algebraic())?;
        let concatenated_rhs = self.concatenate_in_order(&rhs, false)?;
        let concatenated_algebraic = self.concatenate_in_order(&algebraic, false)?;

        let mut variables = IndexMap::new();
        for (name, expr) in model.variables() {
            variables.insert(name.clone(), self.process_symbol(expr)?);
        }
        let mut events = Vec::with_capacity(model.events().len());
        for (name, expr) in model.events() {
            events.push((name.clone(), self.process_symbol(expr)?));
        }

        let mass_matrix =
            self.create_mass_matrix(&rhs, &concatenated_algebraic, &y0)?;

        let mut disc = Model::new(model.name.clone());
        disc.rhs = rhs;
        disc.algebraic = algebraic;
        disc.initial_conditions = initial_conditions;
        disc.boundary_conditions = model.boundary_conditions().clone();
        disc.variables = variables;
        disc.events = events;
        disc.concatenated_rhs = Some(concatenated_rhs);
        disc.concatenated_algebraic = Some(concatenated_algebraic);
        disc.concatenated_initial_conditions = Some(y0);
        disc.mass_matrix = Some(mass_matrix);

        self.check_model(&disc)?;
        let unknowns = disc
            .concatenated_initial_conditions
            .as_ref()
            .map_or(0, |y| y.nrows());
        info!(model = %disc.name, unknowns, "model discretised");
        Ok(disc)
    }

    /// Discretise `model` in place
    pub fn process_model_inplace(&mut self, model: &mut Model) -> Result<()> {
        *model = self.process_model(model)?;
        Ok(())
    }

    /// Assign each variable a contiguous slice of the state vector, in
    /// key order with concatenation keys unpacked
    pub fn set_variable_slices(&mut self, variables: &[Symbol]) -> Result<()> {
        self.y_slices.clear();
        self.slice_names.clear();
        let mut start = 0;
        for key in variables {
            for var in unpack_key(key) {
                // each subdomain is counted by its own registered method
                let mut n = if var.domain().is_empty() { 1 } else { 0 };
                for d in var.domain() {
                    n += self.spatial_methods.get(d)?.broadcast_npts(d)?;
                }
                let end = start + n;
                debug!(variable = var.name(), start, end, "assigned state slice");
                self.y_slices.insert(var.id(), start..end);
                self.slice_names.insert(var.id(), var.name().to_string());
                start = end;
            }
        }
        info!(unknowns = start, variables = self.y_slices.len(), "state slices assigned");
        Ok(())
    }

    /// State slice covered by a key, spanning all of a concatenation
    fn slice_for_key(&self, key: &Symbol) -> Result<Range<usize>> {
        let vars = unpack_key(key);
        let first = vars
            .first()
            .and_then(|v| self.y_slices.get(&v.id()))
            .ok_or_else(|| DiscretisationError::UnknownVariable {
                name: key.name().to_string(),
            })?;
        let last = vars
            .last()
            .and_then(|v| self.y_slices.get(&v.id()))
            .ok_or_else(|| DiscretisationError::UnknownVariable {
                name: key.name().to_string(),
            })?;
        Ok(first.start..last.end)
    }

    fn process_boundary_conditions(&self, model: &Model) -> Result<BoundaryConditions> {
        let mut out = BoundaryConditions::new();
        for (var, bc) in model.boundary_conditions() {
            out.insert(
                var.id(),
                VariableBcs {
                    left: (self.process_symbol(&bc.left.0)?, bc.left.1),
                    right: (self.process_symbol(&bc.right.0)?, bc.right.1),
                },
            );
        }
        Ok(out)
    }

    /// Discretise every equation of a variable-keyed dictionary
    ///
    /// Point-valued equations attached to a spatial variable are tiled
    /// over the variable's domain.
    pub fn process_dict(
        &self,
        dict: &IndexMap<Symbol, Symbol>,
    ) -> Result<IndexMap<Symbol, Symbol>> {
        let mut out = IndexMap::with_capacity(dict.len());
        debug!(entries = dict.len(), "processing equation dictionary");
        for (key, eqn) in dict {
            let processed = self.process_symbol(eqn)?;
            let processed = if eqn.evaluates_to_number() && !key.domain().is_empty() {
                self.spatial_methods
                    .for_domains(key.domain())?
                    .broadcast(processed, key.domain())?
            } else {
                processed
            };
            out.insert(key.clone(), processed);
        }
        Ok(out)
    }

    /// Rewrite one expression tree into its discrete form
    pub fn process_symbol(&self, symbol: &Symbol) -> Result<Symbol> {
        trace!(symbol = %symbol, "rewriting");
        match symbol.kind() {
            Kind::Variable => {
                let slice = self.y_slices.get(&symbol.id()).ok_or_else(|| {
                    DiscretisationError::UnknownVariable {
                        name: symbol.name().to_string(),
                    }
                })?;
                Ok(Symbol::state_vector(slice.clone(), symbol.domain().to_vec()))
            }
            Kind::SpatialVariable => {
                let method = self.spatial_methods.for_domains(symbol.domain())?;
                Ok(method.spatial_variable(symbol)?)
            }
            Kind::Unary(op) => self.process_unary(symbol, *op),
            Kind::Binary(op) => {
                let disc_left = self.process_symbol(symbol.left())?;
                let disc_right = self.process_symbol(symbol.right())?;
                if symbol.domain().is_empty() {
                    Ok(Symbol::binary(*op, disc_left, disc_right))
                } else {
                    let method = self.spatial_methods.for_domains(symbol.domain())?;
                    Ok(method.process_binary(
                        *op,
                        symbol.left(),
                        symbol.right(),
                        disc_left,
                        disc_right,
                    )?)
                }
            }
            Kind::Concatenation => {
                let children: Vec<Symbol> = symbol
                    .children()
                    .iter()
                    .map(|c| {
                        let disc = self.process_symbol(c)?;
                        Ok(disc.with_domain(c.domain().to_vec()))
                    })
                    .collect::<Result<_>>()?;
                let method = self.spatial_methods.for_domains(symbol.domain())?;
                Ok(method.domain_concatenation(children)?)
            }
            Kind::Function { .. } => {
                let disc_child = self.process_symbol(symbol.child())?;
                Ok(Symbol::new(
                    symbol.name(),
                    symbol.domain().to_vec(),
                    symbol.kind().clone(),
                    vec![disc_child],
                ))
            }
            Kind::Stack => {
                let children: Vec<Symbol> = symbol
                    .children()
                    .iter()
                    .map(|c| self.process_symbol(c))
                    .collect::<Result<_>>()?;
                Ok(Symbol::stack(children))
            }
            Kind::Time
            | Kind::Scalar { .. }
            | Kind::Vector { .. }
            | Kind::Matrix { .. }
            | Kind::StateVector { .. } => Ok(symbol.clone()),
        }
    }

    fn process_unary(&self, symbol: &Symbol, op: UnaryOp) -> Result<Symbol> {
        let child = symbol.child();
        match op {
            UnaryOp::Negate => Ok(-self.process_symbol(child)?),
            UnaryOp::Abs => Ok(Symbol::unary(UnaryOp::Abs, self.process_symbol(child)?)),
            UnaryOp::EdgeAverage => Ok(Symbol::unary(
                UnaryOp::EdgeAverage,
                self.process_symbol(child)?,
            )),
            UnaryOp::Broadcast => {
                let disc_child = self.process_symbol(child)?;
                if symbol.domain().is_empty() {
                    return Ok(disc_child);
                }
                let method = self.spatial_methods.for_domains(symbol.domain())?;
                Ok(method.broadcast(disc_child, symbol.domain())?)
            }
            UnaryOp::Gradient
            | UnaryOp::Divergence
            | UnaryOp::DefiniteIntegral
            | UnaryOp::IndefiniteIntegral
            | UnaryOp::BoundaryValue(_) => {
                if child.domain().is_empty() {
                    return Err(DiscretisationError::UnsupportedSymbol {
                        operation: symbol.name().to_string(),
                    });
                }
                let method = self.spatial_methods.for_domains(child.domain())?;
                let disc_child = self.process_symbol(child)?;
                let out = match op {
                    UnaryOp::Gradient => method.gradient(child, disc_child, &self.bcs)?,
                    UnaryOp::Divergence => method.divergence(child, disc_child, &self.bcs)?,
                    UnaryOp::DefiniteIntegral => method.integral(child, disc_child)?,
                    UnaryOp::IndefiniteIntegral => {
                        method.indefinite_integral(child, disc_child)?
                    }
                    UnaryOp::BoundaryValue(side) => {
                        method.boundary_value_or_flux(side, child, disc_child)?
                    }
                    _ => unreachable!("handled above"),
                };
                Ok(out)
            }
        }
    }

    /// Stack a variable-keyed dictionary into a single column in state
    /// order
    ///
    /// With `check_complete` the dictionary must cover every state
    /// slice, which is how missing initial conditions surface.
    pub fn concatenate_in_order(
        &self,
        dict: &IndexMap<Symbol, Symbol>,
        check_complete: bool,
    ) -> Result<Symbol> {
        let mut parts: Vec<(usize, Symbol)> = Vec::with_capacity(dict.len());
        let mut covered: Vec<SymbolId> = Vec::new();
        let mut extra: Vec<String> = Vec::new();
        for (key, eqn) in dict {
            if check_complete
                && unpack_key(key)
                    .iter()
                    .any(|v| !self.y_slices.contains_key(&v.id()))
            {
                extra.push(key.name().to_string());
                continue;
            }
            let slice = self.slice_for_key(key)?;
            covered.extend(unpack_key(key).iter().map(|v| v.id()));
            parts.push((slice.start, eqn.clone()));
        }
        if check_complete {
            let missing: Vec<String> = self
                .y_slices
                .keys()
                .filter(|id| !covered.contains(id))
                .map(|id| {
                    self.slice_names
                        .get(id)
                        .cloned()
                        .unwrap_or_else(|| id.to_string())
                })
                .collect();
            if !missing.is_empty() || !extra.is_empty() {
                return Err(DiscretisationError::IncompleteInitialConditions {
                    missing,
                    extra,
                });
            }
        }
        parts.sort_by_key(|(start, _)| *start);
        Ok(Symbol::stack(parts.into_iter().map(|(_, eqn)| eqn).collect()))
    }

    /// Block-diagonal mass matrix in state order
    ///
    /// Differential variables contribute their method's mass block (the
    /// identity for finite volumes); the algebraic equations contribute
    /// one zero block sized by evaluating them at the initial state.
    fn create_mass_matrix(
        &self,
        rhs: &IndexMap<Symbol, Symbol>,
        concatenated_algebraic: &Symbol,
        y0: &Array2<f64>,
    ) -> Result<CsMat<f64>> {
        let mut keys: Vec<&Symbol> = rhs.keys().collect();
        keys.sort_by_key(|k| self.slice_for_key(k).map(|s| s.start).unwrap_or(usize::MAX));
        let mut blocks = Vec::new();
        for key in keys {
            for var in unpack_key(key) {
                if var.domain().is_empty() {
                    blocks.push(CsMat::eye(1));
                } else {
                    let method = self.spatial_methods.for_domains(var.domain())?;
                    blocks.push(method.mass_matrix(var, &self.bcs)?);
                }
            }
        }
        let algebraic_rows = concatenated_algebraic.evaluate(0.0, Some(y0))?.nrows();
        if algebraic_rows > 0 {
            blocks.push(CsMat::zero((algebraic_rows, algebraic_rows)));
        }
        Ok(block_diag(&blocks))
    }

    /// Shape checks on the discretised model
    fn check_model(&self, model: &Model) -> Result<()> {
        let y0 = model
            .concatenated_initial_conditions
            .as_ref()
            .ok_or_else(|| DiscretisationError::UnknownVariable {
                name: "initial conditions".to_string(),
            })?;

        // each equation must match its initial condition
        for (key, eqn) in model.rhs().iter().chain(model.algebraic().iter()) {
            let eqn_rows = eqn.evaluate(0.0, Some(y0))?.nrows();
            let ic_rows = match model.initial_conditions().get(key) {
                Some(ic) => ic.evaluate(0.0, None)?.nrows(),
                None => continue,
            };
            if eqn_rows != ic_rows {
                return Err(DiscretisationError::ShapeMismatch {
                    variable: key.name().to_string(),
                    equation: eqn_rows,
                    initial_condition: ic_rows,
                });
            }
        }

        // the stacked system must match the state vector
        let mut rows = 0;
        if let Some(rhs) = &model.concatenated_rhs {
            rows += rhs.evaluate(0.0, Some(y0))?.nrows();
        }
        if let Some(algebraic) = &model.concatenated_algebraic {
            rows += algebraic.evaluate(0.0, Some(y0))?.nrows();
        }
        if rows != y0.nrows() {
            return Err(DiscretisationError::ConcatenatedShapeMismatch {
                equations: rows,
                initial_conditions: y0.nrows(),
            });
        }

        // output variables that shadow an unknown must keep its shape,
        // unless they are deliberate re-tilings or concatenations
        for key in model.rhs().keys() {
            for var in unpack_key(key) {
                let Some(expr) = model.variables().get(var.name()) else {
                    continue;
                };
                if is_broadcast_by_ones(expr) || is_concatenation_form(expr) {
                    continue;
                }
                let expr_rows = expr.evaluate(0.0, Some(y0))?.nrows();
                let slice = self.slice_for_key(var)?;
                if expr_rows != slice.len() {
                    return Err(DiscretisationError::VariableShapeMismatch {
                        variable: var.name().to_string(),
                        expression: expr_rows,
                        slice: slice.len(),
                    });
                }
            }
        }
        Ok(())
    }
}
