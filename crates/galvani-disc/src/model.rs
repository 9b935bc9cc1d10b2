//! Symbolic PDAE models
//!
//! A [`Model`] collects differential equations, algebraic constraints,
//! initial and boundary conditions, derived output variables and events,
//! all keyed by symbolic variables. Before discretisation the model is
//! checked for well-posedness: every variable defined exactly once, with
//! the conditions its equations require.

use indexmap::IndexMap;
use ndarray::Array2;
use sprs::CsMat;

use galvani_expr::{Kind, Symbol, SymbolId};
use galvani_spatial::{BcKind, VariableBcs};

use crate::error::ModelError;

type ModelResult<T> = std::result::Result<T, ModelError>;

/// A symbolic model of differential and algebraic equations
///
/// `rhs` holds `d(var)/dt = eqn` entries and `algebraic` holds
/// `0 = eqn` constraints, both keyed by the variable they define. Keys
/// may be concatenations of variables over adjacent subdomains.
///
/// The `concatenated_*` and `mass_matrix` fields are populated by the
/// discretisation engine and are `None` on a freshly built model.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub name: String,
    pub(crate) rhs: IndexMap<Symbol, Symbol>,
    pub(crate) algebraic: IndexMap<Symbol, Symbol>,
    pub(crate) initial_conditions: IndexMap<Symbol, Symbol>,
    pub(crate) boundary_conditions: IndexMap<Symbol, VariableBcs>,
    pub(crate) variables: IndexMap<String, Symbol>,
    pub(crate) events: Vec<(String, Symbol)>,
    pub concatenated_rhs: Option<Symbol>,
    pub concatenated_algebraic: Option<Symbol>,
    pub concatenated_initial_conditions: Option<Array2<f64>>,
    pub mass_matrix: Option<CsMat<f64>>,
}

/// All `Variable` nodes inside a key, covering concatenation keys
fn key_variables(key: &Symbol) -> Vec<&Symbol> {
    let mut vars = Vec::new();
    key.walk(&mut |s| {
        if matches!(s.kind(), Kind::Variable) {
            vars.push(s);
        }
    });
    vars
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Model {
            name: name.into(),
            ..Model::default()
        }
    }

    fn check_domain(variable: &Symbol, eqn: &Symbol) -> ModelResult<()> {
        if !eqn.domain().is_empty() && eqn.domain() != variable.domain() {
            return Err(ModelError::DomainMismatch {
                variable: variable.name().to_string(),
                expected: variable.domain().to_vec(),
                found: eqn.domain().to_vec(),
            });
        }
        Ok(())
    }

    fn check_unused_key(&self, variable: &Symbol) -> ModelResult<()> {
        if self.rhs.contains_key(variable) || self.algebraic.contains_key(variable) {
            return Err(ModelError::DuplicateVariable {
                variable: variable.name().to_string(),
            });
        }
        Ok(())
    }

    /// Add a differential equation `d(variable)/dt = eqn`
    pub fn insert_rhs(&mut self, variable: Symbol, eqn: impl Into<Symbol>) -> ModelResult<()> {
        let eqn = eqn.into();
        Self::check_domain(&variable, &eqn)?;
        self.check_unused_key(&variable)?;
        self.rhs.insert(variable, eqn);
        Ok(())
    }

    /// Add an algebraic constraint `0 = eqn` defining `variable`
    pub fn insert_algebraic(
        &mut self,
        variable: Symbol,
        eqn: impl Into<Symbol>,
    ) -> ModelResult<()> {
        let eqn = eqn.into();
        Self::check_domain(&variable, &eqn)?;
        self.check_unused_key(&variable)?;
        self.algebraic.insert(variable, eqn);
        Ok(())
    }

    pub fn insert_initial_condition(
        &mut self,
        variable: Symbol,
        value: impl Into<Symbol>,
    ) -> ModelResult<()> {
        let value = value.into();
        Self::check_domain(&variable, &value)?;
        self.initial_conditions.insert(variable, value);
        Ok(())
    }

    pub fn insert_boundary_conditions(
        &mut self,
        variable: Symbol,
        left: (impl Into<Symbol>, BcKind),
        right: (impl Into<Symbol>, BcKind),
    ) {
        self.boundary_conditions.insert(
            variable,
            VariableBcs {
                left: (left.0.into(), left.1),
                right: (right.0.into(), right.1),
            },
        );
    }

    /// Expose a derived quantity under a display name
    pub fn insert_variable(&mut self, name: impl Into<String>, expr: Symbol) {
        self.variables.insert(name.into(), expr);
    }

    /// Register a named event; solvers terminate when it crosses zero
    pub fn add_event(&mut self, name: impl Into<String>, expr: Symbol) {
        self.events.push((name.into(), expr));
    }

    pub fn rhs(&self) -> &IndexMap<Symbol, Symbol> {
        &self.rhs
    }

    pub fn algebraic(&self) -> &IndexMap<Symbol, Symbol> {
        &self.algebraic
    }

    pub fn initial_conditions(&self) -> &IndexMap<Symbol, Symbol> {
        &self.initial_conditions
    }

    pub fn boundary_conditions(&self) -> &IndexMap<Symbol, VariableBcs> {
        &self.boundary_conditions
    }

    pub fn variables(&self) -> &IndexMap<String, Symbol> {
        &self.variables
    }

    pub fn events(&self) -> &[(String, Symbol)] {
        &self.events
    }

    /// Fold another model into this one, rejecting colliding entries
    ///
    /// Used to assemble a full model from submodels.
    pub fn update(&mut self, other: Model) -> ModelResult<()> {
        for (var, eqn) in other.rhs {
            self.check_unused_key(&var)?;
            self.rhs.insert(var, eqn);
        }
        for (var, eqn) in other.algebraic {
            self.check_unused_key(&var)?;
            self.algebraic.insert(var, eqn);
        }
        for (var, value) in other.initial_conditions {
            if self.initial_conditions.contains_key(&var) {
                return Err(ModelError::DuplicateVariable {
                    variable: var.name().to_string(),
                });
            }
            self.initial_conditions.insert(var, value);
        }
        for (var, bcs) in other.boundary_conditions {
            if self.boundary_conditions.contains_key(&var) {
                return Err(ModelError::DuplicateVariable {
                    variable: var.name().to_string(),
                });
            }
            self.boundary_conditions.insert(var, bcs);
        }
        self.variables.extend(other.variables);
        self.events.extend(other.events);
        Ok(())
    }

    /// Check that the model defines every variable exactly once, with
    /// the initial and boundary conditions its equations need
    pub fn check_well_posedness(&self) -> ModelResult<()> {
        let mut defined: IndexMap<SymbolId, String> = IndexMap::new();
        let mut repeated: Vec<String> = Vec::new();
        for key in self.rhs.keys().chain(self.algebraic.keys()) {
            for var in key_variables(key) {
                if defined.insert(var.id(), var.name().to_string()).is_some() {
                    repeated.push(var.name().to_string());
                }
            }
        }
        if !repeated.is_empty() {
            return Err(ModelError::Overdetermined {
                variables: repeated,
                reason: "defined more than once".into(),
            });
        }

        let mut referenced: IndexMap<SymbolId, String> = IndexMap::new();
        for eqn in self.rhs.values().chain(self.algebraic.values()) {
            eqn.walk(&mut |s| {
                if matches!(s.kind(), Kind::Variable) {
                    referenced.insert(s.id(), s.name().to_string());
                }
            });
        }

        // an algebraic unknown no equation mentions adds a constraint
        // without a matching degree of freedom
        let unused: Vec<String> = self
            .algebraic
            .keys()
            .flat_map(key_variables)
            .filter(|v| !referenced.contains_key(&v.id()))
            .map(|v| v.name().to_string())
            .collect();
        if !unused.is_empty() {
            return Err(ModelError::Overdetermined {
                variables: unused,
                reason: "constrained algebraically but never used".into(),
            });
        }

        let undefined: Vec<String> = referenced
            .iter()
            .filter(|(id, _)| !defined.contains_key(*id))
            .map(|(_, name)| name.clone())
            .collect();
        if !undefined.is_empty() {
            return Err(ModelError::Underdetermined {
                variables: undefined,
            });
        }

        let ic_ids: Vec<SymbolId> = self
            .initial_conditions
            .keys()
            .flat_map(|k| key_variables(k).into_iter().map(|v| v.id()))
            .collect();
        for key in self.rhs.keys() {
            for var in key_variables(key) {
                if !ic_ids.contains(&var.id()) {
                    return Err(ModelError::MissingInitialCondition {
                        variable: var.name().to_string(),
                    });
                }
            }
        }

        let bc_ids: Vec<SymbolId> = self
            .boundary_conditions
            .keys()
            .flat_map(|k| key_variables(k).into_iter().map(|v| v.id()))
            .collect();
        for (key, eqn) in self.rhs.iter().chain(self.algebraic.iter()) {
            if !eqn.has_spatial_derivatives() {
                continue;
            }
            for var in key_variables(key) {
                if !bc_ids.contains(&var.id()) {
                    return Err(ModelError::MissingBoundaryCondition {
                        variable: var.name().to_string(),
                        equation: eqn.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galvani_expr::{div, grad};

    fn sep() -> Vec<String> {
        vec!["separator".to_string()]
    }

    fn diffusion_model() -> Model {
        let c = Symbol::variable("c", sep());
        let mut model = Model::new("diffusion");
        model.insert_rhs(c.clone(), -div(grad(c.clone()))).unwrap();
        model.insert_initial_condition(c.clone(), 1.0).unwrap();
        model.insert_boundary_conditions(
            c,
            (0.0, BcKind::Neumann),
            (0.0, BcKind::Neumann),
        );
        model
    }

    #[test]
    fn well_posed_model_passes() {
        diffusion_model().check_well_posedness().unwrap();
    }

    #[test]
    fn equation_domain_must_match_variable() {
        let c = Symbol::variable("c", sep());
        let other = Symbol::variable("d", vec!["negative electrode".to_string()]);
        let mut model = Model::new("bad");
        let err = model.insert_rhs(c, -other).unwrap_err();
        assert!(matches!(err, ModelError::DomainMismatch { .. }));
    }

    #[test]
    fn duplicate_definitions_are_rejected_at_insert() {
        let c = Symbol::variable("c", sep());
        let mut model = Model::new("dup");
        model.insert_rhs(c.clone(), 1.0).unwrap();
        let err = model.insert_algebraic(c, 2.0).unwrap_err();
        assert!(matches!(err, ModelError::DuplicateVariable { .. }));
    }

    #[test]
    fn repeated_variable_across_keys_is_overdetermined() {
        let a = Symbol::variable("a", Vec::new());
        let b = Symbol::variable("b", Vec::new());
        let both = Symbol::concatenation(vec![a.clone(), b.clone()]);
        let mut model = Model::new("over");
        model.insert_rhs(both.clone(), 1.0).unwrap();
        model.insert_rhs(b.clone(), 2.0).unwrap();
        model.insert_initial_condition(both, 0.0).unwrap();
        model.insert_initial_condition(b, 0.0).unwrap();
        let err = model.check_well_posedness().unwrap_err();
        assert!(matches!(err, ModelError::Overdetermined { .. }));
    }

    #[test]
    fn unused_algebraic_unknown_is_overdetermined() {
        let q = Symbol::variable("q", Vec::new());
        let mut model = Model::new("unused");
        model.insert_algebraic(q, 1.0).unwrap();
        let err = model.check_well_posedness().unwrap_err();
        assert!(matches!(err, ModelError::Overdetermined { .. }));
    }

    #[test]
    fn unreferenced_unknown_is_underdetermined() {
        let c = Symbol::variable("c", Vec::new());
        let d = Symbol::variable("d", Vec::new());
        let mut model = Model::new("under");
        model.insert_rhs(c.clone(), d).unwrap();
        model.insert_initial_condition(c, 0.0).unwrap();
        let err = model.check_well_posedness().unwrap_err();
        assert!(matches!(err, ModelError::Underdetermined { .. }));
    }

    #[test]
    fn missing_initial_condition_is_rejected() {
        let c = Symbol::variable("c", Vec::new());
        let mut model = Model::new("no ic");
        model.insert_rhs(c, 1.0).unwrap();
        let err = model.check_well_posedness().unwrap_err();
        assert!(matches!(err, ModelError::MissingInitialCondition { .. }));
    }

    #[test]
    fn spatial_derivatives_require_boundary_conditions() {
        let c = Symbol::variable("c", sep());
        let mut model = Model::new("no bcs");
        model.insert_rhs(c.clone(), -div(grad(c.clone()))).unwrap();
        model.insert_initial_condition(c, 1.0).unwrap();
        let err = model.check_well_posedness().unwrap_err();
        assert!(matches!(err, ModelError::MissingBoundaryCondition { .. }));
    }

    #[test]
    fn update_merges_submodels() {
        let mut full = diffusion_model();
        let phi = Symbol::variable("phi", Vec::new());
        let mut sub = Model::new("potential");
        sub.insert_rhs(phi.clone(), 0.5).unwrap();
        sub.insert_initial_condition(phi, 0.0).unwrap();
        sub.add_event("done", Symbol::time() - 1.0);
        full.update(sub).unwrap();
        assert_eq!(full.rhs.len(), 2);
        assert_eq!(full.events.len(), 1);
        full.check_well_posedness().unwrap();

        let dup = diffusion_model();
        let err = full.update(dup).unwrap_err();
        assert!(matches!(err, ModelError::DuplicateVariable { .. }));
    }
}
