//! Integration tests for end-to-end discretisation.
//!
//! These tests verify the full pipeline:
//! Build model → Mesh → Discretise → Evaluate

use std::sync::Arc;

use approx::assert_relative_eq;
use galvani_disc::{Discretisation, DiscretisationError, Model, ModelError};
use galvani_expr::{boundary_value, div, grad, surf, Kind, Side, Symbol};
use galvani_mesh::{Mesh, SubMesh};
use galvani_spatial::{
    BcKind, FiniteElement, FiniteVolume, SpatialMethod, SpatialMethods, MACROSCALE,
};
use galvani_tests::{column, whole_cell, whole_cell_engine, whole_cell_nodes};

/// Diffusion of one concentration across all three electrode-scale
/// domains, fixed to 1 on the left and 0 on the right.
///
/// Verifies: slice assignment, ghost-node Dirichlet conditions,
/// initial-condition broadcasting, mass matrix, steady state
#[test]
fn whole_cell_dirichlet_diffusion() {
    let c = Symbol::variable("c", whole_cell());
    let mut model = Model::new("whole-cell diffusion");
    model.insert_rhs(c.clone(), div(grad(c.clone()))).unwrap();
    model.insert_initial_condition(c.clone(), 1.0).unwrap();
    model.insert_boundary_conditions(
        c.clone(),
        (1.0, BcKind::Dirichlet),
        (0.0, BcKind::Dirichlet),
    );
    model.insert_variable("rightmost c", surf(c.clone()));

    let mut engine = whole_cell_engine(0);
    let out = engine.process_model(&model).unwrap();

    // one variable spanning 10 + 5 + 10 cells
    assert_eq!(engine.y_slices()[&c.id()], 0..25);

    // the scalar initial condition is tiled over all 25 cells
    let y0 = out.concatenated_initial_conditions.clone().unwrap();
    assert_eq!(y0.nrows(), 25);
    for v in y0.iter() {
        assert_relative_eq!(*v, 1.0);
    }

    // the discretised equation is a 25-row column
    let rhs = &out.rhs()[&c];
    assert_eq!(rhs.evaluate(0.0, Some(&y0)).unwrap().nrows(), 25);

    // the mass matrix is the 25 x 25 identity
    let mass = out.mass_matrix.clone().unwrap().to_dense();
    assert_eq!(mass.nrows(), 25);
    for i in 0..25 {
        assert_relative_eq!(mass[[i, i]], 1.0);
    }

    // c = 1 - x satisfies both boundary values and has zero Laplacian,
    // so it is an exact steady state of the discrete operator
    let steady: Vec<f64> = whole_cell_nodes().iter().map(|x| 1.0 - x).collect();
    let y = column(&steady);
    let v = rhs.evaluate(0.0, Some(&y)).unwrap();
    for d in v.iter() {
        assert_relative_eq!(*d, 0.0, epsilon = 1e-10);
    }

    // the surface value extrapolates to the right boundary
    let right = out.variables()["rightmost c"].evaluate(0.0, Some(&y)).unwrap();
    assert_relative_eq!(right[[0, 0]], 0.0, epsilon = 1e-10);
}

/// Quadratic fields are differentiated exactly by the finite-volume
/// stencils.
///
/// Verifies: gradient and divergence composition with Neumann fluxes
#[test]
fn laplacian_of_quadratic_is_exact() {
    let mut mesh = Mesh::new();
    mesh.insert("separator", SubMesh::uniform(0.0, 1.0, 10).unwrap());
    let mut methods = SpatialMethods::new();
    methods.insert("separator", Arc::new(FiniteVolume::new(mesh.clone())));
    let mut engine = Discretisation::new(mesh.clone(), methods);

    let c = Symbol::variable("c", vec!["separator".to_string()]);
    let mut model = Model::new("quadratic");
    model.insert_rhs(c.clone(), div(grad(c.clone()))).unwrap();
    model.insert_initial_condition(c.clone(), 0.0).unwrap();
    // c = x^2 has flux 2x: zero at the left wall, 2 at the right
    model.insert_boundary_conditions(
        c.clone(),
        (0.0, BcKind::Neumann),
        (2.0, BcKind::Neumann),
    );
    let out = engine.process_model(&model).unwrap();

    let nodes = mesh.get("separator").unwrap().nodes().clone();
    let y: Vec<f64> = nodes.iter().map(|x| x * x).collect();
    let v = out.rhs()[&c].evaluate(0.0, Some(&column(&y))).unwrap();
    assert_eq!(v.nrows(), 10);
    for d in v.iter() {
        assert_relative_eq!(*d, 2.0, max_relative = 1e-12);
    }
}

/// Spherical diffusion in a particle domain.
///
/// Verifies: spherical divergence correction, particle surface values
#[test]
fn particle_diffusion_with_surface_value() {
    let c = Symbol::variable("c", vec!["negative particle".to_string()]);
    let mut model = Model::new("particle");
    model.insert_rhs(c.clone(), div(grad(c.clone()))).unwrap();
    model.insert_initial_condition(c.clone(), 0.5).unwrap();
    model.insert_boundary_conditions(
        c.clone(),
        (0.0, BcKind::Neumann),
        (-1.0, BcKind::Neumann),
    );
    model.insert_variable("surface concentration", surf(c.clone()));

    let mut engine = whole_cell_engine(10);
    let out = engine.process_model(&model).unwrap();
    let y0 = out.concatenated_initial_conditions.clone().unwrap();
    assert_eq!(y0.nrows(), 10);

    // uniform concentration with an outward surface flux: the flux only
    // drains the outermost cells, and the surface value starts at 0.5
    let v = out.rhs()[&c].evaluate(0.0, Some(&y0)).unwrap();
    assert_eq!(v.nrows(), 10);
    for d in v.iter().take(9) {
        assert_relative_eq!(*d, 0.0, epsilon = 1e-12);
    }
    assert!(v[[9, 0]] < 0.0);

    let surface = out.variables()["surface concentration"]
        .evaluate(0.0, Some(&y0))
        .unwrap();
    assert_relative_eq!(surface[[0, 0]], 0.5, max_relative = 1e-12);
}

/// Diffusivities multiplying a flux are averaged onto the faces.
///
/// Verifies: node-to-edge averaging inside binary operators
#[test]
fn nonlinear_flux_is_shape_consistent() {
    let mut mesh = Mesh::new();
    mesh.insert("separator", SubMesh::uniform(0.0, 1.0, 10).unwrap());
    let mut methods = SpatialMethods::new();
    methods.insert("separator", Arc::new(FiniteVolume::new(mesh.clone())));
    let mut engine = Discretisation::new(mesh, methods);

    let c = Symbol::variable("c", vec!["separator".to_string()]);
    let mut model = Model::new("nonlinear");
    model
        .insert_rhs(c.clone(), div(c.clone() * grad(c.clone())))
        .unwrap();
    model.insert_initial_condition(c.clone(), 2.0).unwrap();
    model.insert_boundary_conditions(
        c.clone(),
        (0.0, BcKind::Neumann),
        (0.0, BcKind::Neumann),
    );
    let out = engine.process_model(&model).unwrap();

    // a uniform profile has zero flux, so nothing moves
    let y0 = out.concatenated_initial_conditions.clone().unwrap();
    let v = out.rhs()[&c].evaluate(0.0, Some(&y0)).unwrap();
    assert_eq!(v.nrows(), 10);
    for d in v.iter() {
        assert_relative_eq!(*d, 0.0, epsilon = 1e-12);
    }
}

/// A concatenation key assigns slices to each of its children.
///
/// Verifies: per-subdomain variables stitched into one unknown
#[test]
fn concatenated_variables_share_one_system() {
    let neg = Symbol::variable("c_n", vec!["negative electrode".to_string()]);
    let sep = Symbol::variable("c_s", vec!["separator".to_string()]);
    let pos = Symbol::variable("c_p", vec!["positive electrode".to_string()]);
    let c = Symbol::concatenation(vec![neg.clone(), sep.clone(), pos.clone()]);

    let mut model = Model::new("concatenated");
    model
        .insert_rhs(c.clone(), -1.0 * Symbol::concatenation(vec![neg.clone(), sep.clone(), pos.clone()]))
        .unwrap();
    model.insert_initial_condition(c.clone(), 1.0).unwrap();

    let mut engine = whole_cell_engine(0);
    let out = engine.process_model(&model).unwrap();
    assert_eq!(engine.y_slices()[&neg.id()], 0..10);
    assert_eq!(engine.y_slices()[&sep.id()], 10..15);
    assert_eq!(engine.y_slices()[&pos.id()], 15..25);

    let y0 = out.concatenated_initial_conditions.clone().unwrap();
    assert_eq!(y0.nrows(), 25);
    let v = out.rhs()[&c].evaluate(0.0, Some(&y0)).unwrap();
    assert_eq!(v.nrows(), 25);
    for d in v.iter() {
        assert_relative_eq!(*d, -1.0, epsilon = 1e-12);
    }
}

/// Ill-posed models are rejected before any discretisation happens.
///
/// Verifies: well-posedness checks run inside process_model
#[test]
fn ill_posed_models_are_rejected() {
    let mut engine = whole_cell_engine(0);

    // underdetermined: d has no defining equation
    let c = Symbol::variable("c", vec!["separator".to_string()]);
    let d = Symbol::variable("d", vec!["separator".to_string()]);
    let mut model = Model::new("under");
    model.insert_rhs(c.clone(), -d).unwrap();
    model.insert_initial_condition(c.clone(), 1.0).unwrap();
    let err = engine.process_model(&model).unwrap_err();
    assert!(matches!(
        err,
        DiscretisationError::Model(ModelError::Underdetermined { .. })
    ));

    // overdetermined: c defined by two keys
    let both = Symbol::concatenation(vec![c.clone()]);
    let mut model = Model::new("over");
    model.insert_rhs(c.clone(), 1.0).unwrap();
    model.insert_rhs(both, 2.0).unwrap();
    model.insert_initial_condition(c, 1.0).unwrap();
    let err = engine.process_model(&model).unwrap_err();
    assert!(matches!(
        err,
        DiscretisationError::Model(ModelError::Overdetermined { .. })
    ));
}

/// Broadcasting is idempotent: a symbol already on the domain passes
/// through unchanged.
#[test]
fn broadcast_is_idempotent() {
    let engine_mesh = {
        let mut mesh = Mesh::new();
        mesh.insert("separator", SubMesh::uniform(0.0, 1.0, 5).unwrap());
        mesh
    };
    let fv = FiniteVolume::new(engine_mesh);
    let domain = vec!["separator".to_string()];
    let once = fv.broadcast(Symbol::scalar(3.0), &domain).unwrap();
    let twice = fv.broadcast(once.clone(), &domain).unwrap();
    assert_eq!(once, twice);
    let v = twice.evaluate(0.0, None).unwrap();
    assert_eq!(v.nrows(), 5);
    for x in v.iter() {
        assert_relative_eq!(*x, 3.0);
    }
}

/// A finite-element domain coexists with finite-volume domains, with
/// vertex-based unknown counts.
///
/// Verifies: per-domain method registry, lumped mass matrices
#[test]
fn mixed_methods_in_one_model() {
    let mut mesh = Mesh::new();
    mesh.insert("separator", SubMesh::uniform(0.0, 1.0, 6).unwrap());
    mesh.insert("current collector", SubMesh::uniform(0.0, 1.0, 4).unwrap());
    let mut methods = SpatialMethods::new();
    methods.insert(MACROSCALE, Arc::new(FiniteVolume::new(mesh.clone())));
    methods.insert(
        "current collector",
        Arc::new(FiniteElement::new(mesh.clone())),
    );
    let mut engine = Discretisation::new(mesh, methods);

    let c = Symbol::variable("c", vec!["separator".to_string()]);
    let phi = Symbol::variable("phi", vec!["current collector".to_string()]);
    let mut model = Model::new("mixed");
    model.insert_rhs(c.clone(), div(grad(c.clone()))).unwrap();
    model.insert_rhs(phi.clone(), div(grad(phi.clone()))).unwrap();
    model.insert_initial_condition(c.clone(), 1.0).unwrap();
    model.insert_initial_condition(phi.clone(), 0.0).unwrap();
    model.insert_boundary_conditions(
        c.clone(),
        (0.0, BcKind::Neumann),
        (0.0, BcKind::Neumann),
    );
    model.insert_boundary_conditions(
        phi.clone(),
        (1.0, BcKind::Neumann),
        (1.0, BcKind::Neumann),
    );
    let out = engine.process_model(&model).unwrap();

    // 6 cells for c, then 5 vertices for phi
    assert_eq!(engine.y_slices()[&c.id()], 0..6);
    assert_eq!(engine.y_slices()[&phi.id()], 6..11);
    let y0 = out.concatenated_initial_conditions.clone().unwrap();
    assert_eq!(y0.nrows(), 11);

    // identity block for finite volumes, lumped masses for the elements
    let mass = out.mass_matrix.clone().unwrap().to_dense();
    assert_relative_eq!(mass[[0, 0]], 1.0);
    assert_relative_eq!(mass[[6, 6]], 0.125);
    assert_relative_eq!(mass[[7, 7]], 0.25);
    assert_relative_eq!(mass[[10, 10]], 0.125);
}

/// Boundary values and state vectors survive a round trip through the
/// engine unchanged in meaning.
///
/// Verifies: left/right extrapolation against a linear profile
#[test]
fn boundary_values_extrapolate() {
    let mut engine = whole_cell_engine(0);
    let c = Symbol::variable("c", whole_cell());
    let mut model = Model::new("extrapolation");
    model.insert_rhs(c.clone(), Symbol::scalar(0.0)).unwrap();
    model.insert_initial_condition(c.clone(), 0.0).unwrap();
    model.insert_variable("left c", boundary_value(c.clone(), Side::Left));
    model.insert_variable("right c", boundary_value(c.clone(), Side::Right));
    let out = engine.process_model(&model).unwrap();

    let y: Vec<f64> = whole_cell_nodes().iter().map(|x| 2.0 * x + 1.0).collect();
    let y = column(&y);
    let left = out.variables()["left c"].evaluate(0.0, Some(&y)).unwrap();
    let right = out.variables()["right c"].evaluate(0.0, Some(&y)).unwrap();
    assert_relative_eq!(left[[0, 0]], 1.0, max_relative = 1e-12);
    assert_relative_eq!(right[[0, 0]], 3.0, max_relative = 1e-12);

    // the state-vector rewrite of the variable itself
    let disc_c = engine.process_symbol(&c).unwrap();
    assert!(matches!(disc_c.kind(), Kind::StateVector { slice } if *slice == (0..25)));
}
