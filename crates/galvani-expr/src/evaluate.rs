//! Numeric evaluation of expression trees
//!
//! Evaluation returns column vectors of shape `(n, 1)`; scalars come back
//! as `(1, 1)` and broadcast against vectors inside binary operators.

use std::collections::HashMap;

use ndarray::{concatenate, Array2, Axis};
use sprs::CsMat;

use crate::error::{EvalError, Result};
use crate::symbol::{BinaryOp, Kind, Symbol, SymbolId, UnaryOp};

impl Symbol {
    /// Evaluate at time `t` with an optional state vector `y`
    pub fn evaluate(&self, t: f64, y: Option<&Array2<f64>>) -> Result<Array2<f64>> {
        let mut cache = HashMap::new();
        self.evaluate_cached(t, y, &mut cache)
    }

    /// Evaluate with an explicit memo cache keyed by [`SymbolId`]
    ///
    /// Shared subtrees are computed once per call. The cache is only valid
    /// for a single `(t, y)` pair; callers reuse it across symbols that are
    /// evaluated at the same point.
    pub fn evaluate_cached(
        &self,
        t: f64,
        y: Option<&Array2<f64>>,
        cache: &mut HashMap<SymbolId, Array2<f64>>,
    ) -> Result<Array2<f64>> {
        if let Some(hit) = cache.get(&self.id()) {
            return Ok(hit.clone());
        }
        let out = self.eval_node(t, y, cache)?;
        cache.insert(self.id(), out.clone());
        Ok(out)
    }

    fn eval_node(
        &self,
        t: f64,
        y: Option<&Array2<f64>>,
        cache: &mut HashMap<SymbolId, Array2<f64>>,
    ) -> Result<Array2<f64>> {
        match self.kind() {
            Kind::Time => Ok(Array2::from_elem((1, 1), t)),
            Kind::Scalar { value } => Ok(Array2::from_elem((1, 1), *value)),
            Kind::Vector { entries } => Ok(entries.clone().insert_axis(Axis(1))),
            Kind::Matrix { entries } => Ok(entries.to_dense()),
            Kind::StateVector { slice } => {
                let y = y.ok_or_else(|| EvalError::MissingState {
                    name: self.name().to_string(),
                })?;
                if slice.end > y.nrows() {
                    return Err(EvalError::StateSliceOutOfBounds {
                        start: slice.start,
                        stop: slice.end,
                        len: y.nrows(),
                    });
                }
                Ok(y.slice(ndarray::s![slice.start..slice.end, ..]).to_owned())
            }
            Kind::Unary(UnaryOp::Negate) => {
                Ok(-self.child().evaluate_cached(t, y, cache)?)
            }
            Kind::Unary(UnaryOp::Abs) => {
                Ok(self.child().evaluate_cached(t, y, cache)?.mapv(f64::abs))
            }
            Kind::Unary(UnaryOp::EdgeAverage) => {
                let v = self.child().evaluate_cached(t, y, cache)?;
                let n = v.nrows();
                if n < 2 {
                    return Ok(v);
                }
                let mut out = Array2::zeros((n - 1, 1));
                for i in 0..n - 1 {
                    out[[i, 0]] = 0.5 * (v[[i, 0]] + v[[i + 1, 0]]);
                }
                Ok(out)
            }
            Kind::Function { func } => {
                let v = self.child().evaluate_cached(t, y, cache)?;
                Ok(func.call(&v))
            }
            Kind::Binary(BinaryOp::MatMul) => {
                let rv = self.right().evaluate_cached(t, y, cache)?;
                if let Kind::Matrix { entries } = self.left().kind() {
                    return sparse_dot_dense(entries, &rv, self.name());
                }
                let lv = self.left().evaluate_cached(t, y, cache)?;
                if lv.ncols() != rv.nrows() {
                    return Err(shape_error(self.name(), &lv, &rv));
                }
                Ok(lv.dot(&rv))
            }
            Kind::Binary(op) => {
                let lv = self.left().evaluate_cached(t, y, cache)?;
                let rv = self.right().evaluate_cached(t, y, cache)?;
                let (lv, rv) = broadcast_pair(lv, rv, self.name())?;
                let out = match op {
                    BinaryOp::Add => lv + rv,
                    BinaryOp::Sub => lv - rv,
                    BinaryOp::Mul => lv * rv,
                    BinaryOp::Div => lv / rv,
                    BinaryOp::Pow => {
                        let mut out = lv;
                        out.zip_mut_with(&rv, |a, b| *a = a.powf(*b));
                        out
                    }
                    BinaryOp::MatMul => unreachable!("handled above"),
                };
                Ok(out)
            }
            Kind::Stack => {
                if self.children().is_empty() {
                    return Ok(Array2::zeros((0, 1)));
                }
                let parts: Vec<Array2<f64>> = self
                    .children()
                    .iter()
                    .map(|c| c.evaluate_cached(t, y, cache))
                    .collect::<Result<_>>()?;
                let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
                concatenate(Axis(0), &views).map_err(|_| EvalError::ShapeMismatch {
                    operation: "stack".into(),
                    left: shape_of(&parts[0]),
                    right: shape_of(parts.last().unwrap_or(&parts[0])),
                })
            }
            Kind::Variable
            | Kind::SpatialVariable
            | Kind::Concatenation
            | Kind::Unary(_) => Err(EvalError::NotDiscretised {
                name: self.name().to_string(),
            }),
        }
    }
}

fn shape_of(a: &Array2<f64>) -> (usize, usize) {
    (a.nrows(), a.ncols())
}

fn shape_error(operation: &str, left: &Array2<f64>, right: &Array2<f64>) -> EvalError {
    EvalError::ShapeMismatch {
        operation: operation.to_string(),
        left: shape_of(left),
        right: shape_of(right),
    }
}

/// Broadcast a `(1, 1)` operand against its partner's shape
fn broadcast_pair(
    left: Array2<f64>,
    right: Array2<f64>,
    operation: &str,
) -> Result<(Array2<f64>, Array2<f64>)> {
    if left.dim() == right.dim() {
        return Ok((left, right));
    }
    if left.dim() == (1, 1) {
        let v = left[[0, 0]];
        let expanded = Array2::from_elem(right.raw_dim(), v);
        return Ok((expanded, right));
    }
    if right.dim() == (1, 1) {
        let v = right[[0, 0]];
        let expanded = Array2::from_elem(left.raw_dim(), v);
        return Ok((left, expanded));
    }
    Err(shape_error(operation, &left, &right))
}

/// Sparse-matrix, dense-column product
fn sparse_dot_dense(m: &CsMat<f64>, v: &Array2<f64>, operation: &str) -> Result<Array2<f64>> {
    if m.cols() != v.nrows() || v.ncols() != 1 {
        return Err(EvalError::ShapeMismatch {
            operation: operation.to_string(),
            left: (m.rows(), m.cols()),
            right: shape_of(v),
        });
    }
    let owned_csr;
    let m = if m.is_csr() {
        m
    } else {
        owned_csr = m.to_csr();
        &owned_csr
    };
    let mut out = Array2::zeros((m.rows(), 1));
    for (row, vec) in m.outer_iterator().enumerate() {
        let mut acc = 0.0;
        for (col, &val) in vec.iter() {
            acc += val * v[[col, 0]];
        }
        out[[row, 0]] = acc;
    }
    Ok(out)
}
