//! Expression tree nodes
//!
//! A [`Symbol`] is an immutable tree node with a closed [`Kind`] tag, an
//! optional domain, and a structural identity computed eagerly on
//! construction. Two symbols with the same name, kind, domain and children
//! share a [`SymbolId`] and compare equal, which makes symbols usable as
//! map keys throughout the discretisation pipeline.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::sync::Arc;

use ndarray::{Array1, Array2};
use sprs::CsMat;

/// Structural identity of a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u64);

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Side of a one-dimensional domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    Abs,
    /// Spatial gradient, node values to edge values
    Gradient,
    /// Spatial divergence, edge values to node values
    Divergence,
    /// Definite integral over the whole domain
    DefiniteIntegral,
    /// Cumulative integral from the left edge of the domain
    IndefiniteIntegral,
    /// Value (or flux) extrapolated to one boundary of the domain
    BoundaryValue(Side),
    /// Tile a scalar-valued expression over a domain
    Broadcast,
    /// Arithmetic mean of adjacent node values, giving edge values
    EdgeAverage,
}

impl UnaryOp {
    fn name(&self) -> String {
        match self {
            UnaryOp::Negate => "-".into(),
            UnaryOp::Abs => "abs".into(),
            UnaryOp::Gradient => "grad".into(),
            UnaryOp::Divergence => "div".into(),
            UnaryOp::DefiniteIntegral => "integral".into(),
            UnaryOp::IndefiniteIntegral => "indefinite integral".into(),
            UnaryOp::BoundaryValue(side) => format!("boundary value ({side})"),
            UnaryOp::Broadcast => "broadcast".into(),
            UnaryOp::EdgeAverage => "edge average".into(),
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    /// Matrix-vector product
    MatMul,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "**",
            BinaryOp::MatMul => "@",
        };
        write!(f, "{s}")
    }
}

/// Callable payload of a [`Kind::Function`] node
///
/// Identity for hashing purposes comes from the symbol name, not the
/// closure, so two functions with the same name are structurally equal.
#[derive(Clone)]
pub struct EvalFn(Arc<dyn Fn(&Array2<f64>) -> Array2<f64> + Send + Sync>);

impl EvalFn {
    pub fn new(f: impl Fn(&Array2<f64>) -> Array2<f64> + Send + Sync + 'static) -> Self {
        EvalFn(Arc::new(f))
    }

    pub fn call(&self, x: &Array2<f64>) -> Array2<f64> {
        (self.0)(x)
    }
}

impl fmt::Debug for EvalFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EvalFn")
    }
}

/// Closed set of node kinds
#[derive(Debug, Clone)]
pub enum Kind {
    /// The independent time variable
    Time,
    /// An independent spatial variable, resolved to node positions
    SpatialVariable,
    /// A model unknown, resolved to a state-vector slice
    Variable,
    Scalar {
        value: f64,
    },
    Vector {
        entries: Array1<f64>,
    },
    Matrix {
        entries: CsMat<f64>,
    },
    /// A contiguous slice of the global state vector y
    StateVector {
        slice: Range<usize>,
    },
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// Named elementwise function of one argument
    Function {
        func: EvalFn,
    },
    /// Symbolic concatenation of expressions over adjacent subdomains
    Concatenation,
    /// Numerical row-wise stack of already-discretised expressions
    Stack,
}

/// Immutable expression tree node
#[derive(Debug, Clone)]
pub struct Symbol {
    name: String,
    domain: Vec<String>,
    kind: Kind,
    children: Vec<Symbol>,
    id: SymbolId,
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

fn compute_id(name: &str, domain: &[String], kind: &Kind, children: &[Symbol]) -> SymbolId {
    let mut h = DefaultHasher::new();
    std::mem::discriminant(kind).hash(&mut h);
    match kind {
        Kind::Scalar { value } => value.to_bits().hash(&mut h),
        Kind::Vector { entries } => {
            entries.len().hash(&mut h);
            for v in entries.iter() {
                v.to_bits().hash(&mut h);
            }
        }
        Kind::Matrix { entries } => {
            entries.rows().hash(&mut h);
            entries.cols().hash(&mut h);
            for (&v, (r, c)) in entries.iter() {
                r.hash(&mut h);
                c.hash(&mut h);
                v.to_bits().hash(&mut h);
            }
        }
        Kind::StateVector { slice } => {
            slice.start.hash(&mut h);
            slice.end.hash(&mut h);
        }
        Kind::Unary(op) => op.hash(&mut h),
        Kind::Binary(op) => op.hash(&mut h),
        _ => {}
    }
    name.hash(&mut h);
    domain.hash(&mut h);
    for child in children {
        child.id.hash(&mut h);
    }
    SymbolId(h.finish())
}

impl Symbol {
    pub fn new(
        name: impl Into<String>,
        domain: Vec<String>,
        kind: Kind,
        children: Vec<Symbol>,
    ) -> Self {
        let name = name.into();
        let id = compute_id(&name, &domain, &kind, &children);
        Symbol {
            name,
            domain,
            kind,
            children,
            id,
        }
    }

    pub fn time() -> Self {
        Symbol::new("time", Vec::new(), Kind::Time, Vec::new())
    }

    pub fn variable(name: impl Into<String>, domain: Vec<String>) -> Self {
        Symbol::new(name, domain, Kind::Variable, Vec::new())
    }

    pub fn spatial_variable(name: impl Into<String>, domain: Vec<String>) -> Self {
        Symbol::new(name, domain, Kind::SpatialVariable, Vec::new())
    }

    pub fn scalar(value: f64) -> Self {
        Symbol::new(
            format!("{value}"),
            Vec::new(),
            Kind::Scalar { value },
            Vec::new(),
        )
    }

    pub fn vector(entries: Array1<f64>) -> Self {
        Symbol::new("vector", Vec::new(), Kind::Vector { entries }, Vec::new())
    }

    pub fn matrix(entries: CsMat<f64>) -> Self {
        Symbol::new("matrix", Vec::new(), Kind::Matrix { entries }, Vec::new())
    }

    pub fn state_vector(slice: Range<usize>, domain: Vec<String>) -> Self {
        Symbol::new(
            format!("y[{}..{}]", slice.start, slice.end),
            domain,
            Kind::StateVector { slice },
            Vec::new(),
        )
    }

    pub fn function(
        name: impl Into<String>,
        f: impl Fn(&Array2<f64>) -> Array2<f64> + Send + Sync + 'static,
        child: Symbol,
    ) -> Self {
        let domain = child.domain.clone();
        Symbol::new(
            name,
            domain,
            Kind::Function { func: EvalFn::new(f) },
            vec![child],
        )
    }

    pub fn unary(op: UnaryOp, child: Symbol) -> Self {
        let domain = match op {
            // these collapse the spatial extent of their child
            UnaryOp::DefiniteIntegral | UnaryOp::BoundaryValue(_) => Vec::new(),
            _ => child.domain.clone(),
        };
        Symbol::new(op.name(), domain, Kind::Unary(op), vec![child])
    }

    pub fn binary(op: BinaryOp, left: Symbol, right: Symbol) -> Self {
        let domain = if left.domain.is_empty() {
            right.domain.clone()
        } else {
            left.domain.clone()
        };
        Symbol::new(op.to_string(), domain, Kind::Binary(op), vec![left, right])
    }

    pub fn matmul(left: Symbol, right: Symbol) -> Self {
        Symbol::binary(BinaryOp::MatMul, left, right)
    }

    pub fn pow(self, exponent: f64) -> Self {
        Symbol::binary(BinaryOp::Pow, self, Symbol::scalar(exponent))
    }

    pub fn concatenation(children: Vec<Symbol>) -> Self {
        let domain = children
            .iter()
            .flat_map(|c| c.domain.iter().cloned())
            .collect();
        Symbol::new("concatenation", domain, Kind::Concatenation, children)
    }

    pub fn stack(children: Vec<Symbol>) -> Self {
        Symbol::new("stack", Vec::new(), Kind::Stack, children)
    }

    /// Rebuild this node with a different domain (children untouched)
    pub fn with_domain(mut self, domain: Vec<String>) -> Self {
        self.domain = domain;
        self.id = compute_id(&self.name, &self.domain, &self.kind, &self.children);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> &[String] {
        &self.domain
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn children(&self) -> &[Symbol] {
        &self.children
    }

    pub fn id(&self) -> SymbolId {
        self.id
    }

    /// Only child of a unary or function node
    ///
    /// Panics if the node has no children; callers match on `kind` first.
    pub fn child(&self) -> &Symbol {
        &self.children[0]
    }

    pub fn left(&self) -> &Symbol {
        &self.children[0]
    }

    pub fn right(&self) -> &Symbol {
        &self.children[1]
    }

    /// Pre-order traversal
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Symbol)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    pub fn pre_order(&self) -> Vec<&Symbol> {
        let mut nodes = Vec::new();
        self.walk(&mut |s| nodes.push(s));
        nodes
    }

    fn any_node(&self, pred: &impl Fn(&Symbol) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        self.children.iter().any(|c| c.any_node(pred))
    }

    pub fn has_gradient(&self) -> bool {
        self.any_node(&|s| matches!(s.kind, Kind::Unary(UnaryOp::Gradient)))
    }

    pub fn has_divergence(&self) -> bool {
        self.any_node(&|s| matches!(s.kind, Kind::Unary(UnaryOp::Divergence)))
    }

    pub fn has_spatial_derivatives(&self) -> bool {
        self.any_node(&|s| {
            matches!(
                s.kind,
                Kind::Unary(UnaryOp::Gradient) | Kind::Unary(UnaryOp::Divergence)
            )
        })
    }

    /// Whether this expression holds edge values: it contains a gradient
    /// that has not yet been consumed by a divergence
    pub fn has_gradient_and_not_divergence(&self) -> bool {
        self.has_gradient() && !self.has_divergence()
    }

    /// No time, state or model-variable dependence anywhere in the tree
    pub fn is_constant(&self) -> bool {
        !self.any_node(&|s| {
            matches!(
                s.kind,
                Kind::Time | Kind::Variable | Kind::SpatialVariable | Kind::StateVector { .. }
            )
        })
    }

    /// Whether every node evaluates to a single number, so the whole
    /// expression can be tiled over a domain by multiplying with a vector
    /// of ones
    pub fn evaluates_to_number(&self) -> bool {
        let mut ok = true;
        self.walk(&mut |s| {
            ok &= matches!(
                s.kind,
                Kind::Scalar { .. }
                    | Kind::Time
                    | Kind::Function { .. }
                    | Kind::Unary(UnaryOp::Negate)
                    | Kind::Unary(UnaryOp::Abs)
                    | Kind::Binary(
                        BinaryOp::Add
                            | BinaryOp::Sub
                            | BinaryOp::Mul
                            | BinaryOp::Div
                            | BinaryOp::Pow
                    )
            );
        });
        ok
    }

    /// Whether `id` names a node somewhere in this tree
    pub fn contains(&self, id: SymbolId) -> bool {
        self.any_node(&|s| s.id == id)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Binary(op) => write!(f, "({} {op} {})", self.left(), self.right()),
            Kind::Unary(op) => write!(f, "{}({})", op.name(), self.child()),
            Kind::Function { .. } => write!(f, "{}({})", self.name, self.child()),
            Kind::Concatenation | Kind::Stack => {
                write!(f, "{}(", self.name)?;
                for (i, c) in self.children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{c}")?;
                }
                write!(f, ")")
            }
            _ => write!(f, "{}", self.name),
        }
    }
}

macro_rules! impl_binary_ops {
    ($($trait:ident, $method:ident, $op:expr;)*) => {
        $(
            impl std::ops::$trait for Symbol {
                type Output = Symbol;
                fn $method(self, rhs: Symbol) -> Symbol {
                    Symbol::binary($op, self, rhs)
                }
            }

            impl std::ops::$trait<f64> for Symbol {
                type Output = Symbol;
                fn $method(self, rhs: f64) -> Symbol {
                    Symbol::binary($op, self, Symbol::scalar(rhs))
                }
            }

            impl std::ops::$trait<Symbol> for f64 {
                type Output = Symbol;
                fn $method(self, rhs: Symbol) -> Symbol {
                    Symbol::binary($op, Symbol::scalar(self), rhs)
                }
            }
        )*
    };
}

impl_binary_ops! {
    Add, add, BinaryOp::Add;
    Sub, sub, BinaryOp::Sub;
    Mul, mul, BinaryOp::Mul;
    Div, div, BinaryOp::Div;
}

impl std::ops::Neg for Symbol {
    type Output = Symbol;
    fn neg(self) -> Symbol {
        Symbol::unary(UnaryOp::Negate, self)
    }
}

impl From<f64> for Symbol {
    fn from(value: f64) -> Self {
        Symbol::scalar(value)
    }
}
