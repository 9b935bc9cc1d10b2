//! Convenience builders for the spatial operators

use crate::symbol::{Side, Symbol, UnaryOp};

/// Spatial gradient of `child`
pub fn grad(child: Symbol) -> Symbol {
    Symbol::unary(UnaryOp::Gradient, child)
}

/// Spatial divergence of `child`
pub fn div(child: Symbol) -> Symbol {
    Symbol::unary(UnaryOp::Divergence, child)
}

/// Definite integral of `child` over its whole domain
pub fn integral(child: Symbol) -> Symbol {
    Symbol::unary(UnaryOp::DefiniteIntegral, child)
}

/// Cumulative integral of `child` from the left edge of its domain
pub fn indefinite_integral(child: Symbol) -> Symbol {
    Symbol::unary(UnaryOp::IndefiniteIntegral, child)
}

/// Value of `child` extrapolated to one side of its domain
pub fn boundary_value(child: Symbol, side: Side) -> Symbol {
    Symbol::unary(UnaryOp::BoundaryValue(side), child)
}

/// Surface value of a particle-domain quantity (its right boundary)
pub fn surf(child: Symbol) -> Symbol {
    boundary_value(child, Side::Right)
}

/// Tile `child` over `domain`
pub fn broadcast(child: Symbol, domain: Vec<String>) -> Symbol {
    Symbol::unary(UnaryOp::Broadcast, child).with_domain(domain)
}

/// Arithmetic mean of adjacent node values of `child`
pub fn edge_average(child: Symbol) -> Symbol {
    Symbol::unary(UnaryOp::EdgeAverage, child)
}
