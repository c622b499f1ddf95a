//! Polyhedral data structures and bound queries.
//!
//! This module provides the mathematical side of loop regeneration:
//! - Linear expressions and constraints
//! - Polytopes (domains, scatterings, contexts, dependence relations)
//! - A linear solver answering min/max queries over polytopes

pub mod space;
pub mod expr;
pub mod constraint;
pub mod set;
pub mod lp;

pub use space::Space;
pub use expr::LinearExpr;
pub use constraint::{Constraint, ConstraintKind, ConstraintSystem};
pub use set::Polytope;
pub use lp::{FourierMotzkin, LinearSolver, LpBound, LpError};
