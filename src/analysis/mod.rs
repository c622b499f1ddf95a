//! Analysis passes over SCoPs.
//!
//! - `dependence`: dependence polytopes between statement accesses and
//!   the carried-dependence test behind [`crate::codegen::DependenceOracle`]

pub mod dependence;

pub use dependence::{Dependence, DependenceGraph, DependenceKind};
