//! Static control parts.
//!
//! A SCoP is a single-entry single-exit region of a [`Cfg`] whose loops
//! have affine bounds. Each statement block inside it is a [`PolyBb`]:
//! the original block (kept as a black box and copied verbatim when code
//! is regenerated), its iteration domain and its scattering.
//!
//! Scattering follows the `2d+1` convention: for a statement nested in
//! `d` loops, dimensions `0, 2, .., 2d` are static positions and
//! dimension `2l+1` is the value of the loop at level `l`.

pub mod builder;

use crate::ir::cfg::{BlockId, Cfg, EdgeId, LoopId, VarId};
use crate::ir::types::IntType;
use crate::polyhedral::{Constraint, LinearExpr, Polytope, Space};
use crate::utils::intern::Symbol;
use serde::{Serialize, Deserialize};
use std::collections::HashSet;
use std::fmt;

/// Index of a statement in its SCoP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PbbId(pub u32);

impl PbbId {
    pub fn index(self) -> usize { self.0 as usize }
}

impl fmt::Display for PbbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0 + 1)
    }
}

/// A symbolic constant of the region.
#[derive(Debug, Clone)]
pub struct ScopParam {
    pub name: Symbol,
    /// Function argument holding the value
    pub var: VarId,
    pub ty: IntType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    Read,
    Write,
}

/// A memory reference of a statement, `array[index]`.
#[derive(Debug, Clone)]
pub struct Access {
    pub array: Symbol,
    pub kind: AccessKind,
    /// Affine in the statement's iterators and the parameters
    pub index: LinearExpr,
}

/// A statement of the SCoP.
#[derive(Debug, Clone)]
pub struct PolyBb {
    pub id: PbbId,
    pub name: String,
    /// The original statement block
    pub black_box: BlockId,
    /// Loops around the statement, outermost first
    pub loops: Vec<LoopId>,
    /// Iteration domain over the statement's iterators
    pub domain: Polytope,
    /// Scattering dimensions followed by the iterators
    pub scattering: Polytope,
    pub accesses: Vec<Access>,
}

impl PolyBb {
    pub fn depth(&self) -> usize {
        self.domain.dim()
    }

    pub fn nb_scattering(&self) -> usize {
        2 * self.depth() + 1
    }
}

#[derive(Debug, Clone)]
pub struct Scop {
    pub name: String,
    pub params: Vec<ScopParam>,
    /// Constraints on the parameters alone
    pub context: Polytope,
    /// Edge entering the region
    pub entry: EdgeId,
    /// Edge leaving the region
    pub exit: EdgeId,
    pub pbbs: Vec<PolyBb>,
}

impl Scop {
    /// Scattering dimension holding the loop at `level`.
    pub fn dynamic_dim(level: usize) -> usize {
        2 * level + 1
    }

    pub fn pbb(&self, id: PbbId) -> Option<&PolyBb> {
        self.pbbs.get(id.index())
    }

    pub fn n_params(&self) -> usize {
        self.params.len()
    }

    pub fn param_names(&self) -> Vec<Symbol> {
        self.params.iter().map(|p| p.name).collect()
    }

    pub fn region_blocks(&self, cfg: &Cfg) -> HashSet<BlockId> {
        cfg.region_blocks(self.entry, self.exit)
    }

    /// Restrict every parameter to the range of its type. Unsigned 64-bit
    /// parameters are capped at `i64::MAX`, the largest bound a constraint
    /// can hold.
    pub fn add_param_type_bounds(&mut self) {
        let n = self.n_params();
        for (i, p) in self.params.iter().enumerate() {
            let lo = p.ty.min_value().max(i64::MIN as i128) as i64;
            let hi = p.ty.max_value().min(i64::MAX as i128) as i64;
            let param = LinearExpr::param(i, 0, n);
            self.context.add_constraint(Constraint::ge(param.clone(), LinearExpr::constant(lo, 0, n)));
            self.context.add_constraint(Constraint::le(param, LinearExpr::constant(hi, 0, n)));
        }
    }

    /// Scattering of `pbb` intersected with its domain and the context,
    /// over the scattering space `[scattering dims, iterators]`.
    pub fn scattering_polytope(&self, pbb: &PolyBb) -> Polytope {
        let n_dim = pbb.scattering.dim();
        let mut poly = pbb.scattering.clone();
        poly = poly.intersect(&pbb.domain.embed(pbb.nb_scattering(), n_dim));
        poly.intersect(&self.context.embed(0, n_dim))
    }
}

/// A context with no constraints over `params`.
pub fn universe_context(params: &[Symbol]) -> Polytope {
    Polytope::universe(
        Space::params(params.len()).with_param_names(params.iter().map(|p| p.as_string()).collect()),
    )
}
