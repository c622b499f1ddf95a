//! Dependence analysis on SCoPs.
//!
//! Two accesses to the same array, at least one of them a write, depend
//! on each other when some pair of statement instances touches the same
//! cell. The pairs form the dependence polytope:
//!
//! ```text
//! { [i_s, i_t] : i_s in D_s, i_t in D_t, context, index_s(i_s) == index_t(i_t) }
//! ```
//!
//! A dependence is carried by the loop at scattering dimension `k` when
//! some pair of its instances agrees on every scattering dimension before
//! `k` and is strictly ordered on `k`: the two instances run in different
//! iterations of that loop.

use crate::codegen::parallel::DependenceOracle;
use crate::polyhedral::{Constraint, FourierMotzkin, LinearExpr, LinearSolver, Polytope};
use crate::scop::{Access, AccessKind, PbbId, PolyBb, Scop};
use crate::utils::intern::Symbol;
use log::{debug, warn};
use serde::{Serialize, Deserialize};
use std::fmt;

/// Kind of data dependence, named from the source access to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependenceKind {
    /// Read-after-write (true/flow dependence)
    Flow,
    /// Write-after-read (anti dependence)
    Anti,
    /// Write-after-write (output dependence)
    Output,
}

impl DependenceKind {
    /// Kind of the dependence from `source` to `target`; `None` for two
    /// reads.
    pub fn classify(source: AccessKind, target: AccessKind) -> Option<Self> {
        match (source, target) {
            (AccessKind::Write, AccessKind::Read) => Some(DependenceKind::Flow),
            (AccessKind::Read, AccessKind::Write) => Some(DependenceKind::Anti),
            (AccessKind::Write, AccessKind::Write) => Some(DependenceKind::Output),
            (AccessKind::Read, AccessKind::Read) => None,
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            DependenceKind::Flow => "RAW",
            DependenceKind::Anti => "WAR",
            DependenceKind::Output => "WAW",
        }
    }
}

/// A dependence between two statements.
#[derive(Debug, Clone)]
pub struct Dependence {
    pub source: PbbId,
    pub target: PbbId,
    pub array: Symbol,
    pub kind: DependenceKind,
    /// Instance pairs over `[source iterators, target iterators]`
    pub relation: Polytope,
}

impl Dependence {
    pub fn description(&self) -> String {
        let kind = match self.kind {
            DependenceKind::Flow => "flow (RAW)",
            DependenceKind::Anti => "anti (WAR)",
            DependenceKind::Output => "output (WAW)",
        };
        format!("{} -> {} [{}] on {}", self.source, self.target, kind, self.array)
    }
}

/// Dependence relation between accesses `a` of `p` and `b` of `q`.
fn relation(scop: &Scop, p: &PolyBb, a: &Access, q: &PolyBb, b: &Access) -> Polytope {
    let (dp, dq) = (p.depth(), q.depth());
    let n = dp + dq;
    let mut rel = p
        .domain
        .embed(0, n)
        .intersect(&q.domain.embed(dp, n))
        .intersect(&scop.context.embed(0, n));
    rel.add_constraint(Constraint::eq(a.index.embed(0, n), b.index.embed(dp, n)));

    let mut names = p.domain.dim_names();
    names.extend(q.domain.dim_names().into_iter().map(|s| format!("{}'", s)));
    rel.space = rel.space.clone().with_dim_names(names);
    rel
}

/// All dependences of a SCoP, queried through [`DependenceOracle`].
#[derive(Debug, Clone)]
pub struct DependenceGraph<S = FourierMotzkin> {
    pub dependences: Vec<Dependence>,
    /// Scattering polytope of each statement, domain and context included
    scatterings: Vec<Polytope>,
    nb_scattering: Vec<usize>,
    solver: S,
}

impl DependenceGraph<FourierMotzkin> {
    pub fn analyze(scop: &Scop) -> Self {
        Self::build(scop, FourierMotzkin::new())
    }
}

impl<S: LinearSolver> DependenceGraph<S> {
    /// Collect the non-empty dependence relations of every pair of
    /// accesses, each statement paired with itself and with every later
    /// statement. A relation the solver cannot decide is kept.
    pub fn build(scop: &Scop, solver: S) -> Self {
        let mut dependences = Vec::new();
        for (i, p) in scop.pbbs.iter().enumerate() {
            for q in &scop.pbbs[i..] {
                for (x, a) in p.accesses.iter().enumerate() {
                    // a statement's own access pairs are unordered
                    let skip = if p.id == q.id { x } else { 0 };
                    for b in q.accesses.iter().skip(skip) {
                        if a.array != b.array {
                            continue;
                        }
                        let Some(kind) = DependenceKind::classify(a.kind, b.kind) else {
                            continue;
                        };
                        let rel = relation(scop, p, a, q, b);
                        let empty = solver.is_empty(&rel).unwrap_or_else(|err| {
                            warn!("keeping undecided relation {} -> {} on {}: {}", p.id, q.id, a.array, err);
                            false
                        });
                        if empty {
                            continue;
                        }
                        let dep = Dependence { source: p.id, target: q.id, array: a.array, kind, relation: rel };
                        debug!("dependence {}", dep.description());
                        dependences.push(dep);
                    }
                }
            }
        }
        Self {
            dependences,
            scatterings: scop.pbbs.iter().map(|p| scop.scattering_polytope(p)).collect(),
            nb_scattering: scop.pbbs.iter().map(PolyBb::nb_scattering).collect(),
            solver,
        }
    }

    /// Dependences with `a` and `b` as endpoints, in either direction.
    pub fn between(&self, a: PbbId, b: PbbId) -> impl Iterator<Item = &Dependence> {
        self.dependences
            .iter()
            .filter(move |d| (d.source == a && d.target == b) || (d.source == b && d.target == a))
    }

    pub fn len(&self) -> usize {
        self.dependences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependences.is_empty()
    }

    pub fn dependences_of_kind(&self, kind: DependenceKind) -> Vec<&Dependence> {
        self.dependences.iter().filter(|d| d.kind == kind).collect()
    }

    /// Whether `dep` has an instance of `a` and a later instance of `b`
    /// in different iterations of the loop at scattering dimension `dim`.
    /// `reversed` reads the dependence with `a` as its target.
    fn carried(&self, dep: &Dependence, a: PbbId, b: PbbId, dim: usize, reversed: bool) -> bool {
        let (Some(scat_a), Some(scat_b)) = (self.scatterings.get(a.index()), self.scatterings.get(b.index())) else {
            return false;
        };
        let (nb_a, nb_b) = (self.nb_scattering[a.index()], self.nb_scattering[b.index()]);
        if dim >= nb_a || dim >= nb_b {
            return false;
        }
        let (sa, sb) = (scat_a.dim(), scat_b.dim());
        let n = sa + sb;
        let np = scat_a.n_param();

        // [scat_a, iter_a, scat_b, iter_b]
        let mut poly = scat_a.embed(0, n).intersect(&scat_b.embed(sa, n));
        let (iter_a, iter_b) = (nb_a..sa, sa + nb_b..n);
        let positions: Vec<usize> = if reversed {
            iter_b.chain(iter_a).collect()
        } else {
            iter_a.chain(iter_b).collect()
        };
        poly = poly.intersect(&dep.relation.remap(&positions, n));

        for k in 0..dim {
            poly.add_constraint(Constraint::eq(LinearExpr::var(k, n, np), LinearExpr::var(sa + k, n, np)));
        }
        poly.add_constraint(Constraint::ge(
            LinearExpr::var(sa + dim, n, np),
            LinearExpr::var(dim, n, np) + LinearExpr::constant(1, n, np),
        ));

        match self.solver.is_empty(&poly) {
            Ok(empty) => !empty,
            Err(err) => {
                warn!("assuming {} is carried at dimension {}: {}", dep.description(), dim, err);
                true
            }
        }
    }
}

impl<S: LinearSolver> DependenceOracle for DependenceGraph<S> {
    fn dependence_exists(&self, a: PbbId, b: PbbId, dim: usize) -> bool {
        for dep in self.between(a, b) {
            if dep.source == a && dep.target == b && self.carried(dep, a, b, dim, false) {
                return true;
            }
            if dep.source == b && dep.target == a && self.carried(dep, a, b, dim, true) {
                return true;
            }
        }
        false
    }
}

impl<S> fmt::Display for DependenceGraph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} dependences", self.dependences.len())?;
        for d in &self.dependences {
            writeln!(f, "  {}: {}", d.description(), d.relation)?;
        }
        Ok(())
    }
}
