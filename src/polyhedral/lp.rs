//! Bound queries over polytopes.
//!
//! [`LinearSolver`] is the contract the loop generator needs: the minimum
//! and maximum of an affine objective over a polytope, with unboundedness
//! and infeasibility reported as values rather than errors.
//!
//! [`FourierMotzkin`] answers these queries by introducing a variable `t`
//! equal to the objective and projecting every other variable away:
//! unit-coefficient equalities are substituted, the rest is eliminated
//! pairwise. Each derived row is divided by the GCD of its coefficients with
//! the constant rounded down, which keeps the projection exact on the
//! unimodular systems produced by loop nests and makes it a sound
//! over-approximation elsewhere.

use crate::polyhedral::expr::LinearExpr;
use crate::polyhedral::set::Polytope;
use crate::polyhedral::constraint::ConstraintKind;
use num_integer::Integer;
use num_rational::Ratio;
use std::collections::HashMap;
use thiserror::Error;

/// Result of optimising an objective over a polytope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpBound {
    /// Optimum over the integer points
    Finite(i128),
    /// No bound in the requested direction
    Unbounded,
    /// The polytope has no integer points
    Infeasible,
}

impl LpBound {
    pub fn finite(self) -> Option<i128> {
        match self {
            LpBound::Finite(v) => Some(v),
            _ => None,
        }
    }
}

/// Failure to answer a bound query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LpError {
    #[error("objective lives in a space of {found} dims, polytope has {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("coefficient overflow during elimination")]
    Overflow,

    #[error("elimination produced more than {limit} constraints")]
    TooComplex { limit: usize },
}

/// Optimisation of affine objectives over polytopes.
pub trait LinearSolver {
    /// Smallest value of `objective` over the integer points of `poly`.
    fn minimize(&self, poly: &Polytope, objective: &LinearExpr) -> Result<LpBound, LpError>;

    /// Largest value of `objective` over the integer points of `poly`.
    fn maximize(&self, poly: &Polytope, objective: &LinearExpr) -> Result<LpBound, LpError>;

    /// Whether `poly` contains no integer point.
    fn is_empty(&self, poly: &Polytope) -> Result<bool, LpError> {
        let zero = LinearExpr::zero(poly.dim(), poly.n_param());
        Ok(self.minimize(poly, &zero)? == LpBound::Infeasible)
    }
}

/// Fourier-Motzkin elimination on `i128` rows.
#[derive(Debug, Clone)]
pub struct FourierMotzkin {
    /// Give up once this many inequalities are live at the same time.
    pub max_rows: usize,
}

impl Default for FourierMotzkin {
    fn default() -> Self {
        Self { max_rows: 20_000 }
    }
}

/// `coeffs . x + constant >= 0` (or `== 0` for equalities).
#[derive(Debug, Clone)]
struct Row {
    coeffs: Vec<i128>,
    constant: i128,
}

enum Normalized {
    Trivial,
    Infeasible,
    Row(Row),
}

enum Projection {
    Infeasible,
    Bounds { lo: Option<i128>, hi: Option<i128> },
}

fn normalize_ineq(mut row: Row) -> Normalized {
    let g = row.coeffs.iter().fold(0i128, |g, c| g.gcd(c));
    if g == 0 {
        return if row.constant >= 0 { Normalized::Trivial } else { Normalized::Infeasible };
    }
    if g > 1 {
        for c in &mut row.coeffs {
            *c /= g;
        }
        row.constant = Integer::div_floor(&row.constant, &g);
    }
    Normalized::Row(row)
}

fn normalize_eq(mut row: Row) -> Normalized {
    let g = row.coeffs.iter().fold(0i128, |g, c| g.gcd(c));
    if g == 0 {
        return if row.constant == 0 { Normalized::Trivial } else { Normalized::Infeasible };
    }
    if row.constant % g != 0 {
        return Normalized::Infeasible;
    }
    for c in &mut row.coeffs {
        *c /= g;
    }
    row.constant /= g;
    Normalized::Row(row)
}

/// `a*x + b*y`, or `None` on overflow.
fn combine(a: i128, x: &Row, b: i128, y: &Row) -> Option<Row> {
    let mut coeffs = Vec::with_capacity(x.coeffs.len());
    for (&cx, &cy) in x.coeffs.iter().zip(&y.coeffs) {
        coeffs.push(a.checked_mul(cx)?.checked_add(b.checked_mul(cy)?)?);
    }
    let constant = a.checked_mul(x.constant)?.checked_add(b.checked_mul(y.constant)?)?;
    Some(Row { coeffs, constant })
}

/// Parallel inequalities keep only the tightest constant.
#[derive(Default)]
struct RowSet {
    rows: HashMap<Vec<i128>, i128>,
}

impl RowSet {
    /// Returns false when the row proves the system infeasible.
    fn insert(&mut self, row: Row) -> bool {
        match normalize_ineq(row) {
            Normalized::Trivial => true,
            Normalized::Infeasible => false,
            Normalized::Row(row) => {
                self.rows
                    .entry(row.coeffs)
                    .and_modify(|c| *c = (*c).min(row.constant))
                    .or_insert(row.constant);
                true
            }
        }
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn drain(&mut self) -> Vec<Row> {
        self.rows
            .drain()
            .map(|(coeffs, constant)| Row { coeffs, constant })
            .collect()
    }
}

impl FourierMotzkin {
    pub fn new() -> Self {
        Self::default()
    }

    fn project(&self, poly: &Polytope, objective: &LinearExpr) -> Result<Projection, LpError> {
        if objective.n_dim() != poly.dim() || objective.n_param() != poly.n_param() {
            return Err(LpError::DimensionMismatch {
                expected: poly.dim() + poly.n_param(),
                found: objective.n_dim() + objective.n_param(),
            });
        }

        let n_vars = poly.dim() + poly.n_param() + 1;
        let t = n_vars - 1;
        let to_row = |e: &LinearExpr| Row {
            coeffs: e
                .coeffs
                .iter()
                .chain(&e.param_coeffs)
                .map(|&c| c as i128)
                .chain(std::iter::once(0))
                .collect(),
            constant: e.constant as i128,
        };

        let mut eqs = Vec::new();
        let mut ineqs = Vec::new();
        for c in poly.constraints.iter() {
            match c.kind {
                ConstraintKind::Equality => eqs.push(to_row(&c.expr)),
                ConstraintKind::Inequality => ineqs.push(to_row(&c.expr)),
            }
        }

        // t - objective == 0
        let mut def = to_row(objective);
        for c in &mut def.coeffs {
            *c = -*c;
        }
        def.constant = -def.constant;
        def.coeffs[t] = 1;
        eqs.push(def);

        // Substitute equalities that have a unit coefficient on a variable
        // other than t; the remaining ones become pairs of inequalities.
        while let Some(eq) = eqs.pop() {
            let eq = match normalize_eq(eq) {
                Normalized::Trivial => continue,
                Normalized::Infeasible => return Ok(Projection::Infeasible),
                Normalized::Row(row) => row,
            };
            let pivot = (0..t).find(|&k| eq.coeffs[k].abs() == 1);
            match pivot {
                Some(k) => {
                    for row in eqs.iter_mut().chain(ineqs.iter_mut()) {
                        if row.coeffs[k] != 0 {
                            // eq.coeffs[k] is its own inverse
                            let f = row.coeffs[k] * eq.coeffs[k];
                            *row = combine(1, row, -f, &eq).ok_or(LpError::Overflow)?;
                        }
                    }
                }
                None => {
                    let neg = combine(-1, &eq, 0, &eq).ok_or(LpError::Overflow)?;
                    ineqs.push(eq);
                    ineqs.push(neg);
                }
            }
        }

        let mut set = RowSet::default();
        for row in ineqs {
            if !set.insert(row) {
                return Ok(Projection::Infeasible);
            }
        }

        loop {
            let rows = set.drain();
            // Cheapest variable to eliminate: fewest new rows.
            let mut best: Option<(usize, usize)> = None;
            for k in 0..t {
                let pos = rows.iter().filter(|r| r.coeffs[k] > 0).count();
                let neg = rows.iter().filter(|r| r.coeffs[k] < 0).count();
                if pos + neg == 0 {
                    continue;
                }
                let cost = pos * neg;
                if best.map_or(true, |(_, c)| cost < c) {
                    best = Some((k, cost));
                }
            }
            let Some((k, _)) = best else {
                for row in rows {
                    set.insert(row);
                }
                break;
            };

            let (with_k, without_k): (Vec<Row>, Vec<Row>) =
                rows.into_iter().partition(|r| r.coeffs[k] != 0);
            for row in without_k {
                set.insert(row);
            }
            let (pos, neg): (Vec<Row>, Vec<Row>) =
                with_k.into_iter().partition(|r| r.coeffs[k] > 0);
            for p in &pos {
                for n in &neg {
                    let a = p.coeffs[k];
                    let b = -n.coeffs[k];
                    let row = combine(b, p, a, n).ok_or(LpError::Overflow)?;
                    if !set.insert(row) {
                        return Ok(Projection::Infeasible);
                    }
                }
                if set.len() > self.max_rows {
                    return Err(LpError::TooComplex { limit: self.max_rows });
                }
            }
        }

        let mut lo: Option<i128> = None;
        let mut hi: Option<i128> = None;
        for row in set.drain() {
            let a = row.coeffs[t];
            if a > 0 {
                // t >= -c / a
                let v = Ratio::new(-row.constant, a).ceil().to_integer();
                lo = Some(lo.map_or(v, |l| l.max(v)));
            } else if a < 0 {
                // t <= c / -a
                let v = Ratio::new(row.constant, -a).floor().to_integer();
                hi = Some(hi.map_or(v, |h| h.min(v)));
            }
        }
        if let (Some(l), Some(h)) = (lo, hi) {
            if l > h {
                return Ok(Projection::Infeasible);
            }
        }
        Ok(Projection::Bounds { lo, hi })
    }
}

impl LinearSolver for FourierMotzkin {
    fn minimize(&self, poly: &Polytope, objective: &LinearExpr) -> Result<LpBound, LpError> {
        Ok(match self.project(poly, objective)? {
            Projection::Infeasible => LpBound::Infeasible,
            Projection::Bounds { lo: Some(v), .. } => LpBound::Finite(v),
            Projection::Bounds { lo: None, .. } => LpBound::Unbounded,
        })
    }

    fn maximize(&self, poly: &Polytope, objective: &LinearExpr) -> Result<LpBound, LpError> {
        Ok(match self.project(poly, objective)? {
            Projection::Infeasible => LpBound::Infeasible,
            Projection::Bounds { hi: Some(v), .. } => LpBound::Finite(v),
            Projection::Bounds { hi: None, .. } => LpBound::Unbounded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polyhedral::constraint::Constraint;
    use crate::polyhedral::space::Space;

    /// { [i] : 0 <= i <= N - 1 } with 1 <= N <= 100
    fn param_loop() -> Polytope {
        let n = LinearExpr::param(0, 1, 1);
        let i = LinearExpr::var(0, 1, 1);
        Polytope::universe(Space::new(1, 1))
            .with_constraint(Constraint::ge_zero(i.clone()))
            .with_constraint(Constraint::le(i, n.clone() - LinearExpr::constant(1, 1, 1)))
            .with_constraint(Constraint::ge(n.clone(), LinearExpr::constant(1, 1, 1)))
            .with_constraint(Constraint::le(n, LinearExpr::constant(100, 1, 1)))
    }

    #[test]
    fn test_parametric_bounds() {
        let fm = FourierMotzkin::new();
        let p = param_loop();
        let i = LinearExpr::var(0, 1, 1);
        assert_eq!(fm.minimize(&p, &i).unwrap(), LpBound::Finite(0));
        assert_eq!(fm.maximize(&p, &i).unwrap(), LpBound::Finite(99));
    }

    #[test]
    fn test_unbounded() {
        let fm = FourierMotzkin::new();
        let p = Polytope::universe(Space::new(1, 0))
            .with_constraint(Constraint::lower_bound(0, 3, 1, 0));
        let i = LinearExpr::var(0, 1, 0);
        assert_eq!(fm.minimize(&p, &i).unwrap(), LpBound::Finite(3));
        assert_eq!(fm.maximize(&p, &i).unwrap(), LpBound::Unbounded);
    }

    #[test]
    fn test_infeasible() {
        let fm = FourierMotzkin::new();
        let p = Polytope::universe(Space::new(1, 0))
            .with_constraint(Constraint::lower_bound(0, 5, 1, 0))
            .with_constraint(Constraint::upper_bound(0, 3, 1, 0));
        assert!(fm.is_empty(&p).unwrap());
        let i = LinearExpr::var(0, 1, 0);
        assert_eq!(fm.maximize(&p, &i).unwrap(), LpBound::Infeasible);
    }

    #[test]
    fn test_integer_tightening() {
        // 2i >= 1 and 2i <= 1 has a rational point but no integer one.
        let fm = FourierMotzkin::new();
        let two_i = LinearExpr::var(0, 1, 0).scale(2);
        let p = Polytope::universe(Space::new(1, 0))
            .with_constraint(Constraint::ge(two_i.clone(), LinearExpr::constant(1, 1, 0)))
            .with_constraint(Constraint::le(two_i, LinearExpr::constant(1, 1, 0)));
        assert!(fm.is_empty(&p).unwrap());
    }

    #[test]
    fn test_equality_substitution() {
        // [s0, s1, i] : s0 = 0, s1 = i, 0 <= i <= 9
        let fm = FourierMotzkin::new();
        let v = |d| LinearExpr::var(d, 3, 0);
        let p = Polytope::universe(Space::new(3, 0))
            .with_constraint(Constraint::eq_zero(v(0)))
            .with_constraint(Constraint::eq(v(1), v(2)))
            .with_constraint(Constraint::lower_bound(2, 0, 3, 0))
            .with_constraint(Constraint::upper_bound(2, 9, 3, 0));
        assert_eq!(fm.maximize(&p, &v(1)).unwrap(), LpBound::Finite(9));
        assert_eq!(fm.minimize(&p, &v(1)).unwrap(), LpBound::Finite(0));
    }

    #[test]
    fn test_triangle() {
        // 0 <= i <= 9, 0 <= j <= i
        let fm = FourierMotzkin::new();
        let v = |d| LinearExpr::var(d, 2, 0);
        let p = Polytope::universe(Space::new(2, 0))
            .with_constraint(Constraint::lower_bound(0, 0, 2, 0))
            .with_constraint(Constraint::upper_bound(0, 9, 2, 0))
            .with_constraint(Constraint::lower_bound(1, 0, 2, 0))
            .with_constraint(Constraint::le(v(1), v(0)));
        assert_eq!(fm.maximize(&p, &v(1)).unwrap(), LpBound::Finite(9));
        assert_eq!(fm.minimize(&p, &(v(0) - v(1))).unwrap(), LpBound::Finite(0));
        assert_eq!(fm.maximize(&p, &(v(0) + v(1))).unwrap(), LpBound::Finite(18));
    }

    #[test]
    fn test_dimension_mismatch() {
        let fm = FourierMotzkin::new();
        let p = param_loop();
        let bad = LinearExpr::var(0, 2, 1);
        assert!(matches!(
            fm.maximize(&p, &bad),
            Err(LpError::DimensionMismatch { .. })
        ));
    }
}
