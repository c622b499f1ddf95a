//! Polytopes: iteration domains, scatterings, contexts and dependence
//! relations, all as conjunctions of affine constraints.

use crate::polyhedral::space::Space;
use crate::polyhedral::constraint::{Constraint, ConstraintSystem, ConstraintKind};
use serde::{Serialize, Deserialize};
use std::fmt;

/// A set of integer points defined by affine constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Polytope {
    pub space: Space,
    pub constraints: ConstraintSystem,
}

impl Polytope {
    /// The polytope with no constraints over `space`.
    pub fn universe(space: Space) -> Self {
        let constraints = ConstraintSystem::new(space.n_dim, space.n_param);
        Self { space, constraints }
    }

    pub fn dim(&self) -> usize { self.space.n_dim }
    pub fn n_param(&self) -> usize { self.space.n_param }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.add(constraint);
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.add_constraint(constraint);
        self
    }

    pub fn contains(&self, point: &[i64], params: &[i64]) -> bool {
        self.constraints.is_satisfied(point, params)
    }

    /// Emptiness visible without solving: a constant constraint that fails.
    pub fn is_obviously_empty(&self) -> bool {
        self.constraints.iter().any(|c| {
            c.expr.is_constant() && match c.kind {
                ConstraintKind::Inequality => c.expr.constant < 0,
                ConstraintKind::Equality => c.expr.constant != 0,
            }
        })
    }

    /// Conjunction of two polytopes over the same space.
    pub fn intersect(&self, other: &Polytope) -> Polytope {
        assert_eq!(self.dim(), other.dim());
        assert_eq!(self.n_param(), other.n_param());
        let mut result = self.clone();
        for c in other.constraints.iter() {
            result.add_constraint(c.clone());
        }
        result
    }

    /// Move this polytope into a space of `n_dim` dimensions, its own
    /// dimensions starting at `offset`. The other dimensions are free.
    pub fn embed(&self, offset: usize, n_dim: usize) -> Polytope {
        let mut names: Vec<String> = (0..n_dim).map(|i| format!("d{}", i)).collect();
        for (i, name) in self.space.all_dim_names().into_iter().enumerate() {
            if let Some(slot) = names.get_mut(offset + i) {
                *slot = name;
            }
        }
        let space = Space::new(n_dim, self.n_param())
            .with_dim_names(names)
            .with_param_names(self.space.param_names.clone());
        let mut result = Polytope::universe(space);
        for c in self.constraints.iter() {
            result.add_constraint(c.embed(offset, n_dim));
        }
        result
    }

    /// Move this polytope into a space of `n_dim` dimensions, dimension
    /// `i` landing at `positions[i]`.
    pub fn remap(&self, positions: &[usize], n_dim: usize) -> Polytope {
        let space = Space::new(n_dim, self.n_param())
            .with_param_names(self.space.param_names.clone());
        let mut result = Polytope::universe(space);
        for c in self.constraints.iter() {
            result.add_constraint(c.remap(positions, n_dim));
        }
        result
    }

    pub fn dim_names(&self) -> Vec<String> { self.space.all_dim_names() }
    pub fn param_names(&self) -> Vec<String> { self.space.all_param_names() }
}

impl fmt::Display for Polytope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dim_names = self.dim_names();
        let param_names = self.param_names();
        write!(f, "{{ [{}]", dim_names.join(", "))?;
        if !self.constraints.is_empty() {
            write!(f, " : ")?;
            for (i, c) in self.constraints.iter().enumerate() {
                if i > 0 { write!(f, " and ")?; }
                write!(f, "{}", c.to_string_with_names(&dim_names, &param_names))?;
            }
        }
        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polyhedral::expr::LinearExpr;

    fn square(n: i64) -> Polytope {
        let mut p = Polytope::universe(Space::new(2, 0));
        for d in 0..2 {
            p.add_constraint(Constraint::lower_bound(d, 0, 2, 0));
            p.add_constraint(Constraint::upper_bound(d, n - 1, 2, 0));
        }
        p
    }

    #[test]
    fn test_contains() {
        let set = square(10);
        assert!(set.contains(&[0, 0], &[]));
        assert!(set.contains(&[9, 9], &[]));
        assert!(!set.contains(&[10, 0], &[]));
    }

    #[test]
    fn test_intersect() {
        let diag = Polytope::universe(Space::new(2, 0)).with_constraint(Constraint::eq(
            LinearExpr::var(0, 2, 0),
            LinearExpr::var(1, 2, 0),
        ));
        let both = square(4).intersect(&diag);
        assert!(both.contains(&[3, 3], &[]));
        assert!(!both.contains(&[3, 2], &[]));
    }

    #[test]
    fn test_embed() {
        let big = square(4).embed(1, 4);
        assert_eq!(big.dim(), 4);
        assert!(big.contains(&[-50, 1, 2, 99], &[]));
        assert!(!big.contains(&[0, 4, 0, 0], &[]));
    }

    #[test]
    fn test_remap_scatters_dims() {
        // [x, y] -> [y', _, x']
        let tri = Polytope::universe(Space::new(2, 0)).with_constraint(Constraint::ge(
            LinearExpr::var(0, 2, 0),
            LinearExpr::var(1, 2, 0),
        ));
        let moved = tri.remap(&[2, 0], 3);
        assert!(moved.contains(&[1, 77, 5], &[]));
        assert!(!moved.contains(&[5, 0, 1], &[]));
    }

    #[test]
    fn test_obviously_empty() {
        let mut p = square(4);
        assert!(!p.is_obviously_empty());
        p.add_constraint(Constraint::ge_zero(LinearExpr::constant(-1, 2, 0)));
        assert!(p.is_obviously_empty());
    }
}
