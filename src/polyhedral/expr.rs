//! Linear forms over the dimensions and parameters of a polytope.
//!
//! A linear expression is a combination of variables plus a constant:
//! `aff(x, p) = c0 + c1*x1 + ... + cn*xn + d1*p1 + ... + dm*pm`

use num_integer::Integer;
use serde::{Serialize, Deserialize};
use std::fmt;
use std::ops::{Add, Sub, Neg};

/// A linear expression: constant + sum(coeff[i] * dim[i]) + sum(param_coeff[j] * param[j])
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinearExpr {
    /// Constant term
    pub constant: i64,
    /// Coefficients for each dimension (index = dimension index)
    pub coeffs: Vec<i64>,
    /// Coefficients for parameters (index = parameter index)
    pub param_coeffs: Vec<i64>,
}

impl LinearExpr {
    /// Create a zero expression.
    pub fn zero(n_dim: usize, n_param: usize) -> Self {
        Self {
            constant: 0,
            coeffs: vec![0; n_dim],
            param_coeffs: vec![0; n_param],
        }
    }

    /// Create a constant expression.
    pub fn constant(value: i64, n_dim: usize, n_param: usize) -> Self {
        Self {
            constant: value,
            ..Self::zero(n_dim, n_param)
        }
    }

    /// Create an expression for a single dimension variable.
    pub fn var(dim: usize, n_dim: usize, n_param: usize) -> Self {
        let mut expr = Self::zero(n_dim, n_param);
        expr.set_coeff(dim, 1);
        expr
    }

    /// Create an expression for a parameter.
    pub fn param(param_idx: usize, n_dim: usize, n_param: usize) -> Self {
        let mut expr = Self::zero(n_dim, n_param);
        expr.set_param_coeff(param_idx, 1);
        expr
    }

    /// Check if this is a constant expression.
    pub fn is_constant(&self) -> bool {
        self.coeffs.iter().all(|&c| c == 0) &&
        self.param_coeffs.iter().all(|&c| c == 0)
    }

    /// Get the constant value if this is a constant expression.
    pub fn as_constant(&self) -> Option<i64> {
        if self.is_constant() {
            Some(self.constant)
        } else {
            None
        }
    }

    pub fn n_dim(&self) -> usize {
        self.coeffs.len()
    }

    pub fn n_param(&self) -> usize {
        self.param_coeffs.len()
    }

    /// Get coefficient for a dimension.
    pub fn coeff(&self, dim: usize) -> i64 {
        self.coeffs.get(dim).copied().unwrap_or(0)
    }

    /// Get coefficient for a parameter.
    pub fn param_coeff(&self, idx: usize) -> i64 {
        self.param_coeffs.get(idx).copied().unwrap_or(0)
    }

    /// Set coefficient for a dimension. Out of range indices are ignored.
    pub fn set_coeff(&mut self, dim: usize, value: i64) {
        if let Some(c) = self.coeffs.get_mut(dim) {
            *c = value;
        }
    }

    /// Set coefficient for a parameter. Out of range indices are ignored.
    pub fn set_param_coeff(&mut self, idx: usize, value: i64) {
        if let Some(c) = self.param_coeffs.get_mut(idx) {
            *c = value;
        }
    }

    /// Evaluate the expression at a point. Computed in `i128`, so no
    /// intermediate overflow is possible for `i64` inputs of moderate size.
    pub fn evaluate(&self, dim_values: &[i64], param_values: &[i64]) -> i128 {
        let mut result = self.constant as i128;
        for (&c, &v) in self.coeffs.iter().zip(dim_values) {
            result += c as i128 * v as i128;
        }
        for (&c, &v) in self.param_coeffs.iter().zip(param_values) {
            result += c as i128 * v as i128;
        }
        result
    }

    /// Scale the expression by a constant.
    pub fn scale(&self, factor: i64) -> Self {
        Self {
            constant: self.constant * factor,
            coeffs: self.coeffs.iter().map(|&c| c * factor).collect(),
            param_coeffs: self.param_coeffs.iter().map(|&c| c * factor).collect(),
        }
    }

    /// Get GCD of the variable coefficients (constant excluded).
    pub fn coeff_gcd(&self) -> i64 {
        self.coeffs
            .iter()
            .chain(&self.param_coeffs)
            .fold(0i64, |g, &c| g.gcd(&c))
    }

    /// Place this expression into a space with `n_dim` dimensions, its own
    /// dimensions starting at `offset`. Parameters are shared.
    pub fn embed(&self, offset: usize, n_dim: usize) -> Self {
        let mut coeffs = vec![0; n_dim];
        for (i, &c) in self.coeffs.iter().enumerate() {
            if let Some(slot) = coeffs.get_mut(offset + i) {
                *slot = c;
            }
        }
        Self {
            constant: self.constant,
            coeffs,
            param_coeffs: self.param_coeffs.clone(),
        }
    }

    /// Place this expression into a space with `n_dim` dimensions, its
    /// dimension `i` landing at `positions[i]`.
    pub fn remap(&self, positions: &[usize], n_dim: usize) -> Self {
        let mut coeffs = vec![0; n_dim];
        for (&c, &pos) in self.coeffs.iter().zip(positions) {
            if let Some(slot) = coeffs.get_mut(pos) {
                *slot += c;
            }
        }
        Self {
            constant: self.constant,
            coeffs,
            param_coeffs: self.param_coeffs.clone(),
        }
    }

    /// Convert to string with given dimension and parameter names.
    pub fn to_string_with_names(&self, dim_names: &[String], param_names: &[String]) -> String {
        let mut parts = Vec::new();

        let term = |c: i64, name: &str| -> String {
            match c {
                1 => name.to_string(),
                -1 => format!("-{}", name),
                _ => format!("{}*{}", c, name),
            }
        };

        for (i, &c) in self.coeffs.iter().enumerate() {
            if c != 0 {
                let default_name = format!("d{}", i);
                let name = dim_names.get(i).map(|s| s.as_str()).unwrap_or(&default_name);
                parts.push(term(c, name));
            }
        }

        for (i, &c) in self.param_coeffs.iter().enumerate() {
            if c != 0 {
                let default_name = format!("p{}", i);
                let name = param_names.get(i).map(|s| s.as_str()).unwrap_or(&default_name);
                parts.push(term(c, name));
            }
        }

        if self.constant != 0 || parts.is_empty() {
            parts.push(format!("{}", self.constant));
        }

        parts.join(" + ").replace("+ -", "- ")
    }
}

impl Add for LinearExpr {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        assert_eq!(self.coeffs.len(), other.coeffs.len());
        assert_eq!(self.param_coeffs.len(), other.param_coeffs.len());
        Self {
            constant: self.constant + other.constant,
            coeffs: self.coeffs.iter().zip(&other.coeffs)
                .map(|(&a, &b)| a + b).collect(),
            param_coeffs: self.param_coeffs.iter().zip(&other.param_coeffs)
                .map(|(&a, &b)| a + b).collect(),
        }
    }
}

impl Sub for LinearExpr {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self + (-other)
    }
}

impl Neg for LinearExpr {
    type Output = Self;

    fn neg(self) -> Self {
        self.scale(-1)
    }
}

impl fmt::Display for LinearExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_with_names(&[], &[]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant() {
        let expr = LinearExpr::constant(5, 2, 1);
        assert!(expr.is_constant());
        assert_eq!(expr.as_constant(), Some(5));
        assert_eq!(expr.evaluate(&[1, 2], &[3]), 5);
    }

    #[test]
    fn test_var_and_param() {
        let e = LinearExpr::var(0, 2, 1) + LinearExpr::param(0, 2, 1).scale(2);
        assert!(!e.is_constant());
        assert_eq!(e.evaluate(&[7, 3], &[10]), 27);
    }

    #[test]
    fn test_sub() {
        let e = LinearExpr::var(1, 2, 0) - LinearExpr::constant(4, 2, 0);
        assert_eq!(e.evaluate(&[0, 10], &[]), 6);
    }

    #[test]
    fn test_embed() {
        // i + N - 1 over [i], embedded at offset 3 in a 5-dim space.
        let mut e = LinearExpr::var(0, 1, 1);
        e.set_param_coeff(0, 1);
        e.constant = -1;
        let big = e.embed(3, 5);
        assert_eq!(big.coeffs, vec![0, 0, 0, 1, 0]);
        assert_eq!(big.param_coeffs, vec![1]);
        assert_eq!(big.constant, -1);
    }

    #[test]
    fn test_coeff_gcd() {
        let mut e = LinearExpr::zero(2, 1);
        e.coeffs = vec![4, -6];
        e.param_coeffs = vec![2];
        e.constant = 3;
        assert_eq!(e.coeff_gcd(), 2);
    }

    #[test]
    fn test_display() {
        let mut expr = LinearExpr::zero(2, 1);
        expr.constant = -1;
        expr.coeffs[0] = 2;
        expr.coeffs[1] = -1;
        expr.param_coeffs[0] = 1;

        let s = expr.to_string_with_names(
            &["i".to_string(), "j".to_string()],
            &["N".to_string()],
        );
        assert_eq!(s, "2*i - j + N - 1");
    }
}
