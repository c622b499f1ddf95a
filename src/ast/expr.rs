//! Affine expressions of the loop-nest AST.

use crate::polyhedral::LinearExpr;
use crate::utils::intern::{intern, Symbol};
use serde::{Serialize, Deserialize};
use std::fmt;

/// An affine expression over iterators and parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffineExpr {
    /// `coeff * var`, or the constant `coeff` when there is no variable
    Term {
        #[serde(default)]
        var: Option<Symbol>,
        coeff: i64,
    },
    /// Sum, minimum or maximum of a non-empty list
    Reduction {
        op: RedOp,
        elts: Vec<AffineExpr>,
    },
    /// Division or modulo by an integer constant
    Binary {
        op: BinOp,
        lhs: Box<AffineExpr>,
        rhs: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedOp {
    Sum,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    /// Division rounding toward negative infinity
    FloorDiv,
    /// Division rounding toward positive infinity
    CeilDiv,
    /// Division known to have no remainder
    ExactDiv,
    /// Remainder of truncating division
    Mod,
}

impl AffineExpr {
    pub fn constant(value: i64) -> Self {
        Self::Term { var: None, coeff: value }
    }

    pub fn var(name: &str) -> Self {
        Self::term(name, 1)
    }

    pub fn term(name: &str, coeff: i64) -> Self {
        Self::Term { var: Some(intern(name)), coeff }
    }

    pub fn sum(elts: Vec<AffineExpr>) -> Self {
        Self::Reduction { op: RedOp::Sum, elts }
    }

    pub fn min(elts: Vec<AffineExpr>) -> Self {
        Self::Reduction { op: RedOp::Min, elts }
    }

    pub fn max(elts: Vec<AffineExpr>) -> Self {
        Self::Reduction { op: RedOp::Max, elts }
    }

    pub fn binary(op: BinOp, lhs: AffineExpr, rhs: i64) -> Self {
        Self::Binary { op, lhs: Box::new(lhs), rhs }
    }

    /// Rebuild a linear form as a sum of terms, dimensions first, then
    /// parameters, then the constant.
    pub fn from_linear(e: &LinearExpr, dim_names: &[Symbol], param_names: &[Symbol]) -> Self {
        let mut elts = Vec::new();
        for (&c, &name) in e.coeffs.iter().zip(dim_names) {
            if c != 0 {
                elts.push(Self::Term { var: Some(name), coeff: c });
            }
        }
        for (&c, &name) in e.param_coeffs.iter().zip(param_names) {
            if c != 0 {
                elts.push(Self::Term { var: Some(name), coeff: c });
            }
        }
        if e.constant != 0 || elts.is_empty() {
            elts.push(Self::constant(e.constant));
        }
        if elts.len() == 1 {
            elts.remove(0)
        } else {
            Self::sum(elts)
        }
    }

    /// The literal value, for a term without variable.
    pub fn as_constant(&self) -> Option<i64> {
        match self {
            Self::Term { var: None, coeff } => Some(*coeff),
            _ => None,
        }
    }
}

/// A comparison between two affine expressions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equation {
    pub lhs: AffineExpr,
    pub rhs: AffineExpr,
    /// 0 for `==`, positive for `>=`, negative for `<=`
    pub sign: i32,
}

impl Equation {
    pub fn eq(lhs: AffineExpr, rhs: AffineExpr) -> Self {
        Self { lhs, rhs, sign: 0 }
    }

    pub fn ge(lhs: AffineExpr, rhs: AffineExpr) -> Self {
        Self { lhs, rhs, sign: 1 }
    }

    pub fn le(lhs: AffineExpr, rhs: AffineExpr) -> Self {
        Self { lhs, rhs, sign: -1 }
    }
}

impl fmt::Display for AffineExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Term { var: None, coeff } => write!(f, "{}", coeff),
            Self::Term { var: Some(v), coeff: 1 } => write!(f, "{}", v),
            Self::Term { var: Some(v), coeff: -1 } => write!(f, "-{}", v),
            Self::Term { var: Some(v), coeff } => write!(f, "{}*{}", coeff, v),
            Self::Reduction { op: RedOp::Sum, elts } => {
                for (i, e) in elts.iter().enumerate() {
                    let s = e.to_string();
                    if i > 0 && !s.starts_with('-') {
                        write!(f, "+")?;
                    }
                    write!(f, "{}", s)?;
                }
                Ok(())
            }
            Self::Reduction { op, elts } => {
                let name = if *op == RedOp::Min { "min" } else { "max" };
                write!(f, "{}(", name)?;
                for (i, e) in elts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, ")")
            }
            Self::Binary { op, lhs, rhs } => match op {
                BinOp::FloorDiv => write!(f, "floord({},{})", lhs, rhs),
                BinOp::CeilDiv => write!(f, "ceild({},{})", lhs, rhs),
                BinOp::ExactDiv => write!(f, "({})/{}", lhs, rhs),
                BinOp::Mod => write!(f, "({})%{}", lhs, rhs),
            },
        }
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.sign {
            0 => "==",
            s if s > 0 => ">=",
            _ => "<=",
        };
        write!(f, "{} {} {}", self.lhs, op, self.rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = AffineExpr::sum(vec![AffineExpr::var("N"), AffineExpr::constant(-1)]);
        assert_eq!(e.to_string(), "N-1");

        let m = AffineExpr::min(vec![AffineExpr::term("c1", 32), e.clone()]);
        assert_eq!(m.to_string(), "min(32*c1,N-1)");

        let d = AffineExpr::binary(BinOp::FloorDiv, e, 32);
        assert_eq!(d.to_string(), "floord(N-1,32)");

        let eq = Equation::ge(AffineExpr::var("c1"), AffineExpr::constant(1));
        assert_eq!(eq.to_string(), "c1 >= 1");
    }

    #[test]
    fn test_from_linear() {
        let i = intern("i");
        let n = intern("N");
        let mut le = LinearExpr::zero(1, 1);
        le.param_coeffs[0] = 1;
        le.constant = -1;
        assert_eq!(
            AffineExpr::from_linear(&le, &[i], &[n]),
            AffineExpr::sum(vec![AffineExpr::var("N"), AffineExpr::constant(-1)])
        );

        let zero = LinearExpr::zero(1, 1);
        assert_eq!(AffineExpr::from_linear(&zero, &[i], &[n]), AffineExpr::constant(0));
    }

    #[test]
    fn test_serde_shape() {
        let e: AffineExpr =
            serde_json::from_str(r#"{"term": {"var": "N", "coeff": 2}}"#).unwrap();
        assert_eq!(e, AffineExpr::term("N", 2));
        let c: AffineExpr = serde_json::from_str(r#"{"term": {"coeff": 7}}"#).unwrap();
        assert_eq!(c.as_constant(), Some(7));
    }
}
