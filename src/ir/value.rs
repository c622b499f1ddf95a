//! Typed value expressions.
//!
//! Every constructor folds constant operands, wrapping the result to the
//! value's type the way the target machine would. A non-constant value
//! is a tree over SSA variables and memory loads.

use crate::ir::cfg::VarId;
use crate::ir::types::Type;
use crate::utils::intern::Symbol;
use num_integer::Integer;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub ty: Type,
    pub kind: ValueKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Const(i128),
    Var(VarId),
    Convert(Box<Value>),
    Neg(Box<Value>),
    Binary { op: BinaryOp, lhs: Box<Value>, rhs: Box<Value> },
    Compare { op: CmpOp, lhs: Box<Value>, rhs: Box<Value> },
    And(Box<Value>, Box<Value>),
    Load { array: Symbol, index: Box<Value> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Plus,
    /// Pointer plus an unsigned word-sized offset
    PointerPlus,
    Minus,
    Mult,
    Min,
    Max,
    FloorDiv,
    CeilDiv,
    ExactDiv,
    TruncMod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ge,
    Le,
    Lt,
}

/// Failure to evaluate a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("read of undefined variable {0}")]
    UndefinedVar(VarId),
    #[error("division by zero")]
    DivisionByZero,
}

/// Variable and memory state a value is evaluated against.
pub trait Env {
    fn var(&self, id: VarId) -> Option<i128>;
    fn load(&self, array: Symbol, index: i128) -> i128;
}

fn fold_binary(op: BinaryOp, a: i128, b: i128) -> Option<i128> {
    Some(match op {
        BinaryOp::Plus | BinaryOp::PointerPlus => a.checked_add(b)?,
        BinaryOp::Minus => a.checked_sub(b)?,
        BinaryOp::Mult => a.checked_mul(b)?,
        BinaryOp::Min => a.min(b),
        BinaryOp::Max => a.max(b),
        BinaryOp::FloorDiv if b != 0 => Integer::div_floor(&a, &b),
        BinaryOp::CeilDiv if b != 0 => -Integer::div_floor(&-a, &b),
        BinaryOp::ExactDiv if b != 0 => a / b,
        BinaryOp::TruncMod if b != 0 => a % b,
        _ => return None,
    })
}

fn fold_compare(op: CmpOp, a: i128, b: i128) -> bool {
    match op {
        CmpOp::Eq => a == b,
        CmpOp::Ge => a >= b,
        CmpOp::Le => a <= b,
        CmpOp::Lt => a < b,
    }
}

impl Value {
    /// `v` wrapped into `ty`.
    pub fn constant(ty: Type, v: i128) -> Self {
        Self { ty, kind: ValueKind::Const(ty.wrap(v)) }
    }

    pub fn bool(b: bool) -> Self {
        Self::constant(Type::Bool, b as i128)
    }

    pub fn var(ty: Type, id: VarId) -> Self {
        Self { ty, kind: ValueKind::Var(id) }
    }

    pub fn load(ty: Type, array: Symbol, index: Value) -> Self {
        Self { ty, kind: ValueKind::Load { array, index: Box::new(index) } }
    }

    pub fn as_constant(&self) -> Option<i128> {
        match self.kind {
            ValueKind::Const(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.as_constant().is_some()
    }

    /// A bare SSA variable.
    pub fn is_var(&self) -> bool {
        matches!(self.kind, ValueKind::Var(_))
    }

    pub fn convert(self, ty: Type) -> Self {
        if self.ty == ty {
            return self;
        }
        match self.kind {
            ValueKind::Const(v) => Self::constant(ty, v),
            _ => Self { ty, kind: ValueKind::Convert(Box::new(self)) },
        }
    }

    pub fn neg(self) -> Self {
        match self.kind {
            ValueKind::Const(v) => Self::constant(self.ty, -v),
            _ => Self { ty: self.ty, kind: ValueKind::Neg(Box::new(self)) },
        }
    }

    pub fn binary(op: BinaryOp, ty: Type, lhs: Value, rhs: Value) -> Self {
        if let (Some(a), Some(b)) = (lhs.as_constant(), rhs.as_constant()) {
            if let Some(v) = fold_binary(op, a, b) {
                return Self::constant(ty, v);
            }
        }
        let identity = match op {
            BinaryOp::Plus | BinaryOp::PointerPlus | BinaryOp::Minus => Some(0),
            BinaryOp::Mult | BinaryOp::FloorDiv | BinaryOp::CeilDiv | BinaryOp::ExactDiv => Some(1),
            _ => None,
        };
        if identity.is_some() && rhs.as_constant() == identity && lhs.ty == ty {
            return lhs;
        }
        if op == BinaryOp::Mult && lhs.as_constant() == Some(1) && rhs.ty == ty {
            return rhs;
        }
        Self {
            ty,
            kind: ValueKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
        }
    }

    pub fn compare(op: CmpOp, lhs: Value, rhs: Value) -> Self {
        if let (Some(a), Some(b)) = (lhs.as_constant(), rhs.as_constant()) {
            return Self::bool(fold_compare(op, a, b));
        }
        Self {
            ty: Type::Bool,
            kind: ValueKind::Compare { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
        }
    }

    pub fn and(lhs: Value, rhs: Value) -> Self {
        match (lhs.as_constant(), rhs.as_constant()) {
            (Some(0), _) | (_, Some(0)) => Self::bool(false),
            (Some(_), _) => rhs,
            (_, Some(_)) => lhs,
            _ => Self {
                ty: Type::Bool,
                kind: ValueKind::And(Box::new(lhs), Box::new(rhs)),
            },
        }
    }

    /// Direct subexpressions.
    fn operands(&self) -> Vec<&Value> {
        match &self.kind {
            ValueKind::Const(_) | ValueKind::Var(_) => Vec::new(),
            ValueKind::Convert(v) | ValueKind::Neg(v) => vec![v],
            ValueKind::Binary { lhs, rhs, .. }
            | ValueKind::Compare { lhs, rhs, .. }
            | ValueKind::And(lhs, rhs) => vec![lhs, rhs],
            ValueKind::Load { index, .. } => vec![index],
        }
    }

    /// Variables read by this value, with repetitions.
    pub fn uses(&self) -> Vec<VarId> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(v) = stack.pop() {
            if let ValueKind::Var(id) = v.kind {
                out.push(id);
            }
            stack.extend(v.operands());
        }
        out
    }

    /// Whether the value reads memory.
    pub fn has_load(&self) -> bool {
        matches!(self.kind, ValueKind::Load { .. }) || self.operands().iter().any(|v| v.has_load())
    }

    /// Rebuild the value with every variable replaced by `f(var, type)`,
    /// folding as it goes.
    pub fn substitute(&self, f: &mut dyn FnMut(VarId, Type) -> Value) -> Value {
        match &self.kind {
            ValueKind::Const(_) => self.clone(),
            ValueKind::Var(id) => f(*id, self.ty),
            ValueKind::Convert(v) => v.substitute(f).convert(self.ty),
            ValueKind::Neg(v) => v.substitute(f).neg(),
            ValueKind::Binary { op, lhs, rhs } => {
                Value::binary(*op, self.ty, lhs.substitute(f), rhs.substitute(f))
            }
            ValueKind::Compare { op, lhs, rhs } => {
                Value::compare(*op, lhs.substitute(f), rhs.substitute(f))
            }
            ValueKind::And(lhs, rhs) => Value::and(lhs.substitute(f), rhs.substitute(f)),
            ValueKind::Load { array, index } => Value::load(self.ty, *array, index.substitute(f)),
        }
    }

    pub fn eval(&self, env: &dyn Env) -> Result<i128, EvalError> {
        let v = match &self.kind {
            ValueKind::Const(v) => return Ok(*v),
            ValueKind::Var(id) => env.var(*id).ok_or(EvalError::UndefinedVar(*id))?,
            ValueKind::Convert(v) => v.eval(env)?,
            ValueKind::Neg(v) => -v.eval(env)?,
            ValueKind::Binary { op, lhs, rhs } => {
                let (a, b) = (lhs.eval(env)?, rhs.eval(env)?);
                fold_binary(*op, a, b).ok_or(EvalError::DivisionByZero)?
            }
            ValueKind::Compare { op, lhs, rhs } => {
                fold_compare(*op, lhs.eval(env)?, rhs.eval(env)?) as i128
            }
            ValueKind::And(lhs, rhs) => (lhs.eval(env)? != 0 && rhs.eval(env)? != 0) as i128,
            ValueKind::Load { array, index } => env.load(*array, index.eval(env)?),
        };
        Ok(self.ty.wrap(v))
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Plus => "+",
            BinaryOp::PointerPlus => "p+",
            BinaryOp::Minus => "-",
            BinaryOp::Mult => "*",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
            BinaryOp::FloorDiv => "/[fl]",
            BinaryOp::CeilDiv => "/[cl]",
            BinaryOp::ExactDiv => "/[ex]",
            BinaryOp::TruncMod => "%",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Eq => "==",
            CmpOp::Ge => ">=",
            CmpOp::Le => "<=",
            CmpOp::Lt => "<",
        };
        write!(f, "{}", s)
    }
}

struct Operand<'a>(&'a Value);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.kind {
            ValueKind::Const(_) | ValueKind::Var(_) | ValueKind::Load { .. } => write!(f, "{}", self.0),
            _ => write!(f, "({})", self.0),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValueKind::Const(v) if self.ty == Type::Bool => {
                write!(f, "{}", if *v != 0 { "true" } else { "false" })
            }
            ValueKind::Const(v) => write!(f, "{}", v),
            ValueKind::Var(id) => write!(f, "{}", id),
            ValueKind::Convert(v) => write!(f, "({}) {}", self.ty, Operand(v)),
            ValueKind::Neg(v) => write!(f, "-{}", Operand(v)),
            ValueKind::Binary { op: op @ (BinaryOp::Min | BinaryOp::Max), lhs, rhs } => {
                write!(f, "{} <{}, {}>", op.to_string().to_uppercase() + "_EXPR", lhs, rhs)
            }
            ValueKind::Binary { op, lhs, rhs } => {
                write!(f, "{} {} {}", Operand(lhs), op, Operand(rhs))
            }
            ValueKind::Compare { op, lhs, rhs } => {
                write!(f, "{} {} {}", Operand(lhs), op, Operand(rhs))
            }
            ValueKind::And(lhs, rhs) => write!(f, "{} && {}", Operand(lhs), Operand(rhs)),
            ValueKind::Load { array, index } => write!(f, "{}[{}]", array, index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const I32: Type = Type::Int(crate::ir::types::IntType { precision: 32, unsigned: false });
    const U8: Type = Type::Int(crate::ir::types::IntType { precision: 8, unsigned: true });

    struct MapEnv(HashMap<VarId, i128>);

    impl Env for MapEnv {
        fn var(&self, id: VarId) -> Option<i128> {
            self.0.get(&id).copied()
        }
        fn load(&self, _array: Symbol, index: i128) -> i128 {
            index * 10
        }
    }

    #[test]
    fn test_constant_folding_wraps() {
        let v = Value::binary(BinaryOp::Plus, U8, Value::constant(U8, 255), Value::constant(U8, 1));
        assert_eq!(v.as_constant(), Some(0));
        assert_eq!(Value::constant(U8, -1).as_constant(), Some(255));
        assert_eq!(Value::constant(I32, 5).neg().as_constant(), Some(-5));
    }

    #[test]
    fn test_division_semantics() {
        let c = |v| Value::constant(I32, v);
        let fold = |op, a, b| Value::binary(op, I32, c(a), c(b)).as_constant();
        assert_eq!(fold(BinaryOp::FloorDiv, -7, 2), Some(-4));
        assert_eq!(fold(BinaryOp::CeilDiv, -7, 2), Some(-3));
        assert_eq!(fold(BinaryOp::CeilDiv, 7, 2), Some(4));
        assert_eq!(fold(BinaryOp::ExactDiv, -8, 2), Some(-4));
        assert_eq!(fold(BinaryOp::TruncMod, -7, 2), Some(-1));
        // Division by zero is left for run time.
        assert_eq!(fold(BinaryOp::FloorDiv, 1, 0), None);
    }

    #[test]
    fn test_identities() {
        let x = Value::var(I32, VarId(3));
        assert_eq!(Value::binary(BinaryOp::Plus, I32, x.clone(), Value::constant(I32, 0)), x);
        assert_eq!(Value::binary(BinaryOp::Mult, I32, Value::constant(I32, 1), x.clone()), x);
        assert_eq!(x.clone().convert(I32), x);
        assert!(!x.clone().convert(U8).is_var());
    }

    #[test]
    fn test_and_folding() {
        let x = Value::compare(CmpOp::Lt, Value::var(I32, VarId(0)), Value::constant(I32, 4));
        assert_eq!(Value::and(Value::bool(true), x.clone()), x);
        assert_eq!(Value::and(x, Value::bool(false)).as_constant(), Some(0));
    }

    #[test]
    fn test_eval() {
        let x = Value::var(I32, VarId(0));
        let e = Value::binary(
            BinaryOp::Plus,
            I32,
            Value::load(I32, crate::utils::intern::intern("A"), x.clone()),
            x.clone().neg(),
        );
        let env = MapEnv(HashMap::from([(VarId(0), 3)]));
        assert_eq!(e.eval(&env).unwrap(), 27);

        let empty = MapEnv(HashMap::new());
        assert_eq!(e.eval(&empty), Err(EvalError::UndefinedVar(VarId(0))));
    }

    #[test]
    fn test_substitute_and_uses() {
        let e = Value::binary(
            BinaryOp::Mult,
            I32,
            Value::var(I32, VarId(1)),
            Value::var(I32, VarId(2)),
        );
        assert_eq!(e.uses().len(), 2);
        let folded = e.substitute(&mut |id, ty| Value::constant(ty, id.0 as i128 + 1));
        assert_eq!(folded.as_constant(), Some(6));
    }

    #[test]
    fn test_display() {
        let x = Value::var(I32, VarId(4));
        let e = Value::compare(
            CmpOp::Lt,
            Value::constant(I32, 0),
            Value::binary(BinaryOp::Plus, I32, x.clone(), Value::constant(I32, 1)),
        );
        assert_eq!(e.to_string(), "0 < (_4 + 1)");
        assert_eq!(x.convert(U8).to_string(), "(u8) _4");
    }
}
