//! Types of CFG values: booleans, fixed-width integers and pointers.

use serde::{Serialize, Deserialize};
use std::fmt;
use std::str::FromStr;

/// A fixed-width two's complement integer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntType {
    /// Width in bits, between 1 and 64
    pub precision: u32,
    pub unsigned: bool,
}

impl IntType {
    pub fn new(precision: u32, unsigned: bool) -> Self {
        Self { precision, unsigned }
    }

    pub fn signed(precision: u32) -> Self {
        Self::new(precision, false)
    }

    pub fn unsigned(precision: u32) -> Self {
        Self::new(precision, true)
    }

    pub fn min_value(&self) -> i128 {
        if self.unsigned {
            0
        } else {
            -(1i128 << (self.precision - 1))
        }
    }

    pub fn max_value(&self) -> i128 {
        if self.unsigned {
            (1i128 << self.precision) - 1
        } else {
            (1i128 << (self.precision - 1)) - 1
        }
    }

    pub fn contains(&self, v: i128) -> bool {
        self.min_value() <= v && v <= self.max_value()
    }

    /// Reduce `v` modulo `2^precision` into this type's range.
    pub fn wrap(&self, v: i128) -> i128 {
        let modulus = 1i128 << self.precision;
        let r = v.rem_euclid(modulus);
        if !self.unsigned && r > self.max_value() {
            r - modulus
        } else {
            r
        }
    }
}

/// Type of a CFG value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Type {
    Bool,
    Int(IntType),
    /// An address; arithmetic on it wraps at `precision` bits
    Pointer { precision: u32 },
}

impl Type {
    pub fn int(precision: u32, unsigned: bool) -> Self {
        Type::Int(IntType::new(precision, unsigned))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer { .. })
    }

    pub fn precision(&self) -> u32 {
        match self {
            Type::Bool => 1,
            Type::Int(it) => it.precision,
            Type::Pointer { precision } => *precision,
        }
    }

    pub fn is_unsigned(&self) -> bool {
        match self {
            Type::Bool | Type::Pointer { .. } => true,
            Type::Int(it) => it.unsigned,
        }
    }

    /// The integer range values of this type live in.
    pub fn as_int(&self) -> IntType {
        match self {
            Type::Bool => IntType::unsigned(1),
            Type::Int(it) => *it,
            Type::Pointer { precision } => IntType::unsigned(*precision),
        }
    }

    /// Bring `v` into this type's value range.
    pub fn wrap(&self, v: i128) -> i128 {
        match self {
            Type::Bool => (v != 0) as i128,
            _ => self.as_int().wrap(v),
        }
    }
}

impl fmt::Display for IntType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", if self.unsigned { 'u' } else { 'i' }, self.precision)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Int(it) => write!(f, "{}", it),
            Type::Pointer { precision: 64 } => write!(f, "ptr"),
            Type::Pointer { precision } => write!(f, "ptr{}", precision),
        }
    }
}

impl FromStr for Type {
    type Err = String;

    /// Parses `bool`, `ptr`, `ptrN`, `iN` and `uN` with `N` in 1..=64.
    fn from_str(s: &str) -> Result<Self, String> {
        let width = |digits: &str| -> Result<u32, String> {
            match digits.parse::<u32>() {
                Ok(p) if (1..=64).contains(&p) => Ok(p),
                _ => Err(format!("invalid bit width in type `{}`", s)),
            }
        };
        match s {
            "bool" => Ok(Type::Bool),
            "ptr" => Ok(Type::Pointer { precision: 64 }),
            _ if s.starts_with("ptr") => Ok(Type::Pointer { precision: width(&s[3..])? }),
            _ if s.starts_with('i') => Ok(Type::int(width(&s[1..])?, false)),
            _ if s.starts_with('u') => Ok(Type::int(width(&s[1..])?, true)),
            _ => Err(format!("unknown type `{}`", s)),
        }
    }
}

impl TryFrom<String> for Type {
    type Error = String;

    fn try_from(s: String) -> Result<Self, String> {
        s.parse()
    }
}

impl From<Type> for String {
    fn from(ty: Type) -> String {
        ty.to_string()
    }
}
