//! Type inference for generated expressions.
//!
//! Every expression the translator emits gets the narrowest machine type
//! that holds all values it can take. Types wider than the machine word
//! cannot be emitted: the engine then answers with the signed word type
//! and flags the result, and the caller abandons the translation at the
//! end.

use crate::ast::{AffineExpr, Equation};
use crate::codegen::{Flagged, TranslationContext};
use crate::ir::types::Type;
use crate::utils::errors::{CodegenError, CodegenErrorKind, LoopGenResult};
use log::warn;

const MODES: [u32; 4] = [8, 16, 32, 64];

/// Bits needed for `v` as an unsigned value; `v` is non-negative.
fn unsigned_bits(v: i128) -> u32 {
    (128 - v.leading_zeros()).max(1)
}

/// Bits needed for `v` as a two's complement value.
fn signed_bits(v: i128) -> u32 {
    if v < 0 {
        128 - (!v).leading_zeros() + 1
    } else {
        128 - v.leading_zeros() + 1
    }
}

/// Type algebra for a machine with `word_bits`-bit words.
#[derive(Debug, Clone, Copy)]
pub struct TypeEngine {
    word_bits: u32,
}

impl TypeEngine {
    pub fn new(word_bits: u32) -> Self {
        Self { word_bits }
    }

    /// Default type, used in place of anything that does not fit.
    pub fn word_type(&self) -> Type {
        Type::int(self.word_bits, false)
    }

    /// Smallest machine mode of at least `bits` bits.
    fn mode(&self, bits: u32) -> Option<u32> {
        if bits > self.word_bits {
            return None;
        }
        Some(MODES.into_iter().find(|&m| m >= bits && m <= self.word_bits).unwrap_or(self.word_bits))
    }

    fn fit(&self, bits: u32, unsigned: bool) -> Flagged<Type> {
        match self.mode(bits) {
            Some(p) => Flagged::ok(Type::int(p, unsigned)),
            None => {
                warn!("{} bits do not fit a {}-bit word", bits, self.word_bits);
                Flagged::flagged(self.word_type())
            }
        }
    }

    /// A type holding both operands. Pointers win; two unsigned types
    /// give the wider one; anything else goes through [`Self::signed_join`].
    pub fn join(&self, a: Type, b: Type) -> Flagged<Type> {
        if a.is_pointer() {
            return Flagged::ok(a);
        }
        if b.is_pointer() {
            return Flagged::ok(b);
        }
        if a.is_unsigned() && b.is_unsigned() {
            return Flagged::ok(if a.precision() >= b.precision() { a } else { b });
        }
        self.signed_join(a, b)
    }

    /// Smallest signed type holding both operands. An unsigned operand
    /// of precision `p` needs `p + 1` signed bits.
    pub fn signed_join(&self, a: Type, b: Type) -> Flagged<Type> {
        if a.is_pointer() {
            return Flagged::ok(a);
        }
        if b.is_pointer() {
            return Flagged::ok(b);
        }
        let need = |t: Type| t.precision() + t.is_unsigned() as u32;
        self.fit(need(a).max(need(b)), false)
    }

    pub fn type_for_value(&self, v: i128) -> Flagged<Type> {
        self.type_for_interval(v, v)
    }

    /// Smallest type holding every value between `lo` and `hi`, unsigned
    /// when neither is negative.
    pub fn type_for_interval(&self, lo: i128, hi: i128) -> Flagged<Type> {
        let (lo, hi) = (lo.min(hi), lo.max(hi));
        if lo >= 0 {
            self.fit(unsigned_bits(hi), true)
        } else {
            self.fit(signed_bits(lo).max(signed_bits(hi)), false)
        }
    }
}

impl TranslationContext<'_> {
    /// Type of `e`: literals get the type of their value, names the type
    /// of what they are bound to, reductions the join of their elements
    /// and divisions a signed type holding both operands.
    pub fn type_for_expr(&self, e: &AffineExpr) -> LoopGenResult<Flagged<Type>> {
        match e {
            AffineExpr::Term { var: None, coeff } => Ok(self.types.type_for_value(*coeff as i128)),
            AffineExpr::Term { var: Some(name), .. } => Ok(Flagged::ok(self.lookup(*name)?.ty)),
            AffineExpr::Reduction { elts, .. } => {
                let (first, rest) = elts.split_first().ok_or_else(|| {
                    CodegenError::new(CodegenErrorKind::EmptyReduction, format!("no elements in `{}`", e))
                })?;
                let mut flag = false;
                let mut ty = self.type_for_expr(first)?.take(&mut flag);
                for elt in rest {
                    let t = self.type_for_expr(elt)?.take(&mut flag);
                    ty = self.types.join(ty, t).take(&mut flag);
                }
                Ok(Flagged::new(ty, flag))
            }
            AffineExpr::Binary { lhs, rhs, .. } => {
                let mut flag = false;
                let l = self.type_for_expr(lhs)?.take(&mut flag);
                let r = self.types.type_for_value(*rhs as i128).take(&mut flag);
                Ok(self.types.signed_join(l, r).or_flag(flag))
            }
        }
    }

    /// Type both sides of `eq` are compared in.
    pub fn type_for_equation(&self, eq: &Equation) -> LoopGenResult<Flagged<Type>> {
        let mut flag = false;
        let l = self.type_for_expr(&eq.lhs)?.take(&mut flag);
        let r = self.type_for_expr(&eq.rhs)?.take(&mut flag);
        Ok(self.types.join(l, r).or_flag(flag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> TypeEngine {
        TypeEngine::new(64)
    }

    fn int(p: u32, unsigned: bool) -> Type {
        Type::int(p, unsigned)
    }

    #[test]
    fn test_type_for_value() {
        let e = engine();
        assert_eq!(e.type_for_value(0).value, int(8, true));
        assert_eq!(e.type_for_value(255).value, int(8, true));
        assert_eq!(e.type_for_value(256).value, int(16, true));
        assert_eq!(e.type_for_value(-1).value, int(8, false));
        assert_eq!(e.type_for_value(-128).value, int(8, false));
        assert_eq!(e.type_for_value(-129).value, int(16, false));
        assert_eq!(e.type_for_value(u64::MAX as i128).value, int(64, true));
        assert!(!e.type_for_value(i64::MIN as i128).flagged);
    }

    #[test]
    fn test_minimal_width_for_all_literals() {
        let e = engine();
        for v in [1i128, 7, 100, 1000, 70_000, 1 << 40, -5, -300, -(1 << 33)] {
            let ty = e.type_for_value(v).value;
            assert_eq!(ty.is_unsigned(), v >= 0);
            assert!(ty.as_int().contains(v));
            let half = ty.precision() / 2;
            if half >= 8 {
                assert!(!Type::int(half, v >= 0).as_int().contains(v));
            }
        }
    }

    #[test]
    fn test_type_for_interval() {
        let e = engine();
        assert_eq!(e.type_for_interval(0, 99).value, int(8, true));
        assert_eq!(e.type_for_interval(-1, 200).value, int(16, false));
        assert_eq!(e.type_for_interval(5, -3).value, int(8, false));
        assert_eq!(e.type_for_interval(0, (1 << 32) - 2).value, int(32, true));
        let ty = e.type_for_interval(-1, u64::MAX as i128);
        assert!(ty.flagged);
        assert_eq!(ty.value, e.word_type());
    }

    #[test]
    fn test_join() {
        let e = engine();
        let ptr = Type::Pointer { precision: 64 };
        assert_eq!(e.join(int(32, false), ptr).value, ptr);
        assert_eq!(e.signed_join(ptr, int(8, true)).value, ptr);
        assert_eq!(e.join(int(8, true), int(32, true)).value, int(32, true));
        assert_eq!(e.join(int(8, true), int(8, false)).value, int(16, false));
        assert_eq!(e.join(int(16, false), int(32, false)).value, int(32, false));
    }

    #[test]
    fn test_signed_join_widens_unsigned() {
        let e = engine();
        assert_eq!(e.signed_join(int(32, true), int(8, false)).value, int(64, false));
        assert_eq!(e.signed_join(int(8, true), int(8, true)).value, int(16, false));
        let overflow = e.signed_join(int(64, true), int(8, false));
        assert!(overflow.flagged);
        assert_eq!(overflow.value, int(64, false));
    }

    #[test]
    fn test_narrow_word() {
        let e = TypeEngine::new(32);
        assert_eq!(e.word_type(), int(32, false));
        assert!(e.type_for_value(1 << 40).flagged);
        assert!(e.signed_join(int(32, true), int(8, false)).flagged);
        assert!(!e.type_for_value(-(1 << 20)).flagged);
    }
}
