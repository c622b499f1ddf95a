//! Translation of affine AST expressions into CFG values.

use crate::ast::{AffineExpr, BinOp, RedOp};
use crate::codegen::{Flagged, TranslationContext};
use crate::ir::types::Type;
use crate::ir::value::{BinaryOp, Value};
use crate::utils::errors::{CodegenError, CodegenErrorKind, LoopGenResult};
use log::warn;

impl TranslationContext<'_> {
    /// `e` as a value of type `ty`.
    pub fn translate_expr(&self, ty: Type, e: &AffineExpr) -> LoopGenResult<Flagged<Value>> {
        match e {
            AffineExpr::Term { var: None, coeff } => Ok(Flagged::ok(Value::constant(ty, *coeff as i128))),
            AffineExpr::Term { var: Some(name), coeff } => {
                let mut v = self.lookup(*name)?;
                if *coeff == 1 || *coeff == -1 {
                    if v.ty.is_pointer() != ty.is_pointer() {
                        v = v.convert(self.cfg.sizetype());
                    }
                    v = v.convert(ty);
                    return Ok(Flagged::ok(if *coeff == -1 { v.neg() } else { v }));
                }
                let cst = Value::constant(ty, *coeff as i128);
                if ty.is_pointer() {
                    warn!("cannot scale `{}` by {} in pointer type {}", name, coeff, ty);
                    return Ok(Flagged::flagged(cst));
                }
                Ok(Flagged::ok(Value::binary(BinaryOp::Mult, ty, cst, v.convert(ty))))
            }
            AffineExpr::Reduction { op, elts } => self.translate_reduction(ty, *op, elts, e),
            AffineExpr::Binary { op, lhs, rhs } => {
                let lhs = self.translate_expr(ty, lhs)?;
                let rhs = Value::constant(ty, *rhs as i128);
                let op = match op {
                    BinOp::FloorDiv => BinaryOp::FloorDiv,
                    BinOp::CeilDiv => BinaryOp::CeilDiv,
                    BinOp::ExactDiv => BinaryOp::ExactDiv,
                    BinOp::Mod => BinaryOp::TruncMod,
                };
                Ok(lhs.map(|l| Value::binary(op, ty, l, rhs)))
            }
        }
    }

    /// Left fold of `elts`. Sums in a pointer type add `sizetype`
    /// offsets to the first element.
    fn translate_reduction(
        &self,
        ty: Type,
        op: RedOp,
        elts: &[AffineExpr],
        e: &AffineExpr,
    ) -> LoopGenResult<Flagged<Value>> {
        let (first, rest) = elts.split_first().ok_or_else(|| {
            CodegenError::new(CodegenErrorKind::EmptyReduction, format!("no elements in `{}`", e))
        })?;
        let (op, operand_ty) = match op {
            RedOp::Sum if ty.is_pointer() => (BinaryOp::PointerPlus, self.cfg.sizetype()),
            RedOp::Sum => (BinaryOp::Plus, ty),
            RedOp::Min => (BinaryOp::Min, ty),
            RedOp::Max => (BinaryOp::Max, ty),
        };
        let mut flag = false;
        let mut acc = self.translate_expr(ty, first)?.take(&mut flag);
        for elt in rest {
            let v = self.translate_expr(operand_ty, elt)?.take(&mut flag);
            acc = Value::binary(op, ty, acc, v);
        }
        Ok(Flagged::new(acc, flag))
    }
}
