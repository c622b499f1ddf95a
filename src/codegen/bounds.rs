//! Loop bounds and guard conditions.

use crate::ast::{Equation, ForStmt, GuardStmt};
use crate::codegen::{Flagged, TranslationContext};
use crate::ir::types::Type;
use crate::ir::value::{BinaryOp, CmpOp, Value};
use crate::polyhedral::{LinearExpr, LpBound};
use crate::scop::{PolyBb, Scop};
use crate::utils::errors::{CodegenError, CodegenErrorKind, LoopGenResult};
use log::{debug, warn};

/// Everything needed to emit a loop: the type of its induction variable,
/// its bounds in that type and the condition under which it runs at
/// least once.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopGuard {
    pub ty: Type,
    pub lb: Value,
    pub ub: Value,
    pub cond: Value,
}

impl TranslationContext<'_> {
    /// Smallest and largest value the loop at `level` takes for `pbb`,
    /// over the statement's scattering, domain and the context.
    pub fn bounds_for_level(&self, pbb: &PolyBb, level: usize) -> LoopGenResult<(LpBound, LpBound)> {
        let dim = Scop::dynamic_dim(level);
        if dim >= pbb.nb_scattering() {
            return Err(CodegenError::new(
                CodegenErrorKind::MalformedSubstitution,
                format!("{} has {} loops, none at level {}", pbb.id, pbb.depth(), level),
            )
            .into());
        }
        let poly = self.scop.scattering_polytope(pbb);
        let objective = LinearExpr::var(dim, poly.dim(), poly.n_param());
        let lo = self.solver.minimize(&poly, &objective)?;
        let hi = self.solver.maximize(&poly, &objective)?;
        Ok((lo, hi))
    }

    /// Type of the values the loop at `level` takes for `pbb`. An empty
    /// domain gives the type of `[0, 0]`.
    pub fn type_for_level(&self, pbb: &PolyBb, level: usize) -> LoopGenResult<Flagged<Type>> {
        Ok(match self.bounds_for_level(pbb, level)? {
            (LpBound::Infeasible, _) | (_, LpBound::Infeasible) => self.types.type_for_interval(0, 0),
            (LpBound::Finite(lo), LpBound::Finite(hi)) => self.types.type_for_interval(lo, hi),
            (lo, hi) => {
                warn!("loop {} of {} is unbounded ({:?}, {:?})", level, pbb.id, lo, hi);
                Flagged::flagged(self.types.word_type())
            }
        })
    }

    /// Type, bounds and zero-trip guard of `f` at `level`. The type comes
    /// from the bound expressions and from the range of the loop for the
    /// first statement of its body.
    ///
    /// The guard is `lb <= ub` when `ub` is a constant or a variable, and
    /// `lb < ub + 1` otherwise: for `ub = N - 1` computed in an unsigned
    /// type, `N == 0` wraps `ub` to the type's maximum and only the
    /// second form is false.
    pub fn loop_guard(&self, f: &ForStmt, level: usize) -> LoopGenResult<Flagged<LoopGuard>> {
        let user = f.body.as_deref().and_then(|b| b.first_user()).ok_or_else(|| {
            CodegenError::new(
                CodegenErrorKind::EmptyLoopBody,
                format!("loop over `{}` has no statement", f.iterator),
            )
        })?;
        let pbb = self.statement(user.statement)?;

        let mut flag = false;
        let lb_ty = self.type_for_expr(&f.lb)?.take(&mut flag);
        let ub_ty = self.type_for_expr(&f.ub)?.take(&mut flag);
        let level_ty = self.type_for_level(pbb, level)?.take(&mut flag);
        let wide = self.types.join(ub_ty, level_ty).take(&mut flag);
        let ty = self.types.signed_join(lb_ty, wide).take(&mut flag);

        let lb = self.translate_expr(ty, &f.lb)?.take(&mut flag);
        let ub = self.translate_expr(ty, &f.ub)?.take(&mut flag);
        let cond = if ub.is_constant() || ub.is_var() {
            Value::compare(CmpOp::Le, lb.clone(), ub.clone())
        } else {
            let ub_one = if ty.is_pointer() {
                Value::binary(BinaryOp::PointerPlus, ty, ub.clone(), Value::constant(self.cfg.sizetype(), 1))
            } else {
                Value::binary(BinaryOp::Plus, ty, ub.clone(), Value::constant(ty, 1))
            };
            Value::compare(CmpOp::Lt, lb.clone(), ub_one)
        };
        debug!("guard for `{}` at level {}: {} ({})", f.iterator, level, cond, ty);
        Ok(Flagged::new(LoopGuard { ty, lb, ub, cond }, flag))
    }

    fn translate_equation(&self, eq: &Equation) -> LoopGenResult<Flagged<Value>> {
        let mut flag = false;
        let ty = self.type_for_equation(eq)?.take(&mut flag);
        let lhs = self.translate_expr(ty, &eq.lhs)?.take(&mut flag);
        let rhs = self.translate_expr(ty, &eq.rhs)?.take(&mut flag);
        let op = match eq.sign {
            0 => CmpOp::Eq,
            s if s > 0 => CmpOp::Ge,
            _ => CmpOp::Le,
        };
        Ok(Flagged::new(Value::compare(op, lhs, rhs), flag))
    }

    /// Conjunction of the equations of `g`, in order; `true` for none.
    pub fn conjunction_guard(&self, g: &GuardStmt) -> LoopGenResult<Flagged<Value>> {
        let mut flag = false;
        let mut cond: Option<Value> = None;
        for eq in &g.eqs {
            let c = self.translate_equation(eq)?.take(&mut flag);
            cond = Some(match cond {
                None => c,
                Some(prev) => Value::and(prev, c),
            });
        }
        Ok(Flagged::new(cond.unwrap_or_else(|| Value::bool(true)), flag))
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{AffineExpr, AstKind, AstNode, AstStmt, Equation, GuardStmt, UserStmt, Assignment};
    use crate::codegen::tests::Fixture;
    use crate::ir::types::Type;
    use crate::ir::value::{BinaryOp, CmpOp, ValueKind};
    use crate::polyhedral::LpBound;
    use crate::scop::PbbId;
    use crate::utils::intern::intern;

    fn for_stmt(lb: AffineExpr, ub: AffineExpr) -> crate::ast::ForStmt {
        let user = AstNode::User(UserStmt {
            statement: PbbId(0),
            substitutions: vec![Assignment { lhs: None, rhs: AffineExpr::var("c1") }],
        });
        let node = AstNode::For { iterator: intern("c1"), lb, ub, stride: 1, body: vec![user] };
        match AstStmt::from(node).kind {
            AstKind::For(f) => f,
            _ => unreachable!(),
        }
    }

    fn n_minus_one() -> AffineExpr {
        AffineExpr::sum(vec![AffineExpr::var("N"), AffineExpr::constant(-1)])
    }

    #[test]
    fn test_bounds_for_level() {
        let mut fx = Fixture::vector(&[("N", "i32")], "N-1");
        let ctx = fx.context();
        let pbb = ctx.scop.pbb(PbbId(0)).unwrap();
        let (lo, hi) = ctx.bounds_for_level(pbb, 0).unwrap();
        assert_eq!(lo, LpBound::Finite(0));
        assert_eq!(hi, LpBound::Finite(i32::MAX as i128 - 1));
        assert_eq!(ctx.type_for_level(pbb, 0).unwrap().value, Type::int(32, true));
        assert!(ctx.bounds_for_level(pbb, 1).is_err());
    }

    #[test]
    fn test_constant_upper_bound_uses_le() {
        let mut fx = Fixture::vector(&[("N", "i32")], "99");
        let ctx = fx.context();
        let g = ctx.loop_guard(&for_stmt(AffineExpr::constant(0), AffineExpr::constant(99)), 0).unwrap();
        assert!(!g.flagged);
        // both constant: folded to true
        assert_eq!(g.value.cond.as_constant(), Some(1));

        let g = ctx.loop_guard(&for_stmt(AffineExpr::var("N"), AffineExpr::constant(99)), 0).unwrap();
        assert!(matches!(g.value.cond.kind, ValueKind::Compare { op: CmpOp::Le, .. }));
    }

    #[test]
    fn test_variable_upper_bound_uses_le() {
        let mut fx = Fixture::vector_in(&[("N", "i64")], "N", &["N <= 1000"]);
        let ctx = fx.context();
        let g = ctx.loop_guard(&for_stmt(AffineExpr::constant(0), AffineExpr::var("N")), 0).unwrap();
        assert!(!g.flagged);
        assert_eq!(g.value.ty, Type::int(64, false));
        assert!(g.value.ub.is_var());
        assert!(matches!(g.value.cond.kind, ValueKind::Compare { op: CmpOp::Le, .. }));
    }

    #[test]
    fn test_compound_upper_bound_uses_lt_plus_one() {
        let mut fx = Fixture::vector(&[("N", "i32")], "N-1");
        let ctx = fx.context();
        let g = ctx.loop_guard(&for_stmt(AffineExpr::constant(0), n_minus_one()), 0).unwrap();
        assert!(!g.flagged);
        // u8 lb, i32 ub, u32 range
        assert_eq!(g.value.ty, Type::int(64, false));
        match &g.value.cond.kind {
            ValueKind::Compare { op: CmpOp::Lt, lhs, rhs } => {
                assert_eq!(lhs.as_constant(), Some(0));
                assert!(matches!(rhs.kind, ValueKind::Binary { op: BinaryOp::Plus, .. }));
            }
            other => panic!("expected `<`, got {:?}", other),
        }
        assert_eq!(g.value.cond.to_string(), "0 < ((((i64) _0) + -1) + 1)");
    }

    #[test]
    fn test_empty_loop_body_is_fatal() {
        let mut fx = Fixture::vector(&[("N", "i32")], "N-1");
        let ctx = fx.context();
        let mut f = for_stmt(AffineExpr::constant(0), n_minus_one());
        f.body = None;
        assert!(ctx.loop_guard(&f, 0).is_err());
    }

    #[test]
    fn test_conjunction_guard() {
        let mut fx = Fixture::vector(&[("N", "i32"), ("M", "i32")], "N-1");
        let ctx = fx.context();
        let empty = GuardStmt { eqs: Vec::new(), then: None };
        assert_eq!(ctx.conjunction_guard(&empty).unwrap().value.as_constant(), Some(1));

        let g = GuardStmt {
            eqs: vec![
                Equation::ge(AffineExpr::var("N"), AffineExpr::constant(1)),
                Equation::eq(AffineExpr::var("M"), AffineExpr::constant(0)),
                Equation::le(AffineExpr::var("N"), AffineExpr::var("M")),
            ],
            then: None,
        };
        let cond = ctx.conjunction_guard(&g).unwrap().value;
        assert_eq!(cond.ty, Type::Bool);
        assert_eq!(cond.to_string(), "((_0 >= 1) && (_1 == 0)) && (_0 <= _1)");
    }
}
