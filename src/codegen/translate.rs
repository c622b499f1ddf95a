//! The walk over the loop-nest AST.
//!
//! Each statement is translated onto an edge of the CFG and returns the
//! edge following the code it produced, where its next sibling goes:
//!
//! - a user statement copies its original block with the iterators
//!   replaced by the values of its substitutions
//! - a loop becomes `if (guard) { loop }` with a loop-close block on the
//!   loop exit, and its body is translated one level deeper
//! - a guard becomes `if (conjunction) { then }`
//! - a block translates its body in place

use crate::ast::{AstKind, AstStmt, ForStmt, GuardStmt, UserStmt};
use crate::codegen::parallel::carries_dependence;
use crate::codegen::{Flagged, TranslationContext};
use crate::ir::cfg::EdgeId;
use crate::utils::errors::{CodegenError, CodegenErrorKind, LoopGenResult};
use log::debug;
use std::collections::HashMap;

impl TranslationContext<'_> {
    /// Translate `stmt` and its following siblings onto `next_e`.
    pub fn translate_stmt(&mut self, stmt: &AstStmt, next_e: EdgeId, level: usize) -> LoopGenResult<Flagged<EdgeId>> {
        let mut flag = false;
        let mut next_e = next_e;
        for s in stmt.siblings() {
            next_e = match &s.kind {
                AstKind::Root => next_e,
                AstKind::User(user) => self.translate_user(user, next_e)?.take(&mut flag),
                AstKind::For(f) => self.translate_for(f, next_e, level)?.take(&mut flag),
                AstKind::Guard(g) => self.translate_guard(g, next_e, level)?.take(&mut flag),
                AstKind::Block { body } => match body {
                    Some(body) => self.translate_stmt(body, next_e, level)?.take(&mut flag),
                    None => next_e,
                },
            };
            self.cfg.recompute_dominators();
            if self.config.verify {
                self.cfg.verify()?;
            }
        }
        Ok(Flagged::new(next_e, flag))
    }

    fn translate_user(&mut self, user: &UserStmt, next_e: EdgeId) -> LoopGenResult<Flagged<EdgeId>> {
        let pbb = self.statement(user.statement)?;
        if pbb.black_box == self.cfg.entry {
            return Ok(Flagged::ok(next_e));
        }
        if user.substitutions.len() > pbb.loops.len() {
            return Err(CodegenError::new(
                CodegenErrorKind::MalformedSubstitution,
                format!(
                    "{} is nested in {} loops but has {} substitutions",
                    pbb.id,
                    pbb.loops.len(),
                    user.substitutions.len()
                ),
            )
            .into());
        }

        let mut flag = false;
        let mut iv_map = HashMap::new();
        for (&lp, sub) in pbb.loops.iter().zip(&user.substitutions) {
            let ty = self.type_for_expr(&sub.rhs)?.take(&mut flag);
            let v = self.translate_expr(ty, &sub.rhs)?.take(&mut flag);
            iv_map.insert(lp, v);
        }
        let copy = self
            .cfg
            .copy_bb_and_scalar_dependences(pbb.black_box, &self.region, next_e, &iv_map)?;
        self.bb_pbb.mark(copy.block, pbb.id);
        self.renamed.extend(copy.renamed);
        self.cfg.update_ssa();
        self.statements += 1;
        debug!("copied {} ({}) to {}", pbb.id, pbb.name, copy.block);
        Ok(Flagged::new(copy.exit, flag))
    }

    fn translate_for(&mut self, f: &ForStmt, next_e: EdgeId, level: usize) -> LoopGenResult<Flagged<EdgeId>> {
        if f.stride < 1 {
            return Err(CodegenError::new(
                CodegenErrorKind::InvalidStride,
                format!("loop over `{}` has stride {}", f.iterator, f.stride),
            )
            .into());
        }
        let mut flag = false;
        let guard = self.loop_guard(f, level)?.take(&mut flag);
        let context_loop = self.cfg.block(self.cfg.edge(next_e).src).loop_father;
        let region = self.cfg.create_if_region_on_edge(next_e, guard.cond)?;
        let lp = self.cfg.create_empty_loop_on_edge(
            region.true_edge,
            guard.lb,
            f.stride,
            guard.ub,
            Some(f.iterator),
            guard.ty,
            context_loop,
        )?;
        let exit = self.cfg.single_exit(lp.id)?;
        self.cfg.split_edge(exit);
        let to_body = self.cfg.single_succ_edge(lp.header)?;
        let after = self.cfg.edge(to_body).dest;

        self.iv_index.bind(f.iterator, self.newivs.len(), level);
        self.newivs.push(self.cfg.var_value(lp.iv));
        self.loops.push(lp.id);
        debug!("{} for `{}` at level {} ({})", lp.id, f.iterator, level, guard.ty);

        let body_exit = match f.body.as_deref() {
            Some(body) => self.translate_stmt(body, to_body, level + 1)?.take(&mut flag),
            None => to_body,
        };
        self.cfg.redirect_edge_succ_nodup(body_exit, after);

        if self.config.parallelize_all {
            self.cfg.recompute_dominators();
            if !carries_dependence(self.cfg, lp.id, level, &self.bb_pbb, self.oracle) {
                debug!("{} carries no dependence", lp.id);
                self.cfg.loops[lp.id.index()].can_be_parallel = true;
                self.parallel_loops.push(lp.id);
            }
        }
        Ok(Flagged::new(region.exit, flag))
    }

    fn translate_guard(&mut self, g: &GuardStmt, next_e: EdgeId, level: usize) -> LoopGenResult<Flagged<EdgeId>> {
        let mut flag = false;
        let cond = self.conjunction_guard(g)?.take(&mut flag);
        let region = self.cfg.create_if_region_on_edge(next_e, cond)?;
        if let Some(then) = g.then.as_deref() {
            self.translate_stmt(then, region.true_edge, level)?.take(&mut flag);
        }
        Ok(Flagged::new(region.exit, flag))
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{AffineExpr, AstNode, AstStmt, Assignment, Equation, UserStmt};
    use crate::codegen::tests::Fixture;
    use crate::codegen::TranslationConfig;
    use crate::ir::cfg::Inst;
    use crate::scop::PbbId;
    use crate::utils::errors::{CodegenErrorKind, LoopGenError};
    use crate::utils::intern::intern;

    fn user(subs: &[AffineExpr]) -> AstNode {
        AstNode::User(UserStmt {
            statement: PbbId(0),
            substitutions: subs.iter().map(|rhs| Assignment { lhs: None, rhs: rhs.clone() }).collect(),
        })
    }

    /// Version the region of `fx` and return the edge to generate on.
    fn versioned(fx: &mut Fixture) -> crate::ir::cfg::EdgeId {
        let v = fx.cfg.version_region(fx.scop.entry, fx.scop.exit).unwrap();
        fx.scop.entry = v.false_edge;
        fx.cfg.recompute_dominators();
        v.true_edge
    }

    fn codegen_kind(err: LoopGenError) -> CodegenErrorKind {
        match err {
            LoopGenError::Codegen(e) => e.kind,
            other => panic!("expected a codegen error, got {}", other),
        }
    }

    #[test]
    fn test_translate_loop_nest() {
        let mut fx = Fixture::vector(&[("N", "i32")], "N-1");
        let e = versioned(&mut fx);
        let ast = fx.ast.clone();
        let black_box = fx.scop.pbbs[0].black_box;
        let mut ctx = fx.context();
        let out = ctx.translate_stmt(&ast, e, 0).unwrap();
        assert!(!out.flagged);
        assert_eq!(ctx.statements, 1);
        assert_eq!(ctx.loops.len(), 1);
        assert_eq!(ctx.newivs.len(), 1);
        assert_eq!(ctx.iv_index.level_of(intern("i")), Some(0));

        let (copy, pbb) = ctx.bb_pbb.iter().next().unwrap();
        assert_eq!(pbb, PbbId(0));
        assert_eq!(ctx.cfg.block(copy).origin, Some(black_box));
        let lp = ctx.loops[0];
        assert_eq!(ctx.cfg.block(copy).loop_father, lp);
        assert!(!ctx.cfg.get_loop(lp).can_be_parallel);
        assert!(ctx.cfg.verify().is_ok());
    }

    #[test]
    fn test_copy_reads_new_iterator() {
        let mut fx = Fixture::vector(&[("N", "i32")], "N-1");
        let e = versioned(&mut fx);
        let ast = fx.ast.clone();
        let mut ctx = fx.context();
        ctx.translate_stmt(&ast, e, 0).unwrap();
        let (copy, _) = ctx.bb_pbb.iter().next().unwrap();
        let iv = ctx.cfg.get_loop(ctx.loops[0]).iv.unwrap();
        let store_uses: Vec<_> = ctx
            .cfg
            .block(copy)
            .insts
            .iter()
            .filter(|i| matches!(i, Inst::Store { .. }))
            .flat_map(Inst::uses)
            .collect();
        assert!(store_uses.contains(&iv));
    }

    #[test]
    fn test_parallel_marking() {
        let mut fx = Fixture::vector(&[("N", "i32")], "N-1");
        fx.config = TranslationConfig { parallelize_all: true, ..fx.config.clone() };
        let e = versioned(&mut fx);
        let ast = fx.ast.clone();
        let mut ctx = fx.context();
        ctx.translate_stmt(&ast, e, 0).unwrap();
        assert_eq!(ctx.parallel_loops, ctx.loops);
        assert!(ctx.cfg.get_loop(ctx.loops[0]).can_be_parallel);
    }

    #[test]
    fn test_guard_and_block() {
        let mut fx = Fixture::vector(&[("N", "i32")], "N-1");
        let e = versioned(&mut fx);
        let ast = AstStmt::from_nodes(vec![AstNode::Block {
            body: vec![AstNode::Guard {
                eqs: vec![Equation::ge(AffineExpr::var("N"), AffineExpr::constant(1))],
                then: vec![user(&[AffineExpr::constant(0)])],
            }],
        }]);
        let mut ctx = fx.context();
        let out = ctx.translate_stmt(&ast, e, 0).unwrap();
        assert!(!out.flagged);
        assert_eq!(ctx.statements, 1);
        assert!(ctx.loops.is_empty());
        let (copy, _) = ctx.bb_pbb.iter().next().unwrap();
        let pred = ctx.cfg.single_pred_edge(copy).unwrap();
        let cond_bb = ctx.cfg.edge(pred).src;
        assert_eq!(ctx.cfg.block(cond_bb).cond.as_ref().unwrap().to_string(), "_0 >= 1");
    }

    #[test]
    fn test_too_many_substitutions() {
        let mut fx = Fixture::vector(&[("N", "i32")], "N-1");
        let e = versioned(&mut fx);
        let ast = AstStmt::from_nodes(vec![user(&[AffineExpr::constant(0), AffineExpr::constant(1)])]);
        let mut ctx = fx.context();
        let err = ctx.translate_stmt(&ast, e, 0).unwrap_err();
        assert_eq!(codegen_kind(err), CodegenErrorKind::MalformedSubstitution);
    }

    #[test]
    fn test_missing_substitution_is_fatal() {
        let mut fx = Fixture::vector(&[("N", "i32")], "N-1");
        let e = versioned(&mut fx);
        let ast = AstStmt::from_nodes(vec![user(&[])]);
        let mut ctx = fx.context();
        let err = ctx.translate_stmt(&ast, e, 0).unwrap_err();
        assert_eq!(codegen_kind(err), CodegenErrorKind::MalformedSubstitution);
    }

    #[test]
    fn test_unknown_statement() {
        let mut fx = Fixture::vector(&[("N", "i32")], "N-1");
        let e = versioned(&mut fx);
        let ast = AstStmt::from_nodes(vec![AstNode::User(UserStmt {
            statement: PbbId(7),
            substitutions: Vec::new(),
        })]);
        let mut ctx = fx.context();
        let err = ctx.translate_stmt(&ast, e, 0).unwrap_err();
        assert_eq!(codegen_kind(err), CodegenErrorKind::UnknownStatement);
    }

    #[test]
    fn test_entry_placeholder_is_skipped() {
        let mut fx = Fixture::vector(&[("N", "i32")], "N-1");
        let e = versioned(&mut fx);
        fx.scop.pbbs[0].black_box = fx.cfg.entry;
        let ast = AstStmt::from_nodes(vec![user(&[AffineExpr::constant(0)])]);
        let mut ctx = fx.context();
        let out = ctx.translate_stmt(&ast, e, 0).unwrap();
        assert_eq!(out.value, e);
        assert_eq!(ctx.statements, 0);
        assert!(ctx.bb_pbb.is_empty());
    }

    #[test]
    fn test_non_positive_stride() {
        let mut fx = Fixture::vector(&[("N", "i32")], "N-1");
        let e = versioned(&mut fx);
        let ast = AstStmt::from_nodes(vec![AstNode::For {
            iterator: intern("c1"),
            lb: AffineExpr::constant(0),
            ub: AffineExpr::constant(3),
            stride: 0,
            body: vec![user(&[AffineExpr::var("c1")])],
        }]);
        let mut ctx = fx.context();
        let err = ctx.translate_stmt(&ast, e, 0).unwrap_err();
        assert_eq!(codegen_kind(err), CodegenErrorKind::InvalidStride);
    }
}
