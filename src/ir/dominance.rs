//! Dominator trees and the structural verifier.
//!
//! Dominators are computed with the iterative algorithm of Cooper, Harvey
//! and Kennedy over a reverse postorder of the reachable blocks. The
//! verifier checks the invariants that code generation must preserve:
//! - Edges are linked from both ends and branches are well formed
//! - Stored dominator information matches the graph
//! - Loops have a dominating header and a single latch
//! - Every variable is defined once and its definition dominates each use
//! - Values defined in a loop only leave it through exit phis

use crate::ir::cfg::{BlockId, Cfg, EdgeFlag, EdgeId, LoopId, VarId};
use std::collections::HashMap;
use thiserror::Error;

/// A broken structural invariant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("edge {edge} is not linked from both of its endpoints")]
    DanglingEdge { edge: EdgeId },

    #[error("{block} refers to a removed edge or loop")]
    RemovedReference { block: BlockId },

    #[error("{block} must branch with exactly one true and one false edge")]
    BadBranch { block: BlockId },

    #[error("{block} does not have a single successor")]
    NotSingleSucc { block: BlockId },

    #[error("{block} does not have a single predecessor")]
    NotSinglePred { block: BlockId },

    #[error("{lp} does not have a single exit")]
    NotSingleExit { lp: LoopId },

    #[error("header of {lp} does not dominate {block}")]
    HeaderNotDominating { lp: LoopId, block: BlockId },

    #[error("{lp} does not have a single latch branching to its header")]
    BadLatch { lp: LoopId },

    #[error("dominator information is out of date at {block}")]
    StaleDominator { block: BlockId },

    #[error("{var} is defined more than once")]
    MultipleDefs { var: VarId },

    #[error("{var} is recorded at the wrong definition site")]
    StaleDef { var: VarId },

    #[error("use of {var} in {block} is not dominated by its definition")]
    UseNotDominated { var: VarId, block: BlockId },

    #[error("{var} is used in {block} outside its loop without an exit phi")]
    NotLoopClosed { var: VarId, block: BlockId },
}

/// Immediate dominators of the blocks reachable from the entry.
#[derive(Debug, Clone, Default)]
pub struct DominatorTree {
    idom: Vec<Option<BlockId>>,
    rpo_number: Vec<Option<usize>>,
}

impl DominatorTree {
    pub fn build(cfg: &Cfg) -> Self {
        let n = cfg.blocks.len();
        let rpo = reverse_postorder(cfg);
        let mut rpo_number = vec![None; n];
        for (i, b) in rpo.iter().enumerate() {
            rpo_number[b.index()] = Some(i);
        }

        let mut idom: Vec<Option<BlockId>> = vec![None; n];
        idom[cfg.entry.index()] = Some(cfg.entry);
        let intersect = |idom: &[Option<BlockId>], mut a: BlockId, mut b: BlockId| {
            let num = |x: BlockId| rpo_number[x.index()].unwrap_or(usize::MAX);
            while a != b {
                while num(a) > num(b) {
                    a = idom[a.index()].unwrap_or(cfg.entry);
                }
                while num(b) > num(a) {
                    b = idom[b.index()].unwrap_or(cfg.entry);
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;
            for &b in rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for &e in &cfg.block(b).preds {
                    let p = cfg.edge(e).src;
                    if idom[p.index()].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => intersect(&idom, p, cur),
                    });
                }
                if new_idom.is_some() && idom[b.index()] != new_idom {
                    idom[b.index()] = new_idom;
                    changed = true;
                }
            }
        }
        idom[cfg.entry.index()] = None;
        Self { idom, rpo_number }
    }

    pub fn is_reachable(&self, b: BlockId) -> bool {
        self.rpo_number.get(b.index()).copied().flatten().is_some()
    }

    /// Immediate dominator; `None` for the entry and unreachable blocks.
    pub fn idom(&self, b: BlockId) -> Option<BlockId> {
        self.idom.get(b.index()).copied().flatten()
    }

    /// Whether every path from the entry to `b` passes through `a`.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let mut cur = Some(b);
        while let Some(c) = cur {
            if c == a {
                return true;
            }
            cur = self.idom(c);
        }
        false
    }

    /// Blocks immediately dominated by `b`, in block order.
    pub fn children(&self, b: BlockId) -> Vec<BlockId> {
        self.idom
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == Some(b))
            .map(|(i, _)| BlockId(i as u32))
            .collect()
    }

    /// First block whose immediate dominator differs between the trees.
    fn first_difference(&self, other: &DominatorTree) -> Option<BlockId> {
        let n = self.idom.len().max(other.idom.len());
        (0..n)
            .map(|i| BlockId(i as u32))
            .find(|&b| self.idom(b) != other.idom(b) || self.is_reachable(b) != other.is_reachable(b))
    }
}

fn reverse_postorder(cfg: &Cfg) -> Vec<BlockId> {
    let mut visited = vec![false; cfg.blocks.len()];
    let mut post = Vec::new();
    let mut stack: Vec<(BlockId, usize)> = vec![(cfg.entry, 0)];
    visited[cfg.entry.index()] = true;
    while let Some((b, next)) = stack.pop() {
        let succs = &cfg.block(b).succs;
        if next < succs.len() {
            stack.push((b, next + 1));
            let s = cfg.edge(succs[next]).dest;
            if !visited[s.index()] {
                visited[s.index()] = true;
                stack.push((s, 0));
            }
        } else {
            post.push(b);
        }
    }
    post.reverse();
    post
}

impl Cfg {
    pub fn recompute_dominators(&mut self) {
        self.dom = DominatorTree::build(self);
    }

    pub fn dominators(&self) -> &DominatorTree {
        &self.dom
    }

    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        self.dom.dominates(a, b)
    }

    /// Check every structural invariant, stopping at the first violation.
    pub fn verify(&self) -> Result<(), VerifyError> {
        Verifier::new(self).verify()
    }
}

struct Verifier<'a> {
    cfg: &'a Cfg,
    fresh: DominatorTree,
    /// Definition site of every variable: block and instruction index
    defs: HashMap<VarId, (BlockId, usize)>,
}

impl<'a> Verifier<'a> {
    fn new(cfg: &'a Cfg) -> Self {
        Self { cfg, fresh: DominatorTree::build(cfg), defs: HashMap::new() }
    }

    fn verify(mut self) -> Result<(), VerifyError> {
        self.verify_edges()?;
        self.verify_branches()?;
        if let Some(block) = self.cfg.dom.first_difference(&self.fresh) {
            return Err(VerifyError::StaleDominator { block });
        }
        self.verify_loops()?;
        self.collect_defs()?;
        self.verify_uses()
    }

    fn verify_edges(&self) -> Result<(), VerifyError> {
        let cfg = self.cfg;
        for (i, edge) in cfg.edges.iter().enumerate() {
            let id = EdgeId(i as u32);
            if edge.removed {
                continue;
            }
            let src = cfg.block(edge.src);
            let dest = cfg.block(edge.dest);
            if src.removed || dest.removed || !src.succs.contains(&id) || !dest.preds.contains(&id) {
                return Err(VerifyError::DanglingEdge { edge: id });
            }
        }
        for b in cfg.live_blocks() {
            let block = cfg.block(b);
            let dead_edge = block.succs.iter().chain(&block.preds).any(|&e| cfg.edge(e).removed);
            if dead_edge || cfg.get_loop(block.loop_father).removed {
                return Err(VerifyError::RemovedReference { block: b });
            }
            for &e in &block.succs {
                if cfg.edge(e).src != b {
                    return Err(VerifyError::DanglingEdge { edge: e });
                }
            }
            for &e in &block.preds {
                if cfg.edge(e).dest != b {
                    return Err(VerifyError::DanglingEdge { edge: e });
                }
            }
        }
        Ok(())
    }

    fn verify_branches(&self) -> Result<(), VerifyError> {
        let cfg = self.cfg;
        for b in cfg.live_blocks() {
            let block = cfg.block(b);
            let flags: Vec<EdgeFlag> = block.succs.iter().map(|&e| cfg.edge(e).flag).collect();
            let ok = match (&block.cond, flags.as_slice()) {
                (Some(_), [EdgeFlag::True, EdgeFlag::False]) => true,
                (Some(_), [EdgeFlag::False, EdgeFlag::True]) => true,
                (None, []) => b == cfg.exit,
                (None, [EdgeFlag::Fallthru]) => true,
                _ => false,
            };
            if !ok {
                return Err(VerifyError::BadBranch { block: b });
            }
        }
        Ok(())
    }

    fn verify_loops(&self) -> Result<(), VerifyError> {
        let cfg = self.cfg;
        for l in cfg.live_loops().filter(|&l| l != Cfg::ROOT_LOOP) {
            let lp = cfg.get_loop(l);
            if cfg.block(lp.header).loop_father != l {
                return Err(VerifyError::HeaderNotDominating { lp: l, block: lp.header });
            }
            for b in cfg.loop_blocks(l) {
                if self.fresh.is_reachable(b) && !self.fresh.dominates(lp.header, b) {
                    return Err(VerifyError::HeaderNotDominating { lp: l, block: b });
                }
            }
            let latch = lp.latch.ok_or(VerifyError::BadLatch { lp: l })?;
            if !cfg.loop_nested_in(cfg.block(latch).loop_father, l) {
                return Err(VerifyError::BadLatch { lp: l });
            }
            let back_edges: Vec<BlockId> = cfg
                .block(lp.header)
                .preds
                .iter()
                .map(|&e| cfg.edge(e).src)
                .filter(|&p| cfg.loop_nested_in(cfg.block(p).loop_father, l))
                .collect();
            if back_edges != [latch] {
                return Err(VerifyError::BadLatch { lp: l });
            }
        }
        Ok(())
    }

    fn collect_defs(&mut self) -> Result<(), VerifyError> {
        let cfg = self.cfg;
        for b in cfg.live_blocks() {
            for (i, inst) in cfg.block(b).insts.iter().enumerate() {
                if let Some(v) = inst.def() {
                    if self.defs.insert(v, (b, i)).is_some() {
                        return Err(VerifyError::MultipleDefs { var: v });
                    }
                    if cfg.var(v).def != Some(b) {
                        return Err(VerifyError::StaleDef { var: v });
                    }
                }
            }
        }
        Ok(())
    }

    /// A use at instruction `at` of `block`; `at == None` is a use on the
    /// block's outgoing branch or on a phi edge leaving it.
    fn check_use(&self, var: VarId, block: BlockId, at: Option<usize>) -> Result<(), VerifyError> {
        let cfg = self.cfg;
        let (def_block, def_at) = match self.defs.get(&var) {
            Some(&site) => site,
            None if cfg.var(var).def.is_none() => return Ok(()),
            None => return Err(VerifyError::StaleDef { var }),
        };
        let dominated = if def_block == block {
            at.map_or(true, |i| def_at < i)
        } else {
            self.fresh.dominates(def_block, block)
        };
        if !dominated {
            return Err(VerifyError::UseNotDominated { var, block });
        }
        let def_loop = cfg.block(def_block).loop_father;
        if !cfg.loop_nested_in(cfg.block(block).loop_father, def_loop) {
            return Err(VerifyError::NotLoopClosed { var, block });
        }
        Ok(())
    }

    fn verify_uses(&self) -> Result<(), VerifyError> {
        let cfg = self.cfg;
        for b in cfg.live_blocks().filter(|&b| self.fresh.is_reachable(b)) {
            let block = cfg.block(b);
            for (i, inst) in block.insts.iter().enumerate() {
                for v in inst.uses() {
                    self.check_use(v, b, Some(i))?;
                }
            }
            for v in block.cond.iter().flat_map(|c| c.uses()) {
                self.check_use(v, b, None)?;
            }
            for &e in &block.preds {
                let src = cfg.edge(e).src;
                if !self.fresh.is_reachable(src) {
                    continue;
                }
                for v in cfg.phi_uses(b, e) {
                    self.check_phi_use(v, src)?;
                }
            }
        }
        Ok(())
    }

    /// Phi arguments are read at the end of the incoming block and may
    /// leave a loop.
    fn check_phi_use(&self, var: VarId, src: BlockId) -> Result<(), VerifyError> {
        match self.defs.get(&var) {
            Some(&(def_block, _)) if !self.fresh.dominates(def_block, src) => {
                Err(VerifyError::UseNotDominated { var, block: src })
            }
            None if self.cfg.var(var).def.is_some() => Err(VerifyError::StaleDef { var }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::Type;
    use crate::ir::value::{BinaryOp, CmpOp, Value};

    fn diamond() -> (Cfg, [BlockId; 4]) {
        let mut cfg = Cfg::new(64);
        let r = Cfg::ROOT_LOOP;
        let (a, b, c, d) = (cfg.new_block(r), cfg.new_block(r), cfg.new_block(r), cfg.new_block(r));
        cfg.add_edge(cfg.entry, a, EdgeFlag::Fallthru);
        cfg.add_edge(a, b, EdgeFlag::True);
        cfg.add_edge(a, c, EdgeFlag::False);
        cfg.add_edge(b, d, EdgeFlag::Fallthru);
        cfg.add_edge(c, d, EdgeFlag::Fallthru);
        cfg.add_edge(d, cfg.exit, EdgeFlag::Fallthru);
        cfg.set_condition(a, Value::bool(true));
        cfg.recompute_dominators();
        (cfg, [a, b, c, d])
    }

    #[test]
    fn test_diamond_dominators() {
        let (cfg, [a, b, c, d]) = diamond();
        let dom = cfg.dominators();
        assert_eq!(dom.idom(d), Some(a));
        assert_eq!(dom.idom(b), Some(a));
        assert!(cfg.dominates(a, d));
        assert!(!cfg.dominates(b, d));
        assert!(!cfg.dominates(c, b));
        assert_eq!(dom.children(a), vec![b, c, d]);
        assert!(cfg.verify().is_ok());
    }

    #[test]
    fn test_malformed_branch_detected() {
        let (mut cfg, [_, _, _, d]) = diamond();
        // entry now has two fallthru successors
        cfg.add_edge(cfg.entry, d, EdgeFlag::Fallthru);
        assert!(matches!(cfg.verify(), Err(VerifyError::BadBranch { .. })));
    }

    #[test]
    fn test_use_not_dominated() {
        let (mut cfg, [_, b, c, _]) = diamond();
        let i32t = Type::int(32, false);
        let x = cfg.assign(b, None, Value::constant(i32t, 1));
        cfg.assign(c, None, Value::binary(BinaryOp::Plus, i32t, cfg.var_value(x), Value::constant(i32t, 1)));
        assert_eq!(cfg.verify(), Err(VerifyError::UseNotDominated { var: x, block: c }));
    }

    #[test]
    fn test_generated_loop_verifies() {
        let mut cfg = Cfg::new(64);
        let e = cfg.add_edge(cfg.entry, cfg.exit, EdgeFlag::Fallthru);
        let i32t = Type::int(32, false);
        let guard = cfg
            .create_if_region_on_edge(
                e,
                Value::compare(CmpOp::Le, Value::constant(i32t, 0), Value::constant(i32t, 4)),
            )
            .unwrap();
        let lp = cfg
            .create_empty_loop_on_edge(
                guard.true_edge,
                Value::constant(i32t, 0),
                1,
                Value::constant(i32t, 4),
                None,
                i32t,
                Cfg::ROOT_LOOP,
            )
            .unwrap();
        cfg.recompute_dominators();
        assert_eq!(cfg.verify(), Ok(()));
        assert_eq!(cfg.loop_body_in_dom_order(lp.id), vec![lp.header, lp.test, lp.latch]);

        // Reading the iterator after the loop breaks loop-closed form.
        let after = cfg.edge(cfg.single_exit(lp.id).unwrap()).dest;
        cfg.assign(after, None, cfg.var_value(lp.iv));
        assert!(matches!(cfg.verify(), Err(VerifyError::NotLoopClosed { .. })));
    }

    #[test]
    fn test_missing_recompute_is_stale() {
        let (mut cfg, [_, b, _, _]) = diamond();
        let e = cfg.single_succ_edge(b).unwrap();
        cfg.split_edge(e);
        assert!(matches!(cfg.verify(), Err(VerifyError::StaleDominator { .. })));
        cfg.recompute_dominators();
        assert!(cfg.verify().is_ok());
    }
}
