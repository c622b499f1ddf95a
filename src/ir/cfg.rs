//! Control-flow graph with a loop tree and SSA variables.
//!
//! Blocks, edges, loops and variables live in arenas indexed by small
//! newtype ids. Nothing is ever freed: removing a block or an edge marks
//! it dead and unlinks it, so ids stay valid for the lifetime of the graph.
//!
//! The primitives here mirror what a loop optimizer needs when it grows
//! code inside an existing function: splitting edges, wrapping an edge in
//! an if-region, creating an empty counted loop on an edge, and copying a
//! statement block to a new place with its scalars rewritten.

use crate::ir::dominance::{DominatorTree, VerifyError};
use crate::ir::types::Type;
use crate::ir::value::{BinaryOp, CmpOp, Value};
use crate::utils::errors::{CodegenError, CodegenErrorKind, LoopGenResult};
use crate::utils::intern::Symbol;
use log::trace;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(pub u32);

/// An SSA variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

impl BlockId {
    pub fn index(self) -> usize { self.0 as usize }
}

impl EdgeId {
    pub fn index(self) -> usize { self.0 as usize }
}

impl LoopId {
    pub fn index(self) -> usize { self.0 as usize }
}

impl VarId {
    pub fn index(self) -> usize { self.0 as usize }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loop{}", self.0)
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_{}", self.0)
    }
}

/// An instruction. Phis come first in their block.
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    /// `dest = phi(value on edge, ...)`, one argument per predecessor
    Phi { dest: VarId, args: Vec<(EdgeId, Value)> },
    Assign { dest: VarId, value: Value },
    Store { array: Symbol, index: Value, value: Value },
}

impl Inst {
    pub fn def(&self) -> Option<VarId> {
        match self {
            Inst::Phi { dest, .. } | Inst::Assign { dest, .. } => Some(*dest),
            Inst::Store { .. } => None,
        }
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Inst::Phi { .. })
    }

    /// Variables read by a non-phi instruction. Phi arguments are uses on
    /// their incoming edge and are reported by [`Cfg::phi_uses`].
    pub fn uses(&self) -> Vec<VarId> {
        match self {
            Inst::Phi { .. } => Vec::new(),
            Inst::Assign { value, .. } => value.uses(),
            Inst::Store { index, value, .. } => {
                let mut uses = index.uses();
                uses.extend(value.uses());
                uses
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeFlag {
    Fallthru,
    True,
    False,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub src: BlockId,
    pub dest: BlockId,
    pub flag: EdgeFlag,
    pub removed: bool,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub insts: Vec<Inst>,
    /// Branch condition; a block with a condition has one true and one
    /// false successor edge
    pub cond: Option<Value>,
    pub preds: Vec<EdgeId>,
    pub succs: Vec<EdgeId>,
    pub loop_father: LoopId,
    /// Block this one was copied from
    pub origin: Option<BlockId>,
    pub removed: bool,
}

#[derive(Debug, Clone)]
pub struct Loop {
    pub header: BlockId,
    /// Source of the single back edge; `None` for the function body
    pub latch: Option<BlockId>,
    pub parent: Option<LoopId>,
    pub children: Vec<LoopId>,
    pub depth: usize,
    /// Induction variable defined by a phi in the header
    pub iv: Option<VarId>,
    /// Iterations may run in any order
    pub can_be_parallel: bool,
    pub removed: bool,
}

#[derive(Debug, Clone)]
pub struct VarInfo {
    pub name: Option<Symbol>,
    pub ty: Type,
    /// Defining block; `None` for function arguments
    pub def: Option<BlockId>,
}

/// Result of [`Cfg::create_if_region_on_edge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfRegion {
    pub cond_bb: BlockId,
    pub true_edge: EdgeId,
    pub false_edge: EdgeId,
    pub join_bb: BlockId,
    /// Edge leaving the join block
    pub exit: EdgeId,
}

/// Result of [`Cfg::create_empty_loop_on_edge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewLoop {
    pub id: LoopId,
    /// Value of the induction variable in the current iteration
    pub iv: VarId,
    /// Value for the next iteration
    pub iv_next: VarId,
    pub header: BlockId,
    /// Holds the increment and the exit test
    pub test: BlockId,
    pub latch: BlockId,
}

/// Result of [`Cfg::version_region`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionedRegion {
    pub cond_bb: BlockId,
    /// Where new code for the region goes
    pub true_edge: EdgeId,
    /// Leads into the original region
    pub false_edge: EdgeId,
    pub join_bb: BlockId,
    /// Edge into `join_bb` after the new code
    pub true_exit: EdgeId,
    /// Edge into `join_bb` after the original region
    pub false_exit: EdgeId,
}

/// Result of [`Cfg::copy_bb_and_scalar_dependences`].
#[derive(Debug, Clone)]
pub struct BlockCopy {
    pub block: BlockId,
    /// Edge leaving the copy
    pub exit: EdgeId,
    /// Original variable to the variable holding its value in the copy
    pub renamed: HashMap<VarId, VarId>,
}

/// A function body.
#[derive(Debug, Clone)]
pub struct Cfg {
    pub blocks: Vec<Block>,
    pub edges: Vec<Edge>,
    pub loops: Vec<Loop>,
    pub vars: Vec<VarInfo>,
    pub entry: BlockId,
    pub exit: BlockId,
    /// Width of addresses and of `sizetype`
    pub word_bits: u32,
    pub(crate) dom: DominatorTree,
}

impl Cfg {
    /// The loop standing for the whole function.
    pub const ROOT_LOOP: LoopId = LoopId(0);

    pub fn new(word_bits: u32) -> Self {
        let mut cfg = Self {
            blocks: Vec::new(),
            edges: Vec::new(),
            loops: vec![Loop {
                header: BlockId(0),
                latch: None,
                parent: None,
                children: Vec::new(),
                depth: 0,
                iv: None,
                can_be_parallel: false,
                removed: false,
            }],
            vars: Vec::new(),
            entry: BlockId(0),
            exit: BlockId(0),
            word_bits,
            dom: DominatorTree::default(),
        };
        cfg.entry = cfg.new_block(Self::ROOT_LOOP);
        cfg.exit = cfg.new_block(Self::ROOT_LOOP);
        cfg
    }

    /// Unsigned integer type of address width.
    pub fn sizetype(&self) -> Type {
        Type::int(self.word_bits, true)
    }

    pub fn block(&self, b: BlockId) -> &Block {
        &self.blocks[b.index()]
    }

    pub fn block_mut(&mut self, b: BlockId) -> &mut Block {
        &mut self.blocks[b.index()]
    }

    pub fn edge(&self, e: EdgeId) -> &Edge {
        &self.edges[e.index()]
    }

    pub fn get_loop(&self, l: LoopId) -> &Loop {
        &self.loops[l.index()]
    }

    pub fn var(&self, v: VarId) -> &VarInfo {
        &self.vars[v.index()]
    }

    pub fn var_value(&self, v: VarId) -> Value {
        Value::var(self.var(v).ty, v)
    }

    pub fn new_block(&mut self, loop_father: LoopId) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            insts: Vec::new(),
            cond: None,
            preds: Vec::new(),
            succs: Vec::new(),
            loop_father,
            origin: None,
            removed: false,
        });
        id
    }

    pub fn add_edge(&mut self, src: BlockId, dest: BlockId, flag: EdgeFlag) -> EdgeId {
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(Edge { src, dest, flag, removed: false });
        self.blocks[src.index()].succs.push(id);
        self.blocks[dest.index()].preds.push(id);
        id
    }

    pub fn new_var(&mut self, name: Option<Symbol>, ty: Type) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(VarInfo { name, ty, def: None });
        id
    }

    pub fn new_loop(&mut self, header: BlockId, parent: LoopId) -> LoopId {
        let id = LoopId(self.loops.len() as u32);
        let depth = self.get_loop(parent).depth + 1;
        self.loops.push(Loop {
            header,
            latch: None,
            parent: Some(parent),
            children: Vec::new(),
            depth,
            iv: None,
            can_be_parallel: false,
            removed: false,
        });
        self.loops[parent.index()].children.push(id);
        id
    }

    /// Append an instruction, keeping phis in front.
    pub fn push_inst(&mut self, b: BlockId, inst: Inst) {
        if let Some(dest) = inst.def() {
            self.vars[dest.index()].def = Some(b);
        }
        let insts = &mut self.blocks[b.index()].insts;
        if inst.is_phi() {
            let at = insts.iter().take_while(|i| i.is_phi()).count();
            insts.insert(at, inst);
        } else {
            insts.push(inst);
        }
    }

    /// `name = value` at the end of `b`.
    pub fn assign(&mut self, b: BlockId, name: Option<Symbol>, value: Value) -> VarId {
        let dest = self.new_var(name, value.ty);
        self.push_inst(b, Inst::Assign { dest, value });
        dest
    }

    pub fn set_condition(&mut self, b: BlockId, cond: Value) {
        self.blocks[b.index()].cond = Some(cond);
    }

    pub fn live_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.removed)
            .map(|(i, _)| BlockId(i as u32))
    }

    pub fn live_loops(&self) -> impl Iterator<Item = LoopId> + '_ {
        self.loops
            .iter()
            .enumerate()
            .filter(|(_, l)| !l.removed)
            .map(|(i, _)| LoopId(i as u32))
    }

    pub fn succ_blocks(&self, b: BlockId) -> Vec<BlockId> {
        self.block(b).succs.iter().map(|&e| self.edge(e).dest).collect()
    }

    fn flagged_succ(&self, b: BlockId, flag: EdgeFlag) -> Option<EdgeId> {
        self.block(b).succs.iter().copied().find(|&e| self.edge(e).flag == flag)
    }

    pub fn true_edge(&self, b: BlockId) -> Option<EdgeId> {
        self.flagged_succ(b, EdgeFlag::True)
    }

    pub fn false_edge(&self, b: BlockId) -> Option<EdgeId> {
        self.flagged_succ(b, EdgeFlag::False)
    }

    pub fn single_succ_edge(&self, b: BlockId) -> Result<EdgeId, VerifyError> {
        match self.block(b).succs.as_slice() {
            [e] => Ok(*e),
            _ => Err(VerifyError::NotSingleSucc { block: b }),
        }
    }

    pub fn single_pred_edge(&self, b: BlockId) -> Result<EdgeId, VerifyError> {
        match self.block(b).preds.as_slice() {
            [e] => Ok(*e),
            _ => Err(VerifyError::NotSinglePred { block: b }),
        }
    }

    /// Whether `inner` is `outer` or nested inside it.
    pub fn loop_nested_in(&self, inner: LoopId, outer: LoopId) -> bool {
        let target = self.get_loop(outer).depth;
        let mut l = inner;
        while self.get_loop(l).depth > target {
            l = self.get_loop(l).parent.unwrap_or(Self::ROOT_LOOP);
        }
        l == outer
    }

    pub fn find_common_loop(&self, a: LoopId, b: LoopId) -> LoopId {
        let parent = |l: LoopId| self.get_loop(l).parent.unwrap_or(Self::ROOT_LOOP);
        let (mut a, mut b) = (a, b);
        while self.get_loop(a).depth > self.get_loop(b).depth {
            a = parent(a);
        }
        while self.get_loop(b).depth > self.get_loop(a).depth {
            b = parent(b);
        }
        while a != b {
            a = parent(a);
            b = parent(b);
        }
        a
    }

    /// Live blocks of `l`, nested loops included.
    pub fn loop_blocks(&self, l: LoopId) -> Vec<BlockId> {
        self.live_blocks()
            .filter(|&b| self.loop_nested_in(self.block(b).loop_father, l))
            .collect()
    }

    /// The only edge leaving `l`.
    pub fn single_exit(&self, l: LoopId) -> Result<EdgeId, VerifyError> {
        let inside: HashSet<BlockId> = self.loop_blocks(l).into_iter().collect();
        let mut exits = inside
            .iter()
            .flat_map(|&b| self.block(b).succs.iter().copied())
            .filter(|&e| !inside.contains(&self.edge(e).dest));
        match (exits.next(), exits.next()) {
            (Some(e), None) => Ok(e),
            _ => Err(VerifyError::NotSingleExit { lp: l }),
        }
    }

    /// Loop whose induction variable is `v`.
    pub fn iv_loop(&self, v: VarId) -> Option<LoopId> {
        self.live_loops().find(|&l| self.get_loop(l).iv == Some(v))
    }

    fn def_inst(&self, v: VarId) -> Option<&Inst> {
        let b = self.var(v).def?;
        self.block(b).insts.iter().find(|i| i.def() == Some(v))
    }

    /// Uses by phis of `b` on incoming edge `e`.
    pub fn phi_uses(&self, b: BlockId, e: EdgeId) -> Vec<VarId> {
        let mut uses = Vec::new();
        for inst in &self.block(b).insts {
            if let Inst::Phi { args, .. } = inst {
                for (pe, v) in args {
                    if *pe == e {
                        uses.extend(v.uses());
                    }
                }
            }
        }
        uses
    }

    fn rename_phi_edge(&mut self, b: BlockId, from: EdgeId, to: EdgeId) {
        for inst in &mut self.blocks[b.index()].insts {
            if let Inst::Phi { args, .. } = inst {
                for (pe, _) in args.iter_mut() {
                    if *pe == from {
                        *pe = to;
                    }
                }
            }
        }
    }

    fn drop_phi_edge(&mut self, b: BlockId, e: EdgeId) {
        for inst in &mut self.blocks[b.index()].insts {
            if let Inst::Phi { args, .. } = inst {
                args.retain(|(pe, _)| *pe != e);
            }
        }
    }

    /// Insert a new empty block on `e`. `e` keeps its source and flag and
    /// now ends at the new block; a fresh fallthru edge continues to the
    /// old destination and takes over its phi arguments.
    ///
    /// The block joins the innermost loop containing both ends, except on a
    /// back edge where it becomes the new latch.
    pub fn split_edge(&mut self, e: EdgeId) -> BlockId {
        let Edge { src, dest, .. } = *self.edge(e);
        let dest_loop = self.block(dest).loop_father;
        let is_latch_edge = {
            let l = self.get_loop(dest_loop);
            l.header == dest && l.latch == Some(src)
        };
        let lp = if is_latch_edge {
            dest_loop
        } else {
            self.find_common_loop(self.block(src).loop_father, dest_loop)
        };
        let bb = self.new_block(lp);
        if is_latch_edge {
            self.loops[lp.index()].latch = Some(bb);
        }

        let next = self.add_edge(bb, dest, EdgeFlag::Fallthru);
        let preds = &mut self.blocks[dest.index()].preds;
        preds.retain(|&p| p != next);
        if let Some(slot) = preds.iter_mut().find(|p| **p == e) {
            *slot = next;
        }
        self.rename_phi_edge(dest, e, next);

        self.edges[e.index()].dest = bb;
        self.blocks[bb.index()].preds.push(e);
        trace!("split {} ({} -> {}) at {}", e, src, dest, bb);
        bb
    }

    pub fn remove_edge(&mut self, e: EdgeId) {
        let Edge { src, dest, .. } = *self.edge(e);
        self.blocks[src.index()].succs.retain(|&s| s != e);
        self.blocks[dest.index()].preds.retain(|&p| p != e);
        self.drop_phi_edge(dest, e);
        self.edges[e.index()].removed = true;
    }

    /// Point `e` at `dest`. When its source already has an edge to
    /// `dest`, `e` is removed and that edge is returned instead.
    pub fn redirect_edge_succ_nodup(&mut self, e: EdgeId, dest: BlockId) -> EdgeId {
        let Edge { src, dest: old, .. } = *self.edge(e);
        if old == dest {
            return e;
        }
        let existing = self
            .block(src)
            .succs
            .iter()
            .copied()
            .find(|&s| s != e && self.edge(s).dest == dest);
        if let Some(existing) = existing {
            self.remove_edge(e);
            return existing;
        }
        self.blocks[old.index()].preds.retain(|&p| p != e);
        self.drop_phi_edge(old, e);
        self.edges[e.index()].dest = dest;
        self.blocks[dest.index()].preds.push(e);
        e
    }

    /// Turn `e` into `if (cond) {} ` with an empty then block:
    ///
    /// ```text
    /// src -> cond_bb -T-> true_bb -> join_bb -> dest
    ///              \-F-------------^
    /// ```
    pub fn create_if_region_on_edge(
        &mut self,
        e: EdgeId,
        cond: Value,
    ) -> Result<IfRegion, VerifyError> {
        let cond_bb = self.split_edge(e);
        let to_join = self.single_succ_edge(cond_bb)?;
        let join_bb = self.split_edge(to_join);
        let true_edge = self.single_succ_edge(cond_bb)?;
        self.split_edge(true_edge);
        let false_edge = self.add_edge(cond_bb, join_bb, EdgeFlag::False);
        self.edges[true_edge.index()].flag = EdgeFlag::True;
        self.set_condition(cond_bb, cond);
        let exit = self.single_succ_edge(join_bb)?;
        Ok(IfRegion { cond_bb, true_edge, false_edge, join_bb, exit })
    }

    /// Create a counted loop on `entry` running `iv` from `lb` by `stride`
    /// while `iv <= ub`, nested in `outer`:
    ///
    /// ```text
    /// src -> header -> test -T-> latch -> header
    ///                      \-F-> dest
    /// ```
    ///
    /// The header holds the phi of `iv`; the test computes `iv_next` and
    /// compares the current `iv` against `ub` so that the last iteration
    /// never steps past it. Body code goes on the header -> test edge. The
    /// caller guarantees `lb <= ub`.
    #[allow(clippy::too_many_arguments)]
    pub fn create_empty_loop_on_edge(
        &mut self,
        entry: EdgeId,
        lb: Value,
        stride: i64,
        ub: Value,
        name: Option<Symbol>,
        ty: Type,
        outer: LoopId,
    ) -> Result<NewLoop, VerifyError> {
        let header = self.split_edge(entry);
        let to_test = self.single_succ_edge(header)?;
        let test = self.split_edge(to_test);
        let to_latch = self.single_succ_edge(test)?;
        let latch = self.split_edge(to_latch);
        let out = self.single_succ_edge(latch)?;
        let dest = self.edge(out).dest;
        let back = self.redirect_edge_succ_nodup(out, header);
        self.add_edge(test, dest, EdgeFlag::False);
        self.edges[to_latch.index()].flag = EdgeFlag::True;

        let id = self.new_loop(header, outer);
        self.loops[id.index()].latch = Some(latch);
        for b in [header, test, latch] {
            self.blocks[b.index()].loop_father = id;
        }

        let iv = self.new_var(name, ty);
        let iv_next = self.new_var(name, ty);
        let cur = Value::var(ty, iv);
        // `iv <= ub` inside the loop, so `ub - iv` fits the unsigned type
        // of the same width even when the signed difference overflows.
        let diff_ty = if ty.is_pointer() { self.sizetype() } else { Type::int(ty.precision(), true) };
        let step = if ty.is_pointer() {
            Value::binary(BinaryOp::PointerPlus, ty, cur.clone(), Value::constant(diff_ty, stride as i128))
        } else {
            Value::binary(BinaryOp::Plus, ty, cur.clone(), Value::constant(ty, stride as i128))
        };
        self.push_inst(header, Inst::Phi {
            dest: iv,
            args: vec![(entry, lb), (back, Value::var(ty, iv_next))],
        });
        self.push_inst(test, Inst::Assign { dest: iv_next, value: step });

        let cond = if stride == 1 {
            Value::compare(CmpOp::Lt, cur, ub)
        } else {
            let remaining = Value::binary(
                BinaryOp::Minus,
                diff_ty,
                ub.convert(diff_ty),
                cur.convert(diff_ty),
            );
            Value::compare(CmpOp::Le, Value::constant(diff_ty, stride as i128), remaining)
        };
        self.set_condition(test, cond);
        self.loops[id.index()].iv = Some(iv);
        trace!("new {} header {} latch {} in {}", id, header, latch, outer);
        Ok(NewLoop { id, iv, iv_next, header, test, latch })
    }

    /// Put the region between `entry` and `exit` under a condition:
    ///
    /// ```text
    /// src -> cond_bb -T-> true_bb -> join_bb -> dest
    ///              \-F-> region ... -^
    /// ```
    ///
    /// The condition starts out as `true`.
    pub fn version_region(
        &mut self,
        entry: EdgeId,
        exit: EdgeId,
    ) -> Result<VersionedRegion, VerifyError> {
        let cond_bb = self.split_edge(entry);
        let false_edge = self.single_succ_edge(cond_bb)?;
        let join_bb = self.split_edge(exit);
        let true_bb = self.new_block(self.block(cond_bb).loop_father);
        let true_edge = self.add_edge(cond_bb, true_bb, EdgeFlag::True);
        let true_exit = self.add_edge(true_bb, join_bb, EdgeFlag::Fallthru);
        self.edges[false_edge.index()].flag = EdgeFlag::False;
        self.set_condition(cond_bb, Value::bool(true));
        Ok(VersionedRegion { cond_bb, true_edge, false_edge, join_bb, true_exit, false_exit: exit })
    }

    /// Merge each of `vars`, defined in the original `region`, with its
    /// value from the new code in a phi of the join block, and make every
    /// use after the region read the phi. The new-code argument starts out
    /// as zero; see [`Cfg::set_phi_arg`].
    pub fn insert_liveout_phis(
        &mut self,
        versioned: &VersionedRegion,
        region: &HashSet<BlockId>,
        vars: &[VarId],
    ) -> Vec<(VarId, VarId)> {
        let mut phis = Vec::with_capacity(vars.len());
        for &v in vars {
            let VarInfo { name, ty, .. } = *self.var(v);
            let phi = self.new_var(name, ty);
            self.replace_uses_outside(v, phi, region);
            self.push_inst(versioned.join_bb, Inst::Phi {
                dest: phi,
                args: vec![
                    (versioned.false_exit, Value::var(ty, v)),
                    (versioned.true_exit, Value::constant(ty, 0)),
                ],
            });
            phis.push((v, phi));
        }
        phis
    }

    /// Make every use of `v` outside `region` read `with` instead.
    fn replace_uses_outside(&mut self, v: VarId, with: VarId, region: &HashSet<BlockId>) {
        let replacement = self.var_value(with);
        let mut swap = |id: VarId, ty: Type| {
            if id == v { replacement.clone() } else { Value::var(ty, id) }
        };
        for (i, block) in self.blocks.iter_mut().enumerate() {
            if block.removed || region.contains(&BlockId(i as u32)) {
                continue;
            }
            for inst in &mut block.insts {
                match inst {
                    Inst::Phi { args, .. } => {
                        for (_, arg) in args.iter_mut() {
                            *arg = arg.substitute(&mut swap);
                        }
                    }
                    Inst::Assign { value, .. } => *value = value.substitute(&mut swap),
                    Inst::Store { index, value, .. } => {
                        *index = index.substitute(&mut swap);
                        *value = value.substitute(&mut swap);
                    }
                }
            }
            if let Some(cond) = &mut block.cond {
                *cond = cond.substitute(&mut swap);
            }
        }
    }

    /// Set the argument of the phi defining `dest` in `b` on edge `e`.
    pub fn set_phi_arg(&mut self, b: BlockId, dest: VarId, e: EdgeId, value: Value) {
        for inst in &mut self.blocks[b.index()].insts {
            if let Inst::Phi { dest: d, args } = inst {
                if *d != dest {
                    continue;
                }
                match args.iter_mut().find(|(pe, _)| *pe == e) {
                    Some(slot) => slot.1 = value,
                    None => args.push((e, value)),
                }
                return;
            }
        }
    }

    /// Whether `v` is the result of a phi.
    pub fn defined_by_phi(&self, v: VarId) -> bool {
        self.def_inst(v).map_or(false, Inst::is_phi)
    }

    /// Blocks reached from the destination of `entry` without passing
    /// the destination of `exit`.
    pub fn region_blocks(&self, entry: EdgeId, exit: EdgeId) -> HashSet<BlockId> {
        let stop = self.edge(exit).dest;
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([self.edge(entry).dest]);
        while let Some(b) = queue.pop_front() {
            if b == stop || !seen.insert(b) {
                continue;
            }
            queue.extend(self.succ_blocks(b));
        }
        seen
    }

    /// Variables defined in `region` and used outside of it.
    pub fn region_liveouts(&self, region: &HashSet<BlockId>) -> Vec<VarId> {
        let defined_inside = |v: &VarId| self.var(*v).def.map_or(false, |d| region.contains(&d));
        let mut out = Vec::new();
        for b in self.live_blocks().filter(|b| !region.contains(b)) {
            let block = self.block(b);
            let mut uses: Vec<VarId> = block.insts.iter().flat_map(Inst::uses).collect();
            if let Some(cond) = &block.cond {
                uses.extend(cond.uses());
            }
            for &e in &block.preds {
                uses.extend(self.phi_uses(b, e));
            }
            for v in uses.into_iter().filter(defined_inside) {
                if !out.contains(&v) {
                    out.push(v);
                }
            }
        }
        out
    }

    /// Copy the statements of `bb` into a new block on `next_e`.
    ///
    /// Every definition gets a fresh variable. Uses of an induction
    /// variable of a loop in `iv_map` read the mapped value instead;
    /// other scalars defined in `region` are recomputed in the copy.
    pub fn copy_bb_and_scalar_dependences(
        &mut self,
        bb: BlockId,
        region: &HashSet<BlockId>,
        next_e: EdgeId,
        iv_map: &HashMap<LoopId, Value>,
    ) -> LoopGenResult<BlockCopy> {
        let new_bb = self.split_edge(next_e);
        self.blocks[new_bb.index()].origin = Some(bb);

        let mut copier = BlockCopier {
            region,
            iv_map,
            rename: HashMap::new(),
            out: Vec::new(),
        };
        let insts = self.block(bb).insts.clone();
        for inst in &insts {
            match inst {
                Inst::Phi { .. } => continue,
                Inst::Assign { dest, value } => {
                    let value = copier.rewrite(self, value)?;
                    let copy = self.new_var(self.var(*dest).name, self.var(*dest).ty);
                    copier.out.push(Inst::Assign { dest: copy, value });
                    copier.rename.insert(*dest, copy);
                }
                Inst::Store { array, index, value } => {
                    let index = copier.rewrite(self, index)?;
                    let value = copier.rewrite(self, value)?;
                    copier.out.push(Inst::Store { array: *array, index, value });
                }
            }
        }
        for inst in copier.out {
            self.push_inst(new_bb, inst);
        }
        Ok(BlockCopy {
            block: new_bb,
            exit: self.single_succ_edge(new_bb)?,
            renamed: copier.rename,
        })
    }

    /// Replace a constant branch by a fallthru to the taken successor.
    pub fn fold_constant_branch(&mut self, b: BlockId) -> bool {
        let taken = match self.block(b).cond.as_ref().and_then(Value::as_constant) {
            Some(v) => v != 0,
            None => return false,
        };
        let (keep, drop) = if taken {
            (self.true_edge(b), self.false_edge(b))
        } else {
            (self.false_edge(b), self.true_edge(b))
        };
        if let Some(drop) = drop {
            self.remove_edge(drop);
        }
        if let Some(keep) = keep {
            self.edges[keep.index()].flag = EdgeFlag::Fallthru;
        }
        self.blocks[b.index()].cond = None;
        true
    }

    /// Remove blocks not reachable from the entry, with their edges and
    /// the loops they head. Returns the number of blocks removed.
    pub fn prune_unreachable(&mut self) -> usize {
        let mut reached = HashSet::new();
        let mut queue = VecDeque::from([self.entry]);
        while let Some(b) = queue.pop_front() {
            if reached.insert(b) {
                queue.extend(self.succ_blocks(b));
            }
        }
        let dead: Vec<BlockId> = self.live_blocks().filter(|b| !reached.contains(b)).collect();
        for &b in &dead {
            let edges: Vec<EdgeId> = self
                .block(b)
                .succs
                .iter()
                .chain(self.block(b).preds.iter())
                .copied()
                .collect();
            for e in edges {
                if !self.edge(e).removed {
                    self.remove_edge(e);
                }
            }
        }
        for &b in &dead {
            for v in self.block(b).insts.iter().filter_map(Inst::def).collect::<Vec<_>>() {
                self.vars[v.index()].def = None;
            }
            let block = &mut self.blocks[b.index()];
            block.insts.clear();
            block.cond = None;
            block.removed = true;
        }
        let dead_loops: Vec<LoopId> = self
            .live_loops()
            .filter(|&l| l != Self::ROOT_LOOP && self.block(self.get_loop(l).header).removed)
            .collect();
        for l in dead_loops {
            self.loops[l.index()].removed = true;
            if let Some(parent) = self.get_loop(l).parent {
                self.loops[parent.index()].children.retain(|&c| c != l);
            }
        }
        dead.len()
    }

    /// Fold every constant branch and drop what became unreachable.
    pub fn cleanup(&mut self) -> usize {
        let blocks: Vec<BlockId> = self.live_blocks().collect();
        for b in blocks {
            self.fold_constant_branch(b);
        }
        let removed = self.prune_unreachable();
        self.update_ssa();
        self.recompute_dominators();
        removed
    }

    /// Blocks of `l` in a preorder walk of the dominator tree.
    pub fn loop_body_in_dom_order(&self, l: LoopId) -> Vec<BlockId> {
        let inside: HashSet<BlockId> = self.loop_blocks(l).into_iter().collect();
        let mut order = Vec::new();
        let mut stack = vec![self.get_loop(l).header];
        while let Some(b) = stack.pop() {
            if !inside.contains(&b) {
                continue;
            }
            order.push(b);
            let mut children = self.dom.children(b);
            children.reverse();
            stack.extend(children);
        }
        order
    }

    /// Rebuild the table of definition sites from the instructions.
    pub fn update_ssa(&mut self) {
        for var in &mut self.vars {
            var.def = None;
        }
        for b in 0..self.blocks.len() {
            if self.blocks[b].removed {
                continue;
            }
            let defs: Vec<VarId> = self.blocks[b].insts.iter().filter_map(Inst::def).collect();
            for v in defs {
                self.vars[v.index()].def = Some(BlockId(b as u32));
            }
        }
    }
}

/// State of one [`Cfg::copy_bb_and_scalar_dependences`] call.
struct BlockCopier<'a> {
    region: &'a HashSet<BlockId>,
    iv_map: &'a HashMap<LoopId, Value>,
    rename: HashMap<VarId, VarId>,
    out: Vec<Inst>,
}

impl BlockCopier<'_> {
    fn rewrite(&mut self, cfg: &mut Cfg, value: &Value) -> LoopGenResult<Value> {
        let mut resolved = HashMap::new();
        for v in value.uses() {
            if !resolved.contains_key(&v) {
                let r = self.resolve(cfg, v)?;
                resolved.insert(v, r);
            }
        }
        Ok(value.substitute(&mut |id, ty| {
            resolved.get(&id).cloned().unwrap_or_else(|| Value::var(ty, id))
        }))
    }

    fn resolve(&mut self, cfg: &mut Cfg, v: VarId) -> LoopGenResult<Value> {
        if let Some(&copy) = self.rename.get(&v) {
            return Ok(cfg.var_value(copy));
        }
        let ty = cfg.var(v).ty;
        if let Some(l) = cfg.iv_loop(v) {
            if let Some(new_iv) = self.iv_map.get(&l) {
                return Ok(new_iv.clone().convert(ty));
            }
            if self.region.contains(&cfg.get_loop(l).header) {
                return Err(CodegenError::new(
                    CodegenErrorKind::MalformedSubstitution,
                    format!("no substitution for the iterator {} of {}", v, l),
                )
                .into());
            }
        }
        let def = match cfg.var(v).def {
            Some(d) if self.region.contains(&d) => d,
            _ => return Ok(Value::var(ty, v)),
        };
        match cfg.def_inst(v).cloned() {
            Some(Inst::Assign { value, .. }) => {
                let value = self.rewrite(cfg, &value)?;
                let copy = cfg.new_var(cfg.var(v).name, ty);
                self.out.push(Inst::Assign { dest: copy, value });
                self.rename.insert(v, copy);
                Ok(Value::var(ty, copy))
            }
            _ => Err(CodegenError::new(
                CodegenErrorKind::Cfg,
                format!("scalar {} defined by a phi in {} cannot be recomputed", v, def),
            )
            .into()),
        }
    }
}
