//! Dependence queries for generated loops.

use crate::ir::cfg::{BlockId, Cfg, LoopId};
use crate::scop::{PbbId, Scop};
use log::trace;
use std::collections::HashMap;

/// Answers whether a dependence between two statements is carried at a
/// scattering dimension.
pub trait DependenceOracle {
    /// Whether some dependence between instances of `a` and `b`, in either
    /// direction, is carried by scattering dimension `dim`.
    fn dependence_exists(&self, a: PbbId, b: PbbId, dim: usize) -> bool;
}

/// An oracle that knows of no dependence.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDependences;

impl DependenceOracle for NoDependences {
    fn dependence_exists(&self, _a: PbbId, _b: PbbId, _dim: usize) -> bool {
        false
    }
}

/// Statement each generated block is a copy of. The first mark of a
/// block wins.
#[derive(Debug, Clone, Default)]
pub struct BbPbbMap {
    map: HashMap<BlockId, PbbId>,
}

impl BbPbbMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, bb: BlockId, pbb: PbbId) {
        self.map.entry(bb).or_insert(pbb);
    }

    pub fn get(&self, bb: BlockId) -> Option<PbbId> {
        self.map.get(&bb).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Entries ordered by block.
    pub fn iter(&self) -> impl Iterator<Item = (BlockId, PbbId)> + '_ {
        let mut entries: Vec<(BlockId, PbbId)> = self.map.iter().map(|(&b, &p)| (b, p)).collect();
        entries.sort();
        entries.into_iter()
    }

    /// Forget blocks that were removed from `cfg`.
    pub fn retain_live(&mut self, cfg: &Cfg) {
        self.map.retain(|b, _| !cfg.block(*b).removed);
    }
}

/// Whether the loop `lp`, generated at `level`, carries a dependence
/// between the statements copied into it.
pub fn carries_dependence(
    cfg: &Cfg,
    lp: LoopId,
    level: usize,
    map: &BbPbbMap,
    oracle: &dyn DependenceOracle,
) -> bool {
    let dim = Scop::dynamic_dim(level);
    let stmts: Vec<PbbId> = cfg
        .loop_body_in_dom_order(lp)
        .into_iter()
        .filter_map(|b| map.get(b))
        .collect();
    for &a in &stmts {
        for &b in &stmts {
            if oracle.dependence_exists(a, b, dim) {
                trace!("{} carries a dependence between {} and {}", lp, a, b);
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::cfg::EdgeFlag;
    use crate::ir::types::Type;
    use crate::ir::value::Value;
    use std::cell::RefCell;

    struct Recording {
        calls: RefCell<Vec<(PbbId, PbbId, usize)>>,
        answer: Option<(PbbId, PbbId)>,
    }

    impl Recording {
        fn new(answer: Option<(PbbId, PbbId)>) -> Self {
            Self { calls: RefCell::new(Vec::new()), answer }
        }
    }

    impl DependenceOracle for Recording {
        fn dependence_exists(&self, a: PbbId, b: PbbId, dim: usize) -> bool {
            self.calls.borrow_mut().push((a, b, dim));
            self.answer == Some((a, b))
        }
    }

    /// A loop whose body holds `n` blocks, one after the other.
    fn loop_with_body(n: usize) -> (Cfg, LoopId, Vec<BlockId>) {
        let mut cfg = Cfg::new(64);
        let e = cfg.add_edge(cfg.entry, cfg.exit, EdgeFlag::Fallthru);
        let ty = Type::int(32, false);
        let lp = cfg
            .create_empty_loop_on_edge(e, Value::constant(ty, 0), 1, Value::constant(ty, 9), None, ty, Cfg::ROOT_LOOP)
            .unwrap();
        let mut next = cfg.single_succ_edge(lp.header).unwrap();
        let mut blocks = Vec::new();
        for _ in 0..n {
            let bb = cfg.split_edge(next);
            next = cfg.single_succ_edge(bb).unwrap();
            blocks.push(bb);
        }
        cfg.recompute_dominators();
        (cfg, lp.id, blocks)
    }

    #[test]
    fn test_first_mark_wins() {
        let mut map = BbPbbMap::new();
        map.mark(BlockId(4), PbbId(0));
        map.mark(BlockId(4), PbbId(1));
        map.mark(BlockId(2), PbbId(1));
        assert_eq!(map.get(BlockId(4)), Some(PbbId(0)));
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(BlockId(2), PbbId(1)), (BlockId(4), PbbId(0))]);
    }

    #[test]
    fn test_pairs_in_dominance_order_short_circuit() {
        let (cfg, lp, blocks) = loop_with_body(2);
        let mut map = BbPbbMap::new();
        map.mark(blocks[0], PbbId(0));
        map.mark(blocks[1], PbbId(1));

        let oracle = Recording::new(Some((PbbId(1), PbbId(0))));
        assert!(carries_dependence(&cfg, lp, 2, &map, &oracle));
        assert_eq!(
            *oracle.calls.borrow(),
            vec![(PbbId(0), PbbId(0), 5), (PbbId(0), PbbId(1), 5), (PbbId(1), PbbId(0), 5)]
        );

        let none = Recording::new(None);
        assert!(!carries_dependence(&cfg, lp, 0, &map, &none));
        assert_eq!(none.calls.borrow().len(), 4);
    }

    #[test]
    fn test_unmarked_blocks_are_skipped() {
        let (cfg, lp, blocks) = loop_with_body(3);
        let mut map = BbPbbMap::new();
        map.mark(blocks[1], PbbId(0));
        let oracle = Recording::new(None);
        assert!(!carries_dependence(&cfg, lp, 0, &map, &oracle));
        assert_eq!(*oracle.calls.borrow(), vec![(PbbId(0), PbbId(0), 1)]);
        assert!(!carries_dependence(&cfg, lp, 0, &map, &NoDependences));
    }
}
