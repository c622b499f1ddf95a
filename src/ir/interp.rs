//! Reference interpreter for CFGs.
//!
//! Runs a function body from its entry with concrete argument values and
//! a sparse memory, so that a regenerated region can be checked against
//! the code it replaces.

use crate::ir::cfg::{Cfg, EdgeFlag, EdgeId, Inst, VarId, BlockId};
use crate::ir::value::{Env, EvalError};
use crate::utils::intern::Symbol;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpError {
    #[error("evaluation failed in {block}: {source}")]
    Eval { block: BlockId, source: EvalError },

    #[error("{block} has no successor to take")]
    Stuck { block: BlockId },

    #[error("step limit of {limit} blocks exceeded")]
    StepLimit { limit: usize },
}

/// Sparse array memory; cells never written read as zero.
pub type Memory = HashMap<(Symbol, i128), i128>;

/// Outcome of a run.
#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub memory: Memory,
    /// Every store in execution order
    pub stores: Vec<(Symbol, i128, i128)>,
    pub blocks_executed: usize,
}

struct Frame<'a> {
    vars: HashMap<VarId, i128>,
    memory: &'a Memory,
}

impl Env for Frame<'_> {
    fn var(&self, id: VarId) -> Option<i128> {
        self.vars.get(&id).copied()
    }

    fn load(&self, array: Symbol, index: i128) -> i128 {
        self.memory.get(&(array, index)).copied().unwrap_or(0)
    }
}

pub struct Interpreter<'a> {
    cfg: &'a Cfg,
    /// Upper bound on executed blocks
    pub max_steps: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(cfg: &'a Cfg) -> Self {
        Self { cfg, max_steps: 10_000_000 }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Execute from the entry until the exit block is reached.
    pub fn run(&self, args: &HashMap<VarId, i128>, memory: Memory) -> Result<Execution, InterpError> {
        let cfg = self.cfg;
        let mut vars: HashMap<VarId, i128> = args
            .iter()
            .map(|(&v, &x)| (v, cfg.var(v).ty.wrap(x)))
            .collect();
        let mut exec = Execution { memory, ..Default::default() };
        let mut block = cfg.entry;
        let mut incoming: Option<EdgeId> = None;

        loop {
            exec.blocks_executed += 1;
            if exec.blocks_executed > self.max_steps {
                return Err(InterpError::StepLimit { limit: self.max_steps });
            }
            let eval_err = |source| InterpError::Eval { block, source };

            // Phis read their arguments before any of them is written.
            let frame = Frame { vars, memory: &exec.memory };
            let mut phi_values = Vec::new();
            for inst in &cfg.block(block).insts {
                if let Inst::Phi { dest, args } = inst {
                    let arg = args.iter().find(|(e, _)| Some(*e) == incoming);
                    if let Some((_, value)) = arg {
                        phi_values.push((*dest, value.eval(&frame).map_err(eval_err)?));
                    }
                }
            }
            vars = frame.vars;
            vars.extend(phi_values);

            for inst in &cfg.block(block).insts {
                match inst {
                    Inst::Phi { .. } => {}
                    Inst::Assign { dest, value } => {
                        let frame = Frame { vars, memory: &exec.memory };
                        let v = value.eval(&frame).map_err(eval_err)?;
                        vars = frame.vars;
                        vars.insert(*dest, v);
                    }
                    Inst::Store { array, index, value } => {
                        let frame = Frame { vars, memory: &exec.memory };
                        let i = index.eval(&frame).map_err(eval_err)?;
                        let v = value.eval(&frame).map_err(eval_err)?;
                        vars = frame.vars;
                        exec.memory.insert((*array, i), v);
                        exec.stores.push((*array, i, v));
                    }
                }
            }

            if block == cfg.exit {
                return Ok(exec);
            }
            let next = match &cfg.block(block).cond {
                Some(cond) => {
                    let frame = Frame { vars, memory: &exec.memory };
                    let taken = cond.eval(&frame).map_err(eval_err)? != 0;
                    vars = frame.vars;
                    if taken { cfg.true_edge(block) } else { cfg.false_edge(block) }
                }
                None => cfg
                    .block(block)
                    .succs
                    .iter()
                    .copied()
                    .find(|&e| cfg.edge(e).flag == EdgeFlag::Fallthru),
            };
            let e = next.ok_or(InterpError::Stuck { block })?;
            incoming = Some(e);
            block = cfg.edge(e).dest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::Type;
    use crate::ir::value::{BinaryOp, CmpOp, Value};
    use crate::utils::intern::intern;

    /// `for (i = 0; i <= n; i++) A[i] = i * 2;` guarded by `0 <= n`.
    fn counted_loop(stride: i64) -> (Cfg, VarId) {
        let i64t = Type::int(64, false);
        let mut cfg = Cfg::new(64);
        let n = cfg.new_var(Some(intern("n")), i64t);
        let e = cfg.add_edge(cfg.entry, cfg.exit, EdgeFlag::Fallthru);
        let guard = cfg
            .create_if_region_on_edge(e, Value::compare(CmpOp::Le, Value::constant(i64t, 0), cfg.var_value(n)))
            .unwrap();
        let lp = cfg
            .create_empty_loop_on_edge(
                guard.true_edge,
                Value::constant(i64t, 0),
                stride,
                cfg.var_value(n),
                Some(intern("i")),
                i64t,
                Cfg::ROOT_LOOP,
            )
            .unwrap();
        let body = cfg.split_edge(cfg.single_succ_edge(lp.header).unwrap());
        let iv = cfg.var_value(lp.iv);
        let twice = Value::binary(BinaryOp::Mult, i64t, iv.clone(), Value::constant(i64t, 2));
        cfg.push_inst(body, Inst::Store { array: intern("A"), index: iv, value: twice });
        cfg.recompute_dominators();
        (cfg, n)
    }

    #[test]
    fn test_counted_loop_runs_inclusive() {
        let (cfg, n) = counted_loop(1);
        let exec = Interpreter::new(&cfg).run(&HashMap::from([(n, 4)]), Memory::new()).unwrap();
        let a = intern("A");
        assert_eq!(exec.stores.len(), 5);
        assert_eq!(exec.memory.get(&(a, 4)), Some(&8));
    }

    #[test]
    fn test_zero_trip_guard() {
        let (cfg, n) = counted_loop(1);
        let exec = Interpreter::new(&cfg).run(&HashMap::from([(n, -1)]), Memory::new()).unwrap();
        assert!(exec.stores.is_empty());
    }

    #[test]
    fn test_strided_loop_stops_at_bound() {
        let (cfg, n) = counted_loop(3);
        let exec = Interpreter::new(&cfg).run(&HashMap::from([(n, 7)]), Memory::new()).unwrap();
        let indices: Vec<i128> = exec.stores.iter().map(|s| s.1).collect();
        assert_eq!(indices, vec![0, 3, 6]);
    }

    /// `for (i = m; i <= n; i += stride) A[i] = i` over i16 under a `m <= n` guard.
    fn i16_range_loop(stride: i64) -> (Cfg, VarId, VarId) {
        let i16t = Type::int(16, false);
        let mut cfg = Cfg::new(64);
        let m = cfg.new_var(Some(intern("m")), i16t);
        let n = cfg.new_var(Some(intern("n")), i16t);
        let e = cfg.add_edge(cfg.entry, cfg.exit, EdgeFlag::Fallthru);
        let guard = cfg
            .create_if_region_on_edge(e, Value::compare(CmpOp::Le, cfg.var_value(m), cfg.var_value(n)))
            .unwrap();
        let lp = cfg
            .create_empty_loop_on_edge(
                guard.true_edge,
                cfg.var_value(m),
                stride,
                cfg.var_value(n),
                Some(intern("i")),
                i16t,
                Cfg::ROOT_LOOP,
            )
            .unwrap();
        let body = cfg.split_edge(cfg.single_succ_edge(lp.header).unwrap());
        let iv = cfg.var_value(lp.iv);
        cfg.push_inst(body, Inst::Store { array: intern("A"), index: iv.clone(), value: iv });
        cfg.recompute_dominators();
        (cfg, m, n)
    }

    #[test]
    fn test_strided_loop_spans_signed_range() {
        for (stride, lo, hi) in [(2, 0, 10), (2, -30000, 30000), (3, -30000, 30000), (3, 32765, 32767), (2, 7, 7)] {
            let (cfg, m, n) = i16_range_loop(stride);
            let exec = Interpreter::new(&cfg)
                .run(&HashMap::from([(m, lo), (n, hi)]), Memory::new())
                .unwrap();
            let indices: Vec<i128> = exec.stores.iter().map(|s| s.1).collect();
            let expected: Vec<i128> = (lo..=hi).step_by(stride as usize).collect();
            assert_eq!(indices.len(), expected.len(), "stride {} over {}..={}", stride, lo, hi);
            assert_eq!(indices, expected);
        }
    }

    #[test]
    fn test_step_limit() {
        let (cfg, n) = counted_loop(1);
        let err = Interpreter::new(&cfg)
            .with_max_steps(10)
            .run(&HashMap::from([(n, 100)]), Memory::new())
            .unwrap_err();
        assert_eq!(err, InterpError::StepLimit { limit: 10 });
    }
}
