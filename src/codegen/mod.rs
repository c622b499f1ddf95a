//! Regeneration of a SCoP's control flow from a loop-nest AST.
//!
//! [`generate`] versions the region, translates the AST onto the true
//! branch of the version condition and, when some translation step could
//! not be expressed faithfully, falls back to the original code.
//!
//! - `registry`: names of the AST and where their values live
//! - `types`: the machine type of every generated expression
//! - `expr`: affine expressions to CFG values
//! - `bounds`: loop bounds, zero-trip guards and conditions
//! - `translate`: the walk over the AST
//! - `parallel`: dependence queries for generated loops

pub mod registry;
pub mod types;
pub mod expr;
pub mod bounds;
pub mod translate;
pub mod parallel;

pub use registry::{NameBinding, NameIndex};
pub use types::TypeEngine;
pub use bounds::LoopGuard;
pub use parallel::{carries_dependence, BbPbbMap, DependenceOracle, NoDependences};

use crate::ast::AstStmt;
use crate::ir::cfg::{BlockId, Cfg, LoopId, VarId, VersionedRegion};
use crate::ir::value::Value;
use crate::polyhedral::{FourierMotzkin, LinearSolver};
use crate::scop::{PbbId, PolyBb, Scop};
use crate::utils::errors::{
    CodegenError, CodegenErrorKind, InputError, InputErrorKind, LoopGenResult,
};
use crate::utils::intern::Symbol;
use crate::utils::pretty::format_list;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A translation result and whether it had to be approximated.
///
/// The flag only ever goes from `false` to `true`: combining results ORs
/// their flags.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flagged<T> {
    pub value: T,
    pub flagged: bool,
}

impl<T> Flagged<T> {
    pub fn ok(value: T) -> Self {
        Self { value, flagged: false }
    }

    pub fn flagged(value: T) -> Self {
        Self { value, flagged: true }
    }

    pub fn new(value: T, flagged: bool) -> Self {
        Self { value, flagged }
    }

    /// The value, ORing the flag into `flag`.
    pub fn take(self, flag: &mut bool) -> T {
        *flag |= self.flagged;
        self.value
    }

    pub fn or_flag(mut self, flag: bool) -> Self {
        self.flagged |= flag;
        self
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Flagged<U> {
        Flagged { value: f(self.value), flagged: self.flagged }
    }
}

/// Configuration of a [`generate`] call.
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    /// Mark loops that carry no dependence as parallel
    pub parallelize_all: bool,
    /// Verify the CFG after every translated statement
    pub verify: bool,
    /// Width of the machine word; wider types are never emitted
    pub word_bits: u32,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            parallelize_all: false,
            verify: cfg!(debug_assertions),
            word_bits: 64,
        }
    }
}

impl TranslationConfig {
    pub fn validate(&self) -> Result<(), InputError> {
        if !(8..=64).contains(&self.word_bits) {
            return Err(InputError::new(
                InputErrorKind::InvalidType,
                format!("word size must be between 8 and 64 bits, got {}", self.word_bits),
            ));
        }
        Ok(())
    }
}

/// State of one [`generate`] call.
pub struct TranslationContext<'a> {
    pub cfg: &'a mut Cfg,
    pub scop: &'a Scop,
    pub config: TranslationConfig,
    pub types: TypeEngine,
    /// Values of the SCoP parameters, in declaration order
    pub params: Vec<Value>,
    pub param_index: NameIndex,
    /// Induction variables of the generated loops, in creation order
    pub newivs: Vec<Value>,
    pub iv_index: NameIndex,
    /// Blocks of the original region
    pub region: HashSet<BlockId>,
    pub bb_pbb: BbPbbMap,
    pub parallel_loops: Vec<LoopId>,
    pub loops: Vec<LoopId>,
    /// User statements translated so far
    pub statements: usize,
    /// Latest copy of each scalar of the region
    pub renamed: HashMap<VarId, VarId>,
    oracle: &'a dyn DependenceOracle,
    solver: &'a dyn LinearSolver,
}

impl<'a> TranslationContext<'a> {
    /// A context over `scop` with every parameter bound to its value.
    pub fn new(
        cfg: &'a mut Cfg,
        scop: &'a Scop,
        config: TranslationConfig,
        oracle: &'a dyn DependenceOracle,
        solver: &'a dyn LinearSolver,
    ) -> Self {
        let types = TypeEngine::new(config.word_bits);
        let region = scop.region_blocks(cfg);
        let mut param_index = NameIndex::new();
        let mut params = Vec::with_capacity(scop.params.len());
        for (i, p) in scop.params.iter().enumerate() {
            param_index.bind(p.name, i, i);
            params.push(cfg.var_value(p.var));
        }
        Self {
            cfg,
            scop,
            config,
            types,
            params,
            param_index,
            newivs: Vec::new(),
            iv_index: NameIndex::new(),
            region,
            bb_pbb: BbPbbMap::new(),
            parallel_loops: Vec::new(),
            loops: Vec::new(),
            statements: 0,
            renamed: HashMap::new(),
            oracle,
            solver,
        }
    }

    /// Value of `name`: a parameter, else a generated iterator.
    pub fn lookup(&self, name: Symbol) -> LoopGenResult<Value> {
        if let Some(i) = self.param_index.index_of(name) {
            return Ok(self.params[i].clone());
        }
        if let Some(i) = self.iv_index.index_of(name) {
            return Ok(self.newivs[i].clone());
        }
        Err(CodegenError::new(
            CodegenErrorKind::UnknownName,
            format!("`{}` is neither a parameter nor an iterator", name),
        )
        .into())
    }

    /// Give each live-out phi its value from the new code: the latest
    /// copy of the scalar, which has to reach the end of the new code.
    fn close_liveouts(&mut self, versioned: &VersionedRegion, phis: &[(VarId, VarId)]) -> LoopGenResult<()> {
        self.cfg.recompute_dominators();
        let end = self.cfg.edge(versioned.true_exit).src;
        for &(var, phi) in phis {
            let copy = self.renamed.get(&var).copied().filter(|&c| {
                self.cfg.var(c).def.map_or(false, |d| self.cfg.dominates(d, end))
            });
            let copy = copy.ok_or_else(|| {
                CodegenError::new(
                    CodegenErrorKind::UnsupportedLiveout,
                    format!("{} is used after the region but no copy of it reaches {}", var, end),
                )
            })?;
            let value = self.cfg.var_value(copy);
            self.cfg.set_phi_arg(versioned.join_bb, phi, versioned.true_exit, value);
        }
        Ok(())
    }

    pub fn statement(&self, id: PbbId) -> LoopGenResult<&'a PolyBb> {
        let scop: &'a Scop = self.scop;
        scop.pbb(id).ok_or_else(|| {
            CodegenError::new(CodegenErrorKind::UnknownStatement, format!("no statement {}", id)).into()
        })
    }
}

/// Outcome of a [`generate`] call.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub region: String,
    /// False when the generated code was discarded for the original
    pub success: bool,
    /// Block holding the version condition
    pub version_cond: BlockId,
    /// Generated loops that are still live
    pub loops: Vec<LoopId>,
    pub parallel_loops: Vec<LoopId>,
    pub bb_pbb: BbPbbMap,
    pub statements: usize,
}

impl fmt::Display for GenerationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.success { "regenerated" } else { "kept original code" };
        writeln!(f, "region {}: {}", self.region, status)?;
        writeln!(f, "  statements copied: {}", self.statements)?;
        writeln!(f, "  loops generated:   {}", self.loops.len())?;
        if self.parallel_loops.is_empty() {
            write!(f, "  parallel loops:    none")
        } else {
            write!(f, "  parallel loops:    {}", format_list(&self.parallel_loops, ", "))
        }
    }
}

/// Regenerate the control flow of `scop` from `ast`, using the default
/// bound solver.
pub fn generate(
    cfg: &mut Cfg,
    scop: &mut Scop,
    ast: &AstStmt,
    config: &TranslationConfig,
    oracle: &dyn DependenceOracle,
) -> LoopGenResult<GenerationReport> {
    generate_with(cfg, scop, ast, config, oracle, &FourierMotzkin::new())
}

/// Regenerate the control flow of `scop` from `ast`.
///
/// The region is put under a version condition; the generated code goes
/// on its true branch and the original stays on the false branch, which
/// becomes the new entry of `scop`. Scalars of the region used after it
/// are merged from both versions by phis in the join block.
///
/// When a translation step raised the flag, the condition is set to
/// `false` and the generated code removed. The same happens before an
/// error is returned, so the original code is all that is left.
pub fn generate_with(
    cfg: &mut Cfg,
    scop: &mut Scop,
    ast: &AstStmt,
    config: &TranslationConfig,
    oracle: &dyn DependenceOracle,
    solver: &dyn LinearSolver,
) -> LoopGenResult<GenerationReport> {
    config.validate()?;
    let region = scop.region_blocks(cfg);
    let liveouts = cfg.region_liveouts(&region);
    let from_phis: Vec<VarId> = liveouts.iter().copied().filter(|&v| cfg.defined_by_phi(v)).collect();
    if !from_phis.is_empty() {
        return Err(CodegenError::new(
            CodegenErrorKind::UnsupportedLiveout,
            format!("{} used after the region but defined by phis", format_list(&from_phis, ", ")),
        )
        .into());
    }

    let versioned = cfg.version_region(scop.entry, scop.exit)?;
    scop.entry = versioned.false_edge;
    let liveout_phis = cfg.insert_liveout_phis(&versioned, &region, &liveouts);
    cfg.recompute_dominators();
    debug!(
        "versioned region {} at {}, {} live-out scalars",
        scop.name,
        versioned.cond_bb,
        liveout_phis.len()
    );

    let mut ctx = TranslationContext::new(cfg, scop, config.clone(), oracle, solver);
    let result = translate_region(&mut ctx, ast, &versioned, &liveout_phis);
    let TranslationContext { mut loops, mut parallel_loops, mut bb_pbb, statements, .. } = ctx;

    let flagged = match result {
        Ok(flagged) => flagged,
        Err(err) => {
            warn!("translation of {} failed, keeping the original: {}", scop.name, err);
            discard_generated(cfg, &versioned);
            return Err(err);
        }
    };
    let success = !flagged;
    if flagged {
        warn!("could not generate code for {}, keeping the original", scop.name);
        discard_generated(cfg, &versioned);
        loops.clear();
        parallel_loops.clear();
        bb_pbb.retain_live(cfg);
    }
    if config.verify {
        if let Err(err) = cfg.verify() {
            if success {
                discard_generated(cfg, &versioned);
            }
            return Err(err.into());
        }
    }

    let independent = loops
        .iter()
        .filter(|l| cfg.live_loops().any(|live| live == **l) && cfg.get_loop(**l).can_be_parallel)
        .count();
    info!("{} loops carried no dependency.", independent);

    Ok(GenerationReport {
        region: scop.name.clone(),
        success,
        version_cond: versioned.cond_bb,
        loops,
        parallel_loops,
        bb_pbb,
        statements,
    })
}

/// Translate `ast` onto the true branch of `versioned`; returns the flag.
fn translate_region(
    ctx: &mut TranslationContext<'_>,
    ast: &AstStmt,
    versioned: &VersionedRegion,
    liveout_phis: &[(VarId, VarId)],
) -> LoopGenResult<bool> {
    let out = ctx.translate_stmt(ast, versioned.true_edge, 0)?;
    if !out.flagged {
        ctx.close_liveouts(versioned, liveout_phis)?;
    }
    Ok(out.flagged)
}

/// Leave only the original code: the version condition becomes `false`
/// and everything on its true branch goes away.
fn discard_generated(cfg: &mut Cfg, versioned: &VersionedRegion) {
    cfg.set_condition(versioned.cond_bb, Value::bool(false));
    cfg.cleanup();
}
