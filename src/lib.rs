//! # loopgen - control-flow regeneration from polyhedral loop nests
//!
//! Turns the loop-nest AST a polyhedral scheduler produces for a static
//! control part (SCoP) back into a control-flow graph:
//! - Induction variables and bounds get the narrowest machine type that
//!   holds every value they take
//! - Every loop sits behind a guard that skips it when it runs zero times
//! - Statement blocks are copied with their iterators substituted
//! - Loops that carry no dependence can be marked parallel
//!
//! ## Architecture
//!
//! ```text
//! Kernel (JSON) → CFG + SCoP + AST → Dependence analysis → Codegen → CFG
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use loopgen::prelude::*;
//!
//! let mut kernel = KernelDesc::from_json(&text)?.build(64)?;
//! let deps = DependenceGraph::analyze(&kernel.scop);
//! let config = TranslationConfig { parallelize_all: true, ..Default::default() };
//! let report = generate(&mut kernel.cfg, &mut kernel.scop, &kernel.ast, &config, &deps)?;
//! println!("{}", report);
//! ```

#![warn(clippy::all)]

pub mod ast;
pub mod ir;
pub mod polyhedral;
pub mod scop;
pub mod analysis;
pub mod codegen;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::ast::{AffineExpr, AstNode, AstStmt, Equation};
    pub use crate::ir::{Cfg, Interpreter, Type, Value};
    pub use crate::polyhedral::{Constraint, FourierMotzkin, LinearExpr, LinearSolver, Polytope, Space};
    pub use crate::scop::builder::{Kernel, KernelDesc};
    pub use crate::scop::{PbbId, PolyBb, Scop};
    pub use crate::analysis::{Dependence, DependenceGraph, DependenceKind};
    pub use crate::codegen::{
        generate, generate_with, DependenceOracle, GenerationReport, NoDependences, TranslationConfig,
    };
    pub use crate::utils::errors::*;
    pub use crate::utils::pretty::PrettyPrint;
}

use utils::errors::LoopGenResult;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build the kernel described by `text`, regenerate its SCoP and clean up
/// the resulting CFG.
pub fn regenerate(text: &str, config: &codegen::TranslationConfig) -> LoopGenResult<(scop::builder::Kernel, codegen::GenerationReport)> {
    let mut kernel = scop::builder::KernelDesc::from_json(text)?.build(config.word_bits)?;
    let deps = analysis::DependenceGraph::analyze(&kernel.scop);
    let report = codegen::generate(&mut kernel.cfg, &mut kernel.scop, &kernel.ast, config, &deps)?;
    kernel.cfg.cleanup();
    Ok((kernel, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_regenerate_vector_add() {
        let config = codegen::TranslationConfig { parallelize_all: true, ..Default::default() };
        let (kernel, report) = regenerate(scop::builder::tests::VECTOR_ADD, &config).unwrap();
        assert!(report.success);
        assert_eq!(report.parallel_loops.len(), 1);
        assert!(kernel.cfg.verify().is_ok());
    }
}
