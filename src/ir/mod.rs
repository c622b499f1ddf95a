//! Control-flow representation that generated code is written into.
//!
//! - `types`: integer, pointer and boolean types
//! - `value`: typed, constant-folded value trees
//! - `cfg`: blocks, edges, loops and the primitives that grow them
//! - `dominance`: dominator trees and the structural verifier
//! - `interp`: a reference interpreter
//! - `pprint`: textual dumps

pub mod types;
pub mod value;
pub mod cfg;
pub mod dominance;
pub mod interp;
pub mod pprint;

pub use types::{IntType, Type};
pub use value::{BinaryOp, CmpOp, Env, EvalError, Value, ValueKind};
pub use cfg::{
    Block, BlockCopy, BlockId, Cfg, Edge, EdgeFlag, EdgeId, IfRegion, Inst, Loop, LoopId, NewLoop, VarId,
    VarInfo, VersionedRegion,
};
pub use dominance::{DominatorTree, VerifyError};
pub use interp::{Execution, InterpError, Interpreter, Memory};
