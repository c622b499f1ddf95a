//! Loop-nest ASTs as produced by the polyhedral scheduler.
//!
//! Expressions are affine in loop iterators and parameters; statements
//! form sibling lists with nested bodies. Both are read-only to the
//! translator.

pub mod expr;
pub mod stmt;
pub mod pprint;

pub use expr::{AffineExpr, BinOp, Equation, RedOp};
pub use stmt::{Assignment, AstKind, AstNode, AstStmt, ForStmt, GuardStmt, UserStmt};
