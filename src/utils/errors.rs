//! Error types for loop regeneration.
//!
//! Numeric trouble (a type wider than the machine word, a scaled pointer)
//! is *not* an error here: it degrades the result and raises the
//! translation flag carried by [`crate::codegen::Flagged`]. The types below
//! cover the fatal cases: broken CFG invariants, malformed ASTs and
//! malformed kernel descriptions.

use thiserror::Error;
use crate::ir::VerifyError;
use crate::polyhedral::lp::LpError;
use std::fmt;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum LoopGenError {
    /// Error while translating the AST
    #[error("Code generation error: {0}")]
    Codegen(#[from] CodegenError),

    /// A structural invariant of the CFG does not hold
    #[error("CFG verification failed: {0}")]
    Verify(#[from] VerifyError),

    /// A polytope query could not be answered
    #[error("Bound query failed: {0}")]
    Lp(#[from] LpError),

    /// The kernel description is inconsistent
    #[error("Invalid kernel description: {0}")]
    Input(#[from] InputError),

    /// Kernel description is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error during AST to CFG translation.
#[derive(Error, Debug, Clone)]
pub struct CodegenError {
    /// The error message
    pub message: String,
    /// The kind of codegen error
    pub kind: CodegenErrorKind,
}

impl CodegenError {
    pub fn new(kind: CodegenErrorKind, message: impl Into<String>) -> Self {
        Self { message: message.into(), kind }
    }
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.message, self.kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodegenErrorKind {
    /// A name in the AST is neither a parameter nor a generated iterator
    UnknownName,
    /// A user statement refers to a statement instance not in the SCoP
    UnknownStatement,
    /// A loop has no user statement in its body to derive a type from
    EmptyLoopBody,
    /// A sum, minimum or maximum without elements
    EmptyReduction,
    /// A loop whose stride is not positive
    InvalidStride,
    /// Substitution list deeper than the statement's loop nest
    MalformedSubstitution,
    /// A scalar used after the region has no value in the new code
    UnsupportedLiveout,
    /// A CFG primitive was applied to an edge or block of the wrong shape
    Cfg,
}

/// Error in a kernel description.
#[derive(Error, Debug, Clone)]
pub struct InputError {
    /// The error message
    pub message: String,
    /// The kind of input error
    pub kind: InputErrorKind,
}

impl InputError {
    pub fn new(kind: InputErrorKind, message: impl Into<String>) -> Self {
        Self { message: message.into(), kind }
    }
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputErrorKind {
    /// Reference to a parameter that is not declared
    UnknownParameter,
    /// Reference to a statement that is not declared
    UnknownStatement,
    /// Loop bound that is not affine in outer iterators and parameters
    NonAffineBound,
    /// Vectors of mismatched length (schedule and loop nest)
    DimensionMismatch,
    /// Integer type that the machine cannot represent
    InvalidType,
}

/// Result type using LoopGenError.
pub type LoopGenResult<T> = Result<T, LoopGenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CodegenError::new(CodegenErrorKind::UnknownName, "unknown name `c3`");
        let s = format!("{}", err);
        assert!(s.contains("c3"));
        assert!(s.contains("UnknownName"));

        let top: LoopGenError = err.into();
        assert!(top.to_string().starts_with("Code generation error"));
    }
}
