//! Utility modules shared by the rest of the crate:
//! - Error types
//! - Symbol interning
//! - Pretty printing

pub mod errors;
pub mod intern;
pub mod pretty;

// Re-exports
pub use errors::*;
pub use intern::{intern, Symbol};
