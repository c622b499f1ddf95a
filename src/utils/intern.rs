//! Symbol interning for AST names.
//!
//! Iterator, scattering and parameter names coming out of the scheduler are
//! compared by identity: two occurrences of `c1` in one AST are the same
//! [`Symbol`], so name tables can hash a `u32` instead of a string.

use string_interner::{StringInterner, DefaultSymbol, backend::StringBackend, Symbol as SymbolTrait};
use serde::{Serialize, Deserialize, Serializer, Deserializer};
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::RwLock;

/// Type alias for our interner backend
type Backend = StringBackend<DefaultSymbol>;

/// A symbol representing an interned string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    /// Resolve to an owned string (the global interner is behind a lock).
    pub fn as_string(&self) -> String {
        resolve(*self).unwrap_or_else(|| format!("<sym{}>", self.0))
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({}, {:?})", self.0, self.as_string())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self { intern(s) }
}

// Raw ids are process-local, so symbols travel through JSON as their text.
impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_string())
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(intern(&s))
    }
}

/// Global symbol interner (thread-safe).
static GLOBAL_INTERNER: Lazy<RwLock<StringInterner<Backend>>> =
    Lazy::new(|| RwLock::new(StringInterner::new()));

/// Intern a string in the global interner.
pub fn intern(s: &str) -> Symbol {
    // A poisoned lock only means another thread panicked mid-insert; the
    // interner itself is append-only and still consistent.
    let mut interner = GLOBAL_INTERNER.write().unwrap_or_else(|e| e.into_inner());
    let sym = interner.get_or_intern(s);
    Symbol(sym.to_usize() as u32)
}

/// Resolve a symbol from the global interner.
pub fn resolve(sym: Symbol) -> Option<String> {
    let interner = GLOBAL_INTERNER.read().unwrap_or_else(|e| e.into_inner());
    let internal_sym = DefaultSymbol::try_from_usize(sym.0 as usize)?;
    interner.resolve(internal_sym).map(|s| s.to_string())
}
