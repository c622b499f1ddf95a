//! Names of the loop-nest AST and where their values live.

use crate::utils::intern::Symbol;
use std::collections::HashMap;

/// Position of a name in its value vector and the loop level it stands
/// for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameBinding {
    pub index: usize,
    pub level: usize,
}

/// Map from AST names to their bindings. Binding a name again replaces
/// the previous binding.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    bindings: HashMap<Symbol, NameBinding>,
}

impl NameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, returning the binding it replaces.
    pub fn bind(&mut self, name: Symbol, index: usize, level: usize) -> Option<NameBinding> {
        self.bindings.insert(name, NameBinding { index, level })
    }

    pub fn get(&self, name: Symbol) -> Option<NameBinding> {
        self.bindings.get(&name).copied()
    }

    pub fn index_of(&self, name: Symbol) -> Option<usize> {
        self.get(name).map(|b| b.index)
    }

    pub fn level_of(&self, name: Symbol) -> Option<usize> {
        self.get(name).map(|b| b.level)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::intern::intern;

    #[test]
    fn test_lookup() {
        let mut names = NameIndex::new();
        assert!(names.is_empty());
        names.bind(intern("c1"), 0, 0);
        names.bind(intern("c3"), 1, 1);
        assert_eq!(names.index_of(intern("c3")), Some(1));
        assert_eq!(names.level_of(intern("c1")), Some(0));
        assert_eq!(names.index_of(intern("c5")), None);
        assert_eq!(names.level_of(intern("c5")), None);
    }

    #[test]
    fn test_rebind_replaces() {
        let mut names = NameIndex::new();
        let i = intern("i");
        assert_eq!(names.bind(i, 0, 0), None);
        let old = names.bind(i, 3, 2);
        assert_eq!(old, Some(NameBinding { index: 0, level: 0 }));
        assert_eq!(names.get(i), Some(NameBinding { index: 3, level: 2 }));
        assert_eq!(names.len(), 1);
    }
}
