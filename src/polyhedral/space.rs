//! Polyhedral spaces: how many dimensions and parameters a polytope has,
//! and what they are called.

use serde::{Serialize, Deserialize};
use std::fmt;

/// Dimensionality and naming of a polytope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    /// Number of set dimensions
    pub n_dim: usize,
    /// Number of parameter dimensions
    pub n_param: usize,
    /// Names of dimensions (optional, for debugging)
    #[serde(default)]
    pub dim_names: Vec<String>,
    /// Names of parameters (optional)
    #[serde(default)]
    pub param_names: Vec<String>,
}

impl Space {
    /// Create a new set space with parameters.
    pub fn new(n_dim: usize, n_param: usize) -> Self {
        Self {
            n_dim,
            n_param,
            dim_names: Vec::new(),
            param_names: Vec::new(),
        }
    }

    /// A space with parameters only, as used by SCoP contexts.
    pub fn params(n_param: usize) -> Self {
        Self::new(0, n_param)
    }

    pub fn dim(&self) -> usize {
        self.n_dim
    }

    /// Get the total number of variables (dimensions and parameters).
    pub fn total_dim(&self) -> usize {
        self.n_param + self.n_dim
    }

    pub fn with_dim_names(mut self, names: Vec<String>) -> Self {
        self.dim_names = names;
        self
    }

    pub fn with_param_names(mut self, names: Vec<String>) -> Self {
        self.param_names = names;
        self
    }

    /// Get all dimension names with defaults.
    pub fn all_dim_names(&self) -> Vec<String> {
        (0..self.n_dim)
            .map(|i| {
                self.dim_names.get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("d{}", i))
            })
            .collect()
    }

    /// Get all parameter names with defaults.
    pub fn all_param_names(&self) -> Vec<String> {
        (0..self.n_param)
            .map(|i| {
                self.param_names.get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("p{}", i))
            })
            .collect()
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.n_dim)?;
        if self.n_param > 0 {
            write!(f, " : {} params", self.n_param)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space() {
        let space = Space::new(3, 1);
        assert_eq!(space.dim(), 3);
        assert_eq!(space.total_dim(), 4);
        assert_eq!(space.to_string(), "[3] : 1 params");
    }

    #[test]
    fn test_default_names() {
        let space = Space::new(2, 1)
            .with_dim_names(vec!["i".to_string()])
            .with_param_names(vec!["N".to_string()]);
        assert_eq!(space.all_dim_names(), vec!["i".to_string(), "d1".to_string()]);
        assert_eq!(space.all_param_names(), vec!["N".to_string()]);
    }
}
