//! # Column Mapping Functionality

use crate::Var;

/// A struct for mapping model [`Var`]s to solver-internal columns
#[derive(Debug)]
pub struct ColMap<T> {
    forward: Vec<T>,
}

impl<T> ColMap<T> {
    /// Initializes a new column map, reserving space for `n_vars` variables
    pub fn new(n_vars: usize) -> Self {
        Self {
            forward: Vec::with_capacity(n_vars),
        }
    }

    /// Iterates over all mapped variables and their columns
    pub fn iter(&self) -> impl Iterator<Item = (Var, &T)> {
        self.forward.iter().enumerate().map(|(idx, col)| (Var(idx), col))
    }

    /// Maps the next variable of the model to a solver column
    ///
    /// # Panics
    ///
    /// If `var` is not the next unmapped variable
    pub fn push(&mut self, var: Var, col: T) {
        assert_eq!(var.idx(), self.forward.len());
        self.forward.push(col);
    }
}

impl<T> std::ops::Index<Var> for ColMap<T> {
    type Output = T;

    fn index(&self, index: Var) -> &Self::Output {
        &self.forward[index.idx()]
    }
}
