//! # Model Building
//!
//! All MIP models of the search are composed from the same building blocks: a selection of
//! items, the favoured space, perturbed weights and the cuts on them.

use knapcf_oracle::{Assignment, Model, Sense, Var};

use crate::types::{weight_bounds, CutPool, FavouredSpace, Instance, ItemSet, LinearCap};

/// Incrementally builds a model over the items of an instance
pub(crate) struct ModelBuilder<'inst> {
    inst: &'inst Instance,
    model: Model,
    selection: Vec<Var>,
    weights: Vec<Var>,
    deltas: Vec<Var>,
}

/// The variables of a built model needed to read back a solution
#[derive(Debug, Clone, Default)]
pub(crate) struct Handles {
    selection: Vec<Var>,
    weights: Vec<Var>,
}

impl Handles {
    /// Gets the selected items of a solution
    pub fn selected(&self, sol: &Assignment) -> ItemSet {
        self.selection
            .iter()
            .enumerate()
            .filter_map(|(idx, &var)| sol.is_true(var).then_some(idx))
            .collect()
    }

    /// Gets the perturbed weights of a solution
    pub fn weights(&self, sol: &Assignment) -> Vec<usize> {
        self.weights
            .iter()
            .map(|&var| sol.int(var).max(0) as usize)
            .collect()
    }
}

impl<'inst> ModelBuilder<'inst> {
    pub fn new(inst: &'inst Instance, sense: Sense) -> Self {
        ModelBuilder {
            inst,
            model: Model::new(sense),
            selection: vec![],
            weights: vec![],
            deltas: vec![],
        }
    }

    /// Adds one binary selection variable per item with the given objective coefficients
    pub fn selection<I: IntoIterator<Item = f64>>(&mut self, objective: I) -> &mut Self {
        debug_assert!(self.selection.is_empty());
        self.selection = objective
            .into_iter()
            .map(|obj| self.model.binary(obj))
            .collect();
        debug_assert_eq!(self.selection.len(), self.inst.n_items());
        self
    }

    /// Adds the selection with the item costs as objective
    pub fn select_by_cost(&mut self) -> &mut Self {
        let costs: Vec<f64> = self.inst.costs().iter().map(|&c| c as f64).collect();
        self.selection(costs)
    }

    /// Adds the selection with the given weights as objective
    pub fn select_by_weight(&mut self, weights: &[f64]) -> &mut Self {
        self.selection(weights.iter().copied())
    }

    /// Adds the selection without objective
    pub fn select(&mut self) -> &mut Self {
        let n_items = self.inst.n_items();
        self.selection(std::iter::repeat(0.).take(n_items))
    }

    fn select_terms<'a>(
        &'a self,
        items: impl IntoIterator<Item = usize> + 'a,
        coef: impl Fn(usize) -> f64 + 'a,
    ) -> impl Iterator<Item = (Var, f64)> + 'a {
        debug_assert!(!self.selection.is_empty());
        items
            .into_iter()
            .map(move |idx| (self.selection[idx], coef(idx)))
    }

    /// Restricts the selection to the favoured space
    pub fn favoured(&mut self, space: &FavouredSpace) -> &mut Self {
        for idx in space.enforced.iter() {
            self.model.fix(self.selection[idx], 1.);
        }
        for idx in space.disallowed.iter() {
            self.model.fix(self.selection[idx], 0.);
        }
        for LinearCap { items, rhs } in &space.caps {
            self.at_most(items, *rhs);
        }
        self
    }

    /// Requires `sum weight[i] x[i] >= capacity`
    pub fn cover(&mut self, weights: &[f64], capacity: f64) -> &mut Self {
        let terms: Vec<_> = self.select_terms(0..weights.len(), |idx| weights[idx]).collect();
        self.model.add_row(capacity.., terms);
        self
    }

    /// Requires `sum weight[i] x[i] <= capacity`
    pub fn packing(&mut self, weights: &[f64], capacity: f64) -> &mut Self {
        let terms: Vec<_> = self.select_terms(0..weights.len(), |idx| weights[idx]).collect();
        self.model.add_row(..=capacity, terms);
        self
    }

    fn cost_terms(&self) -> Vec<(Var, f64)> {
        let costs = self.inst.costs();
        self.select_terms(0..costs.len(), |idx| costs[idx] as f64)
            .collect()
    }

    /// Requires the selection to have exactly the given total cost
    pub fn cost_equals(&mut self, target: usize) -> &mut Self {
        let terms = self.cost_terms();
        let target = target as f64;
        self.model.add_row(target..=target, terms);
        self
    }

    /// Requires the selection to have at most the given total cost
    pub fn cost_at_most(&mut self, bound: usize) -> &mut Self {
        let terms = self.cost_terms();
        self.model.add_row(..=bound as f64, terms);
        self
    }

    /// Requires `sum_{i in items} x[i] >= rhs`
    pub fn at_least(&mut self, items: &ItemSet, rhs: usize) -> &mut Self {
        let terms: Vec<_> = self.select_terms(items.iter(), |_| 1.).collect();
        self.model.add_row(rhs as f64.., terms);
        self
    }

    /// Requires `sum_{i in items} x[i] <= rhs`
    pub fn at_most(&mut self, items: &ItemSet, rhs: usize) -> &mut Self {
        let terms: Vec<_> = self.select_terms(items.iter(), |_| 1.).collect();
        self.model.add_row(..=rhs as f64, terms);
        self
    }

    /// Requires the selection to differ from the given one in at least one item
    pub fn deviate_from(&mut self, solution: &ItemSet) -> &mut Self {
        let n_items = self.inst.n_items();
        let terms: Vec<_> = self
            .select_terms(0..n_items, |idx| {
                if solution.contains(idx) {
                    -1.
                } else {
                    1.
                }
            })
            .collect();
        self.model
            .add_row(1. - solution.len() as f64.., terms);
        self
    }

    /// Adds integer perturbed weights within the deviation bounds and continuous deltas that
    /// measure their distance to the original weights. The objective is the sum of the deltas.
    pub fn perturbation(&mut self, max_deviation: f64) -> &mut Self {
        debug_assert!(self.weights.is_empty());
        for &weight in self.inst.weights() {
            let (lb, ub) = weight_bounds(weight, max_deviation);
            let new_weight = self.model.integer(0., lb as f64..=ub as f64);
            let delta = self.model.continuous(1., 0.0..);
            let weight = weight as f64;
            // delta >= new_weight - weight
            self.model
                .add_row(-weight.., [(delta, 1.), (new_weight, -1.)]);
            // delta >= weight - new_weight
            self.model.add_row(weight.., [(delta, 1.), (new_weight, 1.)]);
            self.weights.push(new_weight);
            self.deltas.push(delta);
        }
        self
    }

    /// Requires `sum new_weight[i] x[i] >= capacity`, linearised with one bounded auxiliary
    /// variable per item
    pub fn perturbed_cover(&mut self, max_deviation: f64) -> &mut Self {
        debug_assert!(!self.selection.is_empty() && !self.weights.is_empty());
        let mut sum = Vec::with_capacity(self.inst.n_items());
        for (idx, &weight) in self.inst.weights().iter().enumerate() {
            let (_, ub) = weight_bounds(weight, max_deviation);
            let ub = ub as f64;
            let aux = self.model.continuous(0., 0.0..=ub);
            // aux <= new_weight
            self.model
                .add_row(..=0., [(aux, 1.), (self.weights[idx], -1.)]);
            // aux <= ub * x
            self.model
                .add_row(..=0., [(aux, 1.), (self.selection[idx], -ub)]);
            sum.push((aux, 1.));
        }
        self.model.add_row(self.inst.capacity() as f64.., sum);
        self
    }

    /// Adds one row per cut forbidding the item set of the cut from filling the capacity
    pub fn cuts(&mut self, cuts: &CutPool) -> &mut Self {
        debug_assert!(!self.weights.is_empty());
        let bound = self.inst.capacity() as f64 - 1.;
        for cut in cuts {
            let terms: Vec<_> = cut.iter().map(|idx| (self.weights[idx], 1.)).collect();
            self.model.add_row(..=bound, terms);
        }
        self
    }

    /// Bounds the total perturbation cost from above
    pub fn deltas_at_most(&mut self, bound: usize) -> &mut Self {
        debug_assert!(!self.deltas.is_empty());
        let terms: Vec<_> = self.deltas.iter().map(|&var| (var, 1.)).collect();
        self.model.add_row(..=bound as f64, terms);
        self
    }

    pub fn build(self) -> (Model, Handles) {
        (
            self.model,
            Handles {
                selection: self.selection,
                weights: self.weights,
            },
        )
    }
}

/// Converts integer weights to model coefficients, scaled by a factor
pub(crate) fn scaled(values: &[usize], factor: f64) -> Vec<f64> {
    values.iter().map(|&val| val as f64 * factor).collect()
}

#[cfg(test)]
mod tests {
    use knapcf_oracle::{Assignment, Sense};

    use super::{scaled, ModelBuilder};
    use crate::types::{CutPool, FavouredSpace, Instance, LinearCap};

    fn inst() -> Instance {
        Instance::new(vec![2, 3, 4, 5], vec![3, 4, 5, 6], 5).unwrap()
    }

    #[test]
    fn cover_rows() {
        let inst = inst();
        let mut builder = ModelBuilder::new(&inst, Sense::Minimise);
        builder
            .select_by_cost()
            .favoured(&FavouredSpace {
                enforced: [0].into(),
                disallowed: [1].into(),
                caps: vec![LinearCap::new([2, 3].into(), 1)],
            })
            .cover(&scaled(inst.weights(), 1.), inst.capacity() as f64);
        let (model, _) = builder.build();
        assert_eq!(model.n_vars(), 4);
        assert_eq!(model.n_rows(), 2);
        let fixed: Vec<_> = model
            .columns()
            .map(|(_, col)| (col.lb, col.ub))
            .collect();
        assert_eq!(fixed, vec![(1., 1.), (0., 0.), (0., 1.), (0., 1.)]);
    }

    #[test]
    fn perturbation_columns() {
        let inst = inst();
        let mut cuts = CutPool::default();
        cuts.insert([0, 1].into());
        let mut builder = ModelBuilder::new(&inst, Sense::Minimise);
        builder.perturbation(0.2).cuts(&cuts).deltas_at_most(3);
        let (model, handles) = builder.build();
        // one weight and one delta per item
        assert_eq!(model.n_vars(), 8);
        // two linking rows per item, the cut and the pruning row
        assert_eq!(model.n_rows(), 10);
        let sol = Assignment::from(vec![2., 0., 3., 0., 4., 0., 4., 1.]);
        assert_eq!(handles.weights(&sol), vec![2, 3, 4, 4]);
    }

    #[test]
    fn selected_items() {
        let inst = inst();
        let mut builder = ModelBuilder::new(&inst, Sense::Maximise);
        builder.select();
        let (_, handles) = builder.build();
        let sol = Assignment::from(vec![1., 0., 0.9999, 0.]);
        assert_eq!(handles.selected(&sol).as_slice(), &[0, 2]);
    }
}
