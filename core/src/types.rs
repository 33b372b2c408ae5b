//! # Types
//!
//! Shared types of the counterfactual search: the knapsack instance, the favoured solution space
//! and the cuts and perturbations that the search produces.

use std::{cmp, collections::BTreeSet, fmt};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::Error;

/// A binary knapsack instance. Immutable for the duration of a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    weights: Vec<usize>,
    costs: Vec<usize>,
    capacity: usize,
}

impl Instance {
    /// Creates a new instance, checking that all numbers are positive and that there is exactly
    /// one cost per weight
    pub fn new(weights: Vec<usize>, costs: Vec<usize>, capacity: usize) -> anyhow::Result<Self> {
        anyhow::ensure!(
            !weights.is_empty(),
            Error::InvalidInstance("instance without items".to_string())
        );
        anyhow::ensure!(
            weights.len() == costs.len(),
            Error::InvalidInstance(format!(
                "{} weights but {} costs",
                weights.len(),
                costs.len()
            ))
        );
        if let Some(idx) = weights.iter().position(|&w| w == 0) {
            anyhow::bail!(Error::InvalidInstance(format!("item {idx} has weight 0")));
        }
        if let Some(idx) = costs.iter().position(|&c| c == 0) {
            anyhow::bail!(Error::InvalidInstance(format!("item {idx} has cost 0")));
        }
        anyhow::ensure!(
            capacity > 0,
            Error::InvalidInstance("capacity must be positive".to_string())
        );
        Ok(Instance {
            weights,
            costs,
            capacity,
        })
    }

    pub fn n_items(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[usize] {
        &self.weights
    }

    pub fn costs(&self) -> &[usize] {
        &self.costs
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_weight(&self) -> usize {
        self.weights.iter().sum()
    }

    pub fn total_cost(&self) -> usize {
        self.costs.iter().sum()
    }

    /// Gets the total cost of a set of items
    pub fn cost_of(&self, items: &ItemSet) -> usize {
        items.iter().map(|idx| self.costs[idx]).sum()
    }

    /// Keeps only the first `n_items` items and scales the capacity down proportionally to the
    /// original number of items
    ///
    /// # Panics
    ///
    /// If `n_items` is zero or larger than the number of items
    pub fn truncate(mut self, n_items: usize) -> Self {
        assert!(n_items > 0 && n_items <= self.n_items());
        let orig = self.n_items();
        self.weights.truncate(n_items);
        self.costs.truncate(n_items);
        self.capacity = cmp::max(self.capacity * n_items / orig, 1);
        self
    }
}

/// A set of item indices, kept sorted and free of duplicates
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemSet(Vec<usize>);

impl ItemSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, item: usize) -> bool {
        self.0.binary_search(&item).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Gets the largest item index, if any
    pub fn last_item(&self) -> Option<usize> {
        self.0.last().copied()
    }

    /// Gets the total of the given per-item values over the set
    pub fn sum(&self, values: &[usize]) -> usize {
        self.iter().map(|idx| values[idx]).sum()
    }
}

impl FromIterator<usize> for ItemSet {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        ItemSet(iter.into_iter().collect::<BTreeSet<_>>().into_iter().collect())
    }
}

impl<const N: usize> From<[usize; N]> for ItemSet {
    fn from(value: [usize; N]) -> Self {
        value.into_iter().collect()
    }
}

impl fmt::Display for ItemSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.0.iter().format(", "))
    }
}

/// A rejected item set. The set may not remain able to fill the capacity under any perturbation
/// accepted later, i.e., `sum_{i in cut} new_weight[i] <= capacity - 1`.
pub type Cut = ItemSet;

/// All cuts found during one search, shared between all target objectives
///
/// Cuts are never removed. Insertion order is preserved.
#[derive(Debug, Clone, Default)]
pub struct CutPool {
    cuts: Vec<Cut>,
    known: std::collections::HashSet<Cut>,
}

impl CutPool {
    /// Adds a cut, returns `false` if the cut is already in the pool
    pub fn insert(&mut self, cut: Cut) -> bool {
        if self.known.contains(&cut) {
            return false;
        }
        self.known.insert(cut.clone());
        self.cuts.push(cut);
        true
    }

    pub fn contains(&self, cut: &Cut) -> bool {
        self.known.contains(cut)
    }

    pub fn len(&self) -> usize {
        self.cuts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cut> {
        self.cuts.iter()
    }
}

impl<'a> IntoIterator for &'a CutPool {
    type Item = &'a Cut;

    type IntoIter = std::slice::Iter<'a, Cut>;

    fn into_iter(self) -> Self::IntoIter {
        self.cuts.iter()
    }
}

/// A linear cap `sum_{i in items} x_i <= rhs` on the selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearCap {
    pub items: ItemSet,
    pub rhs: usize,
}

impl LinearCap {
    pub fn new(items: ItemSet, rhs: usize) -> Self {
        LinearCap { items, rhs }
    }

    pub fn holds(&self, selection: &ItemSet) -> bool {
        self.items.iter().filter(|&idx| selection.contains(idx)).count() <= self.rhs
    }
}

/// The types of constraints that define a favoured solution space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavouredKind {
    /// Items forced into the selection
    Enforced,
    /// Items forced out of the selection
    Disallowed,
    /// Linear caps on the selection
    Caps,
}

impl fmt::Display for FavouredKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FavouredKind::Enforced => write!(f, "enforced"),
            FavouredKind::Disallowed => write!(f, "disallowed"),
            FavouredKind::Caps => write!(f, "caps"),
        }
    }
}

/// The favoured region of the solution space, defined by externally imposed constraints
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FavouredSpace {
    pub enforced: ItemSet,
    pub disallowed: ItemSet,
    pub caps: Vec<LinearCap>,
}

impl FavouredSpace {
    /// The space without any constraints
    pub fn unconstrained() -> Self {
        Self::default()
    }

    /// Checks that all referenced items exist in an instance with `n_items` items and that no
    /// item is both enforced and disallowed
    pub fn validate(&self, n_items: usize) -> Result<(), Error> {
        let max = [
            self.enforced.last_item(),
            self.disallowed.last_item(),
            self.caps.iter().filter_map(|cap| cap.items.last_item()).max(),
        ]
        .into_iter()
        .flatten()
        .max();
        if let Some(max) = max {
            if max >= n_items {
                return Err(Error::InvalidInstance(format!(
                    "favoured space references item {max} but the instance has {n_items} items"
                )));
            }
        }
        if let Some(idx) = self.enforced.iter().find(|&idx| self.disallowed.contains(idx)) {
            return Err(Error::InvalidInstance(format!(
                "item {idx} is both enforced and disallowed"
            )));
        }
        Ok(())
    }

    /// Gets the constraint types that are in use
    pub fn active_kinds(&self) -> Vec<FavouredKind> {
        let mut kinds = vec![];
        if !self.enforced.is_empty() {
            kinds.push(FavouredKind::Enforced);
        }
        if !self.disallowed.is_empty() {
            kinds.push(FavouredKind::Disallowed);
        }
        if !self.caps.is_empty() {
            kinds.push(FavouredKind::Caps);
        }
        kinds
    }

    pub fn is_unconstrained(&self) -> bool {
        self.active_kinds().is_empty()
    }

    /// Checks whether a selection lies in the favoured space
    pub fn contains(&self, selection: &ItemSet) -> bool {
        self.enforced.iter().all(|idx| selection.contains(idx))
            && self.disallowed.iter().all(|idx| !selection.contains(idx))
            && self.caps.iter().all(|cap| cap.holds(selection))
    }
}

/// Perturbed instance parameters. The capacity is carried along but never changed by the search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Perturbation {
    pub weights: Vec<usize>,
    pub capacity: usize,
}

impl Perturbation {
    /// The perturbation that changes nothing
    pub fn identity(inst: &Instance) -> Self {
        Perturbation {
            weights: inst.weights().to_vec(),
            capacity: inst.capacity(),
        }
    }

    /// The L1 distance of the perturbed weights to the original weights
    pub fn cost(&self, inst: &Instance) -> usize {
        debug_assert_eq!(self.weights.len(), inst.n_items());
        self.weights
            .iter()
            .zip(inst.weights())
            .map(|(&new, &orig)| new.abs_diff(orig))
            .sum()
    }

    /// The change of every weight relative to the original weights
    pub fn delta(&self, inst: &Instance) -> Vec<i64> {
        self.weights
            .iter()
            .zip(inst.weights())
            .map(|(&new, &orig)| new as i64 - orig as i64)
            .collect()
    }

    /// Checks whether the perturbation keeps the item set of a cut from filling the capacity
    pub fn respects(&self, cut: &Cut) -> bool {
        cut.sum(&self.weights) < self.capacity
    }
}

/// The best perturbation found so far
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incumbent {
    pub perturbation: Perturbation,
    /// The L1 cost of the perturbation
    pub cost: usize,
    /// The target objective the perturbation was found at, `None` if the instance already is a
    /// counterfactual
    pub target: Option<usize>,
}

/// A lower bound on the cost of any counterfactual perturbation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LowerBound {
    Finite(usize),
    /// No perturbation within the deviation bounds respects all cuts
    Unreachable,
}

impl LowerBound {
    /// Checks whether a perturbation cost is within `epsilon` of the bound
    pub fn certifies(self, cost: usize, epsilon: f64) -> bool {
        match self {
            LowerBound::Finite(lb) => cost as f64 <= lb as f64 + epsilon,
            LowerBound::Unreachable => true,
        }
    }

    pub fn finite(self) -> Option<usize> {
        match self {
            LowerBound::Finite(lb) => Some(lb),
            LowerBound::Unreachable => None,
        }
    }
}

impl Default for LowerBound {
    fn default() -> Self {
        LowerBound::Finite(0)
    }
}

impl fmt::Display for LowerBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LowerBound::Finite(lb) => write!(f, "{lb}"),
            LowerBound::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// Integer bounds on a perturbed weight, `ceil(w(1-δ))..=floor(w(1+δ))`
pub fn weight_bounds(weight: usize, max_deviation: f64) -> (usize, usize) {
    // tolerance against representation error of products like `5 * 0.8`
    const TOL: f64 = 1e-9;
    let w = weight as f64;
    let lb = (w * (1. - max_deviation) - TOL).ceil().max(0.);
    let ub = (w * (1. + max_deviation) + TOL).floor();
    (lb as usize, cmp::max(ub as usize, lb as usize))
}

#[cfg(test)]
mod tests {
    use super::{
        weight_bounds, CutPool, FavouredKind, FavouredSpace, Instance, ItemSet, LinearCap,
        LowerBound, Perturbation,
    };
    use crate::Error;

    #[test]
    fn instance_validation() {
        assert!(Instance::new(vec![2, 3], vec![3, 4], 5).is_ok());
        assert!(Instance::new(vec![], vec![], 5).is_err());
        assert!(Instance::new(vec![2, 3], vec![3], 5).is_err());
        assert!(Instance::new(vec![2, 0], vec![3, 4], 5).is_err());
        assert!(Instance::new(vec![2, 3], vec![3, 4], 0).is_err());
    }

    #[test]
    fn truncate_scales_capacity() {
        let inst = Instance::new(vec![1; 50], vec![1; 50], 1000).unwrap();
        let inst = inst.truncate(10);
        assert_eq!(inst.n_items(), 10);
        assert_eq!(inst.capacity(), 200);
    }

    #[test]
    fn item_set_normalized() {
        let set: ItemSet = [3, 1, 3, 2].into();
        assert_eq!(set.as_slice(), &[1, 2, 3]);
        assert!(set.contains(2));
        assert!(!set.contains(0));
        assert_eq!(format!("{set}"), "{1, 2, 3}");
    }

    #[test]
    fn cut_pool_rejects_duplicates() {
        let mut pool = CutPool::default();
        assert!(pool.insert([0, 1].into()));
        assert!(pool.insert([2].into()));
        assert!(!pool.insert([1, 0].into()));
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.iter().next(), Some(&ItemSet::from([0, 1])));
    }

    #[test]
    fn favoured_space() {
        let space = FavouredSpace {
            enforced: [0].into(),
            disallowed: ItemSet::new(),
            caps: vec![LinearCap::new([1, 2, 3].into(), 1)],
        };
        assert_eq!(
            space.active_kinds(),
            vec![FavouredKind::Enforced, FavouredKind::Caps]
        );
        assert!(space.contains(&[0, 1].into()));
        assert!(!space.contains(&[1].into()));
        assert!(!space.contains(&[0, 1, 2].into()));
        assert!(space.validate(4).is_ok());
        assert!(space.validate(3).is_err());
        let clash = FavouredSpace {
            enforced: [1].into(),
            disallowed: [1].into(),
            caps: vec![],
        };
        assert!(clash.validate(4).is_err());
    }

    #[test]
    fn validate_item_range() {
        assert_eq!(ItemSet::from([4, 1, 7]).last_item(), Some(7));
        assert_eq!(ItemSet::new().last_item(), None);
        let enforced = FavouredSpace {
            enforced: [2, 5].into(),
            ..Default::default()
        };
        let disallowed = FavouredSpace {
            disallowed: [5].into(),
            ..Default::default()
        };
        let capped = FavouredSpace {
            caps: vec![LinearCap::new([0, 5].into(), 1)],
            ..Default::default()
        };
        for space in [enforced, disallowed, capped] {
            assert!(space.validate(6).is_ok());
            assert!(matches!(
                space.validate(5),
                Err(Error::InvalidInstance(_))
            ));
        }
    }

    #[test]
    fn perturbation_cost() {
        let inst = Instance::new(vec![2, 3, 4, 5], vec![3, 4, 5, 6], 5).unwrap();
        let pert = Perturbation {
            weights: vec![2, 4, 4, 3],
            capacity: 5,
        };
        assert_eq!(pert.cost(&inst), 3);
        assert_eq!(pert.delta(&inst), vec![0, 1, 0, -2]);
        assert!(pert.respects(&[0].into()));
        assert!(!pert.respects(&[0, 3].into()));
        assert_eq!(Perturbation::identity(&inst).cost(&inst), 0);
    }

    #[test]
    fn lower_bound_order() {
        assert!(LowerBound::Finite(3) < LowerBound::Finite(4));
        assert!(LowerBound::Finite(usize::MAX) < LowerBound::Unreachable);
        assert!(LowerBound::Finite(2).certifies(2, 0.001));
        assert!(!LowerBound::Finite(2).certifies(3, 0.001));
        assert!(LowerBound::Unreachable.certifies(100, 0.));
    }

    #[test]
    fn integer_weight_bounds() {
        assert_eq!(weight_bounds(5, 0.2), (4, 6));
        assert_eq!(weight_bounds(10, 0.05), (10, 10));
        assert_eq!(weight_bounds(100, 0.05), (95, 105));
        assert_eq!(weight_bounds(7, 0.), (7, 7));
    }
}
