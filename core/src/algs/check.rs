//! # Counterfactual Certification
//!
//! Decides whether, under given weights, the best favoured solution is also optimal for the
//! whole instance. A favoured solution certifies a weak counterfactual if no solution is strictly
//! cheaper, and a strong one if additionally no solution outside of the favoured space ties it.

use knapcf_oracle::{MipOracle, Sense};

use crate::{
    model::{scaled, ModelBuilder},
    termination::done,
    types::{FavouredKind, ItemSet},
    MaybeTerminated, Phase,
};

use super::{integral, Kernel};

/// Objective values closer than this are considered tied
pub const TIE_TOLERANCE: f64 = 1e-3;

/// The outcome of a counterfactual check
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// The best favoured solution is certified
    Counterfactual {
        /// The best favoured solution
        solution: ItemSet,
        /// Its cost
        objective: usize,
    },
    /// A solution that is strictly cheaper than the best favoured solution, or one outside of the
    /// favoured space that ties it in strong mode
    Counterexample(ItemSet),
    /// No solution in the favoured space fills the capacity
    NoFavouredSolution,
}

impl Verdict {
    pub fn is_counterfactual(&self) -> bool {
        matches!(self, Verdict::Counterfactual { .. })
    }
}

impl<O> Kernel<O>
where
    O: MipOracle,
{
    /// Checks whether the favoured space contains an optimal solution of the instance with the
    /// given weights and capacity
    pub fn check(
        &mut self,
        weights: &[usize],
        capacity: usize,
    ) -> anyhow::Result<MaybeTerminated<Verdict>> {
        debug_assert_eq!(weights.len(), self.inst.n_items());
        self.stats.n_cf_checks += 1;
        let coefs = scaled(weights, 1.);
        let capacity = capacity as f64;

        // best solution in the favoured space
        let mut builder = ModelBuilder::new(&self.inst, Sense::Minimise);
        builder
            .select_by_cost()
            .favoured(&self.space)
            .cover(&coefs, capacity);
        let (model, handles) = builder.build();
        let Some((objective, sol)) = done!(self.optimise(Phase::Check, &model)?).optimum else {
            return Ok(MaybeTerminated::Done(Verdict::NoFavouredSolution));
        };
        let solution = handles.selected(&sol);
        let objective = integral(objective);

        // any strictly cheaper solution
        let mut builder = ModelBuilder::new(&self.inst, Sense::Minimise);
        builder
            .select_by_weight(&coefs)
            .cover(&coefs, capacity)
            .cost_at_most(objective.saturating_sub(1));
        let (model, handles) = builder.build();
        if let Some((_, sol)) = done!(self.optimise(Phase::Check, &model)?).optimum {
            return Ok(MaybeTerminated::Done(Verdict::Counterexample(
                handles.selected(&sol),
            )));
        }
        if !self.opts.kind.is_strong() {
            return Ok(MaybeTerminated::Done(Verdict::Counterfactual {
                solution,
                objective,
            }));
        }

        // best solution outside of the favoured space
        if let Some((other, witness)) = done!(self.best_outside(&coefs, capacity)?) {
            if (other - objective as f64).abs() < TIE_TOLERANCE {
                return Ok(MaybeTerminated::Done(Verdict::Counterexample(witness)));
            }
        }
        Ok(MaybeTerminated::Done(Verdict::Counterfactual {
            solution,
            objective,
        }))
    }

    /// Finds the cheapest cover in the complement of the favoured space. The complement of the
    /// caps is the disjunction of their violations, so every cap is solved separately.
    fn best_outside(
        &mut self,
        coefs: &[f64],
        capacity: f64,
    ) -> anyhow::Result<MaybeTerminated<Option<(f64, ItemSet)>>> {
        let kinds = self.space.active_kinds();
        debug_assert!(kinds.len() <= 1);
        let Some(&kind) = kinds.first() else {
            return Ok(MaybeTerminated::Done(None));
        };
        let n_models = match kind {
            FavouredKind::Caps => self.space.caps.len(),
            FavouredKind::Enforced | FavouredKind::Disallowed => 1,
        };
        let mut best: Option<(f64, ItemSet)> = None;
        for idx in 0..n_models {
            let mut builder = ModelBuilder::new(&self.inst, Sense::Minimise);
            builder.select_by_cost().cover(coefs, capacity);
            match kind {
                FavouredKind::Enforced => {
                    let enforced = &self.space.enforced;
                    builder.at_most(enforced, enforced.len() - 1)
                }
                FavouredKind::Disallowed => builder.at_least(&self.space.disallowed, 1),
                FavouredKind::Caps => {
                    let cap = &self.space.caps[idx];
                    builder.at_least(&cap.items, cap.rhs + 1)
                }
            };
            let (model, handles) = builder.build();
            if let Some((obj, sol)) = done!(self.optimise(Phase::Check, &model)?).optimum {
                if best.as_ref().map_or(true, |(best, _)| obj < *best) {
                    best = Some((obj, handles.selected(&sol)));
                }
            }
        }
        Ok(MaybeTerminated::Done(best))
    }
}
