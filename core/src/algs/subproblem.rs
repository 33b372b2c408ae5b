//! # Subproblem
//!
//! For one fixed target objective, finds the cheapest perturbation under which some favoured
//! selection of exactly that cost fills the capacity and the check certifies a counterfactual.
//! The model alone cannot express the certification, so the perturbation is re-validated every
//! round and every counterexample is turned into a cut.

use knapcf_oracle::{MipOracle, Sense};

use crate::{
    model::ModelBuilder,
    types::{CutPool, Incumbent, Perturbation},
    Error, MaybeTerminated, Phase, Termination, Verdict,
};

use super::Kernel;

/// The outcome of a subproblem for one target objective
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubproblemOutcome {
    /// A certified counterfactual perturbation
    Found(Incumbent),
    /// No perturbation within the bounds, the cuts and the best known cost attains the target
    NotFound,
    /// The search was terminated before the subproblem was resolved
    Terminated(Termination),
}

impl<O> Kernel<O>
where
    O: MipOracle,
{
    /// Runs the cutting-plane loop for a target objective. New cuts are added to the pool and
    /// remain there for all later targets. Perturbations costlier than `best_known` are not
    /// considered.
    pub fn subproblem(
        &mut self,
        target: usize,
        cuts: &mut CutPool,
        best_known: Option<usize>,
    ) -> anyhow::Result<SubproblemOutcome> {
        self.log_routine_start("subproblem")?;
        let outcome = self.subproblem_main(target, cuts, best_known);
        self.log_routine_end()?;
        outcome
    }

    fn subproblem_main(
        &mut self,
        target: usize,
        cuts: &mut CutPool,
        best_known: Option<usize>,
    ) -> anyhow::Result<SubproblemOutcome> {
        let dev = self.opts.max_deviation;
        loop {
            if let MaybeTerminated::Terminated(term) = self.check_termination() {
                return Ok(SubproblemOutcome::Terminated(term));
            }
            self.stats.n_subproblem_rounds += 1;

            let mut builder = ModelBuilder::new(&self.inst, Sense::Minimise);
            builder
                .select()
                .favoured(&self.space)
                .cost_equals(target)
                .perturbation(dev)
                .perturbed_cover(dev)
                .cuts(cuts);
            if let Some(bound) = best_known {
                builder.deltas_at_most(bound);
            }
            let (model, handles) = builder.build();
            let sol = match self.optimise(Phase::Subproblem, &model)? {
                MaybeTerminated::Done(optimised) => match optimised.optimum {
                    Some((_, sol)) => sol,
                    None => return Ok(SubproblemOutcome::NotFound),
                },
                MaybeTerminated::Terminated(term) => {
                    return Ok(SubproblemOutcome::Terminated(term))
                }
            };
            let perturbation = Perturbation {
                weights: handles.weights(&sol),
                capacity: self.inst.capacity(),
            };

            let verdict = match self.check(&perturbation.weights, perturbation.capacity)? {
                MaybeTerminated::Done(verdict) => verdict,
                MaybeTerminated::Terminated(term) => {
                    return Ok(SubproblemOutcome::Terminated(term))
                }
            };
            match verdict {
                Verdict::Counterfactual { .. } => {
                    let cost = perturbation.cost(&self.inst);
                    return Ok(SubproblemOutcome::Found(Incumbent {
                        perturbation,
                        cost,
                        target: Some(target),
                    }));
                }
                Verdict::Counterexample(cut) => {
                    if !cuts.insert(cut.clone()) {
                        anyhow::bail!(Error::RepeatedCut(cut));
                    }
                    self.log_cut(&cut, cuts.len())?;
                }
                // the selection of the subproblem is favoured and fills the capacity
                Verdict::NoFavouredSolution => anyhow::bail!(Error::NoFavouredSolution),
            }
        }
    }
}
