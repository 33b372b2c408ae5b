//! # Lower Bounding
//!
//! Every cut states that its item set must not fill the capacity. The cheapest perturbation
//! within the deviation bounds that respects all cuts found so far is the bound the incumbent is
//! certified against. Cuts are derived for single target objectives, so the bound is a stopping
//! criterion of the scan and may exceed the cost of perturbations found at later targets.

use knapcf_oracle::{MipOracle, Sense};

use crate::{
    model::ModelBuilder,
    termination::done,
    types::{CutPool, LowerBound},
    MaybeTerminated, Phase,
};

use super::{integral, Kernel};

impl<O> Kernel<O>
where
    O: MipOracle,
{
    /// Computes the lower bound implied by a set of cuts. The oracle call is not limited by the
    /// deadline, so that every explored candidate ends with an up-to-date bound.
    pub fn lower_bound(&mut self, cuts: &CutPool) -> anyhow::Result<MaybeTerminated<LowerBound>> {
        self.stats.n_lb_solves += 1;
        let mut builder = ModelBuilder::new(&self.inst, Sense::Minimise);
        builder.perturbation(self.opts.max_deviation).cuts(cuts);
        let (model, _) = builder.build();
        let optimised = done!(self.optimise_within(Phase::LowerBound, &model, None)?);
        Ok(MaybeTerminated::Done(match optimised.optimum {
            Some((obj, _)) => LowerBound::Finite(integral(obj)),
            None => LowerBound::Unreachable,
        }))
    }
}
