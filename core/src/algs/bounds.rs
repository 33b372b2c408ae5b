//! # Objective Range Estimation
//!
//! Bounds the costs that the favoured optimum can take under any perturbation within the
//! deviation bounds. Only target objectives in this range need to be explored.

use knapcf_oracle::{MipOracle, Sense};
use serde::{Deserialize, Serialize};

use crate::{
    model::{scaled, ModelBuilder},
    termination::done,
    MaybeTerminated, Phase,
};

use super::{integral, Kernel};

/// An inclusive range of integer target objectives with `min <= max`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveRange {
    pub min: usize,
    pub max: usize,
}

impl ObjectiveRange {
    pub fn len(&self) -> usize {
        self.max - self.min + 1
    }

    pub fn iter(&self) -> std::ops::RangeInclusive<usize> {
        self.min..=self.max
    }
}

impl<O> Kernel<O>
where
    O: MipOracle,
{
    /// Computes the range of target objectives. Returns `None` if no favoured solution exists
    /// even under the most permissive perturbation.
    pub fn bounds(&mut self) -> anyhow::Result<MaybeTerminated<Option<ObjectiveRange>>> {
        let dev = self.opts.max_deviation;
        let capacity = self.inst.capacity() as f64;

        // grown weights and shrunk capacity make covering easiest
        let Some(min) = done!(self.favoured_cover(1. + dev, capacity * (1. - dev))?) else {
            return Ok(MaybeTerminated::Done(None));
        };

        // shrunk weights and grown capacity make covering hardest
        let total = self.inst.total_cost();
        let max = if (self.inst.total_weight() as f64) * (1. - dev) < capacity * (1. + dev) {
            total
        } else {
            done!(self.favoured_cover(1. - dev, capacity * (1. + dev))?).unwrap_or(total)
        };

        Ok(MaybeTerminated::Done(Some(ObjectiveRange {
            min,
            max: max.max(min),
        })))
    }

    /// The cost of the best favoured cover with all weights scaled by a factor
    fn favoured_cover(
        &mut self,
        weight_factor: f64,
        capacity: f64,
    ) -> anyhow::Result<MaybeTerminated<Option<usize>>> {
        let mut builder = ModelBuilder::new(&self.inst, Sense::Minimise);
        builder
            .select_by_cost()
            .favoured(&self.space)
            .cover(&scaled(self.inst.weights(), weight_factor), capacity);
        let (model, _) = builder.build();
        let optimised = done!(self.optimise(Phase::Bounds, &model)?);
        Ok(MaybeTerminated::Done(
            optimised.optimum.map(|(obj, _)| integral(obj)),
        ))
    }
}
