//! # Nominal Solutions
//!
//! Solves the unperturbed instance, either as a minimum-cost cover of the capacity or as a
//! classic maximum-cost packing.

use std::time::Duration;

use knapcf_oracle::{MipOracle, Model, Sense, SolveResult};

use crate::{
    model::{scaled, Handles, ModelBuilder},
    termination::done,
    types::{FavouredSpace, Instance, ItemSet},
    Error, MaybeTerminated, Phase,
};

use super::{integral, Kernel};

/// An optimal solution of the unperturbed instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nominal {
    /// The selected items
    pub items: ItemSet,
    /// The total cost of the selection
    pub objective: usize,
    /// The time the oracle took to solve the model
    pub runtime: Duration,
}

/// The minimum-cost selection with `sum weight[i] x[i] >= capacity`
fn cover_model(inst: &Instance, space: Option<&FavouredSpace>) -> (Model, Handles) {
    let mut builder = ModelBuilder::new(inst, Sense::Minimise);
    builder.select_by_cost();
    if let Some(space) = space {
        builder.favoured(space);
    }
    builder.cover(&scaled(inst.weights(), 1.), inst.capacity() as f64);
    builder.build()
}

/// The maximum-cost selection with `sum weight[i] x[i] <= capacity`
fn knapsack_model(
    inst: &Instance,
    space: Option<&FavouredSpace>,
    deviate_from: Option<&ItemSet>,
) -> (Model, Handles) {
    let mut builder = ModelBuilder::new(inst, Sense::Maximise);
    builder.select_by_cost();
    if let Some(space) = space {
        builder.favoured(space);
    }
    if let Some(solution) = deviate_from {
        builder.deviate_from(solution);
    }
    builder.packing(&scaled(inst.weights(), 1.), inst.capacity() as f64);
    builder.build()
}

fn solve_nominal<O: MipOracle>(
    oracle: &mut O,
    model: &Model,
    handles: &Handles,
) -> anyhow::Result<Option<Nominal>> {
    let solved = oracle.solve(model, None)?;
    match solved.result {
        SolveResult::Optimal(obj, sol) => Ok(Some(Nominal {
            items: handles.selected(&sol),
            objective: integral(obj),
            runtime: solved.runtime,
        })),
        SolveResult::Infeasible => Ok(None),
        SolveResult::Unknown(status) => Err(Error::UnexpectedOracleStatus(format!(
            "{}: {status}",
            Phase::Nominal
        ))
        .into()),
    }
}

/// Solves the minimum-cost cover of the unconstrained instance with a given oracle. Returns `None`
/// if all items together do not fill the capacity.
pub fn nominal_cover<O: MipOracle>(
    oracle: &mut O,
    inst: &Instance,
) -> anyhow::Result<Option<Nominal>> {
    let (model, handles) = cover_model(inst, None);
    solve_nominal(oracle, &model, &handles)
}

/// Solves the maximum-cost packing of an instance with a given oracle, optionally restricted to
/// a favoured space and to selections that differ from a given one
pub fn nominal_knapsack<O: MipOracle>(
    oracle: &mut O,
    inst: &Instance,
    space: Option<&FavouredSpace>,
    deviate_from: Option<&ItemSet>,
) -> anyhow::Result<Option<Nominal>> {
    let (model, handles) = knapsack_model(inst, space, deviate_from);
    solve_nominal(oracle, &model, &handles)
}

impl<O> Kernel<O>
where
    O: MipOracle,
{
    /// Solves the minimum-cost cover of the unperturbed, unconstrained instance
    pub fn nominal_cover(&mut self) -> anyhow::Result<MaybeTerminated<Option<Nominal>>> {
        let (model, handles) = cover_model(&self.inst, None);
        self.solve_nominal(&model, &handles)
    }

    /// Solves the maximum-cost packing of the unperturbed instance, optionally restricted to the
    /// favoured space and to selections that differ from a given one
    pub fn nominal_knapsack(
        &mut self,
        favoured: bool,
        deviate_from: Option<&ItemSet>,
    ) -> anyhow::Result<MaybeTerminated<Option<Nominal>>> {
        let space = favoured.then_some(&self.space);
        let (model, handles) = knapsack_model(&self.inst, space, deviate_from);
        self.solve_nominal(&model, &handles)
    }

    fn solve_nominal(
        &mut self,
        model: &Model,
        handles: &Handles,
    ) -> anyhow::Result<MaybeTerminated<Option<Nominal>>> {
        let optimised = done!(self.optimise(Phase::Nominal, model)?);
        Ok(MaybeTerminated::Done(optimised.optimum.map(|(obj, sol)| {
            Nominal {
                items: handles.selected(&sol),
                objective: integral(obj),
                runtime: optimised.runtime,
            }
        })))
    }
}
