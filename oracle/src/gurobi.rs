//! # Oracle Interface for the Gurobi Solver

use std::time::{Duration, Instant};

use anyhow::Context;
use grb::{attr, c, expr::Expr, param, Env, ModelSense, Status as GrbStatus, VarType};

use crate::{Assignment, Model, Sense, SolveResult, Solved, Statistics, Status, VarKind};

use super::{BuildOracle, ColMap, MipOracle};

pub struct Oracle {
    env: Env,
    statistics: Statistics,
}

impl MipOracle for Oracle {
    type Builder = Builder;

    fn solve(&mut self, model: &Model, time_limit: Option<Duration>) -> anyhow::Result<Solved> {
        anyhow::ensure!(model.n_vars() > 0, crate::Error::EmptyModel);
        let start = Instant::now();

        let mut gmodel =
            grb::Model::with_env("knapcf", &self.env).context("failed to initialize Gurobi model")?;
        let mut map: ColMap<grb::Var> = ColMap::new(model.n_vars());
        for (var, col) in model.columns() {
            let vtype = match col.kind {
                VarKind::Binary => VarType::Binary,
                VarKind::Integer => VarType::Integer,
                VarKind::Continuous => VarType::Continuous,
            };
            let gvar = gmodel
                .add_var(&format!("{var}"), vtype, col.obj, col.lb, col.ub, std::iter::empty())
                .context("failed to create Gurobi variable")?;
            map.push(var, gvar);
        }
        for (idx, row) in model.rows().enumerate() {
            let expr = row
                .factors
                .iter()
                .fold(Expr::Constant(0.), |expr, &(var, factor)| {
                    expr + Expr::Term(factor, map[var])
                });
            let name = format!("r{idx}");
            if row.lb == row.ub {
                gmodel.add_constr(&name, c!(expr == row.lb))?;
                continue;
            }
            if row.lb > f64::NEG_INFINITY {
                gmodel.add_constr(&name, c!(expr.clone() >= row.lb))?;
            }
            if row.ub < f64::INFINITY {
                gmodel.add_constr(&name, c!(expr <= row.ub))?;
            }
        }
        gmodel.set_attr(
            attr::ModelSense,
            match model.sense() {
                Sense::Minimise => ModelSense::Minimize,
                Sense::Maximise => ModelSense::Maximize,
            },
        )?;
        if let Some(limit) = time_limit {
            gmodel.set_param(param::TimeLimit, limit.as_secs_f64())?;
        }

        gmodel.optimize().context("Gurobi failed to optimize")?;
        let result = match gmodel.status()? {
            GrbStatus::Optimal => {
                let values = map
                    .iter()
                    .map(|(_, gvar)| gmodel.get_obj_attr(attr::X, gvar))
                    .collect::<grb::Result<Vec<f64>>>()?;
                let objective = model.objective_value(&values);
                SolveResult::Optimal(objective, Assignment::from(values))
            }
            GrbStatus::Infeasible | GrbStatus::InfOrUnbd => SolveResult::Infeasible,
            GrbStatus::TimeLimit => SolveResult::Unknown(Status::TimeLimit),
            GrbStatus::Unbounded => SolveResult::Unknown(Status::Unbounded),
            status => SolveResult::Unknown(Status::Other(format!("gurobi: {status:?}"))),
        };
        let solved = Solved {
            result,
            runtime: start.elapsed(),
        };
        self.statistics.record(&solved);
        Ok(solved)
    }

    fn statistics(&self) -> Statistics {
        self.statistics
    }
}

pub struct Builder {
    threads: i32,
}

impl BuildOracle for Builder {
    type Oracle = Oracle;

    fn new() -> Self {
        Builder { threads: 1 }
    }

    fn init(self) -> anyhow::Result<Self::Oracle> {
        let mut env = Env::empty().context("failed to initialize Gurobi environment")?;
        env.set(param::LogToConsole, 0)
            .context("failed to silence Gurobi")?;
        env.set(param::MIPGap, 0.)
            .context("failed to set parameter `MIPGap` for Gurobi")?;
        env.set(param::Threads, self.threads)
            .context("failed to set parameter `Threads` for Gurobi")?;
        Ok(Oracle {
            env: env.start().context("failed to start Gurobi environment")?,
            statistics: Statistics::default(),
        })
    }

    fn threads(&mut self, threads: u32) -> &mut Self {
        self.threads = i32::try_from(threads).unwrap_or(i32::MAX);
        self
    }
}
