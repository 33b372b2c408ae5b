//! # Oracle Interface for the HiGHS Solver

use std::time::{Duration, Instant};

use highs::{Col, HighsModelStatus, RowProblem, Sense as HighsSense};

use crate::{Assignment, Error, Model, Sense, SolveResult, Solved, Statistics, Status, VarKind};

use super::{BuildOracle, ColMap, MipOracle};

pub struct Oracle {
    options: Options,
    statistics: Statistics,
}

impl MipOracle for Oracle {
    type Builder = Builder;

    fn solve(&mut self, model: &Model, time_limit: Option<Duration>) -> anyhow::Result<Solved> {
        anyhow::ensure!(model.n_vars() > 0, Error::EmptyModel);
        let start = Instant::now();

        let mut problem = RowProblem::default();
        let mut map: ColMap<Col> = ColMap::new(model.n_vars());
        for (var, col) in model.columns() {
            let hcol = match col.kind {
                VarKind::Binary | VarKind::Integer => {
                    problem.add_integer_column(col.obj, col.lb..=col.ub)
                }
                VarKind::Continuous => problem.add_column(col.obj, col.lb..=col.ub),
            };
            map.push(var, hcol);
        }
        for row in model.rows() {
            problem.add_row(
                row.lb..=row.ub,
                row.factors.iter().map(|&(var, factor)| (map[var], factor)),
            );
        }

        let mut hmodel = problem.optimise(match model.sense() {
            Sense::Minimise => HighsSense::Minimise,
            Sense::Maximise => HighsSense::Maximise,
        });
        hmodel.set_option("output_flag", false);
        // certified optima only, the search relies on exact objective values
        hmodel.set_option("mip_rel_gap", 0.);
        hmodel.set_option("threads", self.options.threads);
        if let Some(limit) = time_limit {
            hmodel.set_option("time_limit", limit.as_secs_f64());
        }

        let solved = hmodel.solve();
        let result = match solved.status() {
            HighsModelStatus::Optimal => {
                let values = solved.get_solution().columns().to_vec();
                let objective = model.objective_value(&values);
                SolveResult::Optimal(objective, Assignment::from(values))
            }
            // all variables of our models are bounded
            HighsModelStatus::Infeasible | HighsModelStatus::UnboundedOrInfeasible => {
                SolveResult::Infeasible
            }
            HighsModelStatus::ReachedTimeLimit => SolveResult::Unknown(Status::TimeLimit),
            HighsModelStatus::Unbounded => SolveResult::Unknown(Status::Unbounded),
            status => SolveResult::Unknown(Status::Other(format!("highs: {status:?}"))),
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

/// The [`BuildOracle`] type for the HiGHS solver
pub struct Builder {
    options: Options,
}

struct Options {
    threads: i32,
}

impl BuildOracle for Builder {
    type Oracle = Oracle;

    fn new() -> Self {
        Builder {
            options: Options { threads: 1 },
        }
    }

    fn init(self) -> anyhow::Result<Self::Oracle> {
        Ok(Oracle {
            options: self.options,
            statistics: Statistics::default(),
        })
    }

    fn threads(&mut self, threads: u32) -> &mut Self {
        self.options.threads = i32::try_from(threads).unwrap_or(i32::MAX);
        self
    }
}
