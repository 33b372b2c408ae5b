//! Core search functionality shared between the components of the counterfactual search

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use anyhow::Context;
use knapcf_oracle::{Assignment, MipOracle, Model, SolveResult, Statistics, Status};

use crate::{
    types::{Cut, FavouredSpace, Instance, LowerBound},
    CfOptions, Error, Limits, MaybeTerminated, Phase, Stats, Termination, WriteSolverLog,
};

pub mod bounds;
pub mod check;
pub mod lowerbound;
pub mod nominal;
pub mod subproblem;

mod search;
pub use search::Counterfactual;

/// Solving interface of the search
pub trait Solve: KernelFunctions {
    /// Runs the search under given limits. If not fully solved, returns an early termination
    /// reason. Partial results remain available after an early termination.
    fn solve(&mut self, limits: Limits) -> anyhow::Result<MaybeTerminated>;
    /// Gets all statistics from the search and its oracle
    fn all_stats(&self) -> (Stats, Statistics);
}

/// Shared functionality provided by the [`Kernel`]
pub trait KernelFunctions {
    /// Gets tracked statistics from the search
    fn stats(&self) -> Stats;
    /// Attaches a logger to the search
    fn attach_logger<L: WriteSolverLog + 'static>(&mut self, logger: L);
    /// Detaches a logger from the search
    fn detach_logger(&mut self) -> Option<Box<dyn WriteSolverLog>>;
    /// Gets an iterrupter to the search
    fn interrupter(&mut self) -> Interrupter;
}

pub struct Interrupter {
    /// Termination flag of the search
    term_flag: Arc<AtomicBool>,
}

impl Interrupter {
    /// Interrupts the search asynchronously. The search stops at the next boundary between
    /// oracle calls.
    pub fn interrupt(&mut self) {
        self.term_flag.store(true, Ordering::Relaxed);
    }
}

/// The answer of the oracle to an optimisation call
#[derive(Debug)]
pub(crate) struct Optimised {
    /// The optimal objective value and solution, `None` if the model is infeasible
    pub optimum: Option<(f64, Assignment)>,
    /// The time the oracle spent
    pub runtime: Duration,
}

/// Kernel shared between all components of the search. Owns the oracle and all data that is
/// fixed for one run.
///
/// # Generics
///
/// - `O`: the MIP oracle
pub struct Kernel<O> {
    /// The MIP oracle
    oracle: O,
    /// The knapsack instance
    inst: Instance,
    /// The favoured solution space
    space: FavouredSpace,
    /// Configuration options
    opts: CfOptions,
    /// Running statistics
    stats: Stats,
    /// The point in time where the current run has to stop
    deadline: Option<Instant>,
    /// Logger to log with
    logger: Option<Box<dyn WriteSolverLog>>,
    /// Termination flag
    term_flag: Arc<AtomicBool>,
}

impl<O> Kernel<O> {
    /// Initializes a kernel, validating the favoured space against the instance
    pub fn new(
        oracle: O,
        inst: Instance,
        space: FavouredSpace,
        opts: CfOptions,
    ) -> anyhow::Result<Self> {
        space.validate(inst.n_items())?;
        anyhow::ensure!(
            (0. ..1.).contains(&opts.max_deviation),
            Error::InvalidInstance(format!(
                "maximum deviation {} outside of [0, 1)",
                opts.max_deviation
            ))
        );
        if opts.kind.is_strong() && space.active_kinds().len() > 1 {
            anyhow::bail!(Error::UnsupportedStrongCombination);
        }
        Ok(Kernel {
            oracle,
            inst,
            space,
            opts,
            stats: Stats::default(),
            deadline: None,
            logger: None,
            term_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn instance(&self) -> &Instance {
        &self.inst
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    fn start_solving(&mut self, limits: Limits) {
        self.stats.n_solve_calls += 1;
        self.deadline = limits.time.map(|time| Instant::now() + time);
    }

    fn attach_logger<L: WriteSolverLog + 'static>(&mut self, logger: L) {
        self.logger = Some(Box::new(logger));
    }

    fn detach_logger(&mut self) -> Option<Box<dyn WriteSolverLog>> {
        self.logger.take()
    }

    fn interrupter(&mut self) -> Interrupter {
        Interrupter {
            term_flag: self.term_flag.clone(),
        }
    }

    /// The wall-clock time left until the deadline, `None` without deadline
    fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Checks the termination flag and the deadline and terminates if appropriate
    fn check_termination(&self) -> MaybeTerminated {
        if self.term_flag.load(Ordering::Relaxed) {
            return MaybeTerminated::Terminated(Termination::Interrupted);
        }
        if self.remaining().is_some_and(|rem| rem.is_zero()) {
            return MaybeTerminated::Terminated(Termination::TimeLimit);
        }
        MaybeTerminated::Done(())
    }

    /// Logs a candidate target objective
    fn log_candidate(&mut self, target: usize) -> anyhow::Result<()> {
        self.stats.n_candidates += 1;
        // Dispatch to logger
        if let Some(logger) = &mut self.logger {
            logger.log_candidate(target).context("logger failed")?;
        }
        Ok(())
    }

    /// Logs an oracle call
    fn log_oracle_call(
        &mut self,
        phase: Phase,
        result: &SolveResult,
        runtime: Duration,
    ) -> anyhow::Result<()> {
        self.stats.n_oracle_calls += 1;
        // Dispatch to logger
        if let Some(logger) = &mut self.logger {
            logger
                .log_oracle_call(phase, result, runtime)
                .context("logger failed")?;
        }
        Ok(())
    }

    /// Logs a new cut
    fn log_cut(&mut self, cut: &Cut, n_cuts: usize) -> anyhow::Result<()> {
        self.stats.n_cuts += 1;
        // Dispatch to logger
        if let Some(logger) = &mut self.logger {
            logger.log_cut(cut, n_cuts).context("logger failed")?;
        }
        Ok(())
    }

    /// Logs an improved incumbent
    fn log_incumbent(&mut self, target: Option<usize>, cost: usize) -> anyhow::Result<()> {
        // Dispatch to logger
        if let Some(logger) = &mut self.logger {
            logger
                .log_incumbent(target, cost)
                .context("logger failed")?;
        }
        Ok(())
    }

    /// Logs an improved lower bound
    fn log_lower_bound(&mut self, lb: LowerBound) -> anyhow::Result<()> {
        // Dispatch to logger
        if let Some(logger) = &mut self.logger {
            logger.log_lower_bound(lb).context("logger failed")?;
        }
        Ok(())
    }

    /// Logs a routine start
    fn log_routine_start(&mut self, desc: &'static str) -> anyhow::Result<()> {
        // Dispatch to logger
        if let Some(logger) = &mut self.logger {
            logger.log_routine_start(desc).context("logger failed")?;
        }
        Ok(())
    }

    /// Logs a routine end
    fn log_routine_end(&mut self) -> anyhow::Result<()> {
        // Dispatch to logger
        if let Some(logger) = &mut self.logger {
            logger.log_routine_end().context("logger failed")?;
        }
        Ok(())
    }

    /// Logs the end of a run
    fn log_end_solve(&mut self) -> anyhow::Result<()> {
        // Dispatch to logger
        if let Some(logger) = &mut self.logger {
            logger.log_end_solve().context("logger failed")?;
        }
        Ok(())
    }

    /// Logs any message
    fn log_message(&mut self, msg: &str) -> anyhow::Result<()> {
        // Dispatch to logger
        if let Some(logger) = &mut self.logger {
            logger.log_message(msg).context("logger failed")?;
        }
        Ok(())
    }
}

impl<O> Kernel<O>
where
    O: MipOracle,
{
    /// Solves a model to optimality within the time left until the deadline
    pub(crate) fn optimise(
        &mut self,
        phase: Phase,
        model: &Model,
    ) -> anyhow::Result<MaybeTerminated<Optimised>> {
        let remaining = self.remaining();
        if remaining.is_some_and(|rem| rem.is_zero()) {
            return Ok(MaybeTerminated::Terminated(Termination::TimeLimit));
        }
        self.optimise_within(phase, model, remaining)
    }

    /// Solves a model to optimality with an explicit oracle time limit
    pub(crate) fn optimise_within(
        &mut self,
        phase: Phase,
        model: &Model,
        time_limit: Option<Duration>,
    ) -> anyhow::Result<MaybeTerminated<Optimised>> {
        let solved = self.oracle.solve(model, time_limit)?;
        self.log_oracle_call(phase, &solved.result, solved.runtime)?;
        let optimum = match solved.result {
            SolveResult::Optimal(obj, sol) => Some((obj, sol)),
            SolveResult::Infeasible => None,
            SolveResult::Unknown(Status::TimeLimit) => {
                return Ok(MaybeTerminated::Terminated(Termination::TimeLimit))
            }
            SolveResult::Unknown(status) => {
                anyhow::bail!(Error::UnexpectedOracleStatus(format!("{phase}: {status}")))
            }
        };
        Ok(MaybeTerminated::Done(Optimised {
            optimum,
            runtime: solved.runtime,
        }))
    }
}

/// Rounds an objective value of a model with integer optimum
pub(crate) fn integral(obj: f64) -> usize {
    debug_assert!(obj > -0.5);
    obj.round().max(0.) as usize
}
