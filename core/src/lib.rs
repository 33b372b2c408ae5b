//! # Knapcf
//!
//! Counterfactual explanations for binary knapsack problems. Given an instance and a favoured
//! region of the solution space, the search finds the smallest L1 perturbation of the item
//! weights such that an optimal solution of the perturbed instance lies in the favoured region.

use std::{fmt, time::Duration};

use knapcf_oracle::SolveResult;

pub mod options;
pub use options::{CfKind, CfOptions, Limits};

pub mod types;
use types::{Cut, ItemSet, LowerBound};

pub mod prepro;

pub mod trace;
pub use trace::Trace;

mod model;

pub mod algs;
pub use algs::{
    check::Verdict, subproblem::SubproblemOutcome, Counterfactual, Interrupter, Kernel,
    KernelFunctions, Solve,
};

pub(crate) mod termination;
pub use termination::MaybeTerminated;
pub use termination::Termination;

/// Algorithm phases that the search can be in. Every oracle call is made in one phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Solving the unperturbed instance
    Nominal,
    /// Estimating the range of target objectives
    Bounds,
    /// Certifying a counterfactual candidate
    Check,
    /// Searching for a perturbation at a target objective
    Subproblem,
    /// Bounding the perturbation cost from below
    LowerBound,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Nominal => write!(f, "nominal"),
            Phase::Bounds => write!(f, "bounds"),
            Phase::Check => write!(f, "check"),
            Phase::Subproblem => write!(f, "subproblem"),
            Phase::LowerBound => write!(f, "lower-bound"),
        }
    }
}

/// Statistics of the search
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct Stats {
    /// The number of calls to [`Solve::solve`]
    pub n_solve_calls: usize,
    /// The number of target objectives explored
    pub n_candidates: usize,
    /// The number of cutting-plane rounds over all subproblems
    pub n_subproblem_rounds: usize,
    /// The number of counterfactual checks
    pub n_cf_checks: usize,
    /// The number of calls to the MIP oracle
    pub n_oracle_calls: usize,
    /// The number of cuts found
    pub n_cuts: usize,
    /// The number of lower bounds computed
    pub n_lb_solves: usize,
}

/// A logger to attach to a search
pub trait WriteSolverLog {
    /// Adds a candidate target objective to the log
    fn log_candidate(&mut self, target: usize) -> anyhow::Result<()>;
    /// Adds an oracle call to the log
    fn log_oracle_call(
        &mut self,
        phase: Phase,
        result: &SolveResult,
        runtime: Duration,
    ) -> anyhow::Result<()>;
    /// Adds a new cut to the log
    fn log_cut(&mut self, cut: &Cut, n_cuts: usize) -> anyhow::Result<()>;
    /// Adds an improved incumbent to the log
    fn log_incumbent(&mut self, target: Option<usize>, cost: usize) -> anyhow::Result<()>;
    /// Adds an improved lower bound to the log
    fn log_lower_bound(&mut self, lb: LowerBound) -> anyhow::Result<()>;
    /// Adds a new routine starting to the log
    fn log_routine_start(&mut self, desc: &'static str) -> anyhow::Result<()>;
    /// Adds a new routine ending to the log
    fn log_routine_end(&mut self) -> anyhow::Result<()>;
    /// Adds end of solving to the log
    fn log_end_solve(&mut self) -> anyhow::Result<()>;
    /// Logs any string
    fn log_message(&mut self, msg: &str) -> anyhow::Result<()>;
}

/// Failures of the counterfactual search
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid instance: {0}")]
    InvalidInstance(String),
    #[error("strong counterfactuals are only supported with a single type of favoured constraints")]
    UnsupportedStrongCombination,
    #[error("the cut {0} was proposed twice in one subproblem")]
    RepeatedCut(ItemSet),
    #[error("the oracle returned an unexpected status: {0}")]
    UnexpectedOracleStatus(String),
    #[error("no favoured solution exists for a proposed perturbation")]
    NoFavouredSolution,
}
