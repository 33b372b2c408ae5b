//! # Linear Integer Optimization Oracles
//!
//! This crate contains a small description of linear (mixed-)integer models and a uniform
//! interface to exact solvers that can optimize them. The counterfactual search only ever talks
//! to these solvers through [`MipOracle`] and treats them as black boxes.

use std::{fmt, ops, time::Duration};

mod map;
use map::ColMap;

#[cfg(feature = "highs")]
mod highs;
#[cfg(feature = "highs")]
pub use highs::{Builder as HighsBuilder, Oracle as HighsOracle};

#[cfg(feature = "gurobi")]
mod gurobi;
#[cfg(feature = "gurobi")]
pub use gurobi::{Builder as GurobiBuilder, Oracle as GurobiOracle};

pub const EPSILON: f64 = 0.05;
pub const TRUE: f64 = 1. - EPSILON;
pub const FALSE: f64 = 0. + EPSILON;

/// A variable in a [`Model`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Var(usize);

impl Var {
    /// Gets the index of the variable in its model
    pub fn idx(self) -> usize {
        self.0
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// The domain type of a variable
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarKind {
    Binary,
    Integer,
    Continuous,
}

/// A column of the model, i.e., a variable with its domain and objective coefficient
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub kind: VarKind,
    pub lb: f64,
    pub ub: f64,
    pub obj: f64,
}

/// A linear row `lb <= sum factor * var <= ub`
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub lb: f64,
    pub ub: f64,
    pub factors: Vec<(Var, f64)>,
}

/// The optimization direction of a model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Sense {
    #[default]
    Minimise,
    Maximise,
}

/// A linear (mixed-)integer model
#[derive(Clone, Debug, Default)]
pub struct Model {
    sense: Sense,
    cols: Vec<Column>,
    rows: Vec<Row>,
}

impl Model {
    /// Initializes an empty model with a given optimization direction
    pub fn new(sense: Sense) -> Self {
        Model {
            sense,
            ..Default::default()
        }
    }

    /// Adds a new binary variable with a given objective coefficient
    pub fn binary(&mut self, obj: f64) -> Var {
        self.add_col(VarKind::Binary, obj, 0.0..=1.0)
    }

    /// Adds a new integer variable with a given objective coefficient and domain
    pub fn integer<B: ops::RangeBounds<f64>>(&mut self, obj: f64, bounds: B) -> Var {
        self.add_col(VarKind::Integer, obj, bounds)
    }

    /// Adds a new continuous variable with a given objective coefficient and domain
    pub fn continuous<B: ops::RangeBounds<f64>>(&mut self, obj: f64, bounds: B) -> Var {
        self.add_col(VarKind::Continuous, obj, bounds)
    }

    fn add_col<B: ops::RangeBounds<f64>>(&mut self, kind: VarKind, obj: f64, bounds: B) -> Var {
        let (lb, ub) = to_interval(bounds);
        self.cols.push(Column { kind, lb, ub, obj });
        Var(self.cols.len() - 1)
    }

    /// Fixes a variable to a given value
    ///
    /// # Panics
    ///
    /// If the value lies outside of the domain of the variable
    pub fn fix(&mut self, var: Var, val: f64) {
        let col = &mut self.cols[var.0];
        assert!(
            col.lb <= val && val <= col.ub,
            "cannot fix {var} to {val} outside of [{}, {}]",
            col.lb,
            col.ub
        );
        col.lb = val;
        col.ub = val;
    }

    /// Adds a linear row to the model
    pub fn add_row<B: ops::RangeBounds<f64>>(
        &mut self,
        bounds: B,
        factors: impl IntoIterator<Item = (Var, f64)>,
    ) {
        let (lb, ub) = to_interval(bounds);
        let factors: Vec<_> = factors.into_iter().collect();
        debug_assert!(factors.iter().all(|(var, _)| var.0 < self.cols.len()));
        self.rows.push(Row { lb, ub, factors });
    }

    pub fn sense(&self) -> Sense {
        self.sense
    }

    pub fn n_vars(&self) -> usize {
        self.cols.len()
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Iterates over all variables and their columns
    pub fn columns(&self) -> impl Iterator<Item = (Var, &Column)> {
        self.cols.iter().enumerate().map(|(idx, col)| (Var(idx), col))
    }

    pub fn rows(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Evaluates the objective function for given column values
    pub fn objective_value(&self, values: &[f64]) -> f64 {
        debug_assert_eq!(values.len(), self.cols.len());
        self.cols
            .iter()
            .zip(values)
            .fold(0., |sum, (col, &val)| sum + col.obj * val)
    }
}

fn to_interval<B: ops::RangeBounds<f64>>(bounds: B) -> (f64, f64) {
    let lb = match bounds.start_bound() {
        ops::Bound::Included(&lb) | ops::Bound::Excluded(&lb) => lb,
        ops::Bound::Unbounded => f64::NEG_INFINITY,
    };
    let ub = match bounds.end_bound() {
        ops::Bound::Included(&ub) | ops::Bound::Excluded(&ub) => ub,
        ops::Bound::Unbounded => f64::INFINITY,
    };
    (lb, ub)
}

/// Values of all variables in a solution
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Assignment(Vec<f64>);

impl Assignment {
    /// Checks whether a binary variable is set
    ///
    /// # Panics
    ///
    /// If the variable is assigned to a non-integer value
    pub fn is_true(&self, var: Var) -> bool {
        let val = self.0[var.0];
        if val >= TRUE {
            true
        } else if val <= FALSE {
            false
        } else {
            panic!("binary variable {var} assigned to non-integer value {val}")
        }
    }

    /// Gets the value of an integer variable
    pub fn int(&self, var: Var) -> i64 {
        self.0[var.0].round() as i64
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f64>> for Assignment {
    fn from(value: Vec<f64>) -> Self {
        Assignment(value)
    }
}

/// Solver outcomes that are neither optimal nor infeasible
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    /// The time limit passed to the oracle was reached
    TimeLimit,
    /// The model is unbounded
    Unbounded,
    /// Any other backend-specific status
    Other(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::TimeLimit => write!(f, "time limit"),
            Status::Unbounded => write!(f, "unbounded"),
            Status::Other(desc) => write!(f, "{desc}"),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum SolveResult {
    /// A certified optimal solution with its objective value
    Optimal(f64, Assignment),
    Infeasible,
    Unknown(Status),
}

impl fmt::Display for SolveResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveResult::Optimal(obj, _) => write!(f, "optimal ({obj})"),
            SolveResult::Infeasible => write!(f, "infeasible"),
            SolveResult::Unknown(status) => write!(f, "unknown ({status})"),
        }
    }
}

/// The answer of an oracle call together with the time the oracle spent on it
#[derive(Debug, PartialEq)]
pub struct Solved {
    pub result: SolveResult,
    pub runtime: Duration,
}

/// Statistics of an oracle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub n_solves: usize,
    pub n_optimal: usize,
    pub n_infeasible: usize,
    pub runtime: Duration,
}

impl Statistics {
    pub(crate) fn record(&mut self, solved: &Solved) {
        self.n_solves += 1;
        self.runtime += solved.runtime;
        match solved.result {
            SolveResult::Optimal(..) => self.n_optimal += 1,
            SolveResult::Infeasible => self.n_infeasible += 1,
            SolveResult::Unknown(_) => (),
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("the oracle failed to solve the model: {0}")]
    Backend(String),
    #[error("cannot solve a model without variables")]
    EmptyModel,
}

/// Trait specifying the unified interface to exact MIP solvers
pub trait MipOracle {
    /// The type that can be used to build an oracle of this type
    type Builder: BuildOracle<Oracle = Self>;

    /// Solves a model to optimality, optionally stopping at a time limit
    ///
    /// Reaching the time limit is not an error but reported as [`Status::TimeLimit`].
    fn solve(&mut self, model: &Model, time_limit: Option<Duration>) -> anyhow::Result<Solved>;

    /// Gets the statistics of all calls made so far
    fn statistics(&self) -> Statistics;
}

/// Trait for initializing a new oracle
pub trait BuildOracle {
    /// The oracle type that can be initialized with this builder
    type Oracle: MipOracle;

    /// Initializes a new oracle builder with default options
    fn new() -> Self;

    /// Initializes an oracle from the given builder
    fn init(self) -> anyhow::Result<Self::Oracle>;

    /// Sets the number of threads to solve with
    ///
    /// # Default
    ///
    /// The default value shall be `1`
    fn threads(&mut self, threads: u32) -> &mut Self;
}
