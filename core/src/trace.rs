//! # Search Trace
//!
//! A structured record of one run of the counterfactual search that can be serialized for
//! persistence.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    types::{CutPool, Incumbent, Instance},
    Termination,
};

/// The final status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunStatus {
    /// The incumbent is certified optimal, or the search space was exhausted with an incumbent
    #[serde(rename = "solved")]
    Solved,
    /// The time limit was reached, the incumbent is not certified
    #[serde(rename = "solved:timelimit")]
    TimeLimit,
    /// The run was interrupted, the incumbent is not certified
    #[serde(rename = "solved:interrupted")]
    Interrupted,
    /// No counterfactual perturbation exists
    #[default]
    #[serde(rename = "infeasible")]
    Infeasible,
    /// The run stopped with an error, the trace is partial
    #[serde(rename = "error")]
    Failed,
}

impl RunStatus {
    /// Classifies the end of a run
    pub fn classify(termination: Option<Termination>, has_incumbent: bool) -> Self {
        match termination {
            Some(Termination::TimeLimit) => RunStatus::TimeLimit,
            Some(Termination::Interrupted) => RunStatus::Interrupted,
            None if has_incumbent => RunStatus::Solved,
            None => RunStatus::Infeasible,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Solved => write!(f, "solved"),
            RunStatus::TimeLimit => write!(f, "solved:timelimit"),
            RunStatus::Interrupted => write!(f, "solved:interrupted"),
            RunStatus::Infeasible => write!(f, "infeasible"),
            RunStatus::Failed => write!(f, "error"),
        }
    }
}

/// The record of an improved incumbent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncumbentRecord {
    /// The perturbation cost of the incumbent
    pub cost: usize,
    /// The number of cuts in the pool when the incumbent was accepted
    pub n_cuts: usize,
}

/// The final perturbation of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionRecord {
    pub weights: Vec<usize>,
    /// The change of every weight relative to the original weights
    pub delta: Vec<i64>,
    pub capacity: usize,
    /// The target objective the perturbation was found at
    pub target: Option<usize>,
}

impl SolutionRecord {
    pub fn new(inc: &Incumbent, inst: &Instance) -> Self {
        SolutionRecord {
            weights: inc.perturbation.weights.clone(),
            delta: inc.perturbation.delta(inst),
            capacity: inc.perturbation.capacity,
            target: inc.target,
        }
    }
}

/// The trace of one run of the search
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Trace {
    /// The smallest target objective
    pub c_min: Option<usize>,
    /// The largest target objective
    pub c_max: Option<usize>,
    /// The number of target objectives beyond the first
    pub n_subproblems: Option<usize>,
    /// The time in seconds the oracle took for the nominal cover
    pub original_runtime: f64,
    /// Whether the unperturbed instance already is a counterfactual
    pub already_cf: bool,
    pub status: RunStatus,
    /// The cost of the best perturbation
    pub final_ub: Option<usize>,
    /// The final lower bound, `None` if no perturbation respects all cuts
    pub final_lb: Option<usize>,
    /// The number of explored target objectives
    pub total_iterations: usize,
    /// Improved incumbents by target objective
    pub incumbents: BTreeMap<usize, IncumbentRecord>,
    /// Improved lower bounds by target objective
    pub lbs: BTreeMap<usize, usize>,
    pub solution: Option<SolutionRecord>,
    /// All cuts in the order they were found
    pub cuts: Vec<Vec<usize>>,
    pub n_cuts: usize,
    /// The time in seconds spent computing lower bounds
    pub total_time_for_lbs: f64,
    /// The time in seconds spent on each target objective
    pub time_per_iteration: BTreeMap<usize, f64>,
    /// The time in seconds of the whole run
    pub total_time: f64,
}

impl Trace {
    pub(crate) fn record_cuts(&mut self, cuts: &CutPool) {
        self.cuts = cuts.iter().map(|cut| cut.as_slice().to_vec()).collect();
        self.n_cuts = cuts.len();
    }
}
