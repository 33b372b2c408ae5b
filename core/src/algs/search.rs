//! # Counterfactual Search
//!
//! The outer loop of the search. Scans the target objectives in ascending order, solves the
//! subproblem for each of them and stops as soon as the incumbent is within `epsilon` of the
//! lower bound implied by the cuts.

use std::time::Instant;

use knapcf_oracle::{BuildOracle, MipOracle, Statistics};

use crate::{
    termination::done,
    trace::{IncumbentRecord, RunStatus, SolutionRecord},
    types::{CutPool, FavouredSpace, Incumbent, Instance, LowerBound, Perturbation},
    CfOptions, KernelFunctions, Limits, MaybeTerminated, Stats, Trace, Verdict, WriteSolverLog,
};

use super::{subproblem::SubproblemOutcome, Interrupter, Kernel};

/// The counterfactual search
///
/// # Generics
///
/// - `O`: the MIP oracle
pub struct Counterfactual<O> {
    /// The search kernel
    kernel: Kernel<O>,
    /// All cuts found so far
    cuts: CutPool,
    /// The number of cuts the current lower bound was computed with
    lb_cuts: usize,
    /// The best perturbation found so far
    incumbent: Option<Incumbent>,
    /// The best lower bound found so far
    lower_bound: LowerBound,
    /// The trace of the last run
    trace: Trace,
}

impl<O> Counterfactual<O>
where
    O: MipOracle,
{
    /// Initializes the search with an oracle with default options
    pub fn new(inst: Instance, space: FavouredSpace, opts: CfOptions) -> anyhow::Result<Self> {
        let oracle = <O::Builder as BuildOracle>::new().init()?;
        Self::with_oracle(oracle, inst, space, opts)
    }

    /// Initializes the search with a configured oracle
    pub fn with_oracle(
        oracle: O,
        inst: Instance,
        space: FavouredSpace,
        opts: CfOptions,
    ) -> anyhow::Result<Self> {
        let kernel = Kernel::new(oracle, inst, space, opts)?;
        Ok(Self::init(kernel))
    }
}

impl<O> Counterfactual<O> {
    fn init(kernel: Kernel<O>) -> Self {
        Self {
            kernel,
            cuts: CutPool::default(),
            lb_cuts: 0,
            incumbent: None,
            lower_bound: LowerBound::default(),
            trace: Trace::default(),
        }
    }

    /// Gets the trace of the last run
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Gets the best perturbation found
    pub fn incumbent(&self) -> Option<&Incumbent> {
        self.incumbent.as_ref()
    }

    /// Gets the best lower bound found
    pub fn lower_bound(&self) -> LowerBound {
        self.lower_bound
    }

    /// Gets all cuts found
    pub fn cuts(&self) -> &CutPool {
        &self.cuts
    }

    /// Gets the underlying kernel
    pub fn kernel(&self) -> &Kernel<O> {
        &self.kernel
    }

    /// Gets the underlying kernel mutably, e.g., to run single components
    pub fn kernel_mut(&mut self) -> &mut Kernel<O> {
        &mut self.kernel
    }
}

impl<O> KernelFunctions for Counterfactual<O> {
    fn stats(&self) -> Stats {
        self.kernel.stats()
    }

    fn attach_logger<L: WriteSolverLog + 'static>(&mut self, logger: L) {
        self.kernel.attach_logger(logger)
    }

    fn detach_logger(&mut self) -> Option<Box<dyn WriteSolverLog>> {
        self.kernel.detach_logger()
    }

    fn interrupter(&mut self) -> Interrupter {
        self.kernel.interrupter()
    }
}

impl<O> super::Solve for Counterfactual<O>
where
    O: MipOracle,
{
    fn solve(&mut self, limits: Limits) -> anyhow::Result<MaybeTerminated> {
        let start = Instant::now();
        self.kernel.start_solving(limits);
        self.reset();
        let res = match self.alg_main() {
            Ok(res) => res,
            Err(err) => {
                // keep the partial trace of a failed run
                self.finalize(start, RunStatus::Failed);
                return Err(err);
            }
        };
        let term = match res {
            MaybeTerminated::Done(_) => None,
            MaybeTerminated::Terminated(term) => Some(term),
        };
        self.finalize(start, RunStatus::classify(term, self.incumbent.is_some()));
        self.kernel.log_end_solve()?;
        Ok(res)
    }

    fn all_stats(&self) -> (Stats, Statistics) {
        (self.kernel.stats, self.kernel.oracle.statistics())
    }
}

impl<O> Counterfactual<O>
where
    O: MipOracle,
{
    fn reset(&mut self) {
        self.cuts = CutPool::default();
        self.lb_cuts = 0;
        self.incumbent = None;
        self.lower_bound = LowerBound::default();
        self.trace = Trace::default();
    }

    /// The search main routine
    fn alg_main(&mut self) -> anyhow::Result<MaybeTerminated> {
        self.kernel.log_routine_start("counterfactual search")?;
        if let Some(nominal) = done!(self.kernel.nominal_cover()?) {
            self.trace.original_runtime = nominal.runtime.as_secs_f64();
        }

        self.kernel.log_routine_start("bounds")?;
        let range = done!(self.kernel.bounds()?);
        self.kernel.log_routine_end()?;
        let Some(range) = range else {
            self.kernel
                .log_message("no favoured solution under any perturbation")?;
            self.kernel.log_routine_end()?;
            return Ok(MaybeTerminated::Done(()));
        };
        self.trace.c_min = Some(range.min);
        self.trace.c_max = Some(range.max);
        self.trace.n_subproblems = Some(range.len() - 1);

        // the unperturbed instance might already be a counterfactual
        let weights = self.kernel.inst.weights().to_vec();
        let capacity = self.kernel.inst.capacity();
        if let Verdict::Counterfactual { .. } = done!(self.kernel.check(&weights, capacity)?) {
            self.trace.already_cf = true;
            self.kernel
                .log_message("the unperturbed instance is a counterfactual")?;
            self.update_incumbent(Incumbent {
                perturbation: Perturbation::identity(&self.kernel.inst),
                cost: 0,
                target: None,
            })?;
            self.kernel.log_routine_end()?;
            return Ok(MaybeTerminated::Done(()));
        }

        for target in range.iter() {
            done!(self.kernel.check_termination());
            self.kernel.log_candidate(target)?;
            self.trace.total_iterations += 1;
            let iter_start = Instant::now();

            let best_known = self.incumbent.as_ref().map(|inc| inc.cost);
            let outcome = self
                .kernel
                .subproblem(target, &mut self.cuts, best_known)?;

            let lb_start = Instant::now();
            done!(self.update_lower_bound(target)?);
            self.trace.total_time_for_lbs += lb_start.elapsed().as_secs_f64();

            let term = match outcome {
                SubproblemOutcome::Found(inc) => {
                    if best_known.map_or(true, |best| inc.cost < best) {
                        self.update_incumbent(inc)?;
                    }
                    None
                }
                SubproblemOutcome::NotFound => None,
                SubproblemOutcome::Terminated(term) => Some(term),
            };

            self.trace
                .time_per_iteration
                .insert(target, iter_start.elapsed().as_secs_f64());

            if let Some(term) = term {
                return Ok(MaybeTerminated::Terminated(term));
            }
            if self.certified() {
                break;
            }
        }
        self.kernel.log_routine_end()?;
        Ok(MaybeTerminated::Done(()))
    }

    /// Checks whether the incumbent is within `epsilon` of the lower bound
    fn certified(&self) -> bool {
        match &self.incumbent {
            Some(inc) => self
                .lower_bound
                .certifies(inc.cost, self.kernel.opts.epsilon),
            None => self.lower_bound == LowerBound::Unreachable,
        }
    }

    fn update_incumbent(&mut self, inc: Incumbent) -> anyhow::Result<()> {
        self.kernel.log_incumbent(inc.target, inc.cost)?;
        if let Some(target) = inc.target {
            self.trace.incumbents.insert(
                target,
                IncumbentRecord {
                    cost: inc.cost,
                    n_cuts: self.cuts.len(),
                },
            );
        }
        self.incumbent = Some(inc);
        Ok(())
    }

    /// Recomputes the lower bound if the cut pool grew since the last computation
    fn update_lower_bound(&mut self, target: usize) -> anyhow::Result<MaybeTerminated> {
        if self.cuts.len() == self.lb_cuts {
            return Ok(MaybeTerminated::Done(()));
        }
        let lb = done!(self.kernel.lower_bound(&self.cuts)?);
        self.lb_cuts = self.cuts.len();
        if lb > self.lower_bound {
            self.lower_bound = lb;
            if let LowerBound::Finite(lb) = lb {
                self.trace.lbs.insert(target, lb);
            }
            self.kernel.log_lower_bound(lb)?;
        }
        Ok(MaybeTerminated::Done(()))
    }

    fn finalize(&mut self, start: Instant, status: RunStatus) {
        self.trace.status = status;
        self.trace.final_ub = self.incumbent.as_ref().map(|inc| inc.cost);
        self.trace.final_lb = self.lower_bound.finite();
        self.trace.solution = self
            .incumbent
            .as_ref()
            .map(|inc| SolutionRecord::new(inc, &self.kernel.inst));
        self.trace.record_cuts(&self.cuts);
        self.trace.total_time = start.elapsed().as_secs_f64();
    }
}
