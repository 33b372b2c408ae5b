use std::{cell::RefCell, rc::Rc, time::Duration};

use knapcf_core::{
    algs::nominal,
    types::{CutPool, FavouredSpace, Instance, ItemSet, LinearCap, LowerBound, Perturbation},
    CfKind, CfOptions, Counterfactual, Error, KernelFunctions, Limits, MaybeTerminated, Phase,
    Solve, Termination, Verdict, WriteSolverLog,
};
use knapcf_oracle::{
    Assignment, BuildOracle, Column, MipOracle, Model, Row, SolveResult, Solved, Statistics,
};

fn small() -> Instance {
    Instance::new(vec![2, 3, 4, 5], vec![3, 4, 5, 6], 5).unwrap()
}

fn mixed() -> Instance {
    Instance::new(vec![8, 5, 9, 3, 4, 11], vec![3, 7, 11, 2, 10, 5], 10).unwrap()
}

fn dense() -> Instance {
    Instance::new(vec![9, 4, 6, 4, 11, 9], vec![2, 15, 11, 3, 5, 12], 20).unwrap()
}

fn enforce(items: impl IntoIterator<Item = usize>) -> FavouredSpace {
    FavouredSpace {
        enforced: items.into_iter().collect(),
        ..Default::default()
    }
}

fn disallow(items: impl IntoIterator<Item = usize>) -> FavouredSpace {
    FavouredSpace {
        disallowed: items.into_iter().collect(),
        ..Default::default()
    }
}

fn opts(kind: CfKind, max_deviation: f64) -> CfOptions {
    CfOptions {
        kind,
        max_deviation,
        ..Default::default()
    }
}

fn solve<O: MipOracle>(
    inst: Instance,
    space: FavouredSpace,
    opts: CfOptions,
) -> Counterfactual<O> {
    let mut alg = Counterfactual::<O>::new(inst, space, opts).unwrap();
    assert_eq!(
        alg.solve(Limits::none()).unwrap(),
        MaybeTerminated::Done(())
    );
    alg
}

/// All selections of `n_items` items
fn selections(n_items: usize) -> impl Iterator<Item = ItemSet> {
    (0..1usize << n_items)
        .map(move |mask| (0..n_items).filter(|idx| mask >> idx & 1 == 1).collect())
}

/// The cost of the most valuable packing that satisfies a predicate
fn best_packing(inst: &Instance, pred: impl Fn(&ItemSet) -> bool) -> Option<usize> {
    selections(inst.n_items())
        .filter(|sel| sel.sum(inst.weights()) <= inst.capacity() && pred(sel))
        .map(|sel| inst.cost_of(&sel))
        .max()
}

/// The cost of the cheapest cover of the capacity
fn cheapest_cover(inst: &Instance) -> Option<usize> {
    selections(inst.n_items())
        .filter(|sel| sel.sum(inst.weights()) >= inst.capacity())
        .map(|sel| inst.cost_of(&sel))
        .min()
}

fn nominal_knapsack<O: MipOracle>() {
    let inst = small();
    let mut oracle = O::Builder::new().init().unwrap();
    let nom = nominal::nominal_knapsack(&mut oracle, &inst, None, None)
        .unwrap()
        .unwrap();
    assert_eq!(Some(nom.objective), best_packing(&inst, |_| true));
    assert_eq!(inst.cost_of(&nom.items), nom.objective);
    assert!(nom.items.sum(inst.weights()) <= inst.capacity());
    // next best packing
    let first = nom.items;
    let nom = nominal::nominal_knapsack(&mut oracle, &inst, None, Some(&first))
        .unwrap()
        .unwrap();
    assert_ne!(nom.items, first);
    assert_eq!(
        Some(nom.objective),
        best_packing(&inst, |sel| *sel != first)
    );
    let nom = nominal::nominal_cover(&mut oracle, &inst).unwrap().unwrap();
    assert_eq!(Some(nom.objective), cheapest_cover(&inst));
    assert_eq!(inst.cost_of(&nom.items), nom.objective);

    // restricted to the favoured space through the kernel
    let space = enforce([2]);
    let mut alg = Counterfactual::<O>::new(inst.clone(), space.clone(), opts(CfKind::Weak, 0.2))
        .unwrap();
    let nom = alg
        .kernel_mut()
        .nominal_knapsack(true, None)
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(space.contains(&nom.items));
    assert_eq!(
        Some(nom.objective),
        best_packing(&inst, |sel| space.contains(sel))
    );
    let unrestricted = alg
        .kernel_mut()
        .nominal_knapsack(false, None)
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(
        Some(unrestricted.objective),
        best_packing(&inst, |_| true)
    );
}

fn already_counterfactual<O: MipOracle>() {
    for kind in [CfKind::Weak, CfKind::Strong] {
        let alg = solve::<O>(small(), disallow([0]), opts(kind, 0.2));
        let inc = alg.incumbent().unwrap();
        assert_eq!(inc.cost, 0);
        assert_eq!(inc.target, None);
        assert!(alg.trace().already_cf);
        assert_eq!(alg.trace().status.to_string(), "solved");
        assert_eq!(alg.trace().final_ub, Some(0));
        assert_eq!(alg.stats().n_candidates, 0);
        assert_eq!(alg.stats().n_subproblem_rounds, 0);
    }
    let mut alg = Counterfactual::<O>::new(small(), disallow([0]), opts(CfKind::Weak, 0.2))
        .unwrap();
    let kernel = alg.kernel_mut();
    let MaybeTerminated::Done(Verdict::Counterfactual { solution, objective }) =
        kernel.check(&[2, 3, 4, 5], 5).unwrap()
    else {
        panic!("unperturbed instance should be a counterfactual")
    };
    assert!(!solution.contains(0));
    assert_eq!(objective, 6);
}

fn no_deviation<O: MipOracle>() {
    let alg = solve::<O>(small(), enforce([0]), opts(CfKind::Weak, 0.));
    let trace = alg.trace();
    assert_eq!(trace.c_min, trace.c_max);
    assert!(alg.incumbent().is_none());
    assert_eq!(trace.status.to_string(), "infeasible");
    assert_eq!(trace.final_lb, None);

    let alg = solve::<O>(small(), disallow([0]), opts(CfKind::Strong, 0.));
    assert_eq!(alg.incumbent().unwrap().cost, 0);
}

fn enforced_item<O: MipOracle>() {
    for kind in [CfKind::Weak, CfKind::Strong] {
        let mut alg = solve::<O>(small(), enforce([0]), opts(kind, 0.2));
        let inc = alg.incumbent().unwrap().clone();
        assert_eq!(inc.cost, 1);
        assert_eq!(alg.lower_bound(), LowerBound::Finite(1));
        assert_eq!(alg.trace().status.to_string(), "solved");
        assert!(!alg.trace().already_cf);
        assert_eq!(alg.trace().solution.as_ref().unwrap().weights, inc.perturbation.weights);
        let verdict = alg
            .kernel_mut()
            .check(&inc.perturbation.weights, inc.perturbation.capacity)
            .unwrap()
            .unwrap();
        assert!(verdict.is_counterfactual());
        match verdict {
            Verdict::Counterfactual { solution, .. } => assert!(solution.contains(0)),
            _ => unreachable!(),
        }
    }
}

fn strong_needs_strict_dominance<O: MipOracle>() {
    let alg = solve::<O>(mixed(), enforce([0]), opts(CfKind::Weak, 0.25));
    assert_eq!(alg.incumbent().unwrap().cost, 0);
    let alg = solve::<O>(mixed(), enforce([0]), opts(CfKind::Strong, 0.25));
    assert_eq!(alg.incumbent().unwrap().cost, 2);
    assert_eq!(alg.lower_bound(), LowerBound::Finite(2));
    assert_eq!(alg.cuts().len(), 1);
    assert_eq!(alg.trace().n_cuts, 1);
}

fn check_deterministic<O: MipOracle>() {
    let mut alg =
        Counterfactual::<O>::new(mixed(), enforce([0]), opts(CfKind::Strong, 0.25)).unwrap();
    let kernel = alg.kernel_mut();
    let weights = kernel.instance().weights().to_vec();
    let first = kernel.check(&weights, 10).unwrap();
    let second = kernel.check(&weights, 10).unwrap();
    assert_eq!(first, second);
    assert!(matches!(first, MaybeTerminated::Done(Verdict::Counterexample(_))));
}

fn cuts_respected<O: MipOracle>() {
    for kind in [CfKind::Weak, CfKind::Strong] {
        let alg = solve::<O>(dense(), disallow([4]), opts(kind, 0.25));
        let inc = alg.incumbent().unwrap();
        assert_eq!(inc.cost, 6);
        assert!(!alg.cuts().is_empty());
        assert_eq!(alg.trace().cuts.len(), alg.cuts().len());
        // the target of the incumbent lies in the explored range
        let target = inc.target.unwrap();
        let trace = alg.trace();
        assert!(trace.c_min.unwrap() <= target && target <= trace.c_max.unwrap());
        // cuts found before the incumbent was accepted hold for it
        let accepted = trace.incumbents[&target].n_cuts;
        assert!(accepted <= alg.cuts().len());
        assert!(alg
            .cuts()
            .iter()
            .take(accepted)
            .all(|cut| inc.perturbation.respects(cut)));
    }
}

fn later_cuts_need_not_hold<O: MipOracle>() {
    // an optimal counterfactual that violates cuts found at other target objectives
    let inst = dense();
    let perturbation = Perturbation {
        weights: vec![7, 4, 6, 3, 9, 10],
        capacity: 20,
    };
    assert_eq!(perturbation.cost(&inst), 6);
    let mut alg =
        Counterfactual::<O>::new(inst, disallow([4]), opts(CfKind::Weak, 0.25)).unwrap();
    let verdict = alg
        .kernel_mut()
        .check(&perturbation.weights, perturbation.capacity)
        .unwrap()
        .unwrap();
    assert_eq!(
        verdict,
        Verdict::Counterfactual {
            solution: [0, 3, 5].into(),
            objective: 17,
        }
    );
    assert!(perturbation.respects(&[0, 4].into()));
    assert!(!perturbation.respects(&[0, 1, 4].into()));
    assert!(!perturbation.respects(&[3, 4, 5].into()));

    alg.solve(Limits::none()).unwrap();
    assert_eq!(alg.incumbent().unwrap().cost, perturbation.cost(alg.kernel().instance()));
}

fn epsilon_stops_early<O: MipOracle>() {
    let exact = solve::<O>(dense(), disallow([4]), opts(CfKind::Weak, 0.25));
    let loose = solve::<O>(
        dense(),
        disallow([4]),
        CfOptions {
            epsilon: 100.,
            ..opts(CfKind::Weak, 0.25)
        },
    );
    let inc = loose.incumbent().unwrap();
    let trace = loose.trace();
    // the scan ends at the first incumbent
    let target = inc.target.unwrap();
    assert_eq!(trace.incumbents.len(), 1);
    assert_eq!(trace.time_per_iteration.keys().last(), Some(&target));
    assert!(loose.lower_bound().certifies(inc.cost, 100.));
    assert_eq!(trace.status.to_string(), "solved");
    assert_eq!(trace.final_ub, Some(inc.cost));
    assert!(inc.cost >= exact.incumbent().unwrap().cost);
    assert!(trace.total_iterations <= exact.trace().total_iterations);
}

/// Oracle that answers a model extending an already solved one by additional rows with the old
/// solution, i.e., ignores new cuts
struct StaleOracle<O> {
    inner: O,
    solved: Vec<(Vec<Column>, Vec<Row>, f64, Assignment)>,
}

struct StaleBuilder<B>(B);

impl<B: BuildOracle> BuildOracle for StaleBuilder<B> {
    type Oracle = StaleOracle<B::Oracle>;

    fn new() -> Self {
        StaleBuilder(B::new())
    }

    fn init(self) -> anyhow::Result<Self::Oracle> {
        Ok(StaleOracle {
            inner: self.0.init()?,
            solved: vec![],
        })
    }

    fn threads(&mut self, threads: u32) -> &mut Self {
        self.0.threads(threads);
        self
    }
}

impl<O: MipOracle> MipOracle for StaleOracle<O> {
    type Builder = StaleBuilder<O::Builder>;

    fn solve(&mut self, model: &Model, time_limit: Option<Duration>) -> anyhow::Result<Solved> {
        let cols: Vec<Column> = model.columns().map(|(_, col)| col.clone()).collect();
        let rows: Vec<Row> = model.rows().cloned().collect();
        if let Some((.., obj, sol)) = self.solved.iter().find(|(old_cols, old_rows, ..)| {
            *old_cols == cols && old_rows.iter().all(|row| rows.contains(row))
        }) {
            return Ok(Solved {
                result: SolveResult::Optimal(*obj, sol.clone()),
                runtime: Duration::ZERO,
            });
        }
        let solved = self.inner.solve(model, time_limit)?;
        if let SolveResult::Optimal(obj, sol) = &solved.result {
            self.solved.push((cols, rows, *obj, sol.clone()));
        }
        Ok(solved)
    }

    fn statistics(&self) -> Statistics {
        self.inner.statistics()
    }
}

fn repeated_cut<O: MipOracle>() {
    let mut alg = Counterfactual::<StaleOracle<O>>::new(
        dense(),
        disallow([4]),
        opts(CfKind::Weak, 0.25),
    )
    .unwrap();
    let err = alg.solve(Limits::none()).unwrap_err();
    // the partial trace survives the failure
    let trace = alg.trace();
    assert_eq!(trace.status.to_string(), "error");
    assert_eq!(trace.n_cuts, 1);
    assert!(trace.total_iterations >= 1);
    let cut: ItemSet = trace.cuts[0].iter().copied().collect();
    assert_eq!(err.downcast::<Error>().unwrap(), Error::RepeatedCut(cut));
    assert_eq!(alg.stats().n_cuts, 1);
}

fn lower_bound_monotone<O: MipOracle>() {
    let mut alg = solve::<O>(dense(), disallow([4]), opts(CfKind::Weak, 0.25));
    let cuts: Vec<_> = alg.cuts().iter().cloned().collect();
    let kernel = alg.kernel_mut();
    let mut pool = CutPool::default();
    let mut last = kernel.lower_bound(&pool).unwrap().unwrap();
    assert_eq!(last, LowerBound::Finite(0));
    for cut in cuts {
        pool.insert(cut);
        let lb = kernel.lower_bound(&pool).unwrap().unwrap();
        assert!(lb >= last);
        last = lb;
    }
}

fn bounds_ordered<O: MipOracle>() {
    for (inst, space) in [
        (small(), enforce([0])),
        (mixed(), disallow([5])),
        (
            dense(),
            FavouredSpace {
                caps: vec![LinearCap::new([0, 1, 2].into(), 1)],
                ..Default::default()
            },
        ),
    ] {
        for dev in [0., 0.05, 0.25] {
            let mut alg =
                Counterfactual::<O>::new(inst.clone(), space.clone(), opts(CfKind::Weak, dev))
                    .unwrap();
            let range = alg.kernel_mut().bounds().unwrap().unwrap().unwrap();
            assert!(range.min <= range.max);
            if dev == 0. {
                assert_eq!(range.min, range.max);
            }
        }
    }
}

fn unsupported_strong_combination<O: MipOracle>() {
    let space = FavouredSpace {
        enforced: [0].into(),
        disallowed: [1].into(),
        caps: vec![],
    };
    let err = Counterfactual::<O>::new(small(), space.clone(), opts(CfKind::Strong, 0.2))
        .err()
        .unwrap();
    assert_eq!(
        err.downcast::<Error>().unwrap(),
        Error::UnsupportedStrongCombination
    );
    assert!(Counterfactual::<O>::new(small(), space, opts(CfKind::Weak, 0.2)).is_ok());
}

fn invalid_space<O: MipOracle>() {
    let err = Counterfactual::<O>::new(small(), enforce([4]), opts(CfKind::Weak, 0.2))
        .err()
        .unwrap();
    assert!(matches!(
        err.downcast::<Error>().unwrap(),
        Error::InvalidInstance(_)
    ));
}

fn time_limit<O: MipOracle>() {
    let mut alg =
        Counterfactual::<O>::new(mixed(), enforce([0]), opts(CfKind::Strong, 0.25)).unwrap();
    let res = alg.solve(Limits::time(Duration::ZERO)).unwrap();
    assert_eq!(res, MaybeTerminated::Terminated(Termination::TimeLimit));
    assert_eq!(alg.trace().status.to_string(), "solved:timelimit");
    assert!(alg.incumbent().is_none());
}

fn interrupted<O: MipOracle>() {
    let mut alg =
        Counterfactual::<O>::new(mixed(), enforce([0]), opts(CfKind::Strong, 0.25)).unwrap();
    alg.interrupter().interrupt();
    let res = alg.solve(Limits::none()).unwrap();
    assert_eq!(res, MaybeTerminated::Terminated(Termination::Interrupted));
    assert_eq!(alg.trace().status.to_string(), "solved:interrupted");
    assert_eq!(alg.trace().total_iterations, 0);
}

#[derive(Default)]
struct Counts {
    candidates: usize,
    oracle_calls: usize,
    cuts: usize,
    incumbents: usize,
    open_routines: isize,
    ended: bool,
}

struct CountingLogger(Rc<RefCell<Counts>>);

impl WriteSolverLog for CountingLogger {
    fn log_candidate(&mut self, _target: usize) -> anyhow::Result<()> {
        self.0.borrow_mut().candidates += 1;
        Ok(())
    }

    fn log_oracle_call(
        &mut self,
        _phase: Phase,
        _result: &SolveResult,
        _runtime: Duration,
    ) -> anyhow::Result<()> {
        self.0.borrow_mut().oracle_calls += 1;
        Ok(())
    }

    fn log_cut(&mut self, _cut: &ItemSet, _n_cuts: usize) -> anyhow::Result<()> {
        self.0.borrow_mut().cuts += 1;
        Ok(())
    }

    fn log_incumbent(&mut self, _target: Option<usize>, _cost: usize) -> anyhow::Result<()> {
        self.0.borrow_mut().incumbents += 1;
        Ok(())
    }

    fn log_lower_bound(&mut self, _lb: LowerBound) -> anyhow::Result<()> {
        Ok(())
    }

    fn log_routine_start(&mut self, _desc: &'static str) -> anyhow::Result<()> {
        self.0.borrow_mut().open_routines += 1;
        Ok(())
    }

    fn log_routine_end(&mut self) -> anyhow::Result<()> {
        self.0.borrow_mut().open_routines -= 1;
        Ok(())
    }

    fn log_end_solve(&mut self) -> anyhow::Result<()> {
        self.0.borrow_mut().ended = true;
        Ok(())
    }

    fn log_message(&mut self, _msg: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

fn logging<O: MipOracle>() {
    let counts = Rc::new(RefCell::new(Counts::default()));
    let mut alg =
        Counterfactual::<O>::new(mixed(), enforce([0]), opts(CfKind::Strong, 0.25)).unwrap();
    alg.attach_logger(CountingLogger(counts.clone()));
    alg.solve(Limits::none()).unwrap();
    let (stats, oracle_stats) = alg.all_stats();
    let counts = counts.borrow();
    assert_eq!(counts.candidates, stats.n_candidates);
    assert_eq!(counts.oracle_calls, stats.n_oracle_calls);
    assert_eq!(counts.oracle_calls, oracle_stats.n_solves);
    assert_eq!(counts.cuts, alg.cuts().len());
    assert!(counts.incumbents >= 1);
    assert_eq!(counts.open_routines, 0);
    assert!(counts.ended);
    assert!(alg.detach_logger().is_some());
}

fn trace_serializes<O: MipOracle>() {
    let alg = solve::<O>(small(), enforce([0]), opts(CfKind::Weak, 0.2));
    let value = serde_json::to_value(alg.trace()).unwrap();
    assert_eq!(value["status"], "solved");
    assert_eq!(value["final_ub"], 1);
    assert_eq!(value["already_cf"], false);
    let delta: i64 = value["solution"]["delta"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d.as_i64().unwrap().abs())
        .sum();
    assert_eq!(delta, 1);
}

macro_rules! oracle_tests {
    ($mod:ident, $oracle:ty, [$($test:ident),* $(,)?]) => {
        mod $mod {
            $(
                #[test]
                fn $test() {
                    super::$test::<$oracle>()
                }
            )*
        }
    };
}

#[cfg(feature = "highs")]
oracle_tests!(
    highs,
    knapcf_oracle::HighsOracle,
    [
        nominal_knapsack,
        already_counterfactual,
        no_deviation,
        enforced_item,
        strong_needs_strict_dominance,
        check_deterministic,
        cuts_respected,
        later_cuts_need_not_hold,
        epsilon_stops_early,
        repeated_cut,
        lower_bound_monotone,
        bounds_ordered,
        unsupported_strong_combination,
        invalid_space,
        time_limit,
        interrupted,
        logging,
        trace_serializes,
    ]
);

#[cfg(feature = "gurobi")]
oracle_tests!(
    gurobi,
    knapcf_oracle::GurobiOracle,
    [
        nominal_knapsack,
        already_counterfactual,
        no_deviation,
        enforced_item,
        strong_needs_strict_dominance,
        check_deterministic,
        cuts_respected,
        later_cuts_need_not_hold,
        epsilon_stops_early,
        repeated_cut,
        lower_bound_monotone,
        bounds_ordered,
        unsupported_strong_combination,
        invalid_space,
        time_limit,
        interrupted,
        logging,
        trace_serializes,
    ]
);
