use std::{fs, io, path::Path, thread};

use knapcf_core::{
    algs::nominal,
    prepro,
    types::{FavouredSpace, Instance, ItemSet},
    CfOptions, Counterfactual, KernelFunctions, MaybeTerminated, Solve, Trace,
};
use knapcf_oracle::{BuildOracle, MipOracle};
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;

mod cli;
use cli::Cli;

/// The MIP oracle used
#[cfg(feature = "gurobi")]
type Oracle = knapcf_oracle::GurobiOracle;
#[cfg(all(feature = "highs", not(feature = "gurobi")))]
type Oracle = knapcf_oracle::HighsOracle;
#[cfg(not(any(feature = "highs", feature = "gurobi")))]
compile_error!("at least one of the `highs` and `gurobi` features is required");

fn main() -> anyhow::Result<()> {
    let cli = Cli::init();

    match sub_main(&cli) {
        Ok(_) => (),
        Err(err) => {
            cli.error(&format!("{err}"))?;
            cli.error(&format!("{}", err.backtrace()))?;
        }
    };

    Ok(())
}

fn sub_main(cli: &Cli) -> anyhow::Result<()> {
    cli.print_header()?;
    cli.print_solver_config()?;

    if cli.opts.kind.is_strong() && cli.favoured.count() > 1 {
        cli.error(
            "strong counterfactuals are only supported with a single type of favoured constraints",
        )?;
        return Ok(());
    }

    let src = &cli.instance;
    cli.info(&format!(
        "loading {} instance {} with {} items",
        src.kind, src.index, src.size
    ))?;
    let inst = prepro::load(&src.data_dir, src.kind, src.size, src.weight_ub, src.index)?;

    let mut builder = <Oracle as MipOracle>::Builder::new();
    if let Some(threads) = cli.threads {
        builder.threads(threads);
    }
    let mut oracle = builder.init()?;

    let nominal = match nominal::nominal_cover(&mut oracle, &inst)? {
        Some(nominal) => nominal.items,
        None => {
            cli.warning("no selection fills the capacity, sampling around the empty selection")?;
            ItemSet::default()
        }
    };
    let mut rng = StdRng::seed_from_u64(cli.seed);
    let space = prepro::sample_favoured(&inst, &nominal, cli.favoured, &mut rng);
    cli.print_favoured_space(&space)?;

    let mut alg = Counterfactual::with_oracle(oracle, inst.clone(), space.clone(), cli.opts)?;

    // === Set up CLI interaction ===
    // Set up signal handling
    let mut interrupter = alg.interrupter();
    let mut signals = signal_hook::iterator::Signals::new([
        signal_hook::consts::SIGTERM,
        signal_hook::consts::SIGINT,
        signal_hook::consts::SIGXCPU,
        signal_hook::consts::SIGABRT,
    ])?;
    // Thread for catching incoming signals
    thread::spawn(move || {
        for _ in signals.forever() {
            interrupter.interrupt();
        }
    });

    alg.attach_logger(cli.new_cli_logger());

    if let MaybeTerminated::Terminated(term) = alg.solve(cli.limits)? {
        cli.log_termination(&term)?;
    }

    cli.print_trace(alg.trace())?;
    let (stats, oracle_stats) = alg.all_stats();
    cli.print_stats(stats)?;
    cli.print_oracle_stats(oracle_stats)?;

    if let Some(path) = &cli.record_path {
        write_record(
            path,
            &RunRecord {
                instance_type: src.kind.to_string(),
                size: src.size,
                weight_ub: src.weight_ub,
                index: src.index,
                favoured: cli.favoured.to_string(),
                options: cli.opts,
                seed: cli.seed,
                favoured_space: &space,
                instance: &inst,
                total_runtime: alg.trace().total_time,
                trace: alg.trace(),
            },
        )?;
        cli.info(&format!("wrote run record to {path:?}"))?;
    }

    Ok(())
}

/// Everything recorded about one run
#[derive(Serialize)]
struct RunRecord<'a> {
    instance_type: String,
    size: usize,
    weight_ub: usize,
    index: usize,
    favoured: String,
    #[serde(flatten)]
    options: CfOptions,
    seed: u64,
    favoured_space: &'a FavouredSpace,
    instance: &'a Instance,
    total_runtime: f64,
    trace: &'a Trace,
}

fn write_record(path: &Path, record: &RunRecord) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let writer = io::BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer_pretty(writer, record)?;
    Ok(())
}
