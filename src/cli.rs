//! # Command Line Interface for the Search Binary

use std::{
    fmt,
    io::{Error as IOError, Write},
    path::PathBuf,
    time::Duration,
};

use anyhow::Context;
use clap::{crate_authors, crate_name, crate_version, Args, Parser};
use cpu_time::ProcessTime;
use knapcf_core::{
    prepro::{FavouredKinds, InstanceKind},
    types::{FavouredSpace, ItemSet, LowerBound},
    CfKind, CfOptions, Limits, Phase, Stats, Termination, Trace, WriteSolverLog,
};
use knapcf_oracle::{SolveResult, Statistics};
use termcolor::{Buffer, BufferWriter, Color, ColorSpec, WriteColor};

macro_rules! none_if_zero {
    ($val:expr) => {
        if $val == 0 {
            None
        } else {
            Some($val)
        }
    };
}

/// Searches for minimum-cost weight perturbations that make a favoured solution of a knapsack
/// instance optimal
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// The kplib instance family
    instance_type: InstanceKind,
    /// The number of items
    size: usize,
    /// The types of favoured constraints to sample, any combination of `p` (enforced items), `n`
    /// (disallowed items) and `c` (a cap)
    favoured: FavouredKinds,
    /// The maximum relative deviation of every weight, e.g., `0.05` for 5%
    max_deviation: f64,
    /// The index of the kplib instance
    index: usize,
    /// Weak or strong counterfactuals
    kind: CfKind,
    #[command(flatten)]
    source: SourceArgs,
    /// The optimality gap at which the search stops
    #[arg(long, default_value_t = 0.01)]
    epsilon: f64,
    /// The seed for sampling the favoured space
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// The number of threads of the MIP oracle (0 is the oracle default)
    #[arg(long, default_value_t = 0)]
    threads: u32,
    #[command(flatten)]
    limits: LimitArgs,
    #[command(flatten)]
    output: OutputArgs,
    #[command(flatten)]
    log: LogArgs,
}

#[derive(Args)]
struct SourceArgs {
    /// The root directory of the kplib instances
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
    /// The upper bound on item weights of the instance (1000 or 10000)
    #[arg(long, default_value_t = 1000)]
    weight_ub: usize,
}

#[derive(Args)]
struct LimitArgs {
    /// The wall-clock time limit of the search in seconds (0 is no limit)
    #[arg(long, default_value_t = 36000)]
    time_limit: u64,
}

impl From<&LimitArgs> for Limits {
    fn from(args: &LimitArgs) -> Self {
        Limits {
            time: none_if_zero!(args.time_limit).map(Duration::from_secs),
        }
    }
}

#[derive(Args)]
struct OutputArgs {
    /// The directory to write the run record to
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,
    /// Don't write a run record
    #[arg(long)]
    no_trace_file: bool,
}

#[derive(Args)]
struct LogArgs {
    #[command(flatten)]
    color: concolor_clap::Color,
    /// Print the solver configuration
    #[arg(long)]
    print_solver_config: bool,
    /// Print the perturbed weights of the solution
    #[arg(long)]
    print_weights: bool,
    /// Don't print statistics
    #[arg(long)]
    no_print_stats: bool,
    /// Verbosity of the solver output
    #[arg(short, long, default_value_t = 0)]
    verbosity: u8,
    /// Log target objectives as they are explored
    #[arg(long)]
    log_candidates: bool,
    /// Log improved incumbents and lower bounds
    #[arg(long)]
    log_incumbents: bool,
    /// Log cuts as they are found
    #[arg(long)]
    log_cuts: bool,
    /// Log MIP oracle calls
    #[arg(long)]
    log_oracle_calls: bool,
    /// Log routine starts and ends till a given depth
    #[arg(long, default_value_t = 0)]
    log_routines: usize,
}

impl From<&LogArgs> for LoggerConfig {
    fn from(args: &LogArgs) -> Self {
        LoggerConfig {
            log_candidates: args.log_candidates || args.verbosity >= 2,
            log_incumbents: args.log_incumbents || args.verbosity >= 1,
            log_cuts: args.log_cuts || args.verbosity >= 2,
            log_oracle_calls: args.log_oracle_calls || args.verbosity >= 3,
            log_routines: std::cmp::max(args.log_routines, args.verbosity as usize * 2),
        }
    }
}

/// The instance to load
pub struct InstanceArgs {
    pub data_dir: PathBuf,
    pub kind: InstanceKind,
    pub size: usize,
    pub weight_ub: usize,
    pub index: usize,
}

pub struct Cli {
    pub instance: InstanceArgs,
    pub favoured: FavouredKinds,
    pub opts: CfOptions,
    pub limits: Limits,
    pub seed: u64,
    pub threads: Option<u32>,
    /// The path of the run record, `None` if none should be written
    pub record_path: Option<PathBuf>,
    stdout: BufferWriter,
    stderr: BufferWriter,
    print_solver_config: bool,
    print_weights: bool,
    print_stats: bool,
    color: concolor_clap::Color,
    logger_config: LoggerConfig,
}

fn color_choice(color: concolor_clap::Color, stream: atty::Stream) -> termcolor::ColorChoice {
    match color.color {
        concolor_clap::ColorChoice::Always => termcolor::ColorChoice::Always,
        concolor_clap::ColorChoice::Never => termcolor::ColorChoice::Never,
        concolor_clap::ColorChoice::Auto => {
            if atty::is(stream) {
                termcolor::ColorChoice::Auto
            } else {
                termcolor::ColorChoice::Never
            }
        }
    }
}

impl Cli {
    pub fn init() -> Self {
        Self::from_args(CliArgs::parse())
    }

    fn from_args(args: CliArgs) -> Self {
        let record_path = if args.output.no_trace_file {
            None
        } else {
            Some(args.output.output_dir.join(format!(
                "{}_{}_{}_{}_{}_{}_{}.json",
                args.index,
                args.instance_type,
                args.size,
                args.source.weight_ub,
                args.favoured,
                args.max_deviation,
                args.kind,
            )))
        };
        Cli {
            instance: InstanceArgs {
                data_dir: args.source.data_dir,
                kind: args.instance_type,
                size: args.size,
                weight_ub: args.source.weight_ub,
                index: args.index,
            },
            favoured: args.favoured,
            opts: CfOptions {
                kind: args.kind,
                max_deviation: args.max_deviation,
                epsilon: args.epsilon,
            },
            limits: (&args.limits).into(),
            seed: args.seed,
            threads: none_if_zero!(args.threads),
            record_path,
            stdout: BufferWriter::stdout(color_choice(args.log.color, atty::Stream::Stdout)),
            stderr: BufferWriter::stderr(color_choice(args.log.color, atty::Stream::Stderr)),
            print_solver_config: args.log.print_solver_config,
            print_weights: args.log.print_weights,
            print_stats: !args.log.no_print_stats,
            color: args.log.color,
            logger_config: (&args.log).into(),
        }
    }

    pub fn new_cli_logger(&self) -> CliLogger {
        CliLogger {
            stdout: BufferWriter::stdout(color_choice(self.color, atty::Stream::Stdout)),
            config: self.logger_config.clone(),
            routine_stack: vec![],
        }
    }

    pub fn warning(&self, msg: &str) -> Result<(), IOError> {
        Self::print_labelled(&self.stderr, "warning", Color::Yellow, msg)
    }

    pub fn error(&self, msg: &str) -> Result<(), IOError> {
        Self::print_labelled(&self.stderr, "error", Color::Red, msg)
    }

    pub fn info(&self, msg: &str) -> Result<(), IOError> {
        Self::print_labelled(&self.stdout, "info", Color::Blue, msg)
    }

    pub fn log_termination(&self, term: &Termination) -> Result<(), IOError> {
        self.warning(&format!("{}", term))
    }

    pub fn print_header(&self) -> Result<(), IOError> {
        let mut buffer = self.stdout.buffer();
        buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Green)))?;
        write!(buffer, "{}", crate_name!())?;
        buffer.reset()?;
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        writeln!(buffer, " ({})", crate_version!())?;
        buffer.reset()?;
        writeln!(buffer, "{}", crate_authors!("\n"))?;
        write!(buffer, "counterfactuals: ")?;
        buffer.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        writeln!(buffer, "{}", self.opts.kind)?;
        buffer.reset()?;
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        write!(buffer, "==============================")?;
        buffer.reset()?;
        writeln!(buffer)?;
        self.stdout.print(&buffer)?;
        Ok(())
    }

    pub fn print_solver_config(&self) -> Result<(), IOError> {
        if self.print_solver_config {
            let mut buffer = self.stdout.buffer();
            Self::start_block(&mut buffer, "Solver Config")?;
            Self::print_parameter(&mut buffer, "kind", self.opts.kind)?;
            Self::print_parameter(&mut buffer, "max-deviation", self.opts.max_deviation)?;
            Self::print_parameter(&mut buffer, "epsilon", self.opts.epsilon)?;
            Self::print_parameter(&mut buffer, "favoured", self.favoured)?;
            Self::print_parameter(&mut buffer, "seed", self.seed)?;
            Self::print_parameter(&mut buffer, "threads", OptVal::new(self.threads))?;
            Self::print_parameter(
                &mut buffer,
                "time-limit",
                OptVal::new(self.limits.time.map(DurPrinter::new)),
            )?;
            Self::end_block(&mut buffer)?;
            self.stdout.print(&buffer)?;
        }
        Ok(())
    }

    pub fn print_favoured_space(&self, space: &FavouredSpace) -> Result<(), IOError> {
        let mut buffer = self.stdout.buffer();
        Self::start_block(&mut buffer, "Favoured Space")?;
        Self::print_parameter(&mut buffer, "enforced", &space.enforced)?;
        Self::print_parameter(&mut buffer, "disallowed", &space.disallowed)?;
        for cap in &space.caps {
            Self::print_parameter(&mut buffer, "cap", format!("{} <= {}", cap.items, cap.rhs))?;
        }
        Self::end_block(&mut buffer)?;
        self.stdout.print(&buffer)?;
        Ok(())
    }

    pub fn print_trace(&self, trace: &Trace) -> Result<(), IOError> {
        let mut buffer = self.stdout.buffer();
        Self::start_block(&mut buffer, "Result")?;
        Self::print_parameter(&mut buffer, "status", trace.status)?;
        Self::print_parameter(&mut buffer, "already-counterfactual", trace.already_cf)?;
        Self::print_parameter(&mut buffer, "c-min", OptVal::new(trace.c_min))?;
        Self::print_parameter(&mut buffer, "c-max", OptVal::new(trace.c_max))?;
        Self::print_parameter(&mut buffer, "cost", OptVal::new(trace.final_ub))?;
        Self::print_parameter(&mut buffer, "lower-bound", OptVal::new(trace.final_lb))?;
        Self::print_parameter(&mut buffer, "n-iterations", trace.total_iterations)?;
        Self::print_parameter(&mut buffer, "n-cuts", trace.n_cuts)?;
        Self::print_parameter(
            &mut buffer,
            "total-time",
            DurPrinter::new(Duration::from_secs_f64(trace.total_time)),
        )?;
        if let Some(solution) = &trace.solution {
            Self::print_parameter(&mut buffer, "target", OptVal::new(solution.target))?;
            let changed: Vec<_> = solution
                .delta
                .iter()
                .enumerate()
                .filter(|(_, &delta)| delta != 0)
                .map(|(idx, delta)| format!("{idx}:{delta:+}"))
                .collect();
            Self::print_parameter(&mut buffer, "changed-weights", VecPrinter::new(&changed))?;
            if self.print_weights {
                Self::print_parameter(&mut buffer, "weights", VecPrinter::new(&solution.weights))?;
            }
        }
        Self::end_block(&mut buffer)?;
        self.stdout.print(&buffer)?;
        Ok(())
    }

    pub fn print_stats(&self, stats: Stats) -> Result<(), IOError> {
        if self.print_stats {
            let mut buffer = self.stdout.buffer();
            Self::start_block(&mut buffer, "Solver Stats")?;
            Self::print_parameter(&mut buffer, "n-solve-calls", stats.n_solve_calls)?;
            Self::print_parameter(&mut buffer, "n-candidates", stats.n_candidates)?;
            Self::print_parameter(&mut buffer, "n-subproblem-rounds", stats.n_subproblem_rounds)?;
            Self::print_parameter(&mut buffer, "n-cf-checks", stats.n_cf_checks)?;
            Self::print_parameter(&mut buffer, "n-oracle-calls", stats.n_oracle_calls)?;
            Self::print_parameter(&mut buffer, "n-cuts", stats.n_cuts)?;
            Self::print_parameter(&mut buffer, "n-lb-solves", stats.n_lb_solves)?;
            Self::end_block(&mut buffer)?;
            self.stdout.print(&buffer)?;
        }
        Ok(())
    }

    pub fn print_oracle_stats(&self, stats: Statistics) -> Result<(), IOError> {
        if self.print_stats {
            let mut buffer = self.stdout.buffer();
            Self::start_block(&mut buffer, "Oracle Stats")?;
            Self::print_parameter(&mut buffer, "n-solves", stats.n_solves)?;
            Self::print_parameter(&mut buffer, "n-optimal", stats.n_optimal)?;
            Self::print_parameter(&mut buffer, "n-infeasible", stats.n_infeasible)?;
            Self::print_parameter(&mut buffer, "solve-time", DurPrinter::new(stats.runtime))?;
            Self::end_block(&mut buffer)?;
            self.stdout.print(&buffer)?;
        }
        Ok(())
    }

    fn print_parameter<V: fmt::Display>(
        buffer: &mut Buffer,
        name: &str,
        val: V,
    ) -> Result<(), IOError> {
        buffer.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
        write!(buffer, "{}", name)?;
        buffer.reset()?;
        writeln!(buffer, ": {}", val)?;
        Ok(())
    }

    fn print_labelled(
        writer: &BufferWriter,
        label: &str,
        color: Color,
        msg: &str,
    ) -> Result<(), IOError> {
        let mut buffer = writer.buffer();
        buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(color)))?;
        write!(buffer, "{label}")?;
        buffer.reset()?;
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        write!(buffer, ": ")?;
        buffer.reset()?;
        writeln!(buffer, "{msg}")?;
        writer.print(&buffer)
    }

    /// Opens a block of parameters under a title
    fn start_block(buffer: &mut Buffer, title: &str) -> Result<(), IOError> {
        buffer.set_color(ColorSpec::new().set_dimmed(true))?;
        writeln!(buffer, ">>>>>")?;
        buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Blue)))?;
        write!(buffer, "{title}")?;
        buffer.reset()?;
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        writeln!(buffer, ":")?;
        buffer.reset()?;
        Ok(())
    }

    fn end_block(buffer: &mut Buffer) -> Result<(), IOError> {
        buffer.set_color(ColorSpec::new().set_dimmed(true))?;
        write!(buffer, "<<<<<")?;
        buffer.reset()?;
        writeln!(buffer)?;
        Ok(())
    }
}

#[derive(Clone)]
struct LoggerConfig {
    log_candidates: bool,
    log_incumbents: bool,
    log_cuts: bool,
    log_oracle_calls: bool,
    log_routines: usize,
}

pub struct CliLogger {
    stdout: BufferWriter,
    config: LoggerConfig,
    routine_stack: Vec<(&'static str, ProcessTime)>,
}

impl CliLogger {
    /// Prints one log line with a coloured label and a cpu-time stamp
    fn log_line(&self, label: &str, color: Color, details: fmt::Arguments) -> anyhow::Result<()> {
        let mut buffer = self.stdout.buffer();
        buffer.set_color(ColorSpec::new().set_fg(Some(color)))?;
        write!(buffer, "{label}")?;
        buffer.reset()?;
        writeln!(
            buffer,
            ": {details}; cpu-time: {}",
            DurPrinter::new(ProcessTime::now().as_duration())
        )?;
        self.stdout.print(&buffer)?;
        Ok(())
    }
}

impl WriteSolverLog for CliLogger {
    fn log_candidate(&mut self, target: usize) -> anyhow::Result<()> {
        if self.config.log_candidates {
            self.log_line("candidate", Color::Magenta, format_args!("target: {target}"))?;
        }
        Ok(())
    }

    fn log_oracle_call(
        &mut self,
        phase: Phase,
        result: &SolveResult,
        runtime: Duration,
    ) -> anyhow::Result<()> {
        if self.config.log_oracle_calls {
            self.log_line(
                "oracle call",
                Color::Magenta,
                format_args!(
                    "phase: {phase}; result: {result}; runtime: {}",
                    DurPrinter::new(runtime)
                ),
            )?;
        }
        Ok(())
    }

    fn log_cut(&mut self, cut: &ItemSet, n_cuts: usize) -> anyhow::Result<()> {
        if self.config.log_cuts {
            self.log_line(
                "cut",
                Color::Magenta,
                format_args!("items: {cut}; n-cuts: {n_cuts}"),
            )?;
        }
        Ok(())
    }

    fn log_incumbent(&mut self, target: Option<usize>, cost: usize) -> anyhow::Result<()> {
        if self.config.log_incumbents {
            self.log_line(
                "incumbent",
                Color::Cyan,
                format_args!("cost: {cost}; target: {}", OptVal::new(target)),
            )?;
        }
        Ok(())
    }

    fn log_lower_bound(&mut self, lb: LowerBound) -> anyhow::Result<()> {
        if self.config.log_incumbents {
            self.log_line("lower bound", Color::Cyan, format_args!("{lb}"))?;
        }
        Ok(())
    }

    fn log_routine_start(&mut self, desc: &'static str) -> anyhow::Result<()> {
        self.routine_stack.push((desc, ProcessTime::now()));

        if self.config.log_routines >= self.routine_stack.len() {
            self.log_line(">>> routine start", Color::Green, format_args!("{desc}"))?;
        }
        Ok(())
    }

    fn log_routine_end(&mut self) -> anyhow::Result<()> {
        let (desc, start) = self
            .routine_stack
            .pop()
            .context("routine stack out of sync")?;

        if self.config.log_routines > self.routine_stack.len() {
            let duration = DurPrinter::new(ProcessTime::now().duration_since(start));
            self.log_line(
                "<<< routine end",
                Color::Red,
                format_args!("{desc}; duration: {duration}"),
            )?;
        }
        Ok(())
    }

    fn log_end_solve(&mut self) -> anyhow::Result<()> {
        while !self.routine_stack.is_empty() {
            self.log_routine_end()?;
        }
        Ok(())
    }

    fn log_message(&mut self, msg: &str) -> anyhow::Result<()> {
        self.log_line("message", Color::Blue, format_args!("{msg}"))
    }
}

struct OptVal<T> {
    val: Option<T>,
}

impl<T> OptVal<T> {
    fn new(val: Option<T>) -> Self {
        OptVal { val }
    }
}

impl<T: fmt::Display> fmt::Display for OptVal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.val {
            Some(t) => fmt::Display::fmt(&t, f),
            None => write!(f, "none"),
        }
    }
}

struct VecPrinter<'a, C>
where
    C: 'a,
{
    vals: &'a [C],
}

impl<'a, C> VecPrinter<'a, C> {
    fn new(vals: &'a [C]) -> Self {
        VecPrinter { vals }
    }
}

impl<C: fmt::Display> fmt::Display for VecPrinter<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (idx, val) in self.vals.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", val)?;
        }
        write!(f, ")")
    }
}

struct DurPrinter {
    dur: Duration,
}

impl DurPrinter {
    fn new(dur: Duration) -> Self {
        Self { dur }
    }
}

impl fmt::Display for DurPrinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.dur)
    }
}
