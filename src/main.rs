//! Benchmark harness CLI
//!
//! `run` drives a suite of benchmark configurations through the external
//! binary and records one CSV per run; `graph` turns recorded results into
//! chart artifacts; `compare` builds the ours-vs-baseline charts from
//! explicit directories.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use voxel_bench::chart::JsonRenderer;
use voxel_bench::recorder::CancelFlag;
use voxel_bench::reduce::DEFAULT_WARMUP_SECONDS;
use voxel_bench::suite::{self, Suite, SuiteRunner};

#[derive(Parser, Debug)]
#[command(author, version, about = "Benchmark driver and telemetry aggregation for the voxel renderer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a benchmark suite and record one result CSV per run
    Run(RunArgs),
    /// Produce chart artifacts from recorded results
    Graph(GraphArgs),
    /// Produce ours-vs-baseline comparison charts from explicit directories
    Compare(CompareArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Suite to execute
    #[arg(long, value_enum, default_value = "static-locations")]
    suite: SuiteArg,

    /// Path to the benchmark binary
    #[arg(long)]
    program: PathBuf,

    /// Working directory the binary expects to run in
    #[arg(long, default_value = ".")]
    working_dir: PathBuf,

    /// Directory to place per-suite result directories under
    #[arg(long, default_value = ".")]
    results: PathBuf,

    /// Re-run configurations whose result file already exists
    #[arg(long)]
    force: bool,
}

#[derive(Parser, Debug)]
struct GraphArgs {
    /// Suite whose results to graph
    #[arg(long, value_enum, default_value = "static-locations")]
    suite: SuiteArg,

    /// Directory holding the per-suite result directories
    #[arg(long, default_value = ".")]
    results: PathBuf,

    /// Directory to place per-suite figure directories under
    #[arg(long, default_value = ".")]
    figures: PathBuf,

    /// Warm-up window to discard before averaging, in seconds
    #[arg(long, default_value_t = DEFAULT_WARMUP_SECONDS)]
    warmup: f64,
}

#[derive(Parser, Debug)]
struct CompareArgs {
    /// Directory of our comparison-run result CSVs
    #[arg(long)]
    ours: PathBuf,

    /// Directory of baseline logs, named `<total_resolution>.txt`
    #[arg(long)]
    baseline: PathBuf,

    /// Directory to write the comparison charts to
    #[arg(long, default_value = "compare_figures")]
    figures: PathBuf,

    /// Warm-up window to discard before averaging, in seconds
    #[arg(long, default_value_t = DEFAULT_WARMUP_SECONDS)]
    warmup: f64,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
enum SuiteArg {
    StaticLocations,
    CameraPaths,
    Movement,
    Comparison,
}

impl From<SuiteArg> for Suite {
    fn from(arg: SuiteArg) -> Self {
        match arg {
            SuiteArg::StaticLocations => Self::StaticLocations,
            SuiteArg::CameraPaths => Self::CameraPaths,
            SuiteArg::Movement => Self::Movement,
            SuiteArg::Comparison => Self::Comparison,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => {
            let cancel = CancelFlag::new();
            install_sigint_handler(&cancel);
            let runner = SuiteRunner::new(&args.program, &args.working_dir, &args.results)
                .force(args.force)
                .cancel_flag(cancel);
            runner.run(args.suite.into())?;
            Ok(())
        }
        Command::Graph(args) => {
            suite::graph(
                args.suite.into(),
                &args.results,
                &args.figures,
                args.warmup,
                &JsonRenderer,
            )?;
            Ok(())
        }
        Command::Compare(args) => {
            suite::graph_comparison(
                &args.ours,
                &args.baseline,
                &args.figures,
                args.warmup,
                &JsonRenderer,
            )?;
            Ok(())
        }
    }
}

/// Route SIGINT to the recorder's cancel flag so an interrupted run still
/// terminates its subprocess and finalizes the partial record.
fn install_sigint_handler(cancel: &CancelFlag) {
    #[cfg(unix)]
    sigint::install(cancel.clone());
    #[cfg(not(unix))]
    let _ = cancel;
}

#[cfg(unix)]
mod sigint {
    use std::sync::OnceLock;

    use voxel_bench::recorder::CancelFlag;

    static CANCEL: OnceLock<CancelFlag> = OnceLock::new();

    extern "C" fn handle(_signal: libc::c_int) {
        // Only atomics in here; a signal handler cannot allocate or lock.
        if let Some(flag) = CANCEL.get() {
            flag.cancel();
        }
    }

    pub fn install(cancel: CancelFlag) {
        let _ = CANCEL.set(cancel);
        let handler: extern "C" fn(libc::c_int) = handle;
        // SAFETY: installing a handler that only touches atomics.
        unsafe {
            libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        }
    }
}
