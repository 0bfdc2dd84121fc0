use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use tamarin_tester::config::{BenchSettings, Common, TestSettings};
use tamarin_tester::harness::{self, ProcessRunner};
use tamarin_tester::report::{render_table, SummaryCounts};
use tamarin_tester::reporter::TracingReporter;
use tamarin_tester::runners::bench::Bencher;
use tamarin_tester::runners::test::{TestPolicy, Tester, DEFAULT_CONTINGENCY};
use tamarin_tester::schema::{self, BenchReport, RunMeta, TestReport};
use tamarin_tester::{protocol, store, Mode};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(ClapArgs, Debug)]
struct CommonArgs {
    /// Path to the tamarin binary to benchmark or test.
    #[arg(value_name = "TAMARIN_BINARY")]
    tamarin: PathBuf,

    /// Directory scanned recursively for .spthy files. Defaults to the
    /// current directory.
    #[arg(short, long, value_name = "DIR")]
    protocols: Option<PathBuf>,

    /// Flags passed to tamarin on every invocation. Per-protocol flags go in
    /// a `<protocol>.spthy.flags` file next to the protocol.
    #[arg(long, value_name = "FLAGS", default_value = "", allow_hyphen_values = true)]
    flags: String,
}

impl CommonArgs {
    fn into_common(self) -> anyhow::Result<Common> {
        let protocols = match self.protocols {
            Some(p) => p,
            None => std::env::current_dir().context("reading current directory")?,
        };
        Ok(Common {
            binary: self.tamarin,
            protocols,
            user_flags: self.flags,
        })
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Measure a trusted tamarin build and write a benchmark file.
    Benchmark {
        #[command(flatten)]
        common: CommonArgs,

        /// Maximum seconds for the well-formedness check (mandatory).
        #[arg(long = "max-check", visible_alias = "mc", value_name = "SECS")]
        max_check: Option<f64>,

        /// Maximum seconds for the proof (mandatory).
        #[arg(long = "max-proof", visible_alias = "mp", value_name = "SECS")]
        max_proof: Option<f64>,

        /// Samples per protocol; the mean of the completed ones is recorded.
        #[arg(long, default_value_t = 1)]
        repetitions: u32,

        /// Where to write the benchmark file. Defaults to
        /// `<protocols>/benchmark.res`; an existing file is never overwritten.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Compare a tamarin build against a benchmark file.
    Test {
        #[command(flatten)]
        common: CommonArgs,

        /// Benchmark file to compare against. Defaults to
        /// `<protocols>/benchmark.res`.
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// Each protocol may take its benchmarked time times this factor.
        #[arg(long, default_value_t = DEFAULT_CONTINGENCY)]
        contingency: f64,

        /// Budget for the check phase of unbenchmarkable protocols. Defaults
        /// to the slowest benchmarked check.
        #[arg(long = "max-check", visible_alias = "mc", value_name = "SECS")]
        max_check: Option<f64>,

        /// Budget for the proof phase of unbenchmarkable protocols and the
        /// threshold for --overtime. Defaults to the slowest benchmarked proof
        /// times the contingency factor.
        #[arg(long = "max-proof", visible_alias = "mp", value_name = "SECS")]
        max_proof: Option<f64>,

        /// Skip protocols whose benchmarked proof time exceeds --max-proof and
        /// report them as OVERTIME.
        #[arg(long, default_value_t = false)]
        overtime: bool,

        /// Stop with exit code 1 at the first FAIL or TIMEOUT.
        #[arg(long, default_value_t = false)]
        fail_fast: bool,
    },
}

#[derive(Parser, Debug)]
#[command(name = "tamarin-tester", version)]
#[command(about = "Benchmark a tamarin build, then test other builds against the benchmark")]
struct Args {
    /// Enable debug logging (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write a JSON report of the run. `-` prints it to stdout.
    #[arg(long, value_name = "FILE", global = true)]
    json: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn json_target(json: &Option<PathBuf>) -> Option<Option<&std::path::Path>> {
    json.as_deref()
        .map(|p| if p.as_os_str() == "-" { None } else { Some(p) })
}

fn benchmark(settings: BenchSettings, json: &Option<PathBuf>) -> anyhow::Result<ExitCode> {
    info!(
        binary = %settings.common.binary.display(),
        protocols = %settings.common.protocols.display(),
        output = %settings.output.display(),
        flags = %settings.common.user_flags,
        repetitions = settings.repetitions,
        max_check_secs = settings.budgets.check_secs,
        max_proof_secs = settings.budgets.proof_secs,
        "mode: benchmark"
    );
    let protocols = protocol::scan(&settings.common.protocols)?;

    let mut runner = ProcessRunner::new(&settings.common.binary, &settings.common.user_flags);
    let mut reporter = TracingReporter;
    let store = Bencher::new(
        &mut runner,
        &mut reporter,
        settings.budgets,
        settings.repetitions,
    )
    .run_all(&protocols)?;

    store::write(&settings.output, &store)?;
    info!(path = %settings.output.display(), records = store.len(), "benchmark written");

    if let Some(out) = json_target(json) {
        let report = BenchReport {
            run: RunMeta::new(Mode::Benchmark.as_str(), &settings.common.binary),
            repetitions: settings.repetitions,
            max_check_secs: settings.budgets.check_secs,
            max_proof_secs: settings.budgets.proof_secs,
            records: store.records(),
        };
        schema::emit(&report, out).context("writing JSON report")?;
    }
    Ok(ExitCode::SUCCESS)
}

fn test(settings: TestSettings, json: &Option<PathBuf>) -> anyhow::Result<ExitCode> {
    info!(
        binary = %settings.common.binary.display(),
        protocols = %settings.common.protocols.display(),
        input = %settings.input.display(),
        flags = %settings.common.user_flags,
        contingency = settings.contingency,
        "mode: test"
    );
    let baseline = store::load(&settings.input)?;
    let protocols = protocol::scan(&settings.common.protocols)?;
    // Derived budgets only look at baselines of protocols still in the corpus.
    let scanned = baseline.subset(protocols.iter().map(|p| p.id.as_str()));
    let policy = TestPolicy::new(
        &scanned,
        settings.contingency,
        settings.max_check_secs,
        settings.max_proof_secs,
        settings.overtime,
        settings.fail_fast,
    );

    let mut runner = ProcessRunner::new(&settings.common.binary, &settings.common.user_flags);
    let mut reporter = TracingReporter;
    let run = Tester::new(&mut runner, &mut reporter, policy).run_all(&protocols, &baseline)?;

    print!("{}", render_table(&run));
    let summary = SummaryCounts::from_run(&run);

    if let Some(out) = json_target(json) {
        let report = TestReport {
            run: RunMeta::new(Mode::Test.as_str(), &settings.common.binary),
            contingency: settings.contingency,
            verdicts: &run.verdicts,
            missing: &run.missing,
            summary: summary.clone(),
        };
        schema::emit(&report, out).context("writing JSON report")?;
    }

    if summary.aborted {
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    harness::install_interrupt_handler().context("installing Ctrl-C handler")?;
    info!(version = env!("CARGO_PKG_VERSION"), "tamarin-tester");

    match args.cmd {
        Command::Benchmark {
            common,
            max_check,
            max_proof,
            repetitions,
            output,
        } => {
            let settings =
                BenchSettings::new(common.into_common()?, max_check, max_proof, repetitions, output)?;
            benchmark(settings, &args.json)
        }
        Command::Test {
            common,
            input,
            contingency,
            max_check,
            max_proof,
            overtime,
            fail_fast,
        } => {
            let settings = TestSettings::new(
                common.into_common()?,
                input,
                contingency,
                max_check,
                max_proof,
                overtime,
                fail_fast,
            )?;
            test(settings, &args.json)
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
