//! FP-Growth Sweep Benchmark Runner
//!
//! Usage:
//!   fpgrowth-bench sweep.toml                         # run the configured sweep
//!   fpgrowth-bench sweep.toml --backend cluster -p 8  # override the backend
//!   fpgrowth-bench sweep.yaml --runs 10 --out results # more runs, custom output dir
//!   fpgrowth-bench sweep.json --strict                # exit 2 if any repetition failed

use clap::Parser;
use colored::Colorize;
use fpgrowth_bench::adapters::build_backend;
use fpgrowth_bench::config::{BackendKind, SweepConfig};
use fpgrowth_bench::report::{self, DirectoryReporter};
use fpgrowth_bench::session::{with_session, ClusterSession, SessionConfig};
use fpgrowth_bench::sweep::SweepDriver;
use fpgrowth_bench::BenchResult;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "fpgrowth-bench", about = "Timed FP-Growth minimum-support sweep")]
#[command(version)]
struct Cli {
    /// Sweep configuration (.toml, .yaml or .json).
    config: PathBuf,

    /// Override the backend kind (local, cluster).
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Override the number of partitions for the cluster backend.
    #[arg(short = 'p', long)]
    partitions: Option<usize>,

    /// Count result materialization inside the timed window.
    #[arg(long)]
    count_materialization: bool,

    /// Override the number of timed repetitions per point.
    #[arg(long)]
    runs: Option<usize>,

    /// Output directory for the JSON report and CSV files.
    #[arg(long, default_value = "results")]
    out: PathBuf,

    /// Exit with status 2 if any repetition failed.
    #[arg(long)]
    strict: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    debug: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut SweepConfig) -> BenchResult<()> {
        if let Some(kind) = self.backend {
            config.backend.kind = kind;
        }
        if let Some(n) = self.partitions {
            config.backend.num_partitions = Some(n);
        }
        if self.count_materialization {
            config.backend.count_materialization = true;
        }
        if let Some(runs) = self.runs {
            config.num_runs = runs;
        }
        config.validate()
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays the report table.
    let filter = if cli.debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) if cli.strict => ExitCode::from(2),
        Ok(false) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("  {} {}", "FAILED".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every repetition produced a sample.
fn run(cli: &Cli) -> BenchResult<bool> {
    let mut config = SweepConfig::load(&cli.config)?;
    cli.apply_overrides(&mut config)?;

    println!(
        "\n{}",
        "╔══════════════════════════════════════════════════════╗"
            .bold()
            .blue()
    );
    println!(
        "{}",
        "║          FP-Growth Sweep Benchmark                   ║"
            .bold()
            .blue()
    );
    println!(
        "{}",
        "╚══════════════════════════════════════════════════════╝"
            .bold()
            .blue()
    );
    println!(
        "  Data: {}  Backend: {}  Runs: {}  Warmup: {}  Supports: {:?}",
        config.data_file.display(),
        config.backend.kind,
        config.num_runs,
        config.warmup_runs,
        config.min_supports
    );

    let sink = DirectoryReporter::new(&cli.out);
    let complete = match config.backend.kind {
        BackendKind::Local => sweep(config, None, &sink)?,
        BackendKind::Cluster => {
            let session_cfg = SessionConfig::new("fpgrowth-bench", config.backend.partitions());
            with_session(session_cfg, |session| sweep(config, Some(session), &sink))?
        }
    };

    println!(
        "\n  {} results written to {}",
        "✓".green().bold(),
        sink.dir().display()
    );
    if !complete {
        println!(
            "  {} some repetitions failed; see `failures` in the report",
            "WARN".yellow().bold()
        );
    }
    Ok(complete)
}

fn sweep(
    config: SweepConfig,
    session: Option<&ClusterSession>,
    sink: &DirectoryReporter,
) -> BenchResult<bool> {
    let mut backend = build_backend(&config.backend, session)?;
    let mut driver = SweepDriver::new(config)?.on_point(|_, point| {
        let status = if point.failed_runs == 0 {
            "OK".green()
        } else {
            "PARTIAL".yellow()
        };
        match point.mean_time_seconds {
            Some(mean) => println!(
                "  {:>7} min_support={:<8} mean={:.4}s samples={}",
                status,
                point.min_support,
                mean,
                point.raw_times_seconds.len()
            ),
            None => println!(
                "  {:>7} min_support={:<8} no successful samples",
                "FAILED".red(),
                point.min_support
            ),
        }
    });

    let report = driver.run(backend.as_mut())?;
    report::print_report(&report);
    driver.publish(&report, sink)?;
    Ok(report.complete)
}
