//! Scenario engine command line.
//!
//! Runs, validates and generates scenario files without an editor.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use scenario_engine::{
    config::{EngineConfig, LoggingSettings},
    device::{DeviceRegistry, IoDevice, LoopbackDevice},
    scenario::{BlockId, BlockKind, PortRef, RunOutcome, Runner, Scenario},
};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "scenario-engine", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scenario and print the run report.
    Run(RunArgs),
    /// Load a scenario and check that it can run.
    Validate {
        /// Scenario JSON file.
        scenario: PathBuf,
    },
    /// List block kinds and their stable tags.
    Kinds,
    /// Write a demo scenario (start, constant, loop, log, end).
    Demo {
        /// Output JSON path.
        out: PathBuf,
    },
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Scenario JSON file.
    scenario: PathBuf,

    /// Engine config (TOML). Defaults to the platform config directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Register an in-memory loopback device under this name.
    #[arg(long = "loopback", value_name = "DEVICE")]
    loopback: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.cmd {
        Command::Run(RunArgs {
            config: Some(path), ..
        }) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        _ => EngineConfig::load_or_default(),
    };
    let _log_guard = init_logging(&config.logging);

    match cli.cmd {
        Command::Run(args) => run(&args, config),
        Command::Validate { scenario } => validate(&scenario),
        Command::Kinds => {
            for kind in BlockKind::all() {
                println!("{:>4}  {:<16} {}", kind.tag(), kind.display_name(), kind.description());
            }
            Ok(())
        }
        Command::Demo { out } => {
            let scenario = demo_scenario();
            scenario
                .save(&out)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Wrote demo scenario to {}", out.display());
            Ok(())
        }
    }
}

/// Console output plus an optional daily-rolling file. The returned guard
/// flushes the file writer when dropped.
fn init_logging(settings: &LoggingSettings) -> Option<WorkerGuard> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.filter))
    };

    let (file_layer, guard) = match &settings.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "scenario-engine.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter()))
        .with(file_layer)
        .init();
    guard
}

fn run(args: &RunArgs, config: EngineConfig) -> anyhow::Result<()> {
    let mut scenario = Scenario::load(&args.scenario)
        .with_context(|| format!("failed to load {}", args.scenario.display()))?;

    let mut devices = DeviceRegistry::new();
    for name in &args.loopback {
        let mut device = LoopbackDevice::new(name.clone());
        device
            .init()
            .with_context(|| format!("failed to initialize loopback device '{}'", name))?;
        devices.register(name.clone(), device);
    }

    let mut runner = Runner::new(config.runner).with_devices(devices);
    let report = runner.run(&mut scenario);
    println!("Outcome:  {}", report.outcome);
    println!("Steps:    {}", report.steps);
    println!("Duration: {} ms", report.duration().num_milliseconds());
    for (id, block) in scenario.blocks() {
        let count = report.executions_of(id);
        if count > 0 {
            println!("  {:>4} {:<24} x{}", id, block.core().title(), count);
        }
    }

    match report.outcome {
        RunOutcome::Completed => Ok(()),
        RunOutcome::Cancelled => anyhow::bail!("run cancelled"),
        RunOutcome::Aborted(reason) => Err(anyhow::Error::new(reason).context("run aborted")),
    }
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let scenario =
        Scenario::load(path).with_context(|| format!("failed to load {}", path.display()))?;
    scenario.validate().context("scenario cannot run")?;
    println!(
        "{}: {} blocks, {} connections, ok",
        path.display(),
        scenario.block_count(),
        scenario.connection_count()
    );
    Ok(())
}

/// Start -> Merge -> Loop(3); the repeat branch logs the constant and
/// returns to the merge, the done branch ends the run.
fn demo_scenario() -> Scenario {
    let mut scenario = Scenario::new();
    let start = scenario.add_block_of_kind(BlockKind::FlowStart);
    let constant = scenario.add_block_of_kind(BlockKind::ConstantValue);
    let merge = scenario.add_block_of_kind(BlockKind::FlowMerge);
    let repeat = scenario.add_block_of_kind(BlockKind::Loop);
    let log = scenario.add_block_of_kind(BlockKind::Log);
    let end = scenario.add_block_of_kind(BlockKind::FlowEnd);

    let links: [(BlockId, &str, BlockId, &str); 6] = [
        (start, "flowOut", merge, "flowIn1"),
        (merge, "flowOut", repeat, "flowIn"),
        (repeat, "flowOutRepeat", log, "flowIn"),
        (log, "flowOut", merge, "flowIn2"),
        (repeat, "flowOutDone", end, "flowIn"),
        (constant, "dataOut", log, "dataIn"),
    ];
    for (from, out, to, input) in links {
        if !scenario.add_connection(PortRef::new(from, out), PortRef::new(to, input)) {
            tracing::warn!("Demo link {}.{} -> {}.{} rejected", from, out, to, input);
        }
    }
    scenario
}
