mod manager;

use crate::manager::Manager;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
};

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    /// Simulation directory holding `config.toml` (not used by `simulate`).
    #[arg(long)]
    sim_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one simulation and write its snapshots as JSON.
    Simulate {
        #[arg(long)]
        agents: usize,

        #[arg(long)]
        neighbors: usize,

        /// Fraction (`0.8`) or percentage (`80%`).
        #[arg(long, value_parser = parse_threshold)]
        threshold: f64,

        #[arg(long)]
        iterations: usize,

        #[arg(long)]
        seed: Option<u64>,

        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    Create {
        #[arg(long)]
        seed: Option<u64>,
    },

    Export {
        #[arg(long)]
        run_idx: usize,
    },

    Analyze,

    Clean,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    let command = match args.command {
        Command::Simulate {
            agents,
            neighbors,
            threshold,
            iterations,
            seed,
            output,
        } => {
            let mut cfg = segregate::Config::new(agents, neighbors, threshold, iterations);
            cfg.run.seed = seed;
            let snapshots = segregate::run(&cfg).context("failed to run simulation")?;
            return write_snapshots(&snapshots, output);
        }
        command => command,
    };

    let sim_dir = args
        .sim_dir
        .context("--sim-dir is required for this command")?;
    let mgr = Manager::new(sim_dir).context("failed to construct mgr")?;

    match command {
        Command::Create { seed } => mgr.create_run(seed)?,
        Command::Export { run_idx } => mgr.export_run(run_idx)?,
        Command::Analyze => mgr.analyze_sim()?,
        Command::Clean => mgr.clean_sim()?,
        Command::Simulate { .. } => {}
    }

    Ok(())
}

fn write_snapshots(snapshots: &[segregate::Snapshot], output: Option<PathBuf>) -> Result<()> {
    let writer: Box<dyn Write> = match output {
        Some(file) => Box::new(
            File::create(&file).with_context(|| format!("failed to create {file:?}"))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = BufWriter::new(writer);
    serde_json::to_writer(&mut writer, snapshots).context("failed to serialize snapshots")?;
    writeln!(writer).context("failed to write snapshots")?;
    writer.flush().context("failed to flush writer stream")?;
    Ok(())
}

fn parse_threshold(arg: &str) -> Result<f64, String> {
    let (num, scale) = match arg.strip_suffix('%') {
        Some(num) => (num, 100.0),
        None => (arg, 1.0),
    };
    let num: f64 = num
        .trim()
        .parse()
        .map_err(|err| format!("invalid threshold {arg:?}: {err}"))?;
    Ok(num / scale)
}
