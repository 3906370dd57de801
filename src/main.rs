use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;

use cachesim_smp::coherence::{BusCoordinator, Protocol, Statistics, SystemSpec};
use cachesim_smp::report;
use cachesim_smp::sim::EventSystem;
use cachesim_smp::trace::read_trace;

/// Snooping cache coherence simulator for a shared-bus multiprocessor.
#[derive(Parser)]
#[command(name = "cachesim", version)]
struct Cli {
    /// Size of each private cache in bytes
    cache_size: u64,
    /// Ways per set
    assoc: u64,
    /// Line size in bytes
    block_size: u64,
    /// Number of processors (one cache each)
    num_processors: usize,
    /// Coherence protocol: 0/MSI, 1/MESI, 2/MOSI, 3/MOESI
    protocol: Protocol,
    /// Trace of `<proc_id> <r|w> <hex address>` records
    trace_file: PathBuf,
    /// Replay through the asynchronix event-driven engine
    #[arg(long)]
    event_driven: bool,
    /// Print system-wide totals after the per-cache results
    #[arg(long)]
    totals: bool,
}

fn main() -> Result<()> {
    // logging
    let env = Env::default()
        .filter_or("CACHESIM_LOG", "warn")
        .write_style_or("CACHESIM_LOG_STYLE", "auto");
    env_logger::init_from_env(env);

    let cli = Cli::parse();
    let specs = SystemSpec {
        cache_size: cli.cache_size,
        block_size: cli.block_size,
        cache_assoc: cli.assoc,
        num_procs: cli.num_processors,
        protocol: cli.protocol,
    };
    specs.validate().context("invalid cache configuration")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let trace_name = cli.trace_file.file_name().unwrap_or(cli.trace_file.as_os_str());
    report::write_config(&mut out, &specs, &trace_name.to_string_lossy())?;

    let stats = if cli.event_driven {
        run_event_driven(specs, &cli.trace_file)?
    } else {
        run_sequential(specs, &cli.trace_file)?
    };

    for (i, s) in stats.iter().enumerate() {
        report::write_stats(&mut out, i, s)?;
    }
    if cli.totals {
        report::write_totals(&mut out, &stats)?;
    }
    out.flush()?;
    Ok(())
}

fn run_sequential(specs: SystemSpec, path: &Path) -> Result<Vec<Statistics>> {
    let mut bus = BusCoordinator::new(specs)?;
    let trace = read_trace(path, specs.num_procs)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut n = 0usize;
    for rec in trace {
        let rec = rec.with_context(|| format!("reading {}", path.display()))?;
        bus.request(rec.proc_id, rec.op, rec.addr);
        n += 1;
    }
    info!("replayed {n} accesses");
    Ok(report::collect(bus.caches()))
}

fn run_event_driven(specs: SystemSpec, path: &Path) -> Result<Vec<Statistics>> {
    let mut system = EventSystem::new(specs)?;
    let trace = read_trace(path, specs.num_procs)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut n = 0usize;
    for rec in trace {
        let rec = rec.with_context(|| format!("reading {}", path.display()))?;
        system.request(rec.proc_id, rec.op, rec.addr)?;
        n += 1;
    }
    info!("replayed {n} accesses (event-driven)");
    Ok(system.stats()?)
}
