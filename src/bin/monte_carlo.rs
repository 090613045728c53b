// src/bin/monte_carlo.rs
//
// Monte Carlo harness: many seeded episodes of one controller.
//
// - Run i resets the simulator with seed + i, which perturbs the initial
//   state uniformly within --spread.
// - The controller is built once; episodes are separated by reset(), so
//   learned weights carry over from one run to the next.
// - Prints one line per run (unless --quiet) and a JSON batch summary.
//
// Run examples:
//   cargo run --bin monte_carlo -- --system ni --runs 20 --steps 800 --seed 7
//   CALF_VARIANT=predictive cargo run --bin monte_carlo -- --runs 50 --csv runs.csv --quiet

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use calf::metrics::BatchStats;
use calf::{
    build_controller, build_dynamics, resolve_effective_system, ControllerConfig, NoopSink,
    SimConfig, Simulator, SystemKind, TelemetrySink,
};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SystemArg {
    KinPoint,
    Ni,
    Endi,
}

#[derive(Debug, Parser)]
#[command(name = "monte_carlo", about = "CALF Monte Carlo harness")]
struct Args {
    #[arg(long, value_enum)]
    system: Option<SystemArg>,

    #[arg(long, default_value_t = 20)]
    runs: u64,

    /// Integrator ticks per run.
    #[arg(long, default_value_t = 1000)]
    steps: u64,

    /// Base seed. Run i uses seed + i.
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Half-width of the initial-state perturbation.
    #[arg(long, default_value_t = 0.5)]
    spread: f64,

    /// Planar distance counted as converged.
    #[arg(long, default_value_t = 1e-2)]
    tolerance: f64,

    #[arg(long)]
    safe_only: bool,

    /// Per-run CSV rows.
    #[arg(long)]
    csv: Option<PathBuf>,

    #[arg(long)]
    quiet: bool,
}

fn nominal_state(system: SystemKind) -> Vec<f64> {
    match system {
        SystemKind::KinPoint => vec![1.0, -1.0],
        SystemKind::Ni => vec![1.0, 1.0, 0.0],
        SystemKind::Endi => vec![1.0, 1.0, 0.0, 0.0, 0.0],
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.runs == 0 {
        anyhow::bail!("--runs must be >= 1");
    }

    let effective = resolve_effective_system(args.system.map(|s| match s {
        SystemArg::KinPoint => SystemKind::KinPoint,
        SystemArg::Ni => SystemKind::Ni,
        SystemArg::Endi => SystemKind::Endi,
    }));
    effective.log_startup();
    let system = effective.system;

    let mut cfg = ControllerConfig::from_env_or_system(system);
    if args.safe_only {
        cfg.safe_only = true;
    }
    let controller = build_controller(&cfg).context("invalid controller configuration")?;

    let target = cfg
        .observation_target
        .clone()
        .unwrap_or_else(|| vec![0.0; system.observation_dim()]);
    let mut sim = Simulator::new(
        SimConfig {
            dt: cfg.sampling_time,
            substeps: 1,
            initial_state: nominal_state(system),
            target,
            initial_spread: args.spread,
        },
        build_dynamics(&cfg),
        controller,
    );

    let mut csv = match &args.csv {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            let mut w = BufWriter::new(file);
            writeln!(
                w,
                "run,seed,planar_distance,final_certificate,fallbacks,samples,certificate_increases"
            )?;
            Some(w)
        }
        None => None,
    };

    let mut telemetry = TelemetrySink::from_env();
    let mut batch = BatchStats::default();

    for i in 0..args.runs {
        let seed = args.seed.wrapping_add(i);
        sim.reset(Some(seed));
        let summary = sim
            .run(args.steps, &mut NoopSink, &mut telemetry)
            .with_context(|| format!("run {i} (seed {seed})"))?;

        let (fallbacks, samples) = summary
            .counters
            .map(|c| (c.fallbacks, c.samples))
            .unwrap_or((0, 0));

        if !args.quiet {
            println!(
                "run={i} seed={seed} dist={:.3e} lf={:.3e} fallbacks={fallbacks}/{samples} increases={}",
                summary.planar_distance, summary.final_certificate, summary.certificate_increases
            );
        }
        if let Some(w) = csv.as_mut() {
            writeln!(
                w,
                "{i},{seed},{},{},{fallbacks},{samples},{}",
                summary.planar_distance, summary.final_certificate, summary.certificate_increases
            )?;
        }

        batch.add(&summary, args.tolerance);
    }

    if let Some(w) = csv.as_mut() {
        w.flush()?;
    }

    println!("{}", serde_json::to_string(&batch)?);
    Ok(())
}
