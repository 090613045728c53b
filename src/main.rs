// src/main.rs
//
// Research-harness CLI around the CALF library.
//
// - System precedence: --system > CALF_SYSTEM > default (endi).
// - Controller knobs: preset, then CALF_* env overrides, then CLI flags.
// - Optional per-step JSONL via --log-jsonl; run telemetry via
//   CALF_TELEMETRY_MODE / CALF_TELEMETRY_PATH.
// - Prints the run summary as a single JSON line on stdout.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};

use calf::{
    build_controller, build_dynamics, resolve_effective_system, CalfVariant, ControllerConfig,
    EventSink, FileSink, NoopSink, SimConfig, Simulator, StepRecord, SystemKind, TelemetrySink,
};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SystemArg {
    KinPoint,
    Ni,
    Endi,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum VariantArg {
    ExPost,
    Predictive,
    Plain,
}

#[derive(Debug, Parser)]
#[command(
    name = "calf",
    about = "CALF certified actor-critic with CLF backstepping fallback (research harness)",
    version
)]
struct Cli {
    /// Plant family. If omitted, uses CALF_SYSTEM (default endi).
    #[arg(long, value_enum)]
    system: Option<SystemArg>,

    /// Certification variant.
    #[arg(long, value_enum)]
    variant: Option<VariantArg>,

    /// Number of integrator ticks to run.
    #[arg(long, default_value_t = 1000)]
    steps: u64,

    /// Sampling period (also the integrator tick).
    #[arg(long)]
    dt: Option<f64>,

    /// Run the safe controller alone.
    #[arg(long)]
    safe_only: bool,

    /// Seed for the initial-state perturbation.
    #[arg(long)]
    seed: Option<u64>,

    /// Half-width of the seeded initial-state perturbation.
    #[arg(long, default_value_t = 0.1)]
    spread: f64,

    /// Verbosity: -v, -vv
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Optional JSONL path for the per-step log.
    #[arg(long)]
    log_jsonl: Option<String>,
}

/// Build the step sink as a trait object so we can choose between
/// FileSink and NoopSink at runtime.
fn build_sink(log_jsonl: Option<&str>) -> Box<dyn EventSink> {
    if let Some(path) = log_jsonl {
        match FileSink::create(path) {
            Ok(s) => Box::new(s),
            Err(err) => {
                eprintln!(
                    "Failed to create log file ({path}), \
                     falling back to NoopSink: {err}"
                );
                Box::new(NoopSink)
            }
        }
    } else {
        Box::new(NoopSink)
    }
}

/// Echoes every step to stderr before handing it on (-v).
struct EchoSink {
    inner: Box<dyn EventSink>,
}

impl EventSink for EchoSink {
    fn log_step(&mut self, record: &StepRecord) {
        eprintln!(
            "t={:.3} state={:?} action={:?} lf={:.6e} critic={} actor={}",
            record.time,
            record.state,
            record.action,
            record.safe_certificate,
            record.critic_status.as_str(),
            record.actor_status.as_str()
        );
        self.inner.log_step(record);
    }
}

fn build_config(cli: &Cli, system: SystemKind) -> ControllerConfig {
    let mut cfg = ControllerConfig::from_env_or_system(system);

    if let Some(v) = cli.variant {
        cfg.variant = match v {
            VariantArg::ExPost => CalfVariant::ExPost,
            VariantArg::Predictive => CalfVariant::Predictive,
            VariantArg::Plain => CalfVariant::Plain,
        };
    }
    if let Some(dt) = cli.dt {
        cfg.sampling_time = dt;
        cfg.critic_period = dt;
    }
    if cli.safe_only {
        cfg.safe_only = true;
    }

    cfg
}

fn initial_state(system: SystemKind) -> Vec<f64> {
    match system {
        SystemKind::KinPoint => vec![1.0, -1.0],
        SystemKind::Ni => vec![1.0, 1.0, 0.0],
        SystemKind::Endi => vec![1.0, 1.0, 0.0, 0.0, 0.0],
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cli_system = cli.system.map(|s| match s {
        SystemArg::KinPoint => SystemKind::KinPoint,
        SystemArg::Ni => SystemKind::Ni,
        SystemArg::Endi => SystemKind::Endi,
    });
    let effective = resolve_effective_system(cli_system);
    effective.log_startup();
    let system = effective.system;

    let cfg = build_config(&cli, system);
    let controller = build_controller(&cfg).context("invalid controller configuration")?;

    eprintln!(
        "calf: controller={} system={} dt={} steps={} seed={:?}",
        controller.name(),
        system.as_str(),
        cfg.sampling_time,
        cli.steps,
        cli.seed
    );
    if cli.verbose > 1 {
        eprintln!("calf: config={:#?}", cfg);
    }

    let sim_cfg = SimConfig {
        dt: cfg.sampling_time,
        substeps: 1,
        initial_state: initial_state(system),
        target: cfg
            .observation_target
            .clone()
            .unwrap_or_else(|| vec![0.0; system.observation_dim()]),
        initial_spread: cli.spread,
    };
    let mut sim = Simulator::new(sim_cfg, build_dynamics(&cfg), controller);
    sim.reset(cli.seed);

    let mut sink = build_sink(cli.log_jsonl.as_deref());
    if cli.verbose > 0 {
        sink = Box::new(EchoSink { inner: sink });
    }
    let mut telemetry = TelemetrySink::from_env();

    let summary = sim
        .run(cli.steps, sink.as_mut(), &mut telemetry)
        .context("controller failed during run")?;

    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
