//! CALF: certified actor-critic control with a safe fallback.
//!
//! This crate exposes the sampled CALF orchestrator, the actor/critic
//! contracts, the CLF backstepping fallback controllers for three-wheel
//! robots and a small simulation harness. The binary (`src/main.rs`) is a
//! thin research harness around these components.

pub mod actor;
pub mod buffer;
pub mod calf;
pub mod clock;
pub mod config;
pub mod controller;
pub mod critic;
pub mod diagnostics;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod objective;
pub mod optimizer;
pub mod plant;
pub mod predictor;
pub mod safe;
pub mod sim;
pub mod telemetry;
pub mod types;
pub mod weights;

// --- Re-exports for ergonomic external use ---------------------------------

pub use calf::{CalfController, SampleCounters};

pub use clock::Clock;

pub use config::{
    resolve_effective_system, CalfVariant, ConfigError, ControllerConfig, EffectiveSystem,
    SystemKind, SystemSource,
};

pub use controller::{
    build_controller, build_controller_with, build_dynamics, build_safe_controller, Certified,
    Controller, ControllerError, Resettable, Sampled,
};

pub use diagnostics::{CriticStats, DiagnosticEvent, DiagnosticLog, RejectReason};

pub use logging::{EventSink, FileSink, MemorySink, NoopSink};

pub use optimizer::{NelderMead, OptimizeResult, Optimizer};

pub use safe::{
    EndiBacksteppingController, KinPointController, NiBacksteppingController, SafeController,
    SampledController,
};

pub use sim::{RunSummary, SimConfig, Simulator, StepRecord};

pub use telemetry::{TelemetryConfig, TelemetrySink};

pub use types::{AcceptanceStatus, ActionBounds};
