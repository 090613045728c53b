// src/config.rs
//
// Central configuration for the CALF controller.
// This is the single source of truth for sampling periods, acceptance
// thresholds, learning hyperparameters and the fallback controller gains.
// Presets are keyed by the robot model being controlled.

use std::fmt;

use crate::types::ActionBounds;

/// Plant family the controller is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemKind {
    /// Single-integrator point in the plane.
    KinPoint,
    /// Kinematic three-wheel robot (velocity inputs).
    Ni,
    /// Three-wheel robot with force/torque inputs.
    Endi,
}

impl SystemKind {
    /// Return a stable lowercase name (used in logs/telemetry).
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemKind::KinPoint => "kin-point",
            SystemKind::Ni => "ni",
            SystemKind::Endi => "endi",
        }
    }

    /// Parse a system name (case-insensitive). Returns None if unrecognized.
    pub fn parse(s: &str) -> Option<SystemKind> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kin-point" | "kin_point" | "kinpoint" | "point" | "kp" => Some(SystemKind::KinPoint),
            "ni" | "3wrobot-ni" | "3wrobot_ni" | "kinematic" => Some(SystemKind::Ni),
            "endi" | "3wrobot" | "3wrobot-endi" | "dynamic" => Some(SystemKind::Endi),
            _ => None,
        }
    }

    pub fn observation_dim(&self) -> usize {
        match self {
            SystemKind::KinPoint => 2,
            SystemKind::Ni => 3,
            SystemKind::Endi => 5,
        }
    }

    pub fn action_dim(&self) -> usize {
        2
    }
}

/// Scheduling policy of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalfVariant {
    /// Check acceptance after optimizing, gate critic runs by the critic clock.
    ExPost,
    /// Log the predicted certificate and backfill it one sample later.
    Predictive,
    /// Plain actor-critic without any acceptance test.
    Plain,
}

impl CalfVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalfVariant::ExPost => "ex-post",
            CalfVariant::Predictive => "predictive",
            CalfVariant::Plain => "plain",
        }
    }

    pub fn parse(s: &str) -> Option<CalfVariant> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ex-post" | "ex_post" | "expost" | "calf" => Some(CalfVariant::ExPost),
            "predictive" | "pred" | "calf-predictive" => Some(CalfVariant::Predictive),
            "plain" | "rl" | "uncertified" => Some(CalfVariant::Plain),
            _ => None,
        }
    }
}

/// Source of the effective system preset.
///
/// Precedence (highest to lowest):
/// 1. CLI argument (--system)
/// 2. Environment variable (CALF_SYSTEM)
/// 3. Default (Endi)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemSource {
    Cli,
    Env,
    Default,
}

impl SystemSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemSource::Cli => "cli",
            SystemSource::Env => "env",
            SystemSource::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EffectiveSystem {
    pub system: SystemKind,
    pub source: SystemSource,
}

impl EffectiveSystem {
    /// Format: `effective_system=<system> source=<source>`
    pub fn log_startup(&self) {
        eprintln!(
            "effective_system={} source={}",
            self.system.as_str(),
            self.source.as_str()
        );
    }
}

pub fn resolve_effective_system(cli_system: Option<SystemKind>) -> EffectiveSystem {
    if let Some(system) = cli_system {
        return EffectiveSystem {
            system,
            source: SystemSource::Cli,
        };
    }

    if let Ok(env_val) = std::env::var("CALF_SYSTEM") {
        if !env_val.is_empty() {
            if let Some(system) = SystemKind::parse(&env_val) {
                return EffectiveSystem {
                    system,
                    source: SystemSource::Env,
                };
            }
            eprintln!("[config] WARN: invalid CALF_SYSTEM={:?}; ignoring", env_val);
        }
    }

    EffectiveSystem {
        system: SystemKind::Endi,
        source: SystemSource::Default,
    }
}

/// Invalid configuration. Raised at construction, never mid-run.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    NonPositive { name: &'static str, value: f64 },
    Dimension {
        name: &'static str,
        expected: usize,
        got: usize,
    },
    EmptyBuffer { name: &'static str },
    InvertedBounds,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NonPositive { name, value } => {
                write!(f, "{name} must be positive (got {value})")
            }
            ConfigError::Dimension {
                name,
                expected,
                got,
            } => write!(f, "{name} has dimension {got}, expected {expected}"),
            ConfigError::EmptyBuffer { name } => write!(f, "{name} buffer size must be at least 1"),
            ConfigError::InvertedBounds => write!(f, "action bounds must satisfy low <= high"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct CriticConfig {
    /// Number of (observation, action) pairs kept for the TD fit.
    pub buffer_size: usize,
    pub discount_factor: f64,
    /// Required certificate decay rate ν in `ΔV <= -ν·dt·r`.
    pub safe_decay_rate: f64,
    /// Lower certificate bound `c_lb·‖o‖²`.
    pub lb_coefficient: f64,
    /// Upper certificate bound `c_ub·‖o‖²`.
    pub ub_coefficient: f64,
    /// Quadratic penalty weight on violated constraints inside the cost.
    pub constraint_penalty: f64,
    /// None means identity (certificate `‖o‖²`).
    pub initial_weights: Option<Vec<f64>>,
    pub weight_max: f64,
}

#[derive(Debug, Clone)]
pub struct ActorConfig {
    pub buffer_size: usize,
    pub discount_factor: f64,
    pub constraint_penalty: f64,
    /// Row-major `action_dim x observation_dim`. None means zeros.
    pub initial_weights: Option<Vec<f64>>,
    pub weight_max: f64,
}

#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Nelder–Mead iterations per optimized weight.
    pub iters_per_dim: usize,
    pub xtol: f64,
    pub ftol: f64,
}

/// Diagonal running-cost weights.
#[derive(Debug, Clone)]
pub struct ObjectiveConfig {
    pub observation_weights: Vec<f64>,
    pub action_weights: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct SafeControllerConfig {
    pub gain: f64,
    /// ENDI only.
    pub mass: f64,
    /// ENDI only.
    pub inertia: f64,
    pub theta_xtol: f64,
    pub theta_max_evals: usize,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub system: SystemKind,
    pub variant: CalfVariant,
    pub sampling_time: f64,
    pub critic_period: f64,
    pub time_start: f64,
    pub action_bounds: Option<ActionBounds>,
    /// Used when a call does not pass its own target.
    pub observation_target: Option<Vec<f64>>,
    pub action_init: Vec<f64>,
    /// Bypass learning entirely; always act with the safe controller.
    pub safe_only: bool,
    /// Never optimize the critic.
    pub fixed_critic_weights: bool,
    /// Keep the safe certificate/time log in safe-only mode.
    pub record_certificate: bool,
    pub critic: CriticConfig,
    pub actor: ActorConfig,
    pub optimizer: OptimizerConfig,
    pub objective: ObjectiveConfig,
    pub safe: SafeControllerConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::for_system(SystemKind::Endi)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse an env override. Unset or unparsable values yield None; both an
/// accepted override and a parse failure are reported on stderr.
fn env_parse<T: std::str::FromStr + fmt::Display>(name: &str, current: &T) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => {
            eprintln!("[config] {name} = {v} (overrode default)");
            Some(v)
        }
        Err(_) => {
            eprintln!(
                "[config] WARN: could not parse {name} = {:?}; using default {}",
                raw, current
            );
            None
        }
    }
}

impl ControllerConfig {
    /// Preset for a given plant family.
    pub fn for_system(system: SystemKind) -> Self {
        let n = system.observation_dim();
        let m = system.action_dim();

        let mut cfg = ControllerConfig {
            system,
            variant: CalfVariant::ExPost,
            sampling_time: 0.01,
            critic_period: 0.01,
            time_start: 0.0,
            action_bounds: None,
            observation_target: Some(vec![0.0; n]),
            action_init: vec![0.0; m],
            safe_only: false,
            fixed_critic_weights: false,
            record_certificate: true,
            critic: CriticConfig {
                buffer_size: 20,
                discount_factor: 1.0,
                safe_decay_rate: 0.1,
                lb_coefficient: 1e-3,
                ub_coefficient: 1e3,
                constraint_penalty: 1e3,
                initial_weights: None,
                weight_max: 1e3,
            },
            actor: ActorConfig {
                buffer_size: 10,
                discount_factor: 1.0,
                constraint_penalty: 1e3,
                initial_weights: None,
                weight_max: 100.0,
            },
            optimizer: OptimizerConfig {
                iters_per_dim: 200,
                xtol: 1e-4,
                ftol: 1e-4,
            },
            objective: ObjectiveConfig {
                observation_weights: vec![1.0; n],
                action_weights: vec![0.0; m],
            },
            safe: SafeControllerConfig {
                gain: 10.0,
                mass: 10.0,
                inertia: 1.0,
                theta_xtol: 1e-4,
                theta_max_evals: 50,
            },
        };

        match system {
            SystemKind::KinPoint => {
                cfg.sampling_time = 0.1;
                cfg.critic_period = 0.1;
                cfg.action_bounds = ActionBounds::symmetric(&[5.0, 5.0]);
                cfg.critic.safe_decay_rate = 1.0;
                cfg.actor.initial_weights = Some(crate::model::LinearPolicy::proportional_weights(
                    n, m, 1.0,
                ));
                cfg.objective.action_weights = vec![0.1; m];
                cfg.safe.gain = 1.0;
            }
            SystemKind::Ni => {
                cfg.action_bounds = ActionBounds::symmetric(&[50.0, 50.0]);
                cfg.objective.observation_weights = vec![1.0, 1.0, 0.1];
                cfg.objective.action_weights = vec![0.01, 0.01];
            }
            SystemKind::Endi => {
                cfg.action_bounds = ActionBounds::symmetric(&[500.0, 100.0]);
                cfg.objective.observation_weights = vec![1.0, 1.0, 0.1, 0.0, 0.0];
            }
        }

        cfg
    }

    /// Preset plus environment overrides.
    ///
    /// Supported env vars:
    ///   - CALF_SAMPLING_TIME     (f64, seconds)
    ///   - CALF_CRITIC_PERIOD     (f64, seconds)
    ///   - CALF_CONTROLLER_GAIN   (f64)
    ///   - CALF_SAFE_DECAY        (f64)
    ///   - CALF_BUFFER_SIZE       (usize, critic and actor)
    ///   - CALF_OPT_ITERS_PER_DIM (usize, per weight)
    ///   - CALF_OPT_TOL           (f64, x and f tolerance)
    ///   - CALF_VARIANT           (ex-post | predictive | plain)
    ///   - CALF_SAFE_ONLY         (bool)
    ///
    /// Any variable that fails to parse is ignored with a warning.
    pub fn from_env_or_system(system: SystemKind) -> Self {
        let mut cfg = ControllerConfig::for_system(system);

        if let Some(v) = env_parse("CALF_SAMPLING_TIME", &cfg.sampling_time) {
            cfg.sampling_time = v;
        }
        if let Some(v) = env_parse("CALF_CRITIC_PERIOD", &cfg.critic_period) {
            cfg.critic_period = v;
        }
        if let Some(v) = env_parse("CALF_CONTROLLER_GAIN", &cfg.safe.gain) {
            cfg.safe.gain = v;
        }
        if let Some(v) = env_parse("CALF_SAFE_DECAY", &cfg.critic.safe_decay_rate) {
            cfg.critic.safe_decay_rate = v;
        }
        if let Some(v) = env_parse("CALF_BUFFER_SIZE", &cfg.critic.buffer_size) {
            cfg.critic.buffer_size = v;
            cfg.actor.buffer_size = v;
        }
        if let Some(v) = env_parse("CALF_OPT_ITERS_PER_DIM", &cfg.optimizer.iters_per_dim) {
            cfg.optimizer.iters_per_dim = v;
        }
        if let Some(v) = env_parse("CALF_OPT_TOL", &cfg.optimizer.xtol) {
            cfg.optimizer.xtol = v;
            cfg.optimizer.ftol = v;
        }

        if let Ok(raw) = std::env::var("CALF_VARIANT") {
            match CalfVariant::parse(&raw) {
                Some(v) => {
                    cfg.variant = v;
                    eprintln!("[config] CALF_VARIANT = {} (overrode default)", v.as_str());
                }
                None => eprintln!(
                    "[config] WARN: unknown CALF_VARIANT = {:?}; using {}",
                    raw,
                    cfg.variant.as_str()
                ),
            }
        }

        if let Ok(raw) = std::env::var("CALF_SAFE_ONLY") {
            match parse_bool(&raw) {
                Some(v) => {
                    cfg.safe_only = v;
                    eprintln!("[config] CALF_SAFE_ONLY = {v} (overrode default)");
                }
                None => eprintln!(
                    "[config] WARN: could not parse CALF_SAFE_ONLY = {:?}; using default {}",
                    raw, cfg.safe_only
                ),
            }
        }

        cfg
    }

    pub fn observation_dim(&self) -> usize {
        self.system.observation_dim()
    }

    pub fn action_dim(&self) -> usize {
        self.system.action_dim()
    }

    pub fn critic_initial_weights(&self) -> Vec<f64> {
        self.critic
            .initial_weights
            .clone()
            .unwrap_or_else(|| crate::model::QuadraticCritic::identity_weights(self.observation_dim()))
    }

    pub fn actor_initial_weights(&self) -> Vec<f64> {
        self.actor
            .initial_weights
            .clone()
            .unwrap_or_else(|| vec![0.0; self.observation_dim() * self.action_dim()])
    }

    /// Fail fast on anything that would otherwise surface mid-run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let n = self.observation_dim();
        let m = self.action_dim();

        for (name, value) in [
            ("sampling_time", self.sampling_time),
            ("critic_period", self.critic_period),
            ("optimizer.xtol", self.optimizer.xtol),
            ("optimizer.ftol", self.optimizer.ftol),
            ("safe.theta_xtol", self.safe.theta_xtol),
            ("safe.mass", self.safe.mass),
            ("safe.inertia", self.safe.inertia),
        ] {
            if value.is_nan() || value <= 0.0 || value.is_infinite() {
                return Err(ConfigError::NonPositive { name, value });
            }
        }

        if self.critic.buffer_size == 0 {
            return Err(ConfigError::EmptyBuffer { name: "critic" });
        }
        if self.actor.buffer_size == 0 {
            return Err(ConfigError::EmptyBuffer { name: "actor" });
        }

        if let Some(bounds) = &self.action_bounds {
            if bounds.dim() != m {
                return Err(ConfigError::Dimension {
                    name: "action_bounds",
                    expected: m,
                    got: bounds.dim(),
                });
            }
            if bounds.low().iter().zip(bounds.high()).any(|(lo, hi)| lo > hi) {
                return Err(ConfigError::InvertedBounds);
            }
        }

        let dims = [
            (
                "observation_target",
                n,
                self.observation_target.as_ref().map(|t| t.len()),
            ),
            ("action_init", m, Some(self.action_init.len())),
            (
                "critic.initial_weights",
                crate::model::QuadraticCritic::feature_count(n),
                self.critic.initial_weights.as_ref().map(|w| w.len()),
            ),
            (
                "actor.initial_weights",
                n * m,
                self.actor.initial_weights.as_ref().map(|w| w.len()),
            ),
            (
                "objective.observation_weights",
                n,
                Some(self.objective.observation_weights.len()),
            ),
            (
                "objective.action_weights",
                m,
                Some(self.objective.action_weights.len()),
            ),
        ];
        for (name, expected, got) in dims {
            if let Some(got) = got {
                if got != expected {
                    return Err(ConfigError::Dimension {
                        name,
                        expected,
                        got,
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_parse_accepts_aliases() {
        assert_eq!(SystemKind::parse("ENDI"), Some(SystemKind::Endi));
        assert_eq!(SystemKind::parse(" kp "), Some(SystemKind::KinPoint));
        assert_eq!(SystemKind::parse("3wrobot_ni"), Some(SystemKind::Ni));
        assert_eq!(SystemKind::parse("boat"), None);
    }

    #[test]
    fn presets_validate() {
        for system in [SystemKind::KinPoint, SystemKind::Ni, SystemKind::Endi] {
            let cfg = ControllerConfig::for_system(system);
            assert!(cfg.validate().is_ok(), "{}", system.as_str());
            assert_eq!(cfg.critic_initial_weights().len(), {
                let n = system.observation_dim();
                n * (n + 1) / 2
            });
        }
    }

    #[test]
    fn validate_rejects_bad_period() {
        let mut cfg = ControllerConfig::for_system(SystemKind::Ni);
        cfg.sampling_time = 0.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NonPositive {
                name: "sampling_time",
                ..
            })
        ));
    }

    #[test]
    fn validate_rejects_mis_sized_target() {
        let mut cfg = ControllerConfig::for_system(SystemKind::Endi);
        cfg.observation_target = Some(vec![0.0; 3]);
        let err = cfg.validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::Dimension {
                name: "observation_target",
                expected: 5,
                got: 3
            }
        );
        assert!(err.to_string().contains("observation_target"));
    }
}
