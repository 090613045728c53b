// src/controller.rs
//
// Capability traits, the controller facade and its construction.
//
// - Sampled:    zero-order-hold entry point driven by the plant's clock
// - Certified:  reports a Lyapunov-like certificate for any state
// - Resettable: rewinds episode state
//
// `Controller` is chosen once at construction: either the learned CALF
// composite or the pure safe controller behind the same sampled interface.

use std::fmt;

use crate::actor::Actor;
use crate::calf::CalfController;
use crate::config::{ConfigError, ControllerConfig, SystemKind};
use crate::critic::Critic;
use crate::model::{LinearPolicy, QuadraticCritic};
use crate::objective::RunningObjective;
use crate::optimizer::{NelderMead, Optimizer};
use crate::plant::{Dynamics, KinematicPoint, ThreeWheelRobotEndi, ThreeWheelRobotNi};
use crate::predictor::EulerPredictor;
use crate::safe::{
    EndiBacksteppingController, KinPointController, NiBacksteppingController, SafeController,
    SampledController,
};

pub trait Sampled {
    /// Held action between sampling instants; a fresh one at each instant.
    fn compute_action_sampled(
        &mut self,
        time: f64,
        observation: &[f64],
        target: Option<&[f64]>,
    ) -> Result<Vec<f64>, ControllerError>;

    /// Currently held action.
    fn action(&self) -> &[f64];
}

pub trait Certified {
    /// Certificate value for an observation expressed relative to target.
    /// NaN when the observation does not have the controller's dimension.
    fn compute_lf(&self, observation: &[f64]) -> f64;
}

pub trait Resettable {
    fn reset(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControllerError {
    /// No target passed on this call and none was ever configured.
    MissingTarget,
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    Config(ConfigError),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::MissingTarget => {
                write!(f, "no observation target set before the first action")
            }
            ControllerError::DimensionMismatch {
                what,
                expected,
                got,
            } => write!(f, "{what} has dimension {got}, expected {expected}"),
            ControllerError::Config(e) => write!(f, "invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ControllerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ControllerError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for ControllerError {
    fn from(e: ConfigError) -> Self {
        ControllerError::Config(e)
    }
}

/// Check the observation size and settle the target for this call.
///
/// A non-empty `incoming` target replaces the stored one; an empty or
/// missing one falls back to whatever was stored before.
pub(crate) fn resolve_target(
    stored: &mut Option<Vec<f64>>,
    incoming: Option<&[f64]>,
    observation: &[f64],
    dim: usize,
) -> Result<Vec<f64>, ControllerError> {
    if observation.len() != dim {
        return Err(ControllerError::DimensionMismatch {
            what: "observation",
            expected: dim,
            got: observation.len(),
        });
    }
    if let Some(t) = incoming.filter(|t| !t.is_empty()) {
        if t.len() != dim {
            return Err(ControllerError::DimensionMismatch {
                what: "observation_target",
                expected: dim,
                got: t.len(),
            });
        }
        *stored = Some(t.to_vec());
    }
    stored.clone().ok_or(ControllerError::MissingTarget)
}

pub enum Controller {
    Calf(Box<CalfController>),
    SafeOnly(SampledController),
}

impl Controller {
    pub fn name(&self) -> &'static str {
        match self {
            Controller::Calf(c) => c.variant().as_str(),
            Controller::SafeOnly(_) => "safe-only",
        }
    }

    pub fn as_calf(&self) -> Option<&CalfController> {
        match self {
            Controller::Calf(c) => Some(c),
            Controller::SafeOnly(_) => None,
        }
    }

    pub fn as_safe_only(&self) -> Option<&SampledController> {
        match self {
            Controller::Calf(_) => None,
            Controller::SafeOnly(s) => Some(s),
        }
    }
}

impl Sampled for Controller {
    fn compute_action_sampled(
        &mut self,
        time: f64,
        observation: &[f64],
        target: Option<&[f64]>,
    ) -> Result<Vec<f64>, ControllerError> {
        match self {
            Controller::Calf(c) => c.compute_action_sampled(time, observation, target),
            Controller::SafeOnly(s) => s.compute_action_sampled(time, observation, target),
        }
    }

    fn action(&self) -> &[f64] {
        match self {
            Controller::Calf(c) => c.action(),
            Controller::SafeOnly(s) => s.action(),
        }
    }
}

impl Certified for Controller {
    fn compute_lf(&self, observation: &[f64]) -> f64 {
        match self {
            Controller::Calf(c) => c.compute_lf(observation),
            Controller::SafeOnly(s) => s.compute_lf(observation),
        }
    }
}

impl Resettable for Controller {
    fn reset(&mut self) {
        match self {
            Controller::Calf(c) => c.reset(),
            Controller::SafeOnly(s) => s.reset(),
        }
    }
}

pub fn build_safe_controller(cfg: &ControllerConfig) -> Box<dyn SafeController> {
    match cfg.system {
        SystemKind::KinPoint => Box::new(KinPointController::new(
            cfg.safe.gain,
            cfg.observation_dim(),
        )),
        SystemKind::Ni => Box::new(NiBacksteppingController::new(cfg.safe.gain)),
        SystemKind::Endi => Box::new(
            EndiBacksteppingController::new(cfg.safe.gain, cfg.safe.mass, cfg.safe.inertia)
                .with_theta_search(cfg.safe.theta_xtol, cfg.safe.theta_max_evals),
        ),
    }
}

/// Nominal plant model for the configured system.
pub fn build_dynamics(cfg: &ControllerConfig) -> Box<dyn Dynamics> {
    match cfg.system {
        SystemKind::KinPoint => Box::new(KinematicPoint {
            dim: cfg.observation_dim(),
        }),
        SystemKind::Ni => Box::new(ThreeWheelRobotNi),
        SystemKind::Endi => Box::new(ThreeWheelRobotEndi {
            mass: cfg.safe.mass,
            inertia: cfg.safe.inertia,
        }),
    }
}

fn nelder_mead(cfg: &ControllerConfig) -> NelderMead {
    NelderMead {
        iters_per_dim: cfg.optimizer.iters_per_dim,
        xtol: cfg.optimizer.xtol,
        ftol: cfg.optimizer.ftol,
    }
}

/// Build a controller with Nelder–Mead solvers for actor and critic.
pub fn build_controller(cfg: &ControllerConfig) -> Result<Controller, ConfigError> {
    build_controller_with(cfg, Box::new(nelder_mead(cfg)), Box::new(nelder_mead(cfg)))
}

/// Build a controller with caller-supplied solvers.
pub fn build_controller_with(
    cfg: &ControllerConfig,
    actor_optimizer: Box<dyn Optimizer>,
    critic_optimizer: Box<dyn Optimizer>,
) -> Result<Controller, ConfigError> {
    cfg.validate()?;

    let safe = build_safe_controller(cfg);
    if cfg.safe_only {
        return Ok(Controller::SafeOnly(SampledController::new(
            safe,
            cfg.sampling_time,
            cfg.time_start,
            cfg.action_init.clone(),
            cfg.action_bounds.clone(),
            cfg.observation_target.clone(),
            cfg.record_certificate,
        )));
    }

    let n = cfg.observation_dim();
    let m = cfg.action_dim();
    let objective = RunningObjective::new(
        cfg.objective.observation_weights.clone(),
        cfg.objective.action_weights.clone(),
    );

    let critic = Critic::new(
        Box::new(QuadraticCritic::new(n, cfg.critic.weight_max)),
        cfg.critic_initial_weights(),
        critic_optimizer,
        objective.clone(),
        &cfg.critic,
        cfg.sampling_time,
    );

    let actor = Actor::new(
        Box::new(LinearPolicy::new(n, m, cfg.actor.weight_max)),
        cfg.actor_initial_weights(),
        actor_optimizer,
        Box::new(EulerPredictor::new(build_dynamics(cfg))),
        objective,
        &cfg.actor,
        cfg.critic.safe_decay_rate,
        cfg.sampling_time,
        cfg.action_init.clone(),
        cfg.action_bounds.clone(),
    );

    Ok(Controller::Calf(Box::new(CalfController::new(
        cfg, actor, critic, safe,
    ))))
}
