// src/critic.rs
//
// Learned certificate (CALF critic).
//
// The critic fits a value function to buffered transitions by temporal
// differences while penalizing violations of the certificate constraints
// at the current observation:
//
//   decrease : V_w(o) - V_cached(o_lg) <= -nu * dt * r_prev
//   lower    : V_w(o) >= c_lb * |o|^2
//   upper    : V_w(o) <= c_ub * |o|^2
//
// Optimization only ever produces a candidate. Whether the candidate is
// trusted is decided by `acceptance_test`; the orchestrator then drives
// the two-phase commit (update_weights, cache_weights) or reverts with
// restore_weights.

use crate::buffer::ObservationActionBuffer;
use crate::config::CriticConfig;
use crate::diagnostics::{DiagnosticLog, RejectReason};
use crate::model::CriticModel;
use crate::objective::RunningObjective;
use crate::optimizer::Optimizer;
use crate::types::{norm_sq, sub, AcceptanceStatus, WeightChoice};
use crate::weights::WeightSlots;

pub struct Critic {
    model: Box<dyn CriticModel>,
    weights: WeightSlots,
    weight_bounds: Vec<(f64, f64)>,
    optimizer: Box<dyn Optimizer>,
    objective: RunningObjective,
    buffer: ObservationActionBuffer,
    target: Vec<f64>,
    discount_factor: f64,
    safe_decay_rate: f64,
    lb_coefficient: f64,
    ub_coefficient: f64,
    constraint_penalty: f64,
    dt: f64,
    observation_last_good: Option<Vec<f64>>,
    r_prev: f64,
    calf_log: DiagnosticLog<f64>,
    status: AcceptanceStatus,
    last_converged: bool,
}

impl Critic {
    pub fn new(
        model: Box<dyn CriticModel>,
        initial_weights: Vec<f64>,
        optimizer: Box<dyn Optimizer>,
        objective: RunningObjective,
        cfg: &CriticConfig,
        dt: f64,
    ) -> Self {
        let weight_bounds = model.weight_bounds();
        Self {
            model,
            weights: WeightSlots::new(initial_weights),
            weight_bounds,
            optimizer,
            objective,
            buffer: ObservationActionBuffer::new(cfg.buffer_size),
            target: Vec::new(),
            discount_factor: cfg.discount_factor,
            safe_decay_rate: cfg.safe_decay_rate,
            lb_coefficient: cfg.lb_coefficient,
            ub_coefficient: cfg.ub_coefficient,
            constraint_penalty: cfg.constraint_penalty,
            dt,
            observation_last_good: None,
            r_prev: 0.0,
            calf_log: DiagnosticLog::default(),
            status: AcceptanceStatus::Pending,
            last_converged: true,
        }
    }

    pub fn update_target(&mut self, target: &[f64]) {
        self.target = target.to_vec();
    }

    /// Record the observation just reached with the action that led to it.
    pub fn update_buffers(&mut self, observation: &[f64], action: &[f64]) {
        self.buffer.push(observation, action);
    }

    fn relative(&self, observation: &[f64]) -> Vec<f64> {
        sub(observation, &self.target)
    }

    fn value_with(&self, weights: &[f64], observation: &[f64]) -> f64 {
        self.model.evaluate(weights, &self.relative(observation))
    }

    /// Certificate at an absolute observation under the chosen weights.
    pub fn value(&self, observation: &[f64], choice: WeightChoice) -> f64 {
        match choice {
            WeightChoice::Stored => self.value_with(self.weights.cached(), observation),
            WeightChoice::Working => self.value_with(self.weights.working(), observation),
        }
    }

    pub fn candidate_value(&self, observation: &[f64]) -> f64 {
        self.value_with(self.weights.candidate(), observation)
    }

    /// Constraint residuals at `observation` for `weights`; positive means
    /// violated. Order: decrease, lower, upper.
    fn constraint_residuals(&self, weights: &[f64], observation: &[f64]) -> [f64; 3] {
        let v = self.value_with(weights, observation);
        let sq = norm_sq(&self.relative(observation));
        let decrease = match &self.observation_last_good {
            Some(lg) => {
                v - self.value_with(self.weights.cached(), lg)
                    + self.safe_decay_rate * self.dt * self.r_prev
            }
            None => f64::NEG_INFINITY,
        };
        [decrease, self.lb_coefficient * sq - v, v - self.ub_coefficient * sq]
    }

    fn cost(&self, weights: &[f64]) -> f64 {
        let mut td = 0.0;
        for (obs, action, next_obs) in self.buffer.transitions() {
            let r = self.objective.evaluate(&self.relative(obs), action);
            let e = self.value_with(weights, obs)
                - self.discount_factor * self.value_with(weights, next_obs)
                - self.dt * r;
            td += e * e;
        }

        let penalty = match self.buffer.latest_observation() {
            Some(obs) => self
                .constraint_residuals(weights, obs)
                .iter()
                .map(|g| g.max(0.0).powi(2))
                .sum::<f64>(),
            None => 0.0,
        };

        td + self.constraint_penalty * penalty
    }

    /// Run the solver from the cached weights and stage the result as the
    /// candidate. On non-convergence the candidate is the cached weights.
    pub fn optimize_weights(&mut self) -> bool {
        let x0 = self.weights.cached().to_vec();
        let result = {
            let objective = |w: &[f64]| self.cost(w);
            self.optimizer.minimize(&objective, &x0, &self.weight_bounds)
        };
        let usable = result.converged && result.x.iter().all(|w| w.is_finite());
        if usable {
            self.weights.set_candidate(result.x);
        } else {
            self.weights.discard_candidate();
        }
        self.last_converged = usable;
        usable
    }

    /// Check the staged candidate at `observation`.
    pub fn acceptance_test(&self, observation: &[f64]) -> Result<(), (RejectReason, f64)> {
        if !self.last_converged {
            return Err((RejectReason::NotConverged, 0.0));
        }
        let v = self.candidate_value(observation);
        if !v.is_finite() {
            return Err((RejectReason::NonFinite, f64::NAN));
        }
        let [decrease, lower, upper] =
            self.constraint_residuals(self.weights.candidate(), observation);
        if decrease > 0.0 {
            return Err((RejectReason::Decrease, decrease));
        }
        if lower > 0.0 {
            return Err((RejectReason::LowerBound, lower));
        }
        if upper > 0.0 {
            return Err((RejectReason::UpperBound, upper));
        }
        Ok(())
    }

    pub fn update_weights(&mut self) {
        self.weights.update();
    }

    pub fn cache_weights(&mut self) {
        self.weights.cache();
    }

    pub fn restore_weights(&mut self) {
        self.weights.restore();
    }

    pub fn weights_acceptance_status(&self) -> AcceptanceStatus {
        self.status
    }

    pub fn set_weights_acceptance_status(&mut self, status: AcceptanceStatus) {
        self.status = status;
    }

    pub fn observation_last_good(&self) -> Option<&[f64]> {
        self.observation_last_good.as_deref()
    }

    pub fn set_observation_last_good(&mut self, observation: &[f64]) {
        self.observation_last_good = Some(observation.to_vec());
    }

    pub fn r_prev(&self) -> f64 {
        self.r_prev
    }

    /// Assigned, never accumulated.
    pub fn set_r_prev(&mut self, r: f64) {
        self.r_prev = r;
    }

    pub fn calf_log(&self) -> &DiagnosticLog<f64> {
        &self.calf_log
    }

    pub fn log_certificate(&mut self, value: f64) {
        self.calf_log.push(value);
    }

    pub fn backfill_certificate(&mut self, value: f64) -> bool {
        self.calf_log.replace_last(value)
    }

    /// Certificate at the last good observation under cached weights.
    pub fn last_good_certificate(&self) -> Option<f64> {
        self.observation_last_good
            .as_ref()
            .map(|lg| self.value(lg, WeightChoice::Stored))
    }

    pub fn cached_weights(&self) -> &[f64] {
        self.weights.cached()
    }

    pub fn working_weights(&self) -> &[f64] {
        self.weights.working()
    }

    pub fn candidate_weights(&self) -> &[f64] {
        self.weights.candidate()
    }

    pub fn weights_displacement(&self) -> f64 {
        self.weights.displacement()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Episode reset. Cached weights persist.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.weights.restore();
        self.weights.discard_candidate();
        self.observation_last_good = None;
        self.r_prev = 0.0;
        self.calf_log.clear();
        self.status = AcceptanceStatus::Pending;
        self.last_converged = true;
    }
}
