// src/actor.rs
//
// Parametrized policy with cached/candidate weights.
//
// The actor never certifies itself: the orchestrator inspects the
// candidate action and decides whether `update_and_cache_weights` runs.

use crate::buffer::ObservationActionBuffer;
use crate::config::ActorConfig;
use crate::critic::Critic;
use crate::model::ActorModel;
use crate::objective::RunningObjective;
use crate::optimizer::Optimizer;
use crate::predictor::Predictor;
use crate::types::{apply_bounds, sub, AcceptanceStatus, ActionBounds, WeightChoice};
use crate::weights::WeightSlots;

pub struct Actor {
    model: Box<dyn ActorModel>,
    weights: WeightSlots,
    weight_bounds: Vec<(f64, f64)>,
    optimizer: Box<dyn Optimizer>,
    predictor: Box<dyn Predictor>,
    objective: RunningObjective,
    buffer: ObservationActionBuffer,
    discount_factor: f64,
    constraint_penalty: f64,
    safe_decay_rate: f64,
    dt: f64,
    target: Vec<f64>,
    observation: Vec<f64>,
    action: Vec<f64>,
    action_init: Vec<f64>,
    action_bounds: Option<ActionBounds>,
    status: AcceptanceStatus,
}

impl Actor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: Box<dyn ActorModel>,
        initial_weights: Vec<f64>,
        optimizer: Box<dyn Optimizer>,
        predictor: Box<dyn Predictor>,
        objective: RunningObjective,
        cfg: &ActorConfig,
        safe_decay_rate: f64,
        dt: f64,
        action_init: Vec<f64>,
        action_bounds: Option<ActionBounds>,
    ) -> Self {
        let weight_bounds = model.weight_bounds();
        Self {
            model,
            weights: WeightSlots::new(initial_weights),
            weight_bounds,
            optimizer,
            predictor,
            objective,
            buffer: ObservationActionBuffer::new(cfg.buffer_size),
            discount_factor: cfg.discount_factor,
            constraint_penalty: cfg.constraint_penalty,
            safe_decay_rate,
            dt,
            target: Vec::new(),
            observation: Vec::new(),
            action: action_init.clone(),
            action_init,
            action_bounds,
            status: AcceptanceStatus::Pending,
        }
    }

    pub fn receive_observation(&mut self, observation: &[f64]) {
        self.observation = observation.to_vec();
    }

    pub fn update_target(&mut self, target: &[f64]) {
        self.target = target.to_vec();
    }

    pub fn update_buffers(&mut self, observation: &[f64], action: &[f64]) {
        self.buffer.push(observation, action);
    }

    /// Clipped policy output at an absolute observation.
    fn policy(&self, weights: &[f64], observation: &[f64]) -> Vec<f64> {
        let mut action = self
            .model
            .evaluate(weights, &sub(observation, &self.target));
        apply_bounds(self.action_bounds.as_ref(), &mut action);
        action
    }

    pub fn candidate_action(&self, observation: &[f64]) -> Vec<f64> {
        self.policy(self.weights.candidate(), observation)
    }

    /// One-step prediction from an absolute observation.
    pub fn predict(&self, observation: &[f64], action: &[f64]) -> Vec<f64> {
        self.predictor.predict(observation, action, self.dt)
    }

    pub fn running_cost(&self, observation: &[f64], action: &[f64]) -> f64 {
        self.objective
            .evaluate(&sub(observation, &self.target), action)
    }

    fn cost(&self, weights: &[f64], critic: &Critic) -> f64 {
        let mut total = 0.0;
        let mut visited = 0;
        for obs in self.buffer.observations() {
            let a = self.policy(weights, obs);
            let next = self.predict(obs, &a);
            total += self.running_cost(obs, &a)
                + self.discount_factor * critic.value(&next, WeightChoice::Working);
            visited += 1;
        }
        if visited == 0 && !self.observation.is_empty() {
            let a = self.policy(weights, &self.observation);
            let next = self.predict(&self.observation, &a);
            total += self.running_cost(&self.observation, &a)
                + self.discount_factor * critic.value(&next, WeightChoice::Working);
        }

        if !self.observation.is_empty() {
            let a = self.policy(weights, &self.observation);
            let next = self.predict(&self.observation, &a);
            let g = critic.value(&next, WeightChoice::Working)
                - critic.value(&self.observation, WeightChoice::Working)
                + self.safe_decay_rate * self.dt * self.running_cost(&self.observation, &a);
            total += self.constraint_penalty * g.max(0.0).powi(2);
        }

        total
    }

    /// Minimize the accumulated cost over the buffer, starting from the
    /// cached weights. Produces a candidate only.
    pub fn optimize_weights(&mut self, critic: &Critic) -> bool {
        let x0 = self.weights.cached().to_vec();
        let result = {
            let objective = |w: &[f64]| self.cost(w, critic);
            self.optimizer.minimize(&objective, &x0, &self.weight_bounds)
        };
        let usable = result.converged && result.x.iter().all(|w| w.is_finite());
        if usable {
            self.weights.set_candidate(result.x);
        } else {
            self.weights.discard_candidate();
        }
        usable
    }

    pub fn update_and_cache_weights(&mut self) {
        self.weights.update_and_cache();
    }

    /// Synthesize the action from cached weights at the received observation.
    pub fn update_action(&mut self) {
        self.action = self.policy(self.weights.cached(), &self.observation);
    }

    /// Overwrite the current action (fallback path).
    pub fn set_action(&mut self, action: Vec<f64>) {
        self.action = action;
    }

    pub fn action(&self) -> &[f64] {
        &self.action
    }

    pub fn weights_acceptance_status(&self) -> AcceptanceStatus {
        self.status
    }

    pub fn set_weights_acceptance_status(&mut self, status: AcceptanceStatus) {
        self.status = status;
    }

    pub fn cached_weights(&self) -> &[f64] {
        self.weights.cached()
    }

    pub fn candidate_weights(&self) -> &[f64] {
        self.weights.candidate()
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Episode reset. Cached weights persist.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.weights.restore();
        self.weights.discard_candidate();
        self.observation.clear();
        self.action = self.action_init.clone();
        self.status = AcceptanceStatus::Pending;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CriticConfig;
    use crate::model::{LinearPolicy, QuadraticCritic};
    use crate::optimizer::NelderMead;
    use crate::plant::KinematicPoint;
    use crate::predictor::EulerPredictor;

    fn actor(initial: Vec<f64>, bounds: Option<ActionBounds>) -> Actor {
        let mut a = Actor::new(
            Box::new(LinearPolicy::new(2, 2, 10.0)),
            initial,
            Box::new(NelderMead {
                iters_per_dim: 500,
                xtol: 1e-6,
                ftol: 1e-9,
            }),
            Box::new(EulerPredictor::new(Box::new(KinematicPoint { dim: 2 }))),
            RunningObjective::new(vec![1.0, 1.0], vec![0.1, 0.1]),
            &ActorConfig {
                buffer_size: 5,
                discount_factor: 1.0,
                constraint_penalty: 1e3,
                initial_weights: None,
                weight_max: 10.0,
            },
            1.0,
            0.1,
            vec![0.0, 0.0],
            bounds,
        );
        a.update_target(&[0.0, 0.0]);
        a
    }

    fn critic() -> Critic {
        let mut c = Critic::new(
            Box::new(QuadraticCritic::new(2, 1e3)),
            QuadraticCritic::identity_weights(2),
            Box::new(NelderMead::default()),
            RunningObjective::new(vec![1.0, 1.0], vec![0.1, 0.1]),
            &CriticConfig {
                buffer_size: 5,
                discount_factor: 1.0,
                safe_decay_rate: 1.0,
                lb_coefficient: 1e-3,
                ub_coefficient: 1e3,
                constraint_penalty: 1e3,
                initial_weights: None,
                weight_max: 1e3,
            },
            0.1,
        );
        c.update_target(&[0.0, 0.0]);
        c
    }

    #[test]
    fn update_action_uses_cached_weights_and_bounds() {
        let mut a = actor(
            LinearPolicy::proportional_weights(2, 2, 1.0),
            ActionBounds::symmetric(&[0.5, 0.5]),
        );
        a.receive_observation(&[2.0, -0.2]);
        a.update_action();
        assert_eq!(a.action(), &[-0.5, 0.2]);
    }

    #[test]
    fn optimization_does_not_touch_cached_weights() {
        let mut a = actor(vec![0.0; 4], None);
        let c = critic();
        a.receive_observation(&[1.0, 0.5]);
        a.update_buffers(&[1.0, 0.5], &[0.0, 0.0]);
        assert!(a.optimize_weights(&c));
        assert_eq!(a.cached_weights(), &[0.0; 4]);
        let improved = a.candidate_action(&[1.0, 0.5]);
        // Any useful policy pushes the point back toward the origin.
        assert!(improved[0] < 0.0);
    }

    #[test]
    fn reset_restores_initial_action() {
        let mut a = actor(vec![0.0; 4], None);
        a.set_action(vec![1.0, 1.0]);
        a.set_weights_acceptance_status(AcceptanceStatus::Accepted);
        a.reset();
        assert_eq!(a.action(), &[0.0, 0.0]);
        assert_eq!(a.weights_acceptance_status(), AcceptanceStatus::Pending);
    }
}
