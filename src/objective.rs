// src/objective.rs
//
// Running objective r(o, a) = o' Q o + a' R a with diagonal Q and R.

#[derive(Debug, Clone, PartialEq)]
pub struct RunningObjective {
    observation_weights: Vec<f64>,
    action_weights: Vec<f64>,
}

impl RunningObjective {
    pub fn new(observation_weights: Vec<f64>, action_weights: Vec<f64>) -> Self {
        Self {
            observation_weights,
            action_weights,
        }
    }

    pub fn observation_weights(&self) -> &[f64] {
        &self.observation_weights
    }

    pub fn action_weights(&self) -> &[f64] {
        &self.action_weights
    }

    /// Observation is expected relative to the target.
    pub fn evaluate(&self, observation: &[f64], action: &[f64]) -> f64 {
        let state: f64 = self
            .observation_weights
            .iter()
            .zip(observation.iter())
            .map(|(q, o)| q * o * o)
            .sum();
        let effort: f64 = self
            .action_weights
            .iter()
            .zip(action.iter())
            .map(|(r, a)| r * a * a)
            .sum();
        state + effort
    }
}
