// src/safe/kin_point.rs
//
// Proportional controller for the kinematic point: u = -gain * o.

use super::SafeController;
use crate::controller::{Certified, Resettable};
use crate::types::norm_sq;

#[derive(Debug, Clone)]
pub struct KinPointController {
    gain: f64,
    dim: usize,
}

impl KinPointController {
    pub fn new(gain: f64, dim: usize) -> Self {
        Self { gain, dim }
    }
}

impl Certified for KinPointController {
    fn compute_lf(&self, observation: &[f64]) -> f64 {
        if observation.len() != self.dim {
            return f64::NAN;
        }
        norm_sq(observation)
    }
}

impl Resettable for KinPointController {
    fn reset(&mut self) {}
}

impl SafeController for KinPointController {
    fn name(&self) -> &'static str {
        "kin_point"
    }

    fn observation_dim(&self) -> usize {
        self.dim
    }

    fn action_dim(&self) -> usize {
        self.dim
    }

    fn compute_action(&mut self, observation: &[f64]) -> Vec<f64> {
        observation.iter().map(|o| -self.gain * o).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proportional_law() {
        let mut ctrl = KinPointController::new(2.0, 2);
        assert_eq!(ctrl.compute_action(&[1.0, -0.5]), vec![-2.0, 1.0]);
        assert_eq!(ctrl.compute_lf(&[3.0, 4.0]), 25.0);
        assert!(ctrl.compute_lf(&[3.0]).is_nan());
    }
}
