// src/predictor.rs
//
// One-step-ahead state prediction used by the actor.

use crate::plant::Dynamics;

pub trait Predictor: Send {
    fn predict(&self, observation: &[f64], action: &[f64], dt: f64) -> Vec<f64>;
}

/// Explicit Euler step `o' = o + dt * f(o, a)` on the nominal model.
pub struct EulerPredictor {
    dynamics: Box<dyn Dynamics>,
}

impl EulerPredictor {
    pub fn new(dynamics: Box<dyn Dynamics>) -> Self {
        Self { dynamics }
    }
}

impl Predictor for EulerPredictor {
    fn predict(&self, observation: &[f64], action: &[f64], dt: f64) -> Vec<f64> {
        let rate = self.dynamics.rhs(observation, action);
        observation
            .iter()
            .zip(rate.iter())
            .map(|(o, r)| o + dt * r)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plant::KinematicPoint;

    #[test]
    fn euler_step_on_point() {
        let p = EulerPredictor::new(Box::new(KinematicPoint { dim: 2 }));
        assert_eq!(p.predict(&[1.0, 2.0], &[-1.0, 0.0], 0.5), vec![0.5, 2.0]);
    }
}
